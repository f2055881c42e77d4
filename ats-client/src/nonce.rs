//! Request nonce generation

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Generator for random timestamp request nonces.
///
/// Uses `StdRng` seeded from OS entropy. Nonces are positive 63-bit values.
pub struct NonceGenerator {
    rng: StdRng,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator, for reproducible tests
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a new non-zero nonce
    pub fn generate(&mut self) -> u64 {
        loop {
            let nonce = self.rng.next_u64() >> 1;
            if nonce != 0 {
                return nonce;
            }
        }
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_generation() {
        let mut gen = NonceGenerator::new();
        let nonce1 = gen.generate();
        let nonce2 = gen.generate();

        // Nonces should be different (with overwhelming probability)
        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn test_nonce_fits_63_bits() {
        let mut gen = NonceGenerator::new();
        for _ in 0..1000 {
            let nonce = gen.generate();
            assert!(nonce > 0);
            assert!(nonce < 1 << 63);
        }
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = NonceGenerator::from_seed(42);
        let mut b = NonceGenerator::from_seed(42);
        for _ in 0..10 {
            assert_eq!(a.generate(), b.generate());
        }
    }
}
