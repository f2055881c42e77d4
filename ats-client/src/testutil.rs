//! Test utilities for exercising the client without a network authority.
//!
//! Enabled via the `test-util` feature flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ats_types::asn1::{encode_unsigned_token, integer_bytes};
use ats_types::hash::digest;
use ats_types::{MessageImprint, ObjectIdentifier, TimestampRequest, TimestampToken, TokenInfo};
use chrono::{DateTime, SubsecRound, Utc};

use crate::authority::{AuthorityError, TimestampAuthority};

/// Policy OID placed in tokens issued by [`FakeAuthority`]
pub const FAKE_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.7.1");

/// An in-process authority issuing structurally valid, unsigned tokens.
///
/// Tokens echo the request's imprint and nonce and carry an increasing
/// serial number. Every request is recorded for later inspection.
pub struct FakeAuthority {
    serial: AtomicU64,
    gen_time: Option<DateTime<Utc>>,
    tamper: bool,
    requests: Mutex<Vec<TimestampRequest>>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            serial: AtomicU64::new(1),
            gen_time: None,
            tamper: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Issue every token with a fixed generation time
    pub fn with_gen_time(mut self, gen_time: DateTime<Utc>) -> Self {
        self.gen_time = Some(gen_time);
        self
    }

    /// Timestamp a digest other than the requested one
    pub fn tampering(mut self) -> Self {
        self.tamper = true;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn last_request(&self) -> Option<TimestampRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    /// Build the token this authority would return for `request`
    pub fn issue(&self, request: &TimestampRequest) -> Result<TimestampToken, AuthorityError> {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let imprint = if self.tamper {
            digest(request.digest.as_bytes(), request.algorithm)
        } else {
            request.digest.clone()
        };

        let info = TokenInfo {
            policy: FAKE_POLICY,
            message_imprint: MessageImprint {
                algorithm: request.algorithm.tsp_oid(),
                digest: imprint,
            },
            serial_number: integer_bytes(serial),
            gen_time: self
                .gen_time
                .unwrap_or_else(|| Utc::now().trunc_subsecs(0)),
            nonce: request.nonce,
        };
        encode_unsigned_token(&info).map_err(|e| AuthorityError::MalformedResponse(e.to_string()))
    }
}

impl Default for FakeAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimestampAuthority for FakeAuthority {
    async fn request_timestamp(
        &self,
        request: &TimestampRequest,
    ) -> Result<TimestampToken, AuthorityError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.issue(request)
    }
}

/// An authority that fails every request with the same error
pub struct FailingAuthority {
    error: AuthorityError,
    attempts: AtomicU64,
}

impl FailingAuthority {
    pub fn new(error: AuthorityError) -> Self {
        Self {
            error,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimestampAuthority for FailingAuthority {
    async fn request_timestamp(
        &self,
        _request: &TimestampRequest,
    ) -> Result<TimestampToken, AuthorityError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}
