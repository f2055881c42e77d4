//! Client configuration

use ats_types::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ClientError, Result};

/// Environment variable overriding the timestamp authority URL
pub const TSA_URL_ENV: &str = "ATS_TSA_URL";

pub const DEFAULT_TSA_URL: &str = "https://zeitstempel.dfn.de/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtsConfig {
    /// Digest algorithm used for new hash trees
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Timestamp authority configuration
    pub authority: AuthorityConfig,

    /// Record storage configuration
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// RFC 3161 endpoint accepting HTTP POST
    pub url: String,

    /// Connection establishment timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Overall request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Ask the authority to embed its signing certificate
    #[serde(default = "default_true")]
    pub request_certificates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the record database
    pub path: PathBuf,
}

fn default_true() -> bool {
    true
}

impl Default for AtsConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            authority: AuthorityConfig {
                url: DEFAULT_TSA_URL.to_string(),
                connect_timeout_ms: 10_000,
                request_timeout_ms: 10_000,
                request_certificates: true,
            },
            storage: StorageConfig {
                path: PathBuf::from(".ats"),
            },
        }
    }
}

impl AtsConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: AtsConfig = toml::from_str(&contents).map_err(|e| {
            ClientError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.apply_env();
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| {
            ClientError::Config(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Load `path` when given, otherwise start from defaults.
    ///
    /// The environment override applies in both cases.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::from_file(path),
            Some(path) => Err(ClientError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            ))),
            None => {
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(TSA_URL_ENV) {
            if !url.is_empty() {
                self.authority.url = url;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = AtsConfig::default();
        assert_eq!(config.authority.url, DEFAULT_TSA_URL);
        assert_eq!(config.authority.connect_timeout_ms, 10_000);
        assert_eq!(config.authority.request_timeout_ms, 10_000);
        assert!(config.authority.request_certificates);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            hash_algorithm = "SHA-512"

            [authority]
            url = "http://tsa.example.test/"
            connect_timeout_ms = 1500
            request_timeout_ms = 3000

            [storage]
            path = "/var/lib/ats"
        "#;
        let config: AtsConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.authority.connect_timeout_ms, 1500);
        assert!(config.authority.request_certificates);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/ats"));
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let toml = r#"
            hash_algorithm = "MD5"
            [authority]
            url = "http://tsa.example.test/"
            connect_timeout_ms = 1
            request_timeout_ms = 1
            [storage]
            path = "x"
        "#;
        assert!(toml::from_str::<AtsConfig>(toml).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ats.toml");

        let mut config = AtsConfig::default();
        config.hash_algorithm = HashAlgorithm::Sha384;
        config.storage.path = dir.path().join("records");
        config.to_file(&path).unwrap();

        let mut loaded = AtsConfig::from_file(&path).unwrap();
        // The environment may override the URL in CI
        loaded.authority.url = config.authority.url.clone();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            AtsConfig::load_or_default(Some(&missing)),
            Err(ClientError::Config(_))
        ));
    }
}
