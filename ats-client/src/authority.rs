//! RFC 3161 timestamp authority access

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ats_types::messages::pki_status;
use ats_types::{HashAlgorithm, TimestampRequest, TimestampResponse, TimestampToken};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AuthorityConfig;
use crate::nonce::NonceGenerator;

pub const TIMESTAMP_QUERY: &str = "application/timestamp-query";
pub const TIMESTAMP_REPLY: &str = "application/timestamp-reply";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("Timestamp authority returned HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("Timed out waiting for the timestamp authority")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timestamp request rejected with status {status}: {text}")]
    Rejected { status: u32, text: String },

    #[error("Malformed timestamp response: {0}")]
    MalformedResponse(String),

    #[error("Token message imprint does not match the request")]
    ImprintMismatch,

    #[error("Token nonce does not match the request")]
    NonceMismatch,

    #[error("Cannot encode timestamp request: {0}")]
    InvalidRequest(String),
}

/// A source of RFC 3161 timestamp tokens
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    /// Obtain a token over the request's message imprint.
    ///
    /// A returned token has already been checked against the request.
    async fn request_timestamp(
        &self,
        request: &TimestampRequest,
    ) -> Result<TimestampToken, AuthorityError>;
}

/// Check a timestamp response against the request it answers and return its
/// token.
///
/// Only status 0 (granted) is accepted. The token's message imprint must
/// repeat the requested algorithm and digest, and a requested nonce must be
/// echoed.
pub fn validate_response(
    request: &TimestampRequest,
    response: TimestampResponse,
) -> Result<TimestampToken, AuthorityError> {
    if response.status != pki_status::GRANTED {
        return Err(AuthorityError::Rejected {
            status: response.status,
            text: response.status_text.join("; "),
        });
    }

    let token = response.token.ok_or_else(|| {
        AuthorityError::MalformedResponse("granted response carries no token".to_string())
    })?;
    let info = token
        .info()
        .map_err(|e| AuthorityError::MalformedResponse(e.to_string()))?;

    let algorithm = HashAlgorithm::from_oid(&info.message_imprint.algorithm)
        .map_err(|_| AuthorityError::ImprintMismatch)?;
    if algorithm != request.algorithm || info.message_imprint.digest != request.digest {
        return Err(AuthorityError::ImprintMismatch);
    }

    if request.nonce.is_some() && info.nonce != request.nonce {
        return Err(AuthorityError::NonceMismatch);
    }

    Ok(token)
}

/// Timestamp authority reached over HTTP POST
pub struct HttpTimestampAuthority {
    url: String,
    client: reqwest::Client,
    nonces: Mutex<NonceGenerator>,
}

impl HttpTimestampAuthority {
    /// Create an authority client with default timeouts
    pub fn new(url: impl Into<String>) -> Result<Self, AuthorityError> {
        Self::with_timeouts(url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create an authority client with explicit connect and request timeouts
    pub fn with_timeouts(
        url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthorityError::Transport(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            client,
            nonces: Mutex::new(NonceGenerator::new()),
        })
    }

    pub fn from_config(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        Self::with_timeouts(
            config.url.clone(),
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Replace the nonce source
    pub fn with_nonce_generator(mut self, generator: NonceGenerator) -> Self {
        self.nonces = Mutex::new(generator);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_nonce(&self) -> u64 {
        let mut nonces = self.nonces.lock().unwrap_or_else(|e| e.into_inner());
        nonces.generate()
    }
}

fn transport_error(err: reqwest::Error) -> AuthorityError {
    if err.is_timeout() {
        AuthorityError::Timeout
    } else {
        AuthorityError::Transport(err.to_string())
    }
}

#[async_trait]
impl TimestampAuthority for HttpTimestampAuthority {
    async fn request_timestamp(
        &self,
        request: &TimestampRequest,
    ) -> Result<TimestampToken, AuthorityError> {
        let mut request = request.clone();
        if request.nonce.is_none() {
            request.nonce = Some(self.next_nonce());
        }
        let body = request
            .to_der()
            .map_err(|e| AuthorityError::InvalidRequest(e.to_string()))?;

        debug!(url = %self.url, bytes = body.len(), "Sending timestamp request");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, TIMESTAMP_QUERY)
            .header(ACCEPT, TIMESTAMP_REPLY)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            warn!(url = %self.url, status = status.as_u16(), "Timestamp authority returned an error status");
            return Err(AuthorityError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let reply = TimestampResponse::from_der(&bytes)
            .map_err(|e| AuthorityError::MalformedResponse(e.to_string()))?;

        let result = validate_response(&request, reply);
        if let Err(e) = &result {
            warn!(url = %self.url, error = %e, "Timestamp response refused");
        }
        result
    }
}
