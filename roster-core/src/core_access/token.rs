//! Join token generation
//!
//! Tokens are drawn from a cryptographically secure RNG and encoded as
//! URL-safe base64 without padding, so they can be used directly as a URL
//! path segment. Uniqueness against already-issued tokens is checked by the
//! caller-supplied lookup with a small bounded retry.

use super::error::AccessError;
use super::join_link::{JoinLink, JoinToken};
use super::types::{Timestamp, UserId};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::future::Future;
use tracing::{error, warn};

/// Smallest accepted token size in bytes (128 bits)
pub const MIN_TOKEN_BYTES: usize = 16;

/// Default token size in bytes (256 bits)
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Default number of attempts to find an unused token
pub const DEFAULT_TOKEN_ATTEMPTS: u32 = 5;

/// Source of token randomness
pub trait TokenSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// Thread-local CSPRNG seeded from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn fill(&self, buf: &mut [u8]) {
        use rand::RngCore;
        rand::rng().fill_bytes(buf);
    }
}

/// Issues join links with fresh tokens
pub struct TokenGenerator {
    source: Box<dyn TokenSource>,
    token_bytes: usize,
    max_attempts: u32,
    max_expiry_days: u32,
}

impl TokenGenerator {
    pub fn new(token_bytes: usize, max_attempts: u32, max_expiry_days: u32) -> Self {
        Self::with_source(Box::new(OsTokenSource), token_bytes, max_attempts, max_expiry_days)
    }

    pub fn with_source(
        source: Box<dyn TokenSource>,
        token_bytes: usize,
        max_attempts: u32,
        max_expiry_days: u32,
    ) -> Self {
        Self {
            source,
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
            max_attempts: max_attempts.max(1),
            max_expiry_days,
        }
    }

    pub fn token_bytes(&self) -> usize {
        self.token_bytes
    }

    /// Draw a new token
    pub fn generate_token(&self) -> JoinToken {
        let mut buf = vec![0u8; self.token_bytes];
        self.source.fill(&mut buf);
        let token = JoinToken::new(URL_SAFE_NO_PAD.encode(&buf));
        zeroize::Zeroize::zeroize(&mut buf);
        token
    }

    /// Validate link parameters
    pub fn validate(
        &self,
        expires_in_days: u32,
        usage_limit: Option<u32>,
    ) -> Result<(), AccessError> {
        if expires_in_days > self.max_expiry_days {
            return Err(AccessError::validation(format!(
                "expires_in_days must be at most {}",
                self.max_expiry_days
            )));
        }
        if usage_limit == Some(0) {
            return Err(AccessError::validation(
                "usage_limit must be a positive integer when set",
            ));
        }
        Ok(())
    }

    /// Issue a link without a uniqueness check
    pub fn issue(
        &self,
        created_by: UserId,
        expires_in_days: u32,
        usage_limit: Option<u32>,
    ) -> Result<JoinLink, AccessError> {
        self.validate(expires_in_days, usage_limit)?;
        let now = Timestamp::now();
        Ok(JoinLink::new(
            self.generate_token(),
            created_by,
            now,
            now.plus_days(expires_in_days),
            usage_limit,
        ))
    }

    /// Issue a link whose token is not already taken
    ///
    /// `is_taken` is consulted for every candidate. A collision is retried up
    /// to the configured attempt count; running out of attempts means the RNG
    /// or the index is broken and is reported as an invariant violation.
    pub async fn issue_unique<F, Fut>(
        &self,
        created_by: UserId,
        expires_in_days: u32,
        usage_limit: Option<u32>,
        mut is_taken: F,
    ) -> Result<JoinLink, AccessError>
    where
        F: FnMut(JoinToken) -> Fut,
        Fut: Future<Output = Result<bool, AccessError>>,
    {
        self.validate(expires_in_days, usage_limit)?;

        for attempt in 1..=self.max_attempts {
            let token = self.generate_token();
            if !is_taken(token.clone()).await? {
                let now = Timestamp::now();
                return Ok(JoinLink::new(
                    token,
                    created_by,
                    now,
                    now.plus_days(expires_in_days),
                    usage_limit,
                ));
            }
            warn!(
                attempt,
                fingerprint = %token.fingerprint(),
                "Join token collision, retrying"
            );
        }

        error!(
            attempts = self.max_attempts,
            "Exhausted join token uniqueness retries"
        );
        Err(AccessError::InvariantViolation(format!(
            "could not generate a unique join token in {} attempts",
            self.max_attempts
        )))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BYTES, DEFAULT_TOKEN_ATTEMPTS, 365)
    }
}

impl std::fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("token_bytes", &self.token_bytes)
            .field("max_attempts", &self.max_attempts)
            .field("max_expiry_days", &self.max_expiry_days)
            .finish()
    }
}
