//! Join links: shareable, expiring, usage-limited bearer tokens

use super::types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque join token
///
/// `Debug` and `Display` print a short fingerprint, never the secret. Use
/// [`JoinToken::expose_secret`] only where the token must leave the process
/// (the response to the admin who generated it, or a share URL).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct JoinToken(String);

impl JoinToken {
    pub fn new(secret: impl Into<String>) -> Self {
        JoinToken(secret.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Stable lookup key for token indexes (BLAKE3 of the secret, hex)
    pub fn index_key(&self) -> String {
        blake3::hash(self.0.as_bytes()).to_hex().to_string()
    }

    /// Short, non-reversible identifier safe to log
    pub fn fingerprint(&self) -> String {
        let key = self.index_key();
        key[..12].to_string()
    }

    /// Compare against a presented secret without early exit on mismatch
    pub fn matches(&self, presented: &JoinToken) -> bool {
        blake3::hash(self.0.as_bytes()) == blake3::hash(presented.0.as_bytes())
    }
}

impl fmt::Debug for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinToken({})", self.fingerprint())
    }
}

impl fmt::Display for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tok:{}", self.fingerprint())
    }
}

/// Why a join link refused a consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    Expired,
    Exhausted,
}

impl LinkRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRejection::Expired => "expired",
            LinkRejection::Exhausted => "exhausted",
        }
    }
}

/// The live join link of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLink {
    pub token: JoinToken,

    /// Admin who generated the link
    pub created_by: UserId,

    pub created_at: Timestamp,

    /// The link is unusable at and after this instant
    pub expires_at: Timestamp,

    /// Maximum number of consumptions (None = unlimited)
    pub usage_limit: Option<u32>,

    /// Successful consumptions so far; only ever incremented
    pub usage_count: u32,
}

impl JoinLink {
    pub fn new(
        token: JoinToken,
        created_by: UserId,
        created_at: Timestamp,
        expires_at: Timestamp,
        usage_limit: Option<u32>,
    ) -> Self {
        JoinLink {
            token,
            created_by,
            created_at,
            expires_at,
            usage_limit,
            usage_count: 0,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .map(|limit| self.usage_count >= limit)
            .unwrap_or(false)
    }

    /// Validity = not expired AND not exhausted
    pub fn check_valid_at(&self, now: Timestamp) -> Result<(), LinkRejection> {
        if self.is_expired_at(now) {
            return Err(LinkRejection::Expired);
        }
        if self.is_exhausted() {
            return Err(LinkRejection::Exhausted);
        }
        Ok(())
    }

    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.check_valid_at(now).is_ok()
    }

    /// Check validity and record one consumption as a single step
    ///
    /// Returns the new usage count. Callers must hold exclusive access to the
    /// owning conversation for the duration of the call.
    pub fn try_consume_at(&mut self, now: Timestamp) -> Result<u32, LinkRejection> {
        self.check_valid_at(now)?;
        self.usage_count = self
            .usage_count
            .checked_add(1)
            .ok_or(LinkRejection::Exhausted)?;
        Ok(self.usage_count)
    }

    pub fn try_consume(&mut self) -> Result<u32, LinkRejection> {
        self.try_consume_at(Timestamp::now())
    }

    /// Remaining consumptions, or `None` when unlimited
    pub fn remaining_uses(&self) -> Option<u32> {
        self.usage_limit
            .map(|limit| limit.saturating_sub(self.usage_count))
    }

    /// Shareable URL with the token as the final path segment
    pub fn share_url(&self, base_url: &str) -> String {
        format!(
            "{}/join/{}",
            base_url.trim_end_matches('/'),
            self.token.expose_secret()
        )
    }
}
