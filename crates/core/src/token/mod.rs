#![forbid(unsafe_code)]

//! Rolling session tokens.
//!
//! A token is `SHA-256(identity ++ secret ++ issued_at_ms)` rendered as lowercase hex. Only the
//! most recently issued hash is stored per identity, so issuing a new token (login or renewal)
//! revokes every earlier one. Two renewals racing on one identity leave only the last writer's
//! token usable.

use crate::clock::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt::Write as _;

/// Tokens older than this are rejected regardless of hash.
pub const MAX_TOKEN_AGE_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "username")]
    pub identity: String,
    #[serde(rename = "time")]
    pub issued_at_ms: i64,
    pub hash: String,
}

/// A token as handed back by a transport; any field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedToken {
    #[serde(default, rename = "username")]
    pub identity: Option<String>,
    #[serde(default, rename = "time")]
    pub issued_at_ms: Option<i64>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl PresentedToken {
    /// Returns the complete token, or `None` when a field is absent or blank.
    pub fn complete(&self) -> Option<Token> {
        let identity = self.identity.as_deref().filter(|v| !v.is_empty())?;
        let issued_at_ms = self.issued_at_ms?;
        let hash = self.hash.as_deref().filter(|v| !v.is_empty())?;
        Some(Token {
            identity: identity.to_string(),
            issued_at_ms,
            hash: hash.to_string(),
        })
    }
}

impl From<Token> for PresentedToken {
    fn from(token: Token) -> Self {
        Self {
            identity: Some(token.identity),
            issued_at_ms: Some(token.issued_at_ms),
            hash: Some(token.hash),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TokenService<C = SystemClock> {
    clock: C,
}

impl TokenService<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> TokenService<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn generate(&self, identity: &str, secret: &str) -> Token {
        issue_token(identity, secret, self.clock.now_ms())
    }

    /// Checks presence, age and the stored hash, in that order.
    ///
    /// `lookup` maps an identity to its stored hash and runs on every call that reaches the
    /// hash comparison; its error is the only way this returns `Err`.
    pub fn validate<E>(
        &self,
        token: &PresentedToken,
        lookup: impl FnOnce(&str) -> Result<Option<String>, E>,
    ) -> Result<bool, E> {
        let Some(token) = token.complete() else {
            return Ok(false);
        };
        if self.is_expired(token.issued_at_ms) {
            return Ok(false);
        }
        let stored = lookup(&token.identity)?;
        Ok(stored.as_deref() == Some(token.hash.as_str()))
    }

    /// Issues a replacement token. Callers validate first and persist the result, which revokes
    /// `token`.
    pub fn renew(&self, token: &Token, secret: &str) -> Token {
        self.generate(&token.identity, secret)
    }

    fn is_expired(&self, issued_at_ms: i64) -> bool {
        self.clock.now_ms().saturating_sub(issued_at_ms) > MAX_TOKEN_AGE_MS
    }
}

pub fn issue_token(identity: &str, secret: &str, issued_at_ms: i64) -> Token {
    Token {
        identity: identity.to_string(),
        issued_at_ms,
        hash: token_hash(identity, secret, issued_at_ms),
    }
}

fn token_hash(identity: &str, secret: &str, issued_at_ms: i64) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(issued_at_ms.to_string().as_bytes());

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
