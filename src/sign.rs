//! Time-boxed signed references to storage paths.
//!
//! Subtitle URLs handed to clients never expose raw storage paths.
//! Instead the issuer mints an opaque token mapped server-side to the
//! path plus an expiry; redeeming an unknown or expired token fails.

use crate::error::{Result, VidscribeError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct TokenEntry {
    path: String,
    issued_at: Instant,
}

/// Issues and redeems signed storage-path tokens.
pub struct TokenIssuer {
    max_age: Duration,
    tokens: Mutex<HashMap<String, TokenEntry>>,
}

impl TokenIssuer {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Sign a storage-relative path, returning the secure-access URL.
    pub fn sign(&self, path: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut tokens = self.tokens.lock().expect("token table poisoned");

        // Expired entries are dropped opportunistically on each issue.
        tokens.retain(|_, entry| entry.issued_at.elapsed() <= self.max_age);
        tokens.insert(
            token.clone(),
            TokenEntry {
                path: path.to_string(),
                issued_at: Instant::now(),
            },
        );
        format!("/api/storage-secure/{token}")
    }

    /// Redeem a token for its storage path. Fails if unknown or expired.
    pub fn redeem(&self, token: &str) -> Result<String> {
        let tokens = self.tokens.lock().expect("token table poisoned");
        match tokens.get(token) {
            Some(entry) if entry.issued_at.elapsed() <= self.max_age => Ok(entry.path.clone()),
            _ => Err(VidscribeError::InvalidToken),
        }
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
