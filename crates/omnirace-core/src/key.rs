//! Credential pools and key masking.
//!
//! Each provider is configured through one comma-separated environment value.
//! The pool draws one key uniformly at random per request; credentials live in
//! [`SecretString`] and only the masked form ever reaches a log line, header,
//! or response body.

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};

/// An ordered pool of credentials for one provider.
pub struct KeyPool {
    keys: Vec<SecretString>,
}

impl KeyPool {
    /// Parse a pool from a raw environment value.
    ///
    /// Splits on commas, trims whitespace, and drops empty entries. Returns
    /// `None` when no usable key remains — callers must treat that as "skip
    /// this provider", not as an error.
    #[must_use]
    pub fn from_env_value(raw: &str) -> Option<Self> {
        let keys: Vec<SecretString> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::new(k.to_string()))
            .collect();

        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    /// Read and parse the pool for the named environment variable.
    #[must_use]
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().and_then(|v| Self::from_env_value(&v))
    }

    /// Number of keys in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the pool is empty. Parsing never produces an empty pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Draw one key uniformly at random.
    ///
    /// `thread_rng` is a CSPRNG, so selection is both uniform and
    /// cryptographically strong. Never returns an empty string.
    #[must_use]
    pub fn pick(&self) -> &SecretString {
        let idx = rand::thread_rng().gen_range(0..self.keys.len());
        &self.keys[idx]
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &format!("[{} masked]", self.keys.len()))
            .finish()
    }
}

/// Irreversible display form of a credential.
///
/// Keeps the first four and last two characters; anything shorter than eight
/// characters collapses to `"***"` so nothing recoverable leaks.
#[must_use]
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

/// Mask the secret held by a [`SecretString`].
#[must_use]
pub fn mask_secret(secret: &SecretString) -> String {
    mask_key(secret.expose_secret())
}
