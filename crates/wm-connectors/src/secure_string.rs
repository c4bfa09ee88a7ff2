//! Zeroizing string for credentials.
//!
//! Bearer tokens, signed assertions and service-account private keys pass
//! through the migrator for every identity. They are held in [`SecureString`]
//! so they never show up in `Debug` output and are wiped from memory on drop.

use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::Zeroizing;

/// A string whose contents are redacted when formatted and zeroized on drop.
///
/// ```
/// use wm_connectors::SecureString;
///
/// let token = SecureString::new("id-token".to_string());
/// assert_eq!(token.expose_secret(), "id-token");
/// assert_eq!(format!("{:?}", token), "SecureString([REDACTED])");
/// ```
#[derive(Clone, Default)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    /// Exposes the secret for use in a request. Avoid copying the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Deserialize only: secrets are read from key files, never written back out.
impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecureString::new)
    }
}
