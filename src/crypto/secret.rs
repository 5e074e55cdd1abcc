//! Plaintext secret holder
//!
//! Decrypted private keys, phrases and API credentials only ever live in a
//! `VaultSecret`. The buffer is zeroized on drop and never printed.

use serde::{Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

/// A plaintext secret scoped to a single request
#[derive(Clone, Default, Zeroize)]
#[zeroize(drop)]
pub struct VaultSecret {
    inner: String,
}

impl VaultSecret {
    pub fn new(secret: String) -> Self {
        Self { inner: secret }
    }

    /// Expose the plaintext
    ///
    /// Keep the borrow as short as possible; never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Same secret with a suffix appended (used for layered key derivation)
    pub(crate) fn with_suffix(&self, suffix: &str) -> VaultSecret {
        let mut derived = String::with_capacity(self.inner.len() + suffix.len());
        derived.push_str(&self.inner);
        derived.push_str(suffix);
        VaultSecret::new(derived)
    }
}

impl fmt::Debug for VaultSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSecret")
            .field("inner", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for VaultSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for VaultSecret {
    fn from(secret: String) -> Self {
        Self::new(secret)
    }
}

impl From<&str> for VaultSecret {
    fn from(secret: &str) -> Self {
        Self::new(secret.to_string())
    }
}

impl Serialize for VaultSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl PartialEq for VaultSecret {
    fn eq(&self, other: &Self) -> bool {
        let a = self.inner.as_bytes();
        let b = other.inner.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        // constant time over equal-length inputs
        a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl Eq for VaultSecret {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_are_redacted() {
        let secret = VaultSecret::from("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"[REDACTED]\"");
    }

    #[test]
    fn test_equality_and_suffix() {
        let secret = VaultSecret::from("pw1");
        assert_eq!(secret, VaultSecret::from("pw1"));
        assert_ne!(secret, VaultSecret::from("pw2"));
        assert_eq!(secret.with_suffix("@tea").expose_secret(), "pw1@tea");
        assert_eq!(secret.len(), 3);
    }
}
