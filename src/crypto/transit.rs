//! Transit cipher
//!
//! Protects secrets while they cross the service boundary. Keyed by the
//! process-wide transit key, never by a caller password, and never used
//! for values at rest.

use tracing::{debug, warn};

use crate::config::TransitConfig;
use crate::error::{Error, Result};

use super::cipher::{self, EncryptedBlob};
use super::secret::VaultSecret;

/// Single-pass cipher under the fixed transit key
#[derive(Clone)]
pub struct TransitCipher {
    key: VaultSecret,
    legacy_plaintext_fallback: bool,
}

impl TransitCipher {
    /// Create a transit cipher
    ///
    /// With `legacy_plaintext_fallback` set, a caller password that fails
    /// to open is used verbatim (old clients sent it unsealed). Secrets
    /// other than the password never fall back.
    pub fn new(key: VaultSecret, legacy_plaintext_fallback: bool) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::Config("transit key must not be empty".to_string()));
        }
        Ok(Self {
            key,
            legacy_plaintext_fallback,
        })
    }

    pub fn from_config(config: &TransitConfig) -> Result<Self> {
        Self::new(
            VaultSecret::from(config.key.as_str()),
            config.legacy_plaintext_fallback,
        )
    }

    /// Seal a plaintext for the caller
    pub fn seal(&self, plaintext: &VaultSecret) -> EncryptedBlob {
        cipher::encrypt(plaintext.expose_secret(), &self.key)
    }

    /// Seal when present; empty secrets stay absent
    pub fn seal_opt(&self, plaintext: Option<&VaultSecret>) -> Option<EncryptedBlob> {
        plaintext.filter(|s| !s.is_empty()).map(|s| self.seal(s))
    }

    /// Open a value the caller sealed
    pub fn open(&self, sealed: &str) -> Result<VaultSecret> {
        debug!("Opening transit value, len={}", sealed.len());
        cipher::decrypt(sealed, &self.key)
    }

    /// Open when present; blank input stays absent
    pub fn open_opt(&self, sealed: Option<&str>) -> Result<Option<VaultSecret>> {
        match sealed.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => self.open(s).map(Some),
            None => Ok(None),
        }
    }

    /// Open the caller password
    pub fn open_password(&self, sealed: &str) -> Result<VaultSecret> {
        if sealed.is_empty() {
            return Ok(VaultSecret::default());
        }
        match self.open(sealed) {
            Ok(password) => Ok(password),
            Err(e) if self.legacy_plaintext_fallback => {
                warn!("Password did not open with the transit key ({}), using it verbatim", e);
                Ok(VaultSecret::from(sealed))
            }
            Err(e) => Err(e),
        }
    }
}
