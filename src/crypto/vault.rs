//! Credential vault
//!
//! Turns stored blobs into usable plaintext given the caller password, and
//! seals plaintext for storage. The vault holds no state: the password is
//! borrowed for the duration of one call and nothing is cached.

use tracing::debug;

use crate::error::{Error, Result};
use crate::exchange::{ApiCredentials, ExchangeCredential};
use crate::wallet::WalletRecord;

use super::cipher::{self, EncryptedBlob};
use super::secret::VaultSecret;

/// Plaintext exchange fields for one request
#[derive(Debug, Default)]
pub struct ExchangeSecrets {
    pub api_key: Option<VaultSecret>,
    pub secret: Option<VaultSecret>,
    pub passphrase: Option<VaultSecret>,
}

impl ExchangeSecrets {
    /// Require the api key and secret to be present and non-empty
    pub fn into_api_credentials(self) -> Result<ApiCredentials> {
        let api_key = self
            .api_key
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::IncompleteCredential("api key is empty".to_string()))?;
        let secret = self
            .secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::IncompleteCredential("api secret is empty".to_string()))?;

        Ok(ApiCredentials {
            api_key,
            secret,
            passphrase: self.passphrase.filter(|s| !s.is_empty()),
        })
    }
}

/// Plaintext wallet fields for one request
#[derive(Debug, Default)]
pub struct WalletSecrets {
    pub private_key: Option<VaultSecret>,
    pub phrase: Option<VaultSecret>,
}

/// Stateless at-rest sealing and opening
pub struct CredentialVault;

impl CredentialVault {
    /// Seal a plaintext for storage under the caller password
    pub fn seal(plaintext: &VaultSecret, password: &VaultSecret) -> EncryptedBlob {
        cipher::encrypt_layered(plaintext.expose_secret(), password)
    }

    /// Seal when present; empty plaintext is stored as absent
    pub fn seal_opt(plaintext: Option<&VaultSecret>, password: &VaultSecret) -> Option<EncryptedBlob> {
        plaintext
            .filter(|s| !s.is_empty())
            .map(|s| Self::seal(s, password))
    }

    /// Open one stored field; absent or empty blobs are not decrypted
    pub fn open_field(
        blob: Option<&EncryptedBlob>,
        password: &VaultSecret,
    ) -> Result<Option<VaultSecret>> {
        match blob.filter(|b| !b.is_empty()) {
            Some(b) => cipher::decrypt_layered(b.as_str(), password).map(Some),
            None => Ok(None),
        }
    }

    /// Open every populated field of an exchange record
    ///
    /// Any failing field fails the whole record.
    pub fn open_exchange(
        record: &ExchangeCredential,
        password: &VaultSecret,
    ) -> Result<ExchangeSecrets> {
        debug!("Opening credentials for exchange {}", record.name);
        let secrets = ExchangeSecrets {
            api_key: Self::open_field(record.apikey.as_ref(), password)?,
            secret: Self::open_field(record.secret.as_ref(), password)?,
            passphrase: Self::open_field(record.password.as_ref(), password)?,
        };
        Ok(secrets)
    }

    /// Open the private key and phrase of a wallet record
    pub fn open_wallet(record: &WalletRecord, password: &VaultSecret) -> Result<WalletSecrets> {
        Ok(WalletSecrets {
            private_key: Self::open_field(record.private_key.as_ref(), password)?,
            phrase: Self::open_field(record.phrase.as_ref(), password)?,
        })
    }
}
