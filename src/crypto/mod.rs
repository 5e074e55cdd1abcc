//! Credential encryption
//!
//! ```text
//! caller ──transit blob──▶ TransitCipher ──plaintext──▶ CredentialVault ──layered blob──▶ store
//! caller ◀─transit blob── TransitCipher ◀─plaintext─── CredentialVault ◀─layered blob─── store
//! ```
//!
//! The transit format and the at-rest format use different keys, so a
//! blob handed to a caller can never be replayed into storage.

pub mod cipher;
pub mod secret;
pub mod transit;
pub mod vault;

pub use cipher::{decrypt, encrypt, EncryptedBlob};
pub use secret::VaultSecret;
pub use transit::TransitCipher;
pub use vault::{CredentialVault, ExchangeSecrets, WalletSecrets};
