//! Credential cipher
//!
//! AES-256-CBC with key = SHA-256(password bytes), PKCS#7 padding and a
//! fixed IV, ciphertext carried as standard base64 text. The fixed IV is
//! the legacy on-disk format; identical plaintexts under the same password
//! always produce identical blobs.
//!
//! Two layers are built from the primitive:
//! - [`encrypt`] / [`decrypt`]: a single pass under one password
//! - [`encrypt_layered`] / [`decrypt_layered`]: a second pass keyed by
//!   `password + "@tea"` on top of the first, used for values at rest

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};

use super::secret::VaultSecret;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// IV shared with every stored blob and the web client: sixteen ASCII '0'
pub const LEGACY_IV: [u8; 16] = *b"0000000000000000";

/// Suffix appended to the password for the outer layer
pub const LAYER_SUFFIX: &str = "@tea";

const BLOCK_SIZE: usize = 16;

/// Base64 ciphertext as stored or transmitted
///
/// Equality is ciphertext equality, never plaintext equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EncryptedBlob {
    fn from(blob: String) -> Self {
        Self(blob)
    }
}

fn derive_key(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Encrypt `plaintext` under `password`
pub fn encrypt(plaintext: &str, password: &VaultSecret) -> EncryptedBlob {
    let key = derive_key(password.expose_secret());
    let ciphertext = Aes256CbcEnc::new(&key.into(), &LEGACY_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    EncryptedBlob(STANDARD.encode(ciphertext))
}

/// Decrypt a blob produced by [`encrypt`]
///
/// Bad base64, a ragged length, bad padding or non-UTF-8 output all
/// collapse into [`Error::DecryptionFailure`]; the caller never sees
/// partially decrypted bytes.
pub fn decrypt(blob: &str, password: &VaultSecret) -> Result<VaultSecret> {
    let ciphertext = STANDARD.decode(blob.trim()).map_err(|e| {
        debug!("Blob is not valid base64: {}", e);
        Error::DecryptionFailure
    })?;

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        debug!("Blob length {} is not a whole number of blocks", ciphertext.len());
        return Err(Error::DecryptionFailure);
    }

    let key = derive_key(password.expose_secret());
    let plaintext = Aes256CbcDec::new(&key.into(), &LEGACY_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::DecryptionFailure)?;

    String::from_utf8(plaintext)
        .map(VaultSecret::new)
        .map_err(|_| Error::DecryptionFailure)
}

/// Two independent passes: inner under `password`, outer under `password@tea`
pub fn encrypt_layered(plaintext: &str, password: &VaultSecret) -> EncryptedBlob {
    let inner = encrypt(plaintext, password);
    encrypt(inner.as_str(), &password.with_suffix(LAYER_SUFFIX))
}

/// Inverse of [`encrypt_layered`]: outer layer first, then the inner one
pub fn decrypt_layered(blob: &str, password: &VaultSecret) -> Result<VaultSecret> {
    let inner = decrypt(blob, &password.with_suffix(LAYER_SUFFIX))?;
    decrypt(inner.expose_secret(), password)
}
