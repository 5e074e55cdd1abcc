//! Key material generation
//!
//! Every wallet gets its own 12-word BIP-39 phrase; keys are derived from
//! the phrase so the phrase alone restores the wallet. Generators only
//! produce plaintext material; sealing and storage happen in the wallet
//! manager.

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha512;
use solana_sdk::derivation_path::DerivationPath;
use solana_sdk::signature::Signer;
use solana_sdk::signer::keypair::keypair_from_seed_and_derivation_path;
use tiny_keccak::{Hasher, Keccak};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::VaultSecret;
use crate::error::{Error, Result};

use super::types::{KeyMaterial, WalletKind};

type HmacSha512 = Hmac<Sha512>;

/// Upper bound on wallets created per call
pub const MAX_BATCH: usize = 1_000;

/// 128 bits of entropy, 12 words
const PHRASE_ENTROPY_BYTES: usize = 16;

/// BIP-44 path of the first Ethereum account
pub const EVM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// BIP-44 path used by Solana wallets (all levels hardened)
pub const SOL_DERIVATION_PATH: &str = "m/44'/501'/0'/0'";

const HARDENED: u32 = 0x8000_0000;

/// Source of new wallets for one chain family
pub trait KeyGenerator: Send + Sync {
    fn kind(&self) -> WalletKind;

    fn generate(&self, count: usize) -> Result<Vec<KeyMaterial>>;
}

/// secp256k1 wallets for EVM chains
///
/// Address is the EIP-55 checksummed `0x` form; the private key is the
/// 32-byte scalar as lowercase hex.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmKeyGenerator;

impl EvmKeyGenerator {
    /// Restore the wallet a phrase was generated with
    pub fn from_phrase(phrase: &str) -> Result<KeyMaterial> {
        let mnemonic = parse_phrase(phrase)?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let secret = derive_secp256k1(&seed[..], EVM_DERIVATION_PATH)?;
        let public = libsecp256k1::PublicKey::from_secret_key(&secret);
        let key = Zeroizing::new(secret.serialize());

        Ok(KeyMaterial {
            address: evm_address(&public.serialize()),
            private_key: VaultSecret::new(hex::encode(&key[..])),
            phrase: Some(VaultSecret::new(mnemonic.to_string())),
        })
    }
}

impl KeyGenerator for EvmKeyGenerator {
    fn kind(&self) -> WalletKind {
        WalletKind::Evm
    }

    fn generate(&self, count: usize) -> Result<Vec<KeyMaterial>> {
        check_count(count)?;
        (0..count)
            .map(|_| Self::from_phrase(new_phrase()?.expose_secret()))
            .collect()
    }
}

/// Ed25519 wallets for Solana
///
/// The private key is the base58 64-byte keypair (the format wallets
/// import).
#[derive(Debug, Default, Clone, Copy)]
pub struct SolanaKeyGenerator;

impl SolanaKeyGenerator {
    /// Restore the wallet a phrase was generated with
    pub fn from_phrase(phrase: &str) -> Result<KeyMaterial> {
        let mnemonic = parse_phrase(phrase)?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let path = DerivationPath::from_absolute_path_str(SOL_DERIVATION_PATH)
            .map_err(|e| Error::Internal(format!("invalid derivation path: {}", e)))?;
        let keypair = keypair_from_seed_and_derivation_path(&seed[..], Some(path))
            .map_err(|e| Error::Internal(format!("solana key derivation failed: {}", e)))?;

        Ok(KeyMaterial {
            address: keypair.pubkey().to_string(),
            private_key: VaultSecret::new(keypair.to_base58_string()),
            phrase: Some(VaultSecret::new(mnemonic.to_string())),
        })
    }
}

impl KeyGenerator for SolanaKeyGenerator {
    fn kind(&self) -> WalletKind {
        WalletKind::Sol
    }

    fn generate(&self, count: usize) -> Result<Vec<KeyMaterial>> {
        check_count(count)?;
        (0..count)
            .map(|_| Self::from_phrase(new_phrase()?.expose_secret()))
            .collect()
    }
}

/// Fresh English phrase from the OS RNG
fn new_phrase() -> Result<VaultSecret> {
    let mut entropy = [0u8; PHRASE_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy);
    entropy.zeroize();

    mnemonic
        .map(|m| VaultSecret::new(m.to_string()))
        .map_err(|e| Error::Internal(format!("mnemonic generation failed: {}", e)))
}

fn parse_phrase(phrase: &str) -> Result<Mnemonic> {
    let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    Mnemonic::parse(normalized.as_str())
        .map_err(|e| Error::InvalidInput(format!("invalid mnemonic: {}", e)))
}

/// BIP-32 private derivation along `path`
fn derive_secp256k1(seed: &[u8], path: &str) -> Result<libsecp256k1::SecretKey> {
    let (mut key, mut chain_code) = split_hmac(b"Bitcoin seed", seed)?;
    let mut secret = parse_scalar(&key)?;

    for index in parse_path(path)? {
        let mut data = Zeroizing::new(Vec::with_capacity(37));
        if index >= HARDENED {
            data.push(0u8);
            data.extend_from_slice(&key);
        } else {
            let public = libsecp256k1::PublicKey::from_secret_key(&secret);
            data.extend_from_slice(&public.serialize_compressed());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let (mut tweak, child_chain) = split_hmac(&chain_code, &data)?;
        let mut child = parse_scalar(&tweak)?;
        tweak.zeroize();
        child
            .tweak_add_assign(&secret)
            .map_err(|e| Error::Internal(format!("child key derivation failed: {:?}", e)))?;

        secret = child;
        key.zeroize();
        key = secret.serialize();
        chain_code.zeroize();
        chain_code = child_chain;
    }

    key.zeroize();
    chain_code.zeroize();
    Ok(secret)
}

/// HMAC-SHA512 split into (IL, IR)
fn split_hmac(key: &[u8], data: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| Error::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(data);
    let output = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..]);
    Ok((left, right))
}

fn parse_scalar(bytes: &[u8; 32]) -> Result<libsecp256k1::SecretKey> {
    libsecp256k1::SecretKey::parse(bytes)
        .map_err(|e| Error::Internal(format!("derived key out of range: {:?}", e)))
}

/// `m/44'/60'/0'/0/0` into child indexes, hardened ones offset
fn parse_path(path: &str) -> Result<Vec<u32>> {
    let invalid = || Error::Internal(format!("invalid derivation path: {}", path));
    let segments = path.trim().strip_prefix("m/").ok_or_else(invalid)?;

    segments
        .split('/')
        .map(|segment| {
            let (number, hardened) = match segment.strip_suffix('\'') {
                Some(number) => (number, true),
                None => (segment, false),
            };
            let index: u32 = number.parse().map_err(|_| invalid())?;
            if index >= HARDENED {
                return Err(invalid());
            }
            Ok(if hardened { index | HARDENED } else { index })
        })
        .collect()
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut hash);
    hash
}

/// EIP-55 address of an uncompressed public key
fn evm_address(uncompressed: &[u8; 65]) -> String {
    let hash = keccak256(&uncompressed[1..]);
    let lower = hex::encode(&hash[12..]);
    let checksum = keccak256(lower.as_bytes());

    let mut address = String::with_capacity(42);
    address.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            checksum[i / 2] >> 4
        } else {
            checksum[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            address.push(c.to_ascii_uppercase());
        } else {
            address.push(c);
        }
    }
    address
}

pub(crate) fn check_count(count: usize) -> Result<()> {
    if count == 0 || count > MAX_BATCH {
        return Err(Error::InvalidInput(format!(
            "wallet count must be between 1 and {}, got {}",
            MAX_BATCH, count
        )));
    }
    Ok(())
}
