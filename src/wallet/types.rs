//! Core types for wallet custody
//!
//! Defines stored wallet rows, address mappings, and the views handed to
//! callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{EncryptedBlob, VaultSecret};
use crate::error::Error;

/// Stored wallet (private key and phrase sealed at rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Position within the project, assigned on import
    pub index: u64,

    pub address: String,

    #[serde(default)]
    pub public_key: Option<String>,

    #[serde(default)]
    pub private_key: Option<EncryptedBlob>,

    #[serde(default)]
    pub phrase: Option<EncryptedBlob>,

    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub remark: String,
}

/// Wallet as handed to a caller: secrets re-sealed for transit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub index: u64,
    pub address: String,
    pub public_key: Option<String>,
    pub private_key: Option<EncryptedBlob>,
    pub phrase: Option<EncryptedBlob>,
    pub project: String,
    pub remark: String,
}

/// Source to target address routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMappingRecord {
    /// Unique across all projects
    pub source_address: String,
    pub target_address: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One mapping line from an import batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingPair {
    #[serde(default)]
    pub source_address: String,
    #[serde(default)]
    pub target_address: String,
}

impl MappingPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_address: source.into(),
            target_address: target.into(),
        }
    }

    /// Pairs missing either side are ignored on import
    pub fn is_complete(&self) -> bool {
        !self.source_address.is_empty() && !self.target_address.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingView {
    pub source_address: String,
    pub target_address: String,
    pub project: String,
    pub remark: String,
}

impl From<WalletMappingRecord> for MappingView {
    fn from(record: WalletMappingRecord) -> Self {
        Self {
            source_address: record.source_address,
            target_address: record.target_address,
            project: record.project,
            remark: record.remark,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingImportSummary {
    pub success_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectCount {
    pub project: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStatistics {
    pub projects: Vec<ProjectCount>,
    pub total: u64,
}

impl From<Vec<ProjectCount>> for ProjectStatistics {
    fn from(projects: Vec<ProjectCount>) -> Self {
        let total = projects.iter().map(|p| p.count).sum();
        Self { projects, total }
    }
}

/// Result of a wallet import batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    /// Malformed lines plus addresses already in the project
    pub skipped: usize,
}

/// Freshly generated key material
pub struct KeyMaterial {
    pub address: String,
    pub private_key: VaultSecret,
    pub phrase: Option<VaultSecret>,
}

impl KeyMaterial {
    /// Render as an import line: `address,privateKey[,phrase]`
    pub(crate) fn into_line(self) -> VaultSecret {
        let line = match &self.phrase {
            Some(phrase) => format!(
                "{},{},{}",
                self.address,
                self.private_key.expose_secret(),
                phrase.expose_secret()
            ),
            None => format!("{},{}", self.address, self.private_key.expose_secret()),
        };
        VaultSecret::new(line)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("private_key", &"***")
            .field("phrase", &self.phrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Chain family of a generated wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Evm,
    Sol,
}

impl WalletKind {
    pub fn id(&self) -> &'static str {
        match self {
            WalletKind::Evm => "evm",
            WalletKind::Sol => "sol",
        }
    }
}

impl FromStr for WalletKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "evm" => Ok(WalletKind::Evm),
            "sol" => Ok(WalletKind::Sol),
            other => Err(Error::InvalidInput(format!("Unknown wallet type: {}", other))),
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
