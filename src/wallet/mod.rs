//! Wallet custody module
//!
//! Provides:
//! - Wallet import and generation (secrets sealed at rest)
//! - Per-project listing with transit-sealed secrets
//! - Source to target address mappings
//!
//! # Architecture
//!
//! ```text
//! KeyGenerator → WalletManager → CustodyStore
//!                      ↑
//!          TransitCipher / CredentialVault
//! ```

pub mod generator;
pub mod manager;
pub mod mapping;
pub mod types;

pub use generator::{KeyGenerator, SolanaKeyGenerator};
pub use manager::WalletManager;
pub use mapping::MappingRegistry;
pub use types::{
    ImportSummary, KeyMaterial, MappingImportSummary, MappingPair, MappingView, ProjectCount,
    ProjectStatistics, WalletKind, WalletMappingRecord, WalletRecord, WalletView,
};
