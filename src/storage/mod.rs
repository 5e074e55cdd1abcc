//! Persistence for exchange credentials, wallets, and address mappings
//!
//! Everything stored here is already sealed; the store never sees a
//! plaintext secret or a caller password.

mod json_store;

pub use json_store::JsonFileStore;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::exchange::{ExchangeCredential, ExchangeSummary, ExchangeUpdate, NewExchange};
use crate::wallet::{MappingPair, ProjectCount, WalletMappingRecord, WalletRecord};

/// Storage interface used by the registries and the orchestrator
#[async_trait]
pub trait CustodyStore: Send + Sync {
    // Exchange credentials

    async fn exchange_summaries(&self) -> Result<Vec<ExchangeSummary>>;

    async fn find_exchange(&self, name: &str) -> Result<Option<ExchangeCredential>>;

    /// Fails with `Duplicate` when the name is taken
    async fn insert_exchange(&self, exchange: NewExchange) -> Result<ExchangeCredential>;

    /// Rows affected (0 or 1)
    async fn update_exchange(&self, name: &str, update: ExchangeUpdate) -> Result<u64>;

    /// Rows affected
    async fn delete_exchange(&self, name: &str) -> Result<u64>;

    // Wallets

    async fn projects(&self) -> Result<Vec<String>>;

    async fn project_counts(&self) -> Result<Vec<ProjectCount>>;

    /// Wallets whose address OR project matches
    async fn wallets_matching(
        &self,
        address: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<WalletRecord>>;

    async fn find_wallet(&self, address: &str) -> Result<Option<WalletRecord>>;

    /// Highest index used in a project, 0 when empty
    async fn last_wallet_index(&self, project: &str) -> Result<u64>;

    async fn existing_addresses(&self, project: &str, addresses: &[String]) -> Result<HashSet<String>>;

    async fn insert_wallets(&self, wallets: Vec<WalletRecord>) -> Result<usize>;

    // Mappings

    /// Insert or update by source address; returns pairs written
    async fn upsert_mappings(&self, pairs: Vec<MappingPair>, project: &str, remark: &str) -> Result<usize>;

    async fn mappings_by_source(&self, sources: &[String]) -> Result<Vec<WalletMappingRecord>>;

    async fn find_mapping(&self, source: &str) -> Result<Option<WalletMappingRecord>>;
}
