//! Single-document JSON store
//!
//! The whole document lives in memory behind a lock and is rewritten on
//! every mutation. A mutation is applied to a copy, saved, and only then
//! swapped in, so a failed save leaves the store as it was. Without a path
//! the store is memory-only.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::exchange::{ExchangeCredential, ExchangeSummary, ExchangeUpdate, NewExchange};
use crate::wallet::{MappingPair, ProjectCount, WalletMappingRecord, WalletRecord};

use super::CustodyStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    next_exchange_id: u64,
    #[serde(default)]
    exchanges: Vec<ExchangeCredential>,
    #[serde(default)]
    wallets: Vec<WalletRecord>,
    #[serde(default)]
    mappings: Vec<WalletMappingRecord>,
}

pub struct JsonFileStore {
    document: Arc<RwLock<StoreDocument>>,
    path: Option<PathBuf>,
}

impl JsonFileStore {
    /// Open (or start) a store backed by the file at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let data = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?;
            let document: StoreDocument = serde_json::from_str(&data)
                .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?;
            info!(
                "Loaded store {} ({} exchanges, {} wallets, {} mappings)",
                path.display(),
                document.exchanges.len(),
                document.wallets.len(),
                document.mappings.len()
            );
            document
        } else {
            debug!("Store {} does not exist yet", path.display());
            StoreDocument::default()
        };

        Ok(Self {
            document: Arc::new(RwLock::new(document)),
            path: Some(path),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            document: Arc::new(RwLock::new(StoreDocument::default())),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the document via a temp file and rename
    async fn save(&self, document: &StoreDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("{}: {}", parent.display(), e)))?;
        }

        let data = serde_json::to_string_pretty(document)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::Storage(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?;

        debug!("Saved store to {}", path.display());
        Ok(())
    }

    /// Save `staged`, then make it the live document
    async fn commit(&self, live: &mut StoreDocument, staged: StoreDocument) -> Result<()> {
        self.save(&staged).await?;
        *live = staged;
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[async_trait]
impl CustodyStore for JsonFileStore {
    async fn exchange_summaries(&self) -> Result<Vec<ExchangeSummary>> {
        let document = self.document.read().await;
        Ok(document
            .exchanges
            .iter()
            .filter(|e| !e.name.is_empty())
            .map(|e| ExchangeSummary {
                name: e.name.clone(),
                platform: e.platform.clone(),
            })
            .collect())
    }

    async fn find_exchange(&self, name: &str) -> Result<Option<ExchangeCredential>> {
        let document = self.document.read().await;
        Ok(document.exchanges.iter().find(|e| e.name == name).cloned())
    }

    async fn insert_exchange(&self, exchange: NewExchange) -> Result<ExchangeCredential> {
        let mut document = self.document.write().await;
        if document.exchanges.iter().any(|e| e.name == exchange.name) {
            return Err(Error::Duplicate(format!("exchange {}", exchange.name)));
        }

        let mut staged = document.clone();
        staged.next_exchange_id += 1;
        let record = ExchangeCredential {
            id: staged.next_exchange_id,
            platform: exchange.platform,
            apikey: exchange.apikey,
            secret: exchange.secret,
            password: exchange.password,
            ip: exchange.ip,
            name: exchange.name,
        };
        staged.exchanges.push(record.clone());
        self.commit(&mut document, staged).await?;
        Ok(record)
    }

    async fn update_exchange(&self, name: &str, update: ExchangeUpdate) -> Result<u64> {
        let mut document = self.document.write().await;
        let mut staged = document.clone();
        let Some(record) = staged.exchanges.iter_mut().find(|e| e.name == name) else {
            return Ok(0);
        };

        if let Some(platform) = non_empty(update.platform.as_deref()) {
            record.platform = platform.to_string();
        }
        if let Some(apikey) = update.apikey.filter(|b| !b.is_empty()) {
            record.apikey = Some(apikey);
        }
        if let Some(secret) = update.secret.filter(|b| !b.is_empty()) {
            record.secret = Some(secret);
        }
        if let Some(password) = update.password.filter(|b| !b.is_empty()) {
            record.password = Some(password);
        }
        if let Some(ip) = non_empty(update.ip.as_deref()) {
            record.ip = Some(ip.to_string());
        }

        self.commit(&mut document, staged).await?;
        Ok(1)
    }

    async fn delete_exchange(&self, name: &str) -> Result<u64> {
        let mut document = self.document.write().await;
        let mut staged = document.clone();
        staged.exchanges.retain(|e| e.name != name);
        let removed = (document.exchanges.len() - staged.exchanges.len()) as u64;
        if removed > 0 {
            self.commit(&mut document, staged).await?;
        }
        Ok(removed)
    }

    async fn projects(&self) -> Result<Vec<String>> {
        Ok(self
            .project_counts()
            .await?
            .into_iter()
            .map(|p| p.project)
            .collect())
    }

    async fn project_counts(&self) -> Result<Vec<ProjectCount>> {
        let document = self.document.read().await;
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for wallet in &document.wallets {
            *counts.entry(wallet.project.as_str()).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(project, count)| ProjectCount {
                project: project.to_string(),
                count,
            })
            .collect())
    }

    async fn wallets_matching(
        &self,
        address: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<WalletRecord>> {
        let document = self.document.read().await;
        Ok(document
            .wallets
            .iter()
            .filter(|w| {
                address.map(|a| w.address == a).unwrap_or(false)
                    || project.map(|p| w.project == p).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn find_wallet(&self, address: &str) -> Result<Option<WalletRecord>> {
        let document = self.document.read().await;
        Ok(document.wallets.iter().find(|w| w.address == address).cloned())
    }

    async fn last_wallet_index(&self, project: &str) -> Result<u64> {
        let document = self.document.read().await;
        Ok(document
            .wallets
            .iter()
            .filter(|w| w.project == project)
            .map(|w| w.index)
            .max()
            .unwrap_or(0))
    }

    async fn existing_addresses(&self, project: &str, addresses: &[String]) -> Result<HashSet<String>> {
        let wanted: HashSet<&str> = addresses.iter().map(String::as_str).collect();
        let document = self.document.read().await;
        Ok(document
            .wallets
            .iter()
            .filter(|w| w.project == project && wanted.contains(w.address.as_str()))
            .map(|w| w.address.clone())
            .collect())
    }

    async fn insert_wallets(&self, wallets: Vec<WalletRecord>) -> Result<usize> {
        if wallets.is_empty() {
            return Ok(0);
        }
        let mut document = self.document.write().await;
        let count = wallets.len();
        let mut staged = document.clone();
        staged.wallets.extend(wallets);
        self.commit(&mut document, staged).await?;
        Ok(count)
    }

    async fn upsert_mappings(&self, pairs: Vec<MappingPair>, project: &str, remark: &str) -> Result<usize> {
        let now = Utc::now();
        let mut document = self.document.write().await;
        let mut staged = document.clone();
        let mut written = 0;

        for pair in pairs.into_iter().filter(MappingPair::is_complete) {
            match staged
                .mappings
                .iter_mut()
                .find(|m| m.source_address == pair.source_address)
            {
                Some(existing) => {
                    existing.target_address = pair.target_address;
                    existing.project = project.to_string();
                    existing.remark = remark.to_string();
                    existing.updated_at = now;
                }
                None => staged.mappings.push(WalletMappingRecord {
                    source_address: pair.source_address,
                    target_address: pair.target_address,
                    project: project.to_string(),
                    remark: remark.to_string(),
                    created_at: now,
                    updated_at: now,
                }),
            }
            written += 1;
        }

        if written > 0 {
            self.commit(&mut document, staged).await?;
        }
        Ok(written)
    }

    async fn mappings_by_source(&self, sources: &[String]) -> Result<Vec<WalletMappingRecord>> {
        let wanted: HashSet<&str> = sources.iter().map(String::as_str).collect();
        let document = self.document.read().await;
        Ok(document
            .mappings
            .iter()
            .filter(|m| wanted.contains(m.source_address.as_str()))
            .cloned()
            .collect())
    }

    async fn find_mapping(&self, source: &str) -> Result<Option<WalletMappingRecord>> {
        let document = self.document.read().await;
        Ok(document
            .mappings
            .iter()
            .find(|m| m.source_address == source)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptedBlob;

    fn new_exchange(name: &str) -> NewExchange {
        NewExchange {
            platform: "binance".to_string(),
            apikey: Some(EncryptedBlob::new("k")),
            secret: Some(EncryptedBlob::new("s")),
            password: None,
            ip: None,
            name: name.to_string(),
        }
    }

    fn wallet(index: u64, address: &str, project: &str) -> WalletRecord {
        WalletRecord {
            index,
            address: address.to_string(),
            public_key: None,
            private_key: None,
            phrase: None,
            project: project.to_string(),
            remark: String::new(),
        }
    }

    #[tokio::test]
    async fn test_exchange_crud() {
        let store = JsonFileStore::in_memory();
        let first = store.insert_exchange(new_exchange("main")).await.unwrap();
        assert_eq!(first.id, 1);
        assert!(matches!(
            store.insert_exchange(new_exchange("main")).await,
            Err(Error::Duplicate(_))
        ));

        let update = ExchangeUpdate {
            ip: Some("1.2.3.4:8080".to_string()),
            secret: Some(EncryptedBlob::new("")),
            ..Default::default()
        };
        assert_eq!(store.update_exchange("main", update).await.unwrap(), 1);
        assert_eq!(store.update_exchange("other", ExchangeUpdate::default()).await.unwrap(), 0);

        let record = store.find_exchange("main").await.unwrap().unwrap();
        assert_eq!(record.ip.as_deref(), Some("1.2.3.4:8080"));
        assert_eq!(record.secret.unwrap().as_str(), "s");

        assert_eq!(store.delete_exchange("main").await.unwrap(), 1);
        assert_eq!(store.delete_exchange("main").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wallet_queries() {
        let store = JsonFileStore::in_memory();
        store
            .insert_wallets(vec![wallet(1, "a1", "alpha"), wallet(2, "a2", "alpha"), wallet(1, "b1", "beta")])
            .await
            .unwrap();

        assert_eq!(store.last_wallet_index("alpha").await.unwrap(), 2);
        assert_eq!(store.last_wallet_index("gamma").await.unwrap(), 0);
        assert_eq!(store.projects().await.unwrap(), vec!["alpha", "beta"]);

        let matched = store.wallets_matching(Some("b1"), Some("alpha")).await.unwrap();
        assert_eq!(matched.len(), 3);
        assert!(store.wallets_matching(None, None).await.unwrap().is_empty());

        let existing = store
            .existing_addresses("alpha", &["a1".to_string(), "b1".to_string()])
            .await
            .unwrap();
        assert_eq!(existing.len(), 1);
        assert!(existing.contains("a1"));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("custody.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert_exchange(new_exchange("main")).await.unwrap();
        store.insert_wallets(vec![wallet(1, "a1", "alpha")]).await.unwrap();
        store
            .upsert_mappings(vec![MappingPair::new("s", "t")], "alpha", "")
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert!(reopened.find_exchange("main").await.unwrap().is_some());
        assert!(reopened.find_wallet("a1").await.unwrap().is_some());
        assert!(reopened.find_mapping("s").await.unwrap().is_some());

        // Ids keep increasing after reload
        let next = reopened.insert_exchange(new_exchange("second")).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_upsert_mapping_updates_in_place() {
        let store = JsonFileStore::in_memory();
        let written = store
            .upsert_mappings(
                vec![MappingPair::new("s1", "t1"), MappingPair::new("", "t2")],
                "p",
                "r",
            )
            .await
            .unwrap();
        assert_eq!(written, 1);

        store
            .upsert_mappings(vec![MappingPair::new("s1", "t9")], "q", "r2")
            .await
            .unwrap();
        let all = store.mappings_by_source(&["s1".to_string()]).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target_address, "t9");
        assert_eq!(all[0].project, "q");
    }

    #[tokio::test]
    async fn test_failed_save_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "plain file").unwrap();

        // The parent of the store path is a regular file, so every save fails
        let store = JsonFileStore::open(blocker.join("custody.json")).await.unwrap();

        let result = store.insert_exchange(new_exchange("main")).await;
        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(store.find_exchange("main").await.unwrap().is_none());
        // A retry hits the same save error, not a duplicate
        assert!(matches!(
            store.insert_exchange(new_exchange("main")).await,
            Err(Error::Storage(_))
        ));

        assert!(store.insert_wallets(vec![wallet(1, "a1", "alpha")]).await.is_err());
        assert!(store.find_wallet("a1").await.unwrap().is_none());
        assert_eq!(store.last_wallet_index("alpha").await.unwrap(), 0);

        assert!(store
            .upsert_mappings(vec![MappingPair::new("s", "t")], "p", "")
            .await
            .is_err());
        assert!(store.find_mapping("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_exchange_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert_exchange(new_exchange("main")).await.unwrap();

        // A directory where the temp file goes makes the next write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let update = ExchangeUpdate {
            ip: Some("9.9.9.9:1".to_string()),
            ..Default::default()
        };
        assert!(store.update_exchange("main", update).await.is_err());
        assert!(store.find_exchange("main").await.unwrap().unwrap().ip.is_none());

        assert!(store.delete_exchange("main").await.is_err());
        assert!(store.find_exchange("main").await.unwrap().is_some());

        // Ids are not consumed by failed inserts
        assert!(store.insert_exchange(new_exchange("second")).await.is_err());
        std::fs::remove_dir(path.with_extension("json.tmp")).unwrap();
        let second = store.insert_exchange(new_exchange("second")).await.unwrap();
        assert_eq!(second.id, 2);
    }
}
