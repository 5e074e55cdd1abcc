//! Wallet manager - wallet custody operations
//!
//! Imports and generates wallets, seals their secrets under the caller
//! password, and hands them back transit-sealed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::crypto::{CredentialVault, EncryptedBlob, TransitCipher, VaultSecret};
use crate::error::{Error, Result};
use crate::storage::CustodyStore;

use super::generator::{EvmKeyGenerator, KeyGenerator, SolanaKeyGenerator};
use super::types::{ImportSummary, ProjectStatistics, WalletKind, WalletRecord, WalletView};

/// Shortest address accepted on import
const MIN_ADDRESS_LEN: usize = 2;

/// Core wallet manager
pub struct WalletManager {
    store: Arc<dyn CustodyStore>,
    transit: TransitCipher,
    generators: HashMap<WalletKind, Arc<dyn KeyGenerator>>,
}

/// One parsed import line, secrets already sealed at rest
struct ParsedLine {
    position: usize,
    address: String,
    private_key: Option<EncryptedBlob>,
    phrase: Option<EncryptedBlob>,
}

impl WalletManager {
    /// Create a manager with the built-in EVM and Solana generators
    pub fn new(store: Arc<dyn CustodyStore>, transit: TransitCipher) -> Self {
        let mut generators: HashMap<WalletKind, Arc<dyn KeyGenerator>> = HashMap::new();
        generators.insert(WalletKind::Evm, Arc::new(EvmKeyGenerator));
        generators.insert(WalletKind::Sol, Arc::new(SolanaKeyGenerator));
        Self {
            store,
            transit,
            generators,
        }
    }

    /// Register (or replace) the generator for its wallet kind
    pub fn with_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.generators.insert(generator.kind(), generator);
        self
    }

    pub async fn projects(&self) -> Result<Vec<String>> {
        let projects = self.store.projects().await?;
        info!("Found {} wallet projects", projects.len());
        Ok(projects)
    }

    pub async fn project_statistics(&self) -> Result<ProjectStatistics> {
        let stats = ProjectStatistics::from(self.store.project_counts().await?);
        info!(
            "Project statistics: {} projects, {} wallets",
            stats.projects.len(),
            stats.total
        );
        Ok(stats)
    }

    /// Wallets matching the address or the project
    ///
    /// A wallet that does not open under `password` is logged and left
    /// out; the rest of the listing still succeeds.
    pub async fn list(
        &self,
        address: Option<&str>,
        project: Option<&str>,
        password: &VaultSecret,
    ) -> Result<Vec<WalletView>> {
        let address = address.filter(|a| !a.is_empty());
        let project = project.filter(|p| !p.is_empty());
        if address.is_none() && project.is_none() {
            warn!("Wallet list requested without address or project");
            return Ok(Vec::new());
        }

        let records = self.store.wallets_matching(address, project).await?;
        debug!("Store returned {} wallets", records.len());

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            match self.to_view(record, password) {
                Ok(view) => views.push(view),
                Err((address, e)) => {
                    error!("Skipping wallet {}: {}", mask_address(&address), e);
                }
            }
        }

        info!("Returning {} wallets", views.len());
        Ok(views)
    }

    /// Single wallet by address
    pub async fn one(&self, address: &str, password: &VaultSecret) -> Result<Option<WalletView>> {
        if address.is_empty() {
            return Ok(None);
        }
        let Some(record) = self.store.find_wallet(address).await? else {
            warn!("Wallet not found: {}", mask_address(address));
            return Ok(None);
        };
        self.to_view(record, password).map(Some).map_err(|(_, e)| e)
    }

    /// Import `address[,privateKey[,phrase]]` lines into a project
    ///
    /// With `sealed` set the key and phrase arrive transit-sealed.
    /// Indexes continue from the project's current maximum, offset by
    /// the line's position in the batch.
    pub async fn import(
        &self,
        lines: &[String],
        project: &str,
        remark: &str,
        password: &VaultSecret,
        sealed: bool,
    ) -> Result<ImportSummary> {
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        self.ingest(&lines, project, remark, password, sealed).await
    }

    /// Generate `count` wallets of `kind` and import them
    pub async fn create(
        &self,
        kind: WalletKind,
        count: usize,
        project: &str,
        remark: &str,
        password: &VaultSecret,
    ) -> Result<ImportSummary> {
        let generator = self.generators.get(&kind).ok_or_else(|| {
            Error::InvalidInput(format!("No key generator available for {} wallets", kind))
        })?;

        info!("Creating {} {} wallets for project {}", count, kind, project);
        let material = generator.generate(count)?;
        let lines: Vec<VaultSecret> = material.into_iter().map(|m| m.into_line()).collect();
        let lines: Vec<&str> = lines.iter().map(VaultSecret::expose_secret).collect();

        self.ingest(&lines, project, remark, password, false).await
    }

    async fn ingest(
        &self,
        lines: &[&str],
        project: &str,
        remark: &str,
        password: &VaultSecret,
        sealed: bool,
    ) -> Result<ImportSummary> {
        info!(
            "Importing {} wallet lines into project {} (sealed={})",
            lines.len(),
            project,
            sealed
        );
        if lines.is_empty() {
            return Ok(ImportSummary::default());
        }

        let base_index = self.store.last_wallet_index(project).await?;
        debug!("Project {} last index: {}", project, base_index);

        let mut skipped = 0;
        let mut parsed = Vec::with_capacity(lines.len());
        let mut seen = HashSet::new();
        for (position, line) in lines.iter().enumerate() {
            match self.parse_line(position, line, password, sealed) {
                Some(entry) if seen.insert(entry.address.clone()) => parsed.push(entry),
                _ => skipped += 1,
            }
        }

        let addresses: Vec<String> = parsed.iter().map(|p| p.address.clone()).collect();
        let existing = self.store.existing_addresses(project, &addresses).await?;
        debug!("{} addresses already in project {}", existing.len(), project);

        let records: Vec<WalletRecord> = parsed
            .into_iter()
            .filter(|p| {
                let fresh = !existing.contains(&p.address);
                if !fresh {
                    skipped += 1;
                }
                fresh
            })
            .map(|p| WalletRecord {
                index: base_index + 1 + p.position as u64,
                address: p.address,
                public_key: None,
                private_key: p.private_key,
                phrase: p.phrase,
                project: project.to_string(),
                remark: remark.to_string(),
            })
            .collect();

        let inserted = self.store.insert_wallets(records).await?;
        info!(
            "Wallet import into {} complete: {} inserted, {} skipped",
            project, inserted, skipped
        );
        Ok(ImportSummary { inserted, skipped })
    }

    /// Parse one line; `None` means the line is skipped
    fn parse_line(
        &self,
        position: usize,
        line: &str,
        password: &VaultSecret,
        sealed: bool,
    ) -> Option<ParsedLine> {
        let mut parts = line.split(',').map(str::trim);
        let address = parts.next().unwrap_or_default();
        if address.chars().count() < MIN_ADDRESS_LEN {
            return None;
        }

        let seal = |field: Option<&str>, label: &str| -> std::result::Result<Option<EncryptedBlob>, ()> {
            let Some(value) = field.filter(|v| !v.is_empty()) else {
                return Ok(None);
            };
            let plaintext = if sealed {
                self.transit.open(value).map_err(|e| {
                    error!("Cannot open {} for {}: {}", label, mask_address(address), e);
                })?
            } else {
                VaultSecret::from(value)
            };
            Ok(CredentialVault::seal_opt(Some(&plaintext), password))
        };

        let private_key = seal(parts.next(), "private key").ok()?;
        let phrase = seal(parts.next(), "phrase").ok()?;

        Some(ParsedLine {
            position,
            address: address.to_string(),
            private_key,
            phrase,
        })
    }

    fn to_view(
        &self,
        record: WalletRecord,
        password: &VaultSecret,
    ) -> std::result::Result<WalletView, (String, Error)> {
        let secrets = match CredentialVault::open_wallet(&record, password) {
            Ok(secrets) => secrets,
            Err(e) => return Err((record.address, e)),
        };
        Ok(WalletView {
            index: record.index,
            address: record.address,
            public_key: record.public_key,
            private_key: self.transit.seal_opt(secrets.private_key.as_ref()),
            phrase: self.transit.seal_opt(secrets.phrase.as_ref()),
            project: record.project,
            remark: record.remark,
        })
    }
}

/// First characters of an address, for logs
fn mask_address(address: &str) -> String {
    let prefix: String = address.chars().take(10).collect();
    if prefix.len() < address.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}
