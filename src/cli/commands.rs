//! CLI command implementations
//!
//! Every command prints one `{code, data, msg}` envelope on stdout.
//! Logs go to stderr so the envelope stays machine readable.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Password};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::{TransitCipher, VaultSecret};
use crate::exchange::{ExchangeChanges, ExchangeInput, ExchangeRegistry, HttpAdapterFactory};
use crate::storage::{CustodyStore, JsonFileStore};
use crate::wallet::{MappingPair, MappingRegistry, WalletKind, WalletManager};
use crate::withdraw::{ApiEnvelope, WithdrawalOrchestrator, WithdrawalRequest};

/// Services wired from configuration for one command
struct Services {
    store: Arc<dyn CustodyStore>,
    transit: TransitCipher,
}

impl Services {
    async fn open(config: &Config) -> Result<Self> {
        let path = config.storage.store_path();
        debug!("Opening store at {}", path.display());
        let store = JsonFileStore::open(&path)
            .await
            .with_context(|| format!("Failed to open store {}", path.display()))?;
        let transit = TransitCipher::from_config(&config.transit)
            .context("Failed to initialise transit cipher")?;
        Ok(Self {
            store: Arc::new(store),
            transit,
        })
    }

    fn exchanges(&self) -> ExchangeRegistry {
        ExchangeRegistry::new(self.store.clone(), self.transit.clone())
    }

    fn wallets(&self) -> WalletManager {
        WalletManager::new(self.store.clone(), self.transit.clone())
    }

    fn mappings(&self) -> MappingRegistry {
        MappingRegistry::new(self.store.clone())
    }

    fn orchestrator(&self, config: &Config) -> Result<WithdrawalOrchestrator> {
        let factory = HttpAdapterFactory::from_config(&config.exchange)
            .context("Invalid exchange configuration")?;
        Ok(WithdrawalOrchestrator::new(self.store.clone(), Arc::new(factory)))
    }

    /// Vault password: open a transit-sealed value or prompt for it
    fn password(&self, sealed: Option<&str>) -> Result<VaultSecret> {
        match sealed.filter(|s| !s.is_empty()) {
            Some(sealed) => self
                .transit
                .open_password(sealed)
                .context("Sealed password could not be opened"),
            None => prompt_secret("Vault password"),
        }
    }

    /// Transit-sealed secret for the registry, prompting when absent
    fn sealed_secret(&self, given: Option<String>, prompt: &str, required: bool) -> Result<Option<String>> {
        if let Some(given) = given.filter(|s| !s.is_empty()) {
            return Ok(Some(given));
        }
        if !required {
            return Ok(None);
        }
        let plaintext = prompt_secret(prompt)?;
        Ok(self
            .transit
            .seal_opt(Some(&plaintext))
            .map(|blob| blob.into_inner()))
    }
}

fn prompt_secret(prompt: &str) -> Result<VaultSecret> {
    let value = Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?;
    Ok(VaultSecret::new(value))
}

fn emit<T: Serialize>(envelope: ApiEnvelope<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn emit_result<T: Serialize>(result: crate::error::Result<T>) -> Result<()> {
    emit::<T>(result.into())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Exchanges
// ---------------------------------------------------------------------------

pub async fn exchange_names(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    emit_result(services.exchanges().list_names().await)
}

pub async fn exchange_show(config: &Config, name: &str, sealed_password: Option<&str>) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;

    let envelope = match services.exchanges().get(name, &password).await {
        Ok(Some(view)) => ApiEnvelope::ok(view),
        Ok(None) => ApiEnvelope::fail(format!("Exchange not found: {}", name)),
        Err(e) => ApiEnvelope::fail(e.to_string()),
    };
    emit(envelope)
}

/// Arguments shared by `exchange add` and `exchange update`
#[derive(Debug, Clone, Default)]
pub struct ExchangeFields {
    pub platform: Option<String>,
    pub apikey: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
    pub ip: Option<String>,
}

pub async fn exchange_add(
    config: &Config,
    name: &str,
    fields: ExchangeFields,
    sealed_password: Option<&str>,
) -> Result<()> {
    let services = Services::open(config).await?;
    let platform = fields.platform.unwrap_or_default();
    let needs_passphrase = platform
        .parse::<crate::exchange::Platform>()
        .map(|p| p.requires_passphrase())
        .unwrap_or(false);

    let input = ExchangeInput {
        name: name.to_string(),
        platform,
        apikey: services.sealed_secret(fields.apikey, "API key", true)?,
        secret: services.sealed_secret(fields.secret, "API secret", true)?,
        password: services.sealed_secret(fields.passphrase, "API passphrase", needs_passphrase)?,
        ip: fields.ip,
    };
    let password = services.password(sealed_password)?;

    let result = services
        .exchanges()
        .insert(input, &password)
        .await
        .map(|stored| crate::exchange::ExchangeSummary {
            name: stored.name,
            platform: stored.platform,
        });
    emit_result(result)
}

pub async fn exchange_update(
    config: &Config,
    name: &str,
    fields: ExchangeFields,
    sealed_password: Option<&str>,
) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;
    let changes = ExchangeChanges {
        platform: fields.platform,
        apikey: fields.apikey,
        secret: fields.secret,
        password: fields.passphrase,
        ip: fields.ip,
    };
    emit_result(services.exchanges().update(name, changes, &password).await)
}

pub async fn exchange_delete(config: &Config, name: &str, force: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete exchange {}? This cannot be undone.", name))
            .default(false)
            .interact()?;
        if !confirmed {
            info!("Delete cancelled by user");
            return Ok(());
        }
    }

    let services = Services::open(config).await?;
    emit_result(services.exchanges().delete(name).await)
}

/// Withdrawal arguments from the command line
#[derive(Debug, Clone)]
pub struct WithdrawArgs {
    pub exchange: String,
    pub coin: String,
    /// Decimal text, passed through unchanged
    pub amount: String,
    pub to_address: String,
    pub network: Option<String>,
}

pub async fn exchange_withdraw(
    config: &Config,
    args: WithdrawArgs,
    sealed_password: Option<&str>,
    force: bool,
) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Withdraw {} {} from {} to {} ({})? This cannot be undone.",
                args.amount,
                args.coin,
                args.exchange,
                args.to_address,
                args.network.as_deref().unwrap_or("default network")
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            info!("Withdrawal cancelled by user");
            return Ok(());
        }
    }

    let request = WithdrawalRequest {
        exchange_name: args.exchange,
        password,
        to_address: args.to_address,
        network: args.network,
        coin: args.coin,
        amount: args.amount,
    };
    let outcome = services.orchestrator(config)?.withdraw(&request).await;
    if let Some(failure) = outcome.failure() {
        warn!("Withdrawal not submitted: {}", failure.msg);
    }
    emit(outcome.into_envelope())
}

pub async fn exchange_fee(
    config: &Config,
    exchange: &str,
    coin: &str,
    network: &str,
    sealed_password: Option<&str>,
) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;
    let outcome = services
        .orchestrator(config)?
        .fetch_fee(exchange, &password, coin, network)
        .await;
    emit(outcome.into_envelope())
}

pub async fn exchange_balance(
    config: &Config,
    exchange: &str,
    coin: Option<&str>,
    sealed_password: Option<&str>,
) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;
    let outcome = services
        .orchestrator(config)?
        .fetch_balance(exchange, &password, coin)
        .await;
    emit(outcome.into_envelope())
}

// ---------------------------------------------------------------------------
// Wallets
// ---------------------------------------------------------------------------

pub async fn wallet_projects(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    emit_result(services.wallets().projects().await)
}

pub async fn wallet_stats(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    emit_result(services.wallets().project_statistics().await)
}

pub async fn wallet_list(
    config: &Config,
    address: Option<&str>,
    project: Option<&str>,
    sealed_password: Option<&str>,
) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;
    emit_result(services.wallets().list(address, project, &password).await)
}

pub async fn wallet_show(config: &Config, address: &str, sealed_password: Option<&str>) -> Result<()> {
    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;

    let envelope = match services.wallets().one(address, &password).await {
        Ok(Some(view)) => ApiEnvelope::ok(view),
        Ok(None) => ApiEnvelope::fail(format!("Wallet not found: {}", address)),
        Err(e) => ApiEnvelope::fail(e.to_string()),
    };
    emit(envelope)
}

/// Import `address[,privateKey[,phrase]]` lines from a file
pub async fn wallet_import(
    config: &Config,
    file: &Path,
    project: &str,
    remark: &str,
    sealed: bool,
    sealed_password: Option<&str>,
) -> Result<()> {
    let lines = read_lines(file).await?;
    info!("Read {} wallet lines from {}", lines.len(), file.display());

    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;
    emit_result(
        services
            .wallets()
            .import(&lines, project, remark, &password, sealed)
            .await,
    )
}

pub async fn wallet_create(
    config: &Config,
    kind: &str,
    count: usize,
    project: &str,
    remark: &str,
    sealed_password: Option<&str>,
) -> Result<()> {
    let kind: WalletKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return emit(ApiEnvelope::<()>::fail(e.to_string())),
    };

    let services = Services::open(config).await?;
    let password = services.password(sealed_password)?;
    emit_result(
        services
            .wallets()
            .create(kind, count, project, remark, &password)
            .await,
    )
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

/// Import `source,target` lines from a file
pub async fn mapping_import(config: &Config, file: &Path, project: &str, remark: &str) -> Result<()> {
    let lines = read_lines(file).await?;
    let pairs = parse_mapping_lines(&lines);
    info!("Read {} mapping pairs from {}", pairs.len(), file.display());

    let services = Services::open(config).await?;
    emit_result(services.mappings().import(pairs, project, remark).await)
}

pub async fn mapping_query(config: &Config, sources: &[String]) -> Result<()> {
    let services = Services::open(config).await?;
    let registry = services.mappings();

    match sources {
        [single] => {
            let envelope = match registry.query_one(single).await {
                Ok(Some(view)) => ApiEnvelope::ok(view),
                Ok(None) => ApiEnvelope::fail(format!("Mapping not found: {}", single)),
                Err(e) => ApiEnvelope::fail(e.to_string()),
            };
            emit(envelope)
        }
        many => emit_result(registry.query_many(many).await),
    }
}

/// Non-blank lines of a file, trimmed
async fn read_lines(file: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(non_blank_lines(&content))
}

fn non_blank_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn parse_mapping_lines(lines: &[String]) -> Vec<MappingPair> {
    lines
        .iter()
        .filter_map(|line| {
            let mut parts = line.splitn(2, ',').map(str::trim);
            let source = parts.next()?;
            let target = parts.next()?;
            Some(MappingPair::new(source, target))
        })
        .collect()
}
