//! Exchange adapter abstraction
//!
//! Every supported platform implements [`ExchangeAdapter`]. Adapters are
//! built per request by an [`AdapterFactory`] from freshly decrypted
//! credentials and are closed before the request returns.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::config::ExchangeConfig;
use crate::crypto::VaultSecret;
use crate::error::{Error, Result};
use crate::proxy::ProxyDescriptor;

use super::amount::Amount;
use super::platform::Platform;
use super::rest::{RestClient, TransportSettings};
use super::types::{select_network, BalanceReport, Balances, FeeQuote, NetworkFee, WithdrawReceipt};
use super::{binance, bitget, bybit, gate, okx};

/// Decrypted API credentials, alive for one request
pub struct ApiCredentials {
    pub api_key: VaultSecret,
    pub secret: VaultSecret,
    pub passphrase: Option<VaultSecret>,
}

impl ApiCredentials {
    /// Passphrase for platforms that sign with one
    pub fn require_passphrase(&self, platform: Platform) -> Result<&VaultSecret> {
        self.passphrase.as_ref().ok_or_else(|| {
            Error::IncompleteCredential(format!(
                "{} requires an API passphrase",
                platform.display_name()
            ))
        })
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"***")
            .field("secret", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Withdrawal request
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawParams {
    /// Upper-case symbol
    pub coin: String,
    pub amount: Amount,
    pub address: String,
    pub network: Option<String>,
}

impl WithdrawParams {
    pub fn validate(&self) -> Result<()> {
        if self.coin.trim().is_empty() {
            return Err(Error::InvalidInput("coin must not be empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(Error::InvalidInput("to_address must not be empty".to_string()));
        }
        Ok(())
    }

    /// Network to send on, when one was requested
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref().filter(|n| !n.is_empty())
    }

    /// Amount as sent on the wire
    pub fn amount_str(&self) -> String {
        self.amount.to_string()
    }
}

/// Operations every platform binding supports
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Submit a withdrawal; the platform decides the fee
    async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawReceipt>;

    /// Network table for a coin; `None` when the platform does not know it
    async fn network_fees(&self, coin: &str) -> Result<Option<Vec<NetworkFee>>>;

    /// Fee for one coin on one network
    async fn fetch_fee_info(&self, coin: &str, network: &str) -> Result<FeeQuote> {
        let rows = self.network_fees(coin).await?.ok_or_else(|| {
            Error::NotFound(format!("{} does not list coin {}", self.platform().display_name(), coin))
        })?;

        select_network(rows, network, self.platform().network_match())
            .map(|row| row.into_quote(coin, network))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "{} has no network {} for {}",
                    self.platform().display_name(),
                    network,
                    coin
                ))
            })
    }

    /// Free and locked amounts for every held asset
    async fn fetch_balances(&self) -> Result<Balances>;

    /// One coin (zero when absent) or every non-zero coin
    async fn fetch_balance(&self, coin: Option<&str>) -> Result<BalanceReport> {
        let balances = self.fetch_balances().await?;
        Ok(balances.report(coin.filter(|c| !c.is_empty())))
    }

    /// Release transport resources; calling twice is harmless
    async fn close(&mut self) -> Result<()>;
}

/// Everything a platform constructor needs
pub struct AdapterContext {
    pub credentials: ApiCredentials,
    pub rest: RestClient,
    pub recv_window_ms: u64,
}

/// Builds adapters for a platform
pub trait AdapterFactory: Send + Sync {
    fn create(
        &self,
        platform: Platform,
        credentials: ApiCredentials,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<Box<dyn ExchangeAdapter>>;
}

type Constructor = fn(AdapterContext) -> Result<Box<dyn ExchangeAdapter>>;

/// Static lookup table from platform to binding
const CONSTRUCTORS: [(Platform, Constructor); 5] = [
    (Platform::Binance, binance::build),
    (Platform::Bitget, bitget::build),
    (Platform::Okx, okx::build),
    (Platform::Gate, gate::build),
    (Platform::Bybit, bybit::build),
];

/// Factory producing the signed-REST bindings
#[derive(Debug, Clone)]
pub struct HttpAdapterFactory {
    transport: TransportSettings,
    endpoints: HashMap<Platform, String>,
}

impl HttpAdapterFactory {
    pub fn new(transport: TransportSettings) -> Self {
        Self {
            transport,
            endpoints: HashMap::new(),
        }
    }

    pub fn from_config(config: &ExchangeConfig) -> Result<Self> {
        let mut factory = Self::new(TransportSettings {
            timeout: Duration::from_millis(config.timeout_ms),
            recv_window_ms: config.recv_window_ms,
        });
        for (platform, url) in &config.endpoints {
            let platform: Platform = platform.parse().map_err(|_| {
                Error::Config(format!("Unknown platform in exchange.endpoints: {}", platform))
            })?;
            factory = factory.with_endpoint(platform, url);
        }
        Ok(factory)
    }

    /// Override the base URL of one platform
    pub fn with_endpoint(mut self, platform: Platform, url: impl Into<String>) -> Self {
        self.endpoints.insert(platform, url.into());
        self
    }

    pub fn base_url(&self, platform: Platform) -> &str {
        self.endpoints
            .get(&platform)
            .map(String::as_str)
            .unwrap_or_else(|| platform.default_base_url())
    }
}

impl Default for HttpAdapterFactory {
    fn default() -> Self {
        Self::new(TransportSettings::default())
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn create(
        &self,
        platform: Platform,
        credentials: ApiCredentials,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<Box<dyn ExchangeAdapter>> {
        let constructor = CONSTRUCTORS
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, c)| *c)
            .ok_or_else(|| Error::UnsupportedPlatform(platform.id().to_string()))?;

        let rest = RestClient::new(platform, self.base_url(platform), &self.transport, proxy)?;

        constructor(AdapterContext {
            credentials,
            rest,
            recv_window_ms: self.transport.recv_window_ms,
        })
    }
}
