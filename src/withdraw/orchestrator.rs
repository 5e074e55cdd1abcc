//! Withdrawal orchestration
//!
//! Drives one exchange call end to end:
//!
//! ```text
//! lookup → decrypt → build client → invoke → classify → close
//! ```
//!
//! A fresh adapter is built for every call and closed on every path that
//! reached it. Nothing is retried.

use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::crypto::{CredentialVault, VaultSecret};
use crate::error::{self, Error, ErrorKind};
use crate::exchange::{
    AdapterFactory, BalanceReport, ExchangeAdapter, FeeQuote, Platform, WithdrawParams,
};
use crate::proxy;
use crate::storage::CustodyStore;

use super::outcome::{Failure, Outcome, WithdrawalOutcome, WithdrawalSuccess};

/// Withdrawal as submitted by a caller
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub exchange_name: String,
    pub password: VaultSecret,
    pub to_address: String,
    pub network: Option<String>,
    pub coin: String,
    /// Decimal text; parsed into an exact [`Amount`](crate::exchange::Amount)
    pub amount: String,
}

impl WithdrawalRequest {
    /// Normalized and validated exchange parameters
    fn params(&self) -> error::Result<WithdrawParams> {
        let params = WithdrawParams {
            coin: normalize_coin(&self.coin),
            amount: self.amount.parse()?,
            address: self.to_address.trim().to_string(),
            network: self
                .network
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Coins are matched upper-case on every platform
fn normalize_coin(coin: &str) -> String {
    coin.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Withdraw,
    Fee,
    Balance,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Withdraw => "withdraw",
            Operation::Fee => "fee",
            Operation::Balance => "balance",
        }
    }

    /// Prefix for failures nothing else classifies
    fn failure_prefix(&self) -> &'static str {
        match self {
            Operation::Withdraw => "Withdrawal failed",
            Operation::Fee | Operation::Balance => "Query failed",
        }
    }
}

/// Adapter built for a single call
struct Session {
    platform: Platform,
    adapter: Box<dyn ExchangeAdapter>,
}

impl Session {
    /// Release the client; errors are logged and dropped
    async fn close(mut self) {
        if let Err(e) = self.adapter.close().await {
            warn!("Failed to close {} client: {}", self.platform.display_name(), e);
        }
    }
}

pub struct WithdrawalOrchestrator {
    store: Arc<dyn CustodyStore>,
    factory: Arc<dyn AdapterFactory>,
}

impl WithdrawalOrchestrator {
    pub fn new(store: Arc<dyn CustodyStore>, factory: Arc<dyn AdapterFactory>) -> Self {
        Self { store, factory }
    }

    /// Submit one withdrawal
    pub async fn withdraw(&self, request: &WithdrawalRequest) -> WithdrawalOutcome {
        let span = info_span!(
            "exchange_call",
            exchange = %request.exchange_name,
            op = Operation::Withdraw.name()
        );
        async {
            let params = match request.params() {
                Ok(params) => params,
                Err(e) => {
                    warn!("Rejected withdrawal: {}", e);
                    return Outcome::Failure(Failure::from(&e));
                }
            };

            let session = match self.open_session(&request.exchange_name, &request.password).await {
                Ok(session) => session,
                Err(failure) => return Outcome::Failure(failure),
            };

            info!(
                "Submitting {} {} withdrawal on {} network {}",
                params.amount_str(),
                params.coin,
                session.platform.display_name(),
                params.network().unwrap_or("default")
            );
            let result = session.adapter.withdraw(&params).await;
            let platform = session.platform;
            session.close().await;

            match result {
                Ok(receipt) => {
                    let success = WithdrawalSuccess::from_receipt(
                        platform.display_name(),
                        receipt,
                        params.amount.clone(),
                        &params.coin,
                        params.network(),
                        &params.address,
                    );
                    info!(
                        "Withdrawal accepted by {}: id={} status={}",
                        success.exchange, success.withdraw_id, success.status
                    );
                    Outcome::Success(success)
                }
                Err(e) => Outcome::Failure(classify(Operation::Withdraw, e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Fee and minimum for one coin on one network
    pub async fn fetch_fee(
        &self,
        exchange_name: &str,
        password: &VaultSecret,
        coin: &str,
        network: &str,
    ) -> Outcome<FeeQuote> {
        let span = info_span!("exchange_call", exchange = %exchange_name, op = Operation::Fee.name());
        async {
            if coin.trim().is_empty() || network.trim().is_empty() {
                return Outcome::Failure(Failure::new(
                    ErrorKind::InvalidInput,
                    "coin and network must not be empty",
                ));
            }

            let session = match self.open_session(exchange_name, password).await {
                Ok(session) => session,
                Err(failure) => return Outcome::Failure(failure),
            };

            let coin = normalize_coin(coin);
            let result = session.adapter.fetch_fee_info(&coin, network.trim()).await;
            session.close().await;

            match result {
                Ok(quote) => {
                    debug!("Fee for {} on {}: {:?}", quote.coin, quote.network, quote.fee);
                    Outcome::Success(quote)
                }
                Err(e) => Outcome::Failure(classify(Operation::Fee, e)),
            }
        }
        .instrument(span)
        .await
    }

    /// One coin, or every non-zero coin when `coin` is absent
    pub async fn fetch_balance(
        &self,
        exchange_name: &str,
        password: &VaultSecret,
        coin: Option<&str>,
    ) -> Outcome<BalanceReport> {
        let span = info_span!("exchange_call", exchange = %exchange_name, op = Operation::Balance.name());
        async {
            let session = match self.open_session(exchange_name, password).await {
                Ok(session) => session,
                Err(failure) => return Outcome::Failure(failure),
            };

            let coin = coin.map(normalize_coin).filter(|c| !c.is_empty());
            let result = session.adapter.fetch_balance(coin.as_deref()).await;
            session.close().await;

            match result {
                Ok(report) => Outcome::Success(report),
                Err(e) => Outcome::Failure(classify(Operation::Balance, e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Lookup, decrypt and build; every failure here is terminal
    async fn open_session(
        &self,
        exchange_name: &str,
        password: &VaultSecret,
    ) -> Result<Session, Failure> {
        let record = match self.store.find_exchange(exchange_name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Exchange not found: {}", exchange_name);
                return Err(Failure::new(
                    ErrorKind::CredentialNotFound,
                    format!("Exchange not found: {}", exchange_name),
                ));
            }
            Err(e) => {
                error!("Credential lookup failed: {}", e);
                return Err(Failure::new(
                    ErrorKind::Internal,
                    format!("Credential lookup failed: {}", e),
                ));
            }
        };

        let platform: Platform = record.platform.parse().map_err(|_| {
            warn!("Unsupported platform {} for {}", record.platform, record.name);
            Failure::new(
                ErrorKind::UnsupportedPlatform,
                format!("Unsupported platform: {}", record.platform),
            )
        })?;

        let credentials = CredentialVault::open_exchange(&record, password)
            .and_then(|secrets| secrets.into_api_credentials())
            .map_err(|e| match e {
                Error::IncompleteCredential(detail) => {
                    warn!("Incomplete credentials for {}: {}", record.name, detail);
                    Failure::new(ErrorKind::IncompleteCredential, "API credentials incomplete")
                }
                other => {
                    warn!("Could not open credentials for {}: {}", record.name, other);
                    Failure::new(ErrorKind::DecryptionFailure, "Decryption failed")
                }
            })?;

        let proxy = record.ip.as_deref().filter(|ip| !ip.trim().is_empty()).and_then(|ip| {
            let parsed = proxy::parse(ip);
            if parsed.is_none() {
                warn!("Ignoring malformed proxy for {}", record.name);
            }
            parsed
        });
        if let Some(proxy) = &proxy {
            debug!("Routing {} through proxy {}", record.name, proxy);
        }

        let adapter = self
            .factory
            .create(platform, credentials, proxy.as_ref())
            .map_err(|e| {
                error!("Failed to create {} client: {}", platform.display_name(), e);
                match e {
                    Error::IncompleteCredential(_) => {
                        Failure::new(ErrorKind::IncompleteCredential, "API credentials incomplete")
                    }
                    Error::UnsupportedPlatform(p) => {
                        Failure::new(ErrorKind::UnsupportedPlatform, format!("Unsupported platform: {}", p))
                    }
                    Error::ClientCreationFailure(detail) => Failure::new(
                        ErrorKind::ClientCreationFailure,
                        Error::ClientCreationFailure(detail).to_string(),
                    ),
                    other => Failure::new(
                        ErrorKind::ClientCreationFailure,
                        Error::ClientCreationFailure(other.to_string()).to_string(),
                    ),
                }
            })?;

        Ok(Session { platform, adapter })
    }
}

/// Map an invocation error onto the caller-facing taxonomy
fn classify(operation: Operation, e: Error) -> Failure {
    match e.kind() {
        ErrorKind::InsufficientFunds
        | ErrorKind::NetworkError
        | ErrorKind::ExchangeError
        | ErrorKind::NotFound
        | ErrorKind::InvalidInput => {
            warn!("{} rejected: {}", operation.name(), e);
            Failure::from(&e)
        }
        _ => {
            error!("{} failed: {}", operation.name(), e);
            Failure::new(
                ErrorKind::Internal,
                format!("{}: {}", operation.failure_prefix(), e),
            )
        }
    }
}
