//! Exchange credentials and platform bindings
//!
//! - `platform`: supported platforms and their quirks
//! - `amount`: exact decimal withdrawal amounts
//! - `adapter`: the uniform adapter trait and the factory that builds them
//! - `rest`: signed HTTP transport shared by the bindings
//! - `registry`: stored credential management

pub mod adapter;
pub mod amount;
mod binance;
mod bitget;
mod bybit;
mod gate;
mod okx;
pub mod platform;
pub mod registry;
pub mod rest;
#[cfg(test)]
pub(crate) mod test_server;
pub mod types;

pub use adapter::{
    AdapterFactory, ApiCredentials, ExchangeAdapter, HttpAdapterFactory, WithdrawParams,
};
pub use amount::Amount;
pub use platform::{NetworkMatch, Platform};
pub use registry::{ExchangeChanges, ExchangeInput, ExchangeRegistry};
pub use types::{
    BalanceEntry, BalanceReport, Balances, ExchangeCredential, ExchangeSummary, ExchangeUpdate,
    ExchangeView, FeeQuote, NetworkFee, NewExchange, WithdrawReceipt,
};
