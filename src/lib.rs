//! Custody Vault Library
//!
//! Encrypted custody of wallet keys and exchange API credentials, with
//! withdrawals, fee and balance queries across Binance, Bitget, OKX,
//! Gate.io and Bybit.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod proxy;
pub mod storage;
pub mod wallet;
pub mod withdraw;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
