//! Supported trading platforms

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a requested withdrawal network is matched against platform codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMatch {
    /// Network code must equal the request
    Exact,
    /// Platform codes are decorated ("USDT-ERC20"); match case-insensitively
    /// when the code contains the request
    Substring,
}

/// Trading platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Binance,
    Bitget,
    Okx,
    Gate,
    Bybit,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Binance,
        Platform::Bitget,
        Platform::Okx,
        Platform::Gate,
        Platform::Bybit,
    ];

    /// Lowercase identifier used in storage and config
    pub fn id(&self) -> &'static str {
        match self {
            Platform::Binance => "binance",
            Platform::Bitget => "bitget",
            Platform::Okx => "okx",
            Platform::Gate => "gate",
            Platform::Bybit => "bybit",
        }
    }

    /// User-facing name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Binance => "Binance",
            Platform::Bitget => "Bitget",
            Platform::Okx => "OKX",
            Platform::Gate => "Gate.io",
            Platform::Bybit => "Bybit",
        }
    }

    /// Whether the API passphrase is part of the credential
    pub fn requires_passphrase(&self) -> bool {
        matches!(self, Platform::Bitget | Platform::Okx)
    }

    pub fn network_match(&self) -> NetworkMatch {
        match self {
            Platform::Okx | Platform::Bybit => NetworkMatch::Substring,
            Platform::Binance | Platform::Bitget | Platform::Gate => NetworkMatch::Exact,
        }
    }

    /// Production REST endpoint
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Platform::Binance => "https://api.binance.com",
            Platform::Bitget => "https://api.bitget.com",
            Platform::Okx => "https://www.okx.com",
            Platform::Gate => "https://api.gateio.ws",
            Platform::Bybit => "https://api.bybit.com",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.id() == normalized)
            .ok_or_else(|| Error::UnsupportedPlatform(normalized))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
