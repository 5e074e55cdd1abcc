//! Exchange records and normalized response shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::crypto::EncryptedBlob;

use super::platform::NetworkMatch;

/// Stored exchange credential (fields sealed at rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeCredential {
    pub id: u64,

    /// Platform id as stored; may be outside the supported set
    pub platform: String,

    pub apikey: Option<EncryptedBlob>,

    pub secret: Option<EncryptedBlob>,

    /// API passphrase (Bitget, OKX)
    #[serde(default)]
    pub password: Option<EncryptedBlob>,

    /// Outbound proxy string
    #[serde(default)]
    pub ip: Option<String>,

    /// Unique handle
    pub name: String,
}

/// New exchange row, already sealed for storage
#[derive(Debug, Clone)]
pub struct NewExchange {
    pub platform: String,
    pub apikey: Option<EncryptedBlob>,
    pub secret: Option<EncryptedBlob>,
    pub password: Option<EncryptedBlob>,
    pub ip: Option<String>,
    pub name: String,
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default)]
pub struct ExchangeUpdate {
    pub platform: Option<String>,
    pub apikey: Option<EncryptedBlob>,
    pub secret: Option<EncryptedBlob>,
    pub password: Option<EncryptedBlob>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub name: String,
    pub platform: String,
}

/// Exchange record as handed to a caller: secrets re-sealed for transit
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeView {
    pub id: u64,
    pub platform: String,
    pub apikey: Option<EncryptedBlob>,
    pub secret: Option<EncryptedBlob>,
    pub password: Option<EncryptedBlob>,
    pub ip: Option<String>,
    pub name: String,
}

/// Withdrawal fee for one coin on one network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeQuote {
    pub coin: String,
    pub network: String,
    pub fee: Option<f64>,
    pub min_withdraw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// One row of a platform's network table for a coin
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkFee {
    /// Platform network code
    pub code: String,
    /// Alternative labels the platform reports for the same network
    pub aliases: Vec<String>,
    pub fee: Option<f64>,
    pub min_withdraw: Option<f64>,
    pub enabled: Option<bool>,
}

impl NetworkFee {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            aliases: Vec::new(),
            fee: None,
            min_withdraw: None,
            enabled: None,
        }
    }

    fn matches(&self, requested: &str, mode: NetworkMatch) -> bool {
        match mode {
            NetworkMatch::Exact => self.code == requested,
            NetworkMatch::Substring => {
                let needle = requested.to_uppercase();
                std::iter::once(&self.code)
                    .chain(self.aliases.iter())
                    .any(|code| code.to_uppercase().contains(&needle))
            }
        }
    }

    pub fn into_quote(self, coin: &str, requested: &str) -> FeeQuote {
        FeeQuote {
            coin: coin.to_string(),
            network: requested.to_string(),
            fee: self.fee,
            min_withdraw: self.min_withdraw,
            enabled: self.enabled,
        }
    }
}

/// Pick the network row for a request, first match wins
pub fn select_network(rows: Vec<NetworkFee>, requested: &str, mode: NetworkMatch) -> Option<NetworkFee> {
    if requested.is_empty() {
        return None;
    }
    rows.into_iter().find(|row| row.matches(requested, mode))
}

/// Per-coin balance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceEntry {
    pub coin: String,
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

impl BalanceEntry {
    pub fn zero(coin: &str) -> Self {
        Self {
            coin: coin.to_string(),
            free: 0.0,
            used: 0.0,
            total: 0.0,
        }
    }
}

/// Balance answer: one coin, or every non-zero coin
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BalanceReport {
    Single(BalanceEntry),
    All(Vec<BalanceEntry>),
}

/// Free/used maps as reported by a platform, keyed by upper-case coin
#[derive(Debug, Clone, Default)]
pub struct Balances {
    pub free: BTreeMap<String, f64>,
    pub used: BTreeMap<String, f64>,
}

impl Balances {
    /// Accumulate one asset row
    pub fn add(&mut self, coin: &str, free: f64, used: f64) {
        let coin = coin.to_ascii_uppercase();
        *self.free.entry(coin.clone()).or_insert(0.0) += free;
        *self.used.entry(coin).or_insert(0.0) += used;
    }

    /// Balance of one coin; an unknown coin is zero, not an error
    pub fn entry(&self, coin: &str) -> BalanceEntry {
        let coin = coin.to_ascii_uppercase();
        if !self.free.contains_key(&coin) && !self.used.contains_key(&coin) {
            return BalanceEntry::zero(&coin);
        }
        let free = self.free.get(&coin).copied().unwrap_or(0.0);
        let used = self.used.get(&coin).copied().unwrap_or(0.0);
        BalanceEntry {
            coin,
            free,
            used,
            total: free + used,
        }
    }

    /// Every coin with a positive total
    pub fn non_zero(&self) -> Vec<BalanceEntry> {
        let mut coins: Vec<&String> = self.free.keys().chain(self.used.keys()).collect();
        coins.sort();
        coins.dedup();
        coins
            .into_iter()
            .map(|coin| self.entry(coin))
            .filter(|entry| entry.total > 0.0)
            .collect()
    }

    pub fn report(&self, coin: Option<&str>) -> BalanceReport {
        match coin {
            Some(coin) => BalanceReport::Single(self.entry(coin)),
            None => BalanceReport::All(self.non_zero()),
        }
    }
}

/// Platform acknowledgement of a withdrawal
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawReceipt {
    pub id: Option<String>,
    pub txid: Option<String>,
    pub status: Option<String>,
    pub raw: Value,
}

impl WithdrawReceipt {
    pub fn from_id(id: Option<String>, raw: Value) -> Self {
        Self {
            id,
            txid: None,
            status: None,
            raw,
        }
    }
}

/// Read a number that a platform may encode as a JSON string or number
pub(crate) fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read a string that a platform may encode as a JSON string or number
pub(crate) fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a flag encoded as bool, "true"/"false", or "1"/"0"
pub(crate) fn json_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(code: &str) -> NetworkFee {
        NetworkFee {
            fee: Some(1.0),
            min_withdraw: Some(10.0),
            ..NetworkFee::new(code)
        }
    }

    #[test]
    fn test_substring_match_for_decorated_codes() {
        let rows = vec![row("USDT-TRC20"), row("ETH-ERC20")];
        let hit = select_network(rows, "erc20", NetworkMatch::Substring).unwrap();
        assert_eq!(hit.code, "ETH-ERC20");
    }

    #[test]
    fn test_exact_match_rejects_decorated_codes() {
        let rows = vec![row("ETH-ERC20")];
        assert!(select_network(rows.clone(), "ERC20", NetworkMatch::Exact).is_none());
        assert!(select_network(rows, "ETH-ERC20", NetworkMatch::Exact).is_some());
    }

    #[test]
    fn test_substring_checks_aliases() {
        let mut eth = row("ETH");
        eth.aliases.push("ERC20".to_string());
        assert!(select_network(vec![eth], "ERC20", NetworkMatch::Substring).is_some());
    }

    #[test]
    fn test_empty_network_never_matches() {
        assert!(select_network(vec![row("ERC20")], "", NetworkMatch::Substring).is_none());
    }

    #[test]
    fn test_balance_entry_for_unknown_coin_is_zero() {
        let mut balances = Balances::default();
        balances.add("USDT", 12.5, 2.5);
        assert_eq!(balances.entry("BTC"), BalanceEntry::zero("BTC"));
        let usdt = balances.entry("USDT");
        assert_eq!(usdt.total, 15.0);
    }

    #[test]
    fn test_balance_lookup_ignores_coin_case() {
        let mut balances = Balances::default();
        balances.add("usdt", 1.0, 0.0);
        balances.add("USDT", 2.0, 0.0);
        let entry = balances.entry("Usdt");
        assert_eq!(entry.coin, "USDT");
        assert_eq!(entry.free, 3.0);
    }

    #[test]
    fn test_non_zero_listing() {
        let mut balances = Balances::default();
        balances.add("USDT", 1.0, 0.0);
        balances.add("DUST", 0.0, 0.0);
        balances.add("ETH", 0.0, 0.5);
        let coins: Vec<String> = balances.non_zero().into_iter().map(|e| e.coin).collect();
        assert_eq!(coins, vec!["ETH".to_string(), "USDT".to_string()]);
    }

    #[test]
    fn test_json_helpers() {
        assert_eq!(json_f64(&json!("1.5")), Some(1.5));
        assert_eq!(json_f64(&json!(2)), Some(2.0));
        assert_eq!(json_f64(&json!(null)), None);
        assert_eq!(json_string(&json!(123)), Some("123".to_string()));
        assert_eq!(json_string(&json!("")), None);
        assert_eq!(json_bool(&json!("1")), Some(true));
        assert_eq!(json_bool(&json!("false")), Some(false));
    }

    #[test]
    fn test_balance_report_serializes_untagged() {
        let report = BalanceReport::Single(BalanceEntry::zero("USDT"));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["coin"], "USDT");
        assert_eq!(value["total"], 0.0);
    }
}
