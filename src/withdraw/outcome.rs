//! Structured results handed back to callers
//!
//! Every orchestrator call ends in an [`Outcome`]; nothing escapes as an
//! error. [`ApiEnvelope`] is the `{code, data, msg}` wire shape.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::exchange::{Amount, WithdrawReceipt};

pub const SUCCESS_CODE: i32 = 20000;
pub const FAILURE_CODE: i32 = -1;

/// Status reported when the platform does not give one
const DEFAULT_STATUS: &str = "pending";

/// Why a call failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub msg: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }
}

impl From<&Error> for Failure {
    fn from(e: &Error) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(data) => Some(data),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(data) => Outcome::Success(f(data)),
            Outcome::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn into_envelope(self) -> ApiEnvelope<T> {
        match self {
            Outcome::Success(data) => ApiEnvelope::ok(data),
            Outcome::Failure(failure) => ApiEnvelope::fail(failure.msg),
        }
    }
}

/// `{success, msg, kind, data}`; `kind` and `data` are null on the
/// side that does not apply
impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Outcome", 4)?;
        match self {
            Outcome::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("msg", "ok")?;
                state.serialize_field("kind", &Option::<ErrorKind>::None)?;
                state.serialize_field("data", data)?;
            }
            Outcome::Failure(failure) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("msg", &failure.msg)?;
                state.serialize_field("kind", &Some(failure.kind))?;
                state.serialize_field("data", &Option::<T>::None)?;
            }
        }
        state.end()
    }
}

/// Normalized withdrawal acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalSuccess {
    /// Display name of the platform
    pub exchange: String,
    pub txid: String,
    pub withdraw_id: String,
    pub amount: Amount,
    pub coin: String,
    pub network: Option<String>,
    pub to_address: String,
    pub status: String,
    pub raw_response: Value,
}

impl WithdrawalSuccess {
    /// Fill the normalized shape from a platform receipt
    ///
    /// `txid` prefers the platform id and falls back to the chain txid.
    pub fn from_receipt(
        exchange: &str,
        receipt: WithdrawReceipt,
        amount: Amount,
        coin: &str,
        network: Option<&str>,
        to_address: &str,
    ) -> Self {
        let txid = receipt
            .id
            .clone()
            .or(receipt.txid)
            .unwrap_or_default();
        Self {
            exchange: exchange.to_string(),
            txid,
            withdraw_id: receipt.id.unwrap_or_default(),
            amount,
            coin: coin.to_string(),
            network: network.map(str::to_string),
            to_address: to_address.to_string(),
            status: receipt
                .status
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            raw_response: receipt.raw,
        }
    }
}

pub type WithdrawalOutcome = Outcome<WithdrawalSuccess>;

/// Response envelope: `code = 20000` on success, `-1` with `data: null`
/// on failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiEnvelope<T> {
    pub code: i32,
    pub data: Option<T>,
    pub msg: String,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            data: Some(data),
            msg: "ok".to_string(),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            code: FAILURE_CODE,
            data: None,
            msg: msg.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl<T> From<Outcome<T>> for ApiEnvelope<T> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_envelope()
    }
}

impl<T> From<crate::error::Result<T>> for ApiEnvelope<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn receipt(id: Option<&str>, txid: Option<&str>, status: Option<&str>) -> WithdrawReceipt {
        WithdrawReceipt {
            id: id.map(str::to_string),
            txid: txid.map(str::to_string),
            status: status.map(str::to_string),
            raw: json!({"id": id}),
        }
    }

    #[test]
    fn test_success_shape() {
        let success = WithdrawalSuccess::from_receipt(
            "Binance",
            receipt(Some("w-1"), None, None),
            "10.50".parse().unwrap(),
            "USDT",
            Some("ERC20"),
            "0xabc",
        );
        assert_eq!(success.txid, "w-1");
        assert_eq!(success.withdraw_id, "w-1");
        assert_eq!(success.status, "pending");

        let value = serde_json::to_value(&success).unwrap();
        for key in ["exchange", "txid", "withdraw_id", "amount", "coin", "network", "to_address", "status", "raw_response"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["amount"], json!("10.5"));
    }

    #[test]
    fn test_txid_falls_back_to_chain_hash() {
        let success = WithdrawalSuccess::from_receipt(
            "Gate.io",
            receipt(None, Some("0xhash"), Some("DONE")),
            "1".parse().unwrap(),
            "ETH",
            None,
            "0xabc",
        );
        assert_eq!(success.txid, "0xhash");
        assert_eq!(success.withdraw_id, "");
        assert_eq!(success.status, "DONE");
    }

    #[test]
    fn test_envelopes() {
        let ok: ApiEnvelope<u32> = Outcome::Success(5).into();
        assert_eq!(ok.code, 20000);
        assert_eq!(ok.msg, "ok");
        assert_eq!(ok.data, Some(5));

        let failed: ApiEnvelope<u32> =
            Outcome::Failure(Failure::new(ErrorKind::DecryptionFailure, "Decryption failed")).into();
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value, json!({"code": -1, "data": null, "msg": "Decryption failed"}));
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let failure: Outcome<u32> = Outcome::Failure(Failure::new(ErrorKind::NetworkError, "Network error: timeout"));
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "network_error");
        assert!(value["data"].is_null());
    }
}
