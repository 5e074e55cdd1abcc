//! Bitget v2 spot wallet binding

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::adapter::{AdapterContext, ApiCredentials, ExchangeAdapter, WithdrawParams};
use super::platform::Platform;
use super::rest::{
    classify_failure, client_order_id, encode_query, hmac_sha256_base64, timestamp_millis,
    RestClient, RestResponse, SignedRequest,
};
use super::types::{json_bool, json_f64, json_string, Balances, NetworkFee, WithdrawReceipt};

const WITHDRAW_PATH: &str = "/api/v2/spot/wallet/withdrawal";
const COINS_PATH: &str = "/api/v2/spot/public/coins";
const ASSETS_PATH: &str = "/api/v2/spot/account/assets";

const SUCCESS_CODE: &str = "00000";
const INSUFFICIENT_CODES: &[&str] = &["43012"];

pub struct BitgetAdapter {
    rest: RestClient,
    credentials: ApiCredentials,
}

pub(super) fn build(ctx: AdapterContext) -> Result<Box<dyn ExchangeAdapter>> {
    Ok(Box::new(BitgetAdapter::new(ctx)?))
}

impl BitgetAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        ctx.credentials.require_passphrase(Platform::Bitget)?;
        Ok(Self {
            rest: ctx.rest,
            credentials: ctx.credentials,
        })
    }

    /// Signature covers timestamp + METHOD + path(?query) + body
    fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<SignedRequest> {
        let mut request = SignedRequest::new(method, path);
        request.query = encode_query(params);
        request.body = body.map(|b| b.to_string());

        let timestamp = timestamp_millis().to_string();
        let payload = format!(
            "{}{}{}{}",
            timestamp,
            request.method.as_str(),
            request.request_path(),
            request.body.as_deref().unwrap_or_default()
        );
        let signature = hmac_sha256_base64(&self.credentials.secret, &payload)?;
        let passphrase = self.credentials.require_passphrase(Platform::Bitget)?;

        request.headers.extend([
            ("ACCESS-KEY", self.credentials.api_key.expose_secret().to_string()),
            ("ACCESS-SIGN", signature),
            ("ACCESS-TIMESTAMP", timestamp),
            ("ACCESS-PASSPHRASE", passphrase.expose_secret().to_string()),
            ("locale", "en-US".to_string()),
        ]);
        Ok(request)
    }

    async fn send(&self, request: SignedRequest) -> Result<Value> {
        let response = self.rest.execute(request).await?;
        check_response(response)
    }
}

/// Every reply is `{"code": "...", "msg": "...", "data": ...}`
fn check_response(response: RestResponse) -> Result<Value> {
    let code = response.body.get("code").and_then(json_string).unwrap_or_default();
    if code == SUCCESS_CODE && response.is_success() {
        return Ok(response.body.get("data").cloned().unwrap_or(Value::Null));
    }
    if code.is_empty() {
        return Err(Error::Exchange(format!(
            "Bitget HTTP {}: {}",
            response.status, response.body
        )));
    }
    let msg = response.body.get("msg").and_then(|m| m.as_str()).unwrap_or_default();
    Err(classify_failure(Platform::Bitget, &code, msg, INSUFFICIENT_CODES))
}

fn parse_network_table(data: &Value, coin: &str) -> Option<Vec<NetworkFee>> {
    let entry = data.as_array()?.iter().find(|c| {
        c.get("coin")
            .and_then(|v| v.as_str())
            .map(|v| v.eq_ignore_ascii_case(coin))
            .unwrap_or(false)
    })?;

    let rows = entry
        .get("chains")
        .and_then(|c| c.as_array())
        .map(|chains| {
            chains
                .iter()
                .filter_map(|chain| {
                    let code = chain.get("chain").and_then(|v| v.as_str())?;
                    Some(NetworkFee {
                        fee: chain.get("withdrawFee").and_then(json_f64),
                        min_withdraw: chain.get("minWithdrawAmount").and_then(json_f64),
                        enabled: chain.get("withdrawable").and_then(json_bool),
                        ..NetworkFee::new(code)
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(rows)
}

fn parse_balances(data: &Value) -> Balances {
    let mut balances = Balances::default();
    for row in data.as_array().into_iter().flatten() {
        let Some(coin) = row.get("coin").and_then(|c| c.as_str()) else {
            continue;
        };
        let free = row.get("available").and_then(json_f64).unwrap_or(0.0);
        let frozen = row.get("frozen").and_then(json_f64).unwrap_or(0.0);
        let locked = row.get("locked").and_then(json_f64).unwrap_or(0.0);
        balances.add(&coin.to_uppercase(), free, frozen + locked);
    }
    balances
}

#[async_trait]
impl ExchangeAdapter for BitgetAdapter {
    fn platform(&self) -> Platform {
        Platform::Bitget
    }

    async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawReceipt> {
        let mut body = json!({
            "coin": params.coin,
            "transferType": "on_chain",
            "address": params.address,
            "size": params.amount_str(),
            "clientOid": client_order_id(),
        });
        if let Some(network) = params.network() {
            body["chain"] = Value::String(network.to_string());
        }

        let request = self.signed(Method::POST, WITHDRAW_PATH, &[], Some(body))?;
        let data = self.send(request).await?;
        let id = data.get("orderId").and_then(json_string);
        debug!("Bitget withdrawal accepted: {:?}", id);
        Ok(WithdrawReceipt::from_id(id, data))
    }

    async fn network_fees(&self, coin: &str) -> Result<Option<Vec<NetworkFee>>> {
        let request = self.signed(Method::GET, COINS_PATH, &[("coin", coin.to_string())], None)?;
        let data = self.send(request).await?;
        Ok(parse_network_table(&data, coin))
    }

    async fn fetch_balances(&self) -> Result<Balances> {
        let request = self.signed(Method::GET, ASSETS_PATH, &[], None)?;
        let data = self.send(request).await?;
        Ok(parse_balances(&data))
    }

    async fn close(&mut self) -> Result<()> {
        self.rest.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::test_server::{
        adapter_at, secret, serve_once, withdraw_params, API_KEY, API_PASSPHRASE,
    };

    #[test]
    fn test_parse_network_table() {
        let data = json!([{
            "coin": "USDT",
            "chains": [
                {"chain": "ERC20", "withdrawFee": "2.5", "minWithdrawAmount": "10", "withdrawable": "true"},
                {"chain": "TRC20", "withdrawFee": "1", "minWithdrawAmount": "10", "withdrawable": "false"}
            ]
        }]);
        let rows = parse_network_table(&data, "USDT").unwrap();
        assert_eq!(rows[0].code, "ERC20");
        assert_eq!(rows[0].fee, Some(2.5));
        assert_eq!(rows[1].enabled, Some(false));
        assert!(parse_network_table(&json!([]), "USDT").is_none());
    }

    #[test]
    fn test_parse_balances() {
        let data = json!([
            {"coin": "usdt", "available": "50", "frozen": "1", "locked": "1"},
            {"coin": "btc", "available": "0", "frozen": "0", "locked": "0"}
        ]);
        let balances = parse_balances(&data);
        let usdt = balances.entry("USDT");
        assert_eq!(usdt.free, 50.0);
        assert_eq!(usdt.used, 2.0);
        assert_eq!(balances.non_zero().len(), 1);
    }

    #[test]
    fn test_check_response() {
        let ok = RestResponse {
            status: 200,
            body: json!({"code": "00000", "msg": "success", "data": {"orderId": "123"}}),
        };
        assert_eq!(check_response(ok).unwrap()["orderId"], "123");

        let low = RestResponse {
            status: 400,
            body: json!({"code": "43012", "msg": "Insufficient balance"}),
        };
        assert!(matches!(check_response(low), Err(Error::InsufficientFunds(_))));

        let denied = RestResponse {
            status: 400,
            body: json!({"code": "40037", "msg": "Apikey does not exist"}),
        };
        assert!(matches!(check_response(denied), Err(Error::Exchange(_))));
    }

    #[tokio::test]
    async fn test_withdraw_request_on_the_wire() {
        let reply = json!({"code": "00000", "msg": "success", "data": {"orderId": "b-1"}});
        let (base_url, server) = serve_once(reply).await;
        let adapter = adapter_at(Platform::Bitget, &base_url, None);
        let receipt = adapter.withdraw(&withdraw_params(Some("TRC20"))).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(receipt.id.as_deref(), Some("b-1"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, WITHDRAW_PATH);
        let body = request.json();
        assert_eq!(body["coin"], "USDT");
        assert_eq!(body["chain"], "TRC20");
        assert_eq!(body["size"], "12.5");
        assert_eq!(body["address"], "0xdest");

        assert_eq!(request.header("ACCESS-KEY"), Some(API_KEY));
        assert_eq!(request.header("ACCESS-PASSPHRASE"), Some(API_PASSPHRASE));
        let timestamp = request.header("ACCESS-TIMESTAMP").unwrap();
        let payload = format!("{}POST{}{}", timestamp, request.request_path(), request.body);
        assert_eq!(
            request.header("ACCESS-SIGN").unwrap(),
            hmac_sha256_base64(&secret(), &payload).unwrap()
        );
    }
}
