//! Binance spot wallet binding
//!
//! Signed endpoints take the HMAC-SHA256 (hex) of the full query string,
//! appended as `signature`, with the key in `X-MBX-APIKEY`.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::adapter::{AdapterContext, ApiCredentials, ExchangeAdapter, WithdrawParams};
use super::platform::Platform;
use super::rest::{
    classify_failure, client_order_id, encode_query, hmac_sha256_hex, timestamp_millis,
    RestClient, RestResponse, SignedRequest,
};
use super::types::{json_bool, json_f64, json_string, Balances, NetworkFee, WithdrawReceipt};

const WITHDRAW_PATH: &str = "/sapi/v1/capital/withdraw/apply";
const COIN_CONFIG_PATH: &str = "/sapi/v1/capital/config/getall";
const ACCOUNT_PATH: &str = "/api/v3/account";

/// Codes Binance returns when the wallet cannot cover a withdrawal
const INSUFFICIENT_CODES: &[&str] = &["-4026", "-2010"];

pub struct BinanceAdapter {
    rest: RestClient,
    credentials: ApiCredentials,
    recv_window_ms: u64,
}

pub(super) fn build(ctx: AdapterContext) -> Result<Box<dyn ExchangeAdapter>> {
    Ok(Box::new(BinanceAdapter::new(ctx)))
}

impl BinanceAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            rest: ctx.rest,
            credentials: ctx.credentials,
            recv_window_ms: ctx.recv_window_ms,
        }
    }

    fn signed(&self, method: Method, path: &str, mut params: Vec<(&str, String)>) -> Result<SignedRequest> {
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", timestamp_millis().to_string()));
        let query = encode_query(&params);
        let signature = hmac_sha256_hex(&self.credentials.secret, &query)?;

        let mut request = SignedRequest::new(method, path);
        request.query = format!("{}&signature={}", query, signature);
        request
            .headers
            .push(("X-MBX-APIKEY", self.credentials.api_key.expose_secret().to_string()));
        Ok(request)
    }

    async fn send(&self, request: SignedRequest) -> Result<Value> {
        let response = self.rest.execute(request).await?;
        check_response(response)
    }
}

/// Binance errors arrive as `{"code": -xxxx, "msg": "..."}`
fn check_response(response: RestResponse) -> Result<Value> {
    let code = response.body.get("code").and_then(|c| c.as_i64());
    match code {
        Some(code) if code < 0 || !response.is_success() => {
            let msg = response
                .body
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            Err(classify_failure(Platform::Binance, &code.to_string(), msg, INSUFFICIENT_CODES))
        }
        _ if !response.is_success() => Err(Error::Exchange(format!(
            "Binance HTTP {}: {}",
            response.status, response.body
        ))),
        _ => Ok(response.body),
    }
}

fn parse_network_table(body: &Value, coin: &str) -> Option<Vec<NetworkFee>> {
    let entry = body
        .as_array()?
        .iter()
        .find(|c| {
            c.get("coin")
                .and_then(|v| v.as_str())
                .is_some_and(|c| c.eq_ignore_ascii_case(coin))
        })?;

    let rows = entry
        .get("networkList")
        .and_then(|n| n.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|net| {
                    let code = net.get("network").and_then(|v| v.as_str())?;
                    Some(NetworkFee {
                        fee: net.get("withdrawFee").and_then(json_f64),
                        min_withdraw: net.get("withdrawMin").and_then(json_f64),
                        enabled: net.get("withdrawEnable").and_then(json_bool),
                        ..NetworkFee::new(code)
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(rows)
}

fn parse_balances(body: &Value) -> Result<Balances> {
    let rows = body
        .get("balances")
        .and_then(|b| b.as_array())
        .ok_or_else(|| Error::Deserialization("Binance account has no balances".to_string()))?;

    let mut balances = Balances::default();
    for row in rows {
        let Some(asset) = row.get("asset").and_then(|a| a.as_str()) else {
            continue;
        };
        let free = row.get("free").and_then(json_f64).unwrap_or(0.0);
        let locked = row.get("locked").and_then(json_f64).unwrap_or(0.0);
        balances.add(asset, free, locked);
    }
    Ok(balances)
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn platform(&self) -> Platform {
        Platform::Binance
    }

    async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawReceipt> {
        let mut query = vec![
            ("coin", params.coin.clone()),
            ("address", params.address.clone()),
            ("amount", params.amount_str()),
            ("withdrawOrderId", client_order_id()),
        ];
        if let Some(network) = params.network() {
            query.push(("network", network.to_string()));
        }

        let request = self.signed(Method::POST, WITHDRAW_PATH, query)?;
        let body = self.send(request).await?;
        let id = body.get("id").and_then(json_string);
        debug!("Binance withdrawal accepted: {:?}", id);
        Ok(WithdrawReceipt::from_id(id, body))
    }

    async fn network_fees(&self, coin: &str) -> Result<Option<Vec<NetworkFee>>> {
        let request = self.signed(Method::GET, COIN_CONFIG_PATH, Vec::new())?;
        let body = self.send(request).await?;
        Ok(parse_network_table(&body, coin))
    }

    async fn fetch_balances(&self) -> Result<Balances> {
        let request = self.signed(Method::GET, ACCOUNT_PATH, Vec::new())?;
        let body = self.send(request).await?;
        parse_balances(&body)
    }

    async fn close(&mut self) -> Result<()> {
        self.rest.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::test_server::{adapter_at, secret, serve_once, withdraw_params, API_KEY};
    use serde_json::json;

    #[test]
    fn test_parse_network_table() {
        let body = json!([
            {"coin": "BTC", "networkList": []},
            {"coin": "USDT", "networkList": [
                {"network": "ETH", "withdrawFee": "4.5", "withdrawMin": "10", "withdrawEnable": true},
                {"network": "TRX", "withdrawFee": "1", "withdrawMin": "2", "withdrawEnable": false}
            ]}
        ]);
        let rows = parse_network_table(&body, "USDT").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "ETH");
        assert_eq!(rows[0].fee, Some(4.5));
        assert_eq!(rows[1].enabled, Some(false));
        assert!(parse_network_table(&body, "DOGE").is_none());
        assert!(parse_network_table(&body, "usdt").is_some());
    }

    #[test]
    fn test_parse_balances() {
        let body = json!({"balances": [
            {"asset": "USDT", "free": "100.5", "locked": "0.5"},
            {"asset": "BNB", "free": "0.00000000", "locked": "0.00000000"}
        ]});
        let balances = parse_balances(&body).unwrap();
        assert_eq!(balances.entry("USDT").total, 101.0);
        assert_eq!(balances.non_zero().len(), 1);
    }

    #[test]
    fn test_error_codes_classified() {
        let insufficient = RestResponse {
            status: 400,
            body: json!({"code": -4026, "msg": "User has insufficient balance"}),
        };
        assert!(matches!(check_response(insufficient), Err(Error::InsufficientFunds(_))));

        let other = RestResponse {
            status: 400,
            body: json!({"code": -1022, "msg": "Signature for this request is not valid."}),
        };
        assert!(matches!(check_response(other), Err(Error::Exchange(_))));

        let ok = RestResponse { status: 200, body: json!({"id": "7213fea8e94b4a5593d507237e5a555b"}) };
        assert!(check_response(ok).is_ok());
    }

    #[tokio::test]
    async fn test_withdraw_request_on_the_wire() {
        let (base_url, server) = serve_once(json!({"id": "wd-7"})).await;
        let mut adapter = adapter_at(Platform::Binance, &base_url, None);
        let receipt = adapter.withdraw(&withdraw_params(Some("TRX"))).await.unwrap();
        adapter.close().await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(receipt.id.as_deref(), Some("wd-7"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, WITHDRAW_PATH);
        assert_eq!(request.query_param("coin").as_deref(), Some("USDT"));
        assert_eq!(request.query_param("network").as_deref(), Some("TRX"));
        assert_eq!(request.query_param("amount").as_deref(), Some("12.5"));
        assert_eq!(request.query_param("address").as_deref(), Some("0xdest"));
        assert_eq!(request.header("X-MBX-APIKEY"), Some(API_KEY));

        let (unsigned, signature) = request.query.rsplit_once("&signature=").unwrap();
        assert_eq!(signature, hmac_sha256_hex(&secret(), unsigned).unwrap());
    }

    #[tokio::test]
    async fn test_withdraw_without_network_sends_no_network() {
        let (base_url, server) = serve_once(json!({"id": "wd-8"})).await;
        let adapter = adapter_at(Platform::Binance, &base_url, None);
        adapter.withdraw(&withdraw_params(None)).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(request.query_param("coin").as_deref(), Some("USDT"));
        assert!(request.query_param("network").is_none());
    }
}
