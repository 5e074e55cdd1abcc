//! Bybit v5 funding wallet binding

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::adapter::{AdapterContext, ApiCredentials, ExchangeAdapter, WithdrawParams};
use super::platform::Platform;
use super::rest::{
    classify_failure, client_order_id, encode_query, hmac_sha256_hex, timestamp_millis,
    RestClient, RestResponse, SignedRequest,
};
use super::types::{json_bool, json_f64, json_string, Balances, NetworkFee, WithdrawReceipt};

const WITHDRAW_PATH: &str = "/v5/asset/withdraw/create";
const COIN_INFO_PATH: &str = "/v5/asset/coin/query-info";
const FUND_BALANCE_PATH: &str = "/v5/asset/transfer/query-account-coins-balance";

const FUND_ACCOUNT: &str = "FUND";
const INSUFFICIENT_CODES: &[&str] = &["131212"];

pub struct BybitAdapter {
    rest: RestClient,
    credentials: ApiCredentials,
    recv_window_ms: u64,
}

pub(super) fn build(ctx: AdapterContext) -> Result<Box<dyn ExchangeAdapter>> {
    Ok(Box::new(BybitAdapter::new(ctx)))
}

impl BybitAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            rest: ctx.rest,
            credentials: ctx.credentials,
            recv_window_ms: ctx.recv_window_ms,
        }
    }

    /// Signs timestamp + key + recv_window + (query or body)
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
        let recv_window = self.recv_window_ms.to_string();
        let api_key = self.credentials.api_key.expose_secret();
        let payload = format!(
            "{}{}{}{}",
            timestamp,
            api_key,
            recv_window,
            request.body.as_deref().unwrap_or(&request.query)
        );
        let signature = hmac_sha256_hex(&self.credentials.secret, &payload)?;

        request.headers.extend([
            ("X-BAPI-API-KEY", api_key.to_string()),
            ("X-BAPI-SIGN", signature),
            ("X-BAPI-TIMESTAMP", timestamp),
            ("X-BAPI-RECV-WINDOW", recv_window),
        ]);
        Ok(request)
    }

    async fn send(&self, request: SignedRequest) -> Result<Value> {
        let response = self.rest.execute(request).await?;
        check_response(response)
    }
}

/// `{"retCode": 0, "retMsg": "OK", "result": {...}}`
fn check_response(response: RestResponse) -> Result<Value> {
    let Some(code) = response.body.get("retCode").and_then(|c| c.as_i64()) else {
        return Err(Error::Exchange(format!(
            "Bybit HTTP {}: {}",
            response.status, response.body
        )));
    };
    if code != 0 {
        let msg = response
            .body
            .get("retMsg")
            .and_then(|m| m.as_str())
            .unwrap_or_default();
        return Err(classify_failure(Platform::Bybit, &code.to_string(), msg, INSUFFICIENT_CODES));
    }
    Ok(response.body.get("result").cloned().unwrap_or(Value::Null))
}

fn parse_network_table(result: &Value, coin: &str) -> Option<Vec<NetworkFee>> {
    let entry = result.get("rows")?.as_array()?.iter().find(|row| {
        row.get("coin")
            .and_then(|c| c.as_str())
            .map(|c| c.eq_ignore_ascii_case(coin))
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
                    let mut row = NetworkFee {
                        fee: chain.get("withdrawFee").and_then(json_f64),
                        min_withdraw: chain.get("withdrawMin").and_then(json_f64),
                        enabled: chain.get("chainWithdraw").and_then(json_bool),
                        ..NetworkFee::new(code)
                    };
                    if let Some(alias) = chain.get("chainType").and_then(json_string) {
                        row.aliases.push(alias);
                    }
                    Some(row)
                })
                .collect()
        })
        .unwrap_or_default();
    Some(rows)
}

fn parse_balances(result: &Value) -> Balances {
    let mut balances = Balances::default();
    let rows = result.get("balance").and_then(|b| b.as_array());
    for row in rows.into_iter().flatten() {
        let Some(coin) = row.get("coin").and_then(|c| c.as_str()) else {
            continue;
        };
        let total = row.get("walletBalance").and_then(json_f64).unwrap_or(0.0);
        let free = row.get("transferBalance").and_then(json_f64).unwrap_or(total);
        balances.add(coin, free, (total - free).max(0.0));
    }
    balances
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn platform(&self) -> Platform {
        Platform::Bybit
    }

    async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawReceipt> {
        let mut body = json!({
            "coin": params.coin,
            "address": params.address,
            "amount": params.amount_str(),
            "timestamp": timestamp_millis(),
            "accountType": FUND_ACCOUNT,
            "requestId": client_order_id(),
        });
        if let Some(network) = params.network() {
            body["chain"] = Value::String(network.to_string());
        }

        let request = self.signed(Method::POST, WITHDRAW_PATH, &[], Some(body))?;
        let result = self.send(request).await?;
        let id = result.get("id").and_then(json_string);
        debug!("Bybit withdrawal accepted: {:?}", id);
        Ok(WithdrawReceipt::from_id(id, result))
    }

    async fn network_fees(&self, coin: &str) -> Result<Option<Vec<NetworkFee>>> {
        let request = self.signed(Method::GET, COIN_INFO_PATH, &[("coin", coin.to_string())], None)?;
        let result = self.send(request).await?;
        Ok(parse_network_table(&result, coin))
    }

    async fn fetch_balances(&self) -> Result<Balances> {
        let request = self.signed(
            Method::GET,
            FUND_BALANCE_PATH,
            &[("accountType", FUND_ACCOUNT.to_string())],
            None,
        )?;
        let result = self.send(request).await?;
        Ok(parse_balances(&result))
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
    use crate::exchange::platform::NetworkMatch;
    use crate::exchange::types::select_network;

    #[test]
    fn test_parse_network_table_with_aliases() {
        let result = json!({"rows": [{
            "coin": "USDT",
            "chains": [
                {"chain": "ETH", "chainType": "ERC20", "withdrawFee": "4", "withdrawMin": "10", "chainWithdraw": "1"},
                {"chain": "TRX", "chainType": "TRC20", "withdrawFee": "1", "withdrawMin": "1", "chainWithdraw": "0"}
            ]
        }]});
        let rows = parse_network_table(&result, "USDT").unwrap();
        assert_eq!(rows[1].enabled, Some(false));

        let hit = select_network(rows, "erc20", NetworkMatch::Substring).unwrap();
        assert_eq!(hit.code, "ETH");
        assert_eq!(hit.fee, Some(4.0));
    }

    #[test]
    fn test_parse_balances() {
        let result = json!({"balance": [
            {"coin": "USDT", "walletBalance": "30", "transferBalance": "25"},
            {"coin": "ETH", "walletBalance": "0.5"}
        ]});
        let balances = parse_balances(&result);
        let usdt = balances.entry("USDT");
        assert_eq!(usdt.free, 25.0);
        assert_eq!(usdt.used, 5.0);
        assert_eq!(balances.entry("ETH").free, 0.5);
    }

    #[test]
    fn test_ret_codes() {
        let low = RestResponse {
            status: 200,
            body: json!({"retCode": 131212, "retMsg": "Insufficient balance"}),
        };
        assert!(matches!(check_response(low), Err(Error::InsufficientFunds(_))));

        let ok = RestResponse {
            status: 200,
            body: json!({"retCode": 0, "retMsg": "OK", "result": {"id": "10195"}}),
        };
        assert_eq!(check_response(ok).unwrap()["id"], "10195");
    }

    #[tokio::test]
    async fn test_withdraw_request_on_the_wire() {
        let reply = json!({"retCode": 0, "retMsg": "OK", "result": {"id": "y-1"}});
        let (base_url, server) = serve_once(reply).await;
        let adapter = adapter_at(Platform::Bybit, &base_url, None);
        let receipt = adapter.withdraw(&withdraw_params(Some("TRX"))).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(receipt.id.as_deref(), Some("y-1"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, WITHDRAW_PATH);
        let body = request.json();
        assert_eq!(body["coin"], "USDT");
        assert_eq!(body["chain"], "TRX");
        assert_eq!(body["amount"], "12.5");
        assert_eq!(body["accountType"], FUND_ACCOUNT);

        assert_eq!(request.header("X-BAPI-API-KEY"), Some(API_KEY));
        let timestamp = request.header("X-BAPI-TIMESTAMP").unwrap();
        let recv_window = request.header("X-BAPI-RECV-WINDOW").unwrap();
        let payload = format!("{}{}{}{}", timestamp, API_KEY, recv_window, request.body);
        assert_eq!(
            request.header("X-BAPI-SIGN").unwrap(),
            hmac_sha256_hex(&secret(), &payload).unwrap()
        );
    }
}
