//! OKX v5 funding account binding
//!
//! OKX labels networks as `COIN-NETWORK` (e.g. `USDT-ERC20`); a bare
//! network name is decorated before submission.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::adapter::{AdapterContext, ApiCredentials, ExchangeAdapter, WithdrawParams};
use super::platform::Platform;
use super::rest::{
    classify_failure, client_order_id, encode_query, hmac_sha256_base64, timestamp_iso,
    RestClient, RestResponse, SignedRequest,
};
use super::types::{json_bool, json_f64, json_string, Balances, NetworkFee, WithdrawReceipt};

const WITHDRAW_PATH: &str = "/api/v5/asset/withdrawal";
const CURRENCIES_PATH: &str = "/api/v5/asset/currencies";
const BALANCES_PATH: &str = "/api/v5/asset/balances";

/// On-chain withdrawal destination
const DEST_ON_CHAIN: &str = "4";
const INSUFFICIENT_CODES: &[&str] = &["58350", "51008"];

pub struct OkxAdapter {
    rest: RestClient,
    credentials: ApiCredentials,
}

pub(super) fn build(ctx: AdapterContext) -> Result<Box<dyn ExchangeAdapter>> {
    Ok(Box::new(OkxAdapter::new(ctx)?))
}

impl OkxAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        ctx.credentials.require_passphrase(Platform::Okx)?;
        Ok(Self {
            rest: ctx.rest,
            credentials: ctx.credentials,
        })
    }

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

        let timestamp = timestamp_iso();
        let payload = format!(
            "{}{}{}{}",
            timestamp,
            request.method.as_str(),
            request.request_path(),
            request.body.as_deref().unwrap_or_default()
        );
        let signature = hmac_sha256_base64(&self.credentials.secret, &payload)?;
        let passphrase = self.credentials.require_passphrase(Platform::Okx)?;

        request.headers.extend([
            ("OK-ACCESS-KEY", self.credentials.api_key.expose_secret().to_string()),
            ("OK-ACCESS-SIGN", signature),
            ("OK-ACCESS-TIMESTAMP", timestamp),
            ("OK-ACCESS-PASSPHRASE", passphrase.expose_secret().to_string()),
        ]);
        Ok(request)
    }

    async fn send(&self, request: SignedRequest) -> Result<Value> {
        let response = self.rest.execute(request).await?;
        check_response(response)
    }
}

/// Decorate a bare network name the way OKX lists it
fn chain_label(coin: &str, network: &str) -> String {
    if network.contains('-') {
        network.to_string()
    } else {
        format!("{}-{}", coin.to_uppercase(), network)
    }
}

/// `{"code": "0", "msg": "", "data": [...]}`; per-row `sCode` may still fail
fn check_response(response: RestResponse) -> Result<Value> {
    let code = response.body.get("code").and_then(json_string).unwrap_or_default();
    if code.is_empty() {
        return Err(Error::Exchange(format!(
            "OKX HTTP {}: {}",
            response.status, response.body
        )));
    }

    let data = response.body.get("data").cloned().unwrap_or(Value::Null);
    if code != "0" {
        // Batch-style endpoints carry the useful detail in data[0]
        let first = data.as_array().and_then(|rows| rows.first());
        let (code, msg) = match first.and_then(|row| row.get("sCode").and_then(json_string)) {
            Some(s_code) if s_code != "0" => (
                s_code,
                first
                    .and_then(|row| row.get("sMsg"))
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string(),
            ),
            _ => (
                code,
                response
                    .body
                    .get("msg")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string(),
            ),
        };
        return Err(classify_failure(Platform::Okx, &code, &msg, INSUFFICIENT_CODES));
    }
    Ok(data)
}

fn parse_network_table(data: &Value, coin: &str) -> Option<Vec<NetworkFee>> {
    let rows: Vec<NetworkFee> = data
        .as_array()?
        .iter()
        .filter(|row| {
            row.get("ccy")
                .and_then(|c| c.as_str())
                .map(|c| c.eq_ignore_ascii_case(coin))
                .unwrap_or(false)
        })
        .filter_map(|row| {
            let code = row.get("chain").and_then(|v| v.as_str())?;
            let fee = row
                .get("fee")
                .and_then(json_f64)
                .or_else(|| row.get("minFee").and_then(json_f64));
            Some(NetworkFee {
                fee,
                min_withdraw: row.get("minWd").and_then(json_f64),
                enabled: row.get("canWd").and_then(json_bool),
                ..NetworkFee::new(code)
            })
        })
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

fn parse_balances(data: &Value) -> Balances {
    let mut balances = Balances::default();
    for row in data.as_array().into_iter().flatten() {
        let Some(coin) = row.get("ccy").and_then(|c| c.as_str()) else {
            continue;
        };
        let free = row.get("availBal").and_then(json_f64).unwrap_or(0.0);
        let frozen = row.get("frozenBal").and_then(json_f64).unwrap_or(0.0);
        balances.add(coin, free, frozen);
    }
    balances
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn platform(&self) -> Platform {
        Platform::Okx
    }

    async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawReceipt> {
        let mut body = json!({
            "ccy": params.coin,
            "amt": params.amount_str(),
            "dest": DEST_ON_CHAIN,
            "toAddr": params.address,
            "clientId": client_order_id(),
        });
        if let Some(network) = params.network() {
            body["chain"] = Value::String(chain_label(&params.coin, network));
        }

        let request = self.signed(Method::POST, WITHDRAW_PATH, &[], Some(body))?;
        let data = self.send(request).await?;
        let first = data.as_array().and_then(|rows| rows.first()).cloned();
        let id = first.as_ref().and_then(|row| row.get("wdId")).and_then(json_string);
        debug!("OKX withdrawal accepted: {:?}", id);
        Ok(WithdrawReceipt::from_id(id, first.unwrap_or(data)))
    }

    async fn network_fees(&self, coin: &str) -> Result<Option<Vec<NetworkFee>>> {
        let request = self.signed(Method::GET, CURRENCIES_PATH, &[("ccy", coin.to_string())], None)?;
        let data = self.send(request).await?;
        Ok(parse_network_table(&data, coin))
    }

    async fn fetch_balances(&self) -> Result<Balances> {
        let request = self.signed(Method::GET, BALANCES_PATH, &[], None)?;
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
    fn test_chain_label() {
        assert_eq!(chain_label("usdt", "ERC20"), "USDT-ERC20");
        assert_eq!(chain_label("USDT", "USDT-TRC20"), "USDT-TRC20");
    }

    #[test]
    fn test_parse_network_table() {
        let data = json!([
            {"ccy": "USDT", "chain": "USDT-ERC20", "fee": "3.2", "minWd": "2", "canWd": true},
            {"ccy": "USDT", "chain": "USDT-TRC20", "minFee": "1", "minWd": "0.1", "canWd": true}
        ]);
        let rows = parse_network_table(&data, "USDT").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fee, Some(3.2));
        assert_eq!(rows[1].fee, Some(1.0));
        assert!(parse_network_table(&json!([]), "USDT").is_none());
    }

    #[test]
    fn test_parse_balances() {
        let data = json!([
            {"ccy": "USDT", "availBal": "20", "frozenBal": "5", "bal": "25"}
        ]);
        let balances = parse_balances(&data);
        assert_eq!(balances.entry("USDT").total, 25.0);
    }

    #[test]
    fn test_row_level_failure() {
        let response = RestResponse {
            status: 200,
            body: json!({"code": "1", "msg": "Operation failed", "data": [
                {"sCode": "58350", "sMsg": "Insufficient balance"}
            ]}),
        };
        assert!(matches!(check_response(response), Err(Error::InsufficientFunds(_))));

        let response = RestResponse {
            status: 200,
            body: json!({"code": "58207", "msg": "Withdrawal address is not whitelisted", "data": []}),
        };
        assert!(matches!(check_response(response), Err(Error::Exchange(_))));
    }

    #[tokio::test]
    async fn test_withdraw_request_on_the_wire() {
        let reply = json!({"code": "0", "msg": "", "data": [{"wdId": "o-1", "sCode": "0"}]});
        let (base_url, server) = serve_once(reply).await;
        let adapter = adapter_at(Platform::Okx, &base_url, None);
        let receipt = adapter.withdraw(&withdraw_params(Some("TRC20"))).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(receipt.id.as_deref(), Some("o-1"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, WITHDRAW_PATH);
        let body = request.json();
        // The symbol stays bare; the network travels in its own field
        assert_eq!(body["ccy"], "USDT");
        assert_eq!(body["chain"], "USDT-TRC20");
        assert_eq!(body["amt"], "12.5");
        assert_eq!(body["toAddr"], "0xdest");

        assert_eq!(request.header("OK-ACCESS-KEY"), Some(API_KEY));
        assert_eq!(request.header("OK-ACCESS-PASSPHRASE"), Some(API_PASSPHRASE));
        let timestamp = request.header("OK-ACCESS-TIMESTAMP").unwrap();
        let payload = format!("{}POST{}{}", timestamp, request.request_path(), request.body);
        assert_eq!(
            request.header("OK-ACCESS-SIGN").unwrap(),
            hmac_sha256_base64(&secret(), &payload).unwrap()
        );
    }
}
