//! Gate.io v4 wallet binding
//!
//! Signature is hex HMAC-SHA512 over
//! `METHOD\npath\nquery\nsha512(body)\ntimestamp` with the timestamp in seconds.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::adapter::{AdapterContext, ApiCredentials, ExchangeAdapter, WithdrawParams};
use super::platform::Platform;
use super::rest::{
    classify_failure, encode_query, hmac_sha512_hex, sha512_hex, timestamp_secs, RestClient,
    RestResponse, SignedRequest,
};
use super::types::{json_f64, json_string, Balances, NetworkFee, WithdrawReceipt};

const WITHDRAW_PATH: &str = "/api/v4/withdrawals";
const WITHDRAW_STATUS_PATH: &str = "/api/v4/wallet/withdraw_status";
const SPOT_ACCOUNTS_PATH: &str = "/api/v4/spot/accounts";

const INSUFFICIENT_CODES: &[&str] = &["BALANCE_NOT_ENOUGH"];

pub struct GateAdapter {
    rest: RestClient,
    credentials: ApiCredentials,
}

pub(super) fn build(ctx: AdapterContext) -> Result<Box<dyn ExchangeAdapter>> {
    Ok(Box::new(GateAdapter::new(ctx)))
}

impl GateAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            rest: ctx.rest,
            credentials: ctx.credentials,
        }
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

        let timestamp = timestamp_secs().to_string();
        let payload = format!(
            "{}\n{}\n{}\n{}\n{}",
            request.method.as_str(),
            request.path,
            request.query,
            sha512_hex(request.body.as_deref().unwrap_or_default()),
            timestamp
        );
        let signature = hmac_sha512_hex(&self.credentials.secret, &payload)?;

        request.headers.extend([
            ("KEY", self.credentials.api_key.expose_secret().to_string()),
            ("Timestamp", timestamp),
            ("SIGN", signature),
        ]);
        Ok(request)
    }

    async fn send(&self, request: SignedRequest) -> Result<Value> {
        let response = self.rest.execute(request).await?;
        check_response(response)
    }
}

/// Failures come back as `{"label": "...", "message": "..."}`
fn check_response(response: RestResponse) -> Result<Value> {
    if response.is_success() {
        return Ok(response.body);
    }
    match response.body.get("label").and_then(|l| l.as_str()) {
        Some(label) => {
            let msg = response
                .body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            Err(classify_failure(Platform::Gate, label, msg, INSUFFICIENT_CODES))
        }
        None => Err(Error::Exchange(format!(
            "Gate.io HTTP {}: {}",
            response.status, response.body
        ))),
    }
}

/// `withdraw_fix_on_chains` maps chain code to fixed fee
fn parse_network_table(body: &Value, coin: &str) -> Option<Vec<NetworkFee>> {
    let entry = body.as_array()?.iter().find(|row| {
        row.get("currency")
            .and_then(|c| c.as_str())
            .map(|c| c.eq_ignore_ascii_case(coin))
            .unwrap_or(false)
    })?;

    let min_withdraw = entry.get("withdraw_amount_mini").and_then(json_f64);
    let mut rows: Vec<NetworkFee> = entry
        .get("withdraw_fix_on_chains")
        .and_then(|c| c.as_object())
        .map(|chains| {
            chains
                .iter()
                .map(|(chain, fee)| NetworkFee {
                    fee: json_f64(fee),
                    min_withdraw,
                    ..NetworkFee::new(chain.as_str())
                })
                .collect()
        })
        .unwrap_or_default();
    rows.sort_by(|a, b| a.code.cmp(&b.code));
    Some(rows)
}

fn parse_balances(body: &Value) -> Balances {
    let mut balances = Balances::default();
    for row in body.as_array().into_iter().flatten() {
        let Some(coin) = row.get("currency").and_then(|c| c.as_str()) else {
            continue;
        };
        let free = row.get("available").and_then(json_f64).unwrap_or(0.0);
        let locked = row.get("locked").and_then(json_f64).unwrap_or(0.0);
        balances.add(coin, free, locked);
    }
    balances
}

#[async_trait]
impl ExchangeAdapter for GateAdapter {
    fn platform(&self) -> Platform {
        Platform::Gate
    }

    async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawReceipt> {
        let mut body = json!({
            "currency": params.coin,
            "address": params.address,
            "amount": params.amount_str(),
        });
        if let Some(network) = params.network() {
            body["chain"] = Value::String(network.to_string());
        }

        let request = self.signed(Method::POST, WITHDRAW_PATH, &[], Some(body))?;
        let body = self.send(request).await?;
        let id = body.get("id").and_then(json_string);
        let txid = body.get("txid").and_then(json_string);
        let status = body.get("status").and_then(json_string);
        debug!("Gate.io withdrawal accepted: {:?}", id);
        Ok(WithdrawReceipt {
            id,
            txid,
            status,
            raw: body,
        })
    }

    async fn network_fees(&self, coin: &str) -> Result<Option<Vec<NetworkFee>>> {
        let request = self.signed(
            Method::GET,
            WITHDRAW_STATUS_PATH,
            &[("currency", coin.to_string())],
            None,
        )?;
        let body = self.send(request).await?;
        Ok(parse_network_table(&body, coin))
    }

    async fn fetch_balances(&self) -> Result<Balances> {
        let request = self.signed(Method::GET, SPOT_ACCOUNTS_PATH, &[], None)?;
        let body = self.send(request).await?;
        Ok(parse_balances(&body))
    }

    async fn close(&mut self) -> Result<()> {
        self.rest.close();
        Ok(())
    }
}
