//! Signed REST transport shared by every adapter
//!
//! One `RestClient` per adapter instance. The underlying reqwest client
//! is dropped on [`RestClient::close`], after which every call fails.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::time::Duration;
use tracing::debug;

use crate::crypto::VaultSecret;
use crate::error::{Error, Result};
use crate::proxy::ProxyDescriptor;

use super::platform::Platform;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Transport settings shared by all adapters
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub recv_window_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            recv_window_ms: 5_000,
        }
    }
}

/// A fully signed request ready to send
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub path: String,
    /// Already-encoded query string, without the leading '?'
    pub query: String,
    pub body: Option<String>,
    pub headers: Vec<(&'static str, String)>,
}

impl SignedRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: String::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Path plus query, as most platforms sign it
    pub fn request_path(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Raw platform reply
#[derive(Debug)]
pub struct RestResponse {
    pub status: u16,
    pub body: Value,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct RestClient {
    platform: Platform,
    base_url: String,
    client: Option<Client>,
}

impl RestClient {
    /// Build a client, installing the proxy for every scheme
    pub fn new(
        platform: Platform,
        base_url: &str,
        settings: &TransportSettings,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("custody-vault/", env!("CARGO_PKG_VERSION")));

        // Egress follows the stored proxy only, never the environment
        builder = match proxy {
            Some(proxy) => {
                debug!("{} client using proxy {}", platform.display_name(), proxy);
                builder.proxy(proxy.to_reqwest()?)
            }
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| {
            Error::ClientCreationFailure(format!("{}: {}", platform.display_name(), e))
        })?;

        Ok(Self {
            platform,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Some(client),
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Send a request and parse the JSON reply
    ///
    /// Transport failures are `Network`; a non-JSON error page is
    /// `Exchange` carrying the HTTP status.
    pub async fn execute(&self, request: SignedRequest) -> Result<RestResponse> {
        let client = self.client.as_ref().ok_or_else(|| {
            Error::Internal(format!("{} client already closed", self.platform.display_name()))
        })?;

        let url = format!("{}{}", self.base_url, request.request_path());
        debug!("{} {} {}", self.platform.display_name(), request.method, request.path);

        let mut builder = client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", self.platform.display_name(), e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", self.platform.display_name(), e)))?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(RestResponse { status, body }),
            Err(_) if (200..300).contains(&status) => Err(Error::Deserialization(format!(
                "{} returned non-JSON body",
                self.platform.display_name()
            ))),
            Err(_) => Err(Error::Exchange(format!(
                "{} HTTP {}: {}",
                self.platform.display_name(),
                status,
                truncate(&text, 200)
            ))),
        }
    }

    /// Release the connection pool; safe to call more than once
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("{} client closed", self.platform.display_name());
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Map a platform error code/message into the failure taxonomy
pub fn classify_failure(
    platform: Platform,
    code: &str,
    message: &str,
    insufficient_codes: &[&str],
) -> Error {
    let lowered = message.to_lowercase();
    let insufficient = insufficient_codes.contains(&code)
        || lowered.contains("insufficient")
        || lowered.contains("not enough");

    let detail = if message.is_empty() {
        format!("{} error {}", platform.display_name(), code)
    } else {
        format!("{} {}: {}", platform.display_name(), code, message)
    };

    if insufficient {
        Error::InsufficientFunds(detail)
    } else {
        Error::Exchange(detail)
    }
}

/// Encode query parameters in order
pub fn encode_query(params: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn mac_sha256(secret: &VaultSecret, payload: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| Error::Internal(format!("Failed to create HMAC: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// HMAC-SHA256, lowercase hex
pub fn hmac_sha256_hex(secret: &VaultSecret, payload: &str) -> Result<String> {
    Ok(hex::encode(mac_sha256(secret, payload)?))
}

/// HMAC-SHA256, standard base64
pub fn hmac_sha256_base64(secret: &VaultSecret, payload: &str) -> Result<String> {
    Ok(STANDARD.encode(mac_sha256(secret, payload)?))
}

/// HMAC-SHA512, lowercase hex
pub fn hmac_sha512_hex(secret: &VaultSecret, payload: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| Error::Internal(format!("Failed to create HMAC: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// SHA-512 digest, lowercase hex
pub fn sha512_hex(payload: &str) -> String {
    hex::encode(Sha512::digest(payload.as_bytes()))
}

pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn timestamp_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// ISO-8601 UTC with milliseconds, e.g. 2020-12-08T09:08:57.715Z
pub fn timestamp_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Client-side withdrawal id, 32 lowercase hex chars
pub fn client_order_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::test_server::serve_once;
    use serde_json::json;

    #[test]
    fn test_hmac_sha256_hex_known_vector() {
        // Published signing example for the Binance REST API
        let secret = VaultSecret::from("NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j");
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            hmac_sha256_hex(&secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_sha512_of_empty_body() {
        assert_eq!(
            sha512_hex(""),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn test_base64_signature_shape() {
        let sig = hmac_sha256_base64(&VaultSecret::from("k"), "payload").unwrap();
        assert_eq!(STANDARD.decode(sig).unwrap().len(), 32);
        let sig = hmac_sha512_hex(&VaultSecret::from("k"), "payload").unwrap();
        assert_eq!(sig.len(), 128);
    }

    #[test]
    fn test_encode_query_keeps_order() {
        let query = encode_query(&[("coin", "USDT".to_string()), ("amount", "10".to_string()), ("address", "a b".to_string())]);
        assert_eq!(query, "coin=USDT&amount=10&address=a+b");
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(Platform::Binance, "-4026", "User has insufficient balance", &["-4026"]),
            Error::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_failure(Platform::Gate, "BALANCE_NOT_ENOUGH", "", &["BALANCE_NOT_ENOUGH"]),
            Error::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_failure(Platform::Okx, "58207", "Withdrawal address is not whitelisted", &["58350"]),
            Error::Exchange(_)
        ));
    }

    #[test]
    fn test_request_path() {
        let mut req = SignedRequest::new(Method::GET, "/api/v5/asset/currencies");
        assert_eq!(req.request_path(), "/api/v5/asset/currencies");
        req.query = "ccy=USDT".to_string();
        assert_eq!(req.request_path(), "/api/v5/asset/currencies?ccy=USDT");
    }

    #[tokio::test]
    async fn test_closed_client_refuses_requests() {
        let mut client = RestClient::new(
            Platform::Binance,
            "http://127.0.0.1:9",
            &TransportSettings::default(),
            None,
        )
        .unwrap();
        client.close();
        client.close();
        assert!(client.is_closed());
        let result = client.execute(SignedRequest::new(Method::GET, "/ping")).await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_requests_go_through_the_stored_proxy() {
        let (proxy_url, server) = serve_once(json!({"ok": true})).await;
        let address = proxy_url.trim_start_matches("http://");
        let proxy = crate::proxy::parse(&format!("relay:s3cret@{}", address)).unwrap();

        let client = RestClient::new(
            Platform::Binance,
            "http://exchange.invalid",
            &TransportSettings::default(),
            Some(&proxy),
        )
        .unwrap();
        let response = client
            .execute(SignedRequest::new(Method::GET, "/api/v3/ping"))
            .await
            .unwrap();
        assert!(response.is_success());

        let request = server.await.unwrap();
        assert_eq!(request.target, "http://exchange.invalid/api/v3/ping");
        let expected = format!("Basic {}", STANDARD.encode("relay:s3cret"));
        assert_eq!(request.header("Proxy-Authorization"), Some(expected.as_str()));
    }
}
