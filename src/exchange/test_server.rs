//! One-shot HTTP server for exercising adapters over a real socket
//!
//! Accepts a single connection, records the request and answers with a
//! canned JSON body.

use serde_json::Value;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::crypto::VaultSecret;
use crate::proxy::ProxyDescriptor;

use super::adapter::{
    AdapterFactory, ApiCredentials, ExchangeAdapter, HttpAdapterFactory, WithdrawParams,
};
use super::platform::Platform;

pub const API_KEY: &str = "test-api-key";
pub const API_SECRET: &str = "test-api-secret";
pub const API_PASSPHRASE: &str = "test-passphrase";

/// Request as it arrived on the socket
#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    /// Request target exactly as sent (absolute form through a proxy)
    pub target: String,
    pub path: String,
    pub query: String,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    /// Path and query the way platforms sign them
    pub fn request_path(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Bind to an ephemeral port; returns the base URL and the captured request
pub async fn serve_once(reply: Value) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split(' ');
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..header_end + length]).into_owned();

        let payload = reply.to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            payload.len(),
            payload
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;

        // Absolute form: http://host/path?query
        let origin_form = match target.strip_prefix("http://") {
            Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/").to_string(),
            None => target.clone(),
        };
        let (path, query) = match origin_form.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (origin_form, String::new()),
        };

        CapturedRequest {
            method,
            target,
            path,
            query,
            headers,
            body,
        }
    });

    (format!("http://{}", addr), handle)
}

/// Adapter for `platform` pointed at `base_url`, with the test credentials
pub fn adapter_at(
    platform: Platform,
    base_url: &str,
    proxy: Option<&ProxyDescriptor>,
) -> Box<dyn ExchangeAdapter> {
    let credentials = ApiCredentials {
        api_key: VaultSecret::from(API_KEY),
        secret: VaultSecret::from(API_SECRET),
        passphrase: Some(VaultSecret::from(API_PASSPHRASE)),
    };
    HttpAdapterFactory::default()
        .with_endpoint(platform, base_url)
        .create(platform, credentials, proxy)
        .unwrap()
}

pub fn secret() -> VaultSecret {
    VaultSecret::from(API_SECRET)
}

/// 12.5 USDT to a fixed address
pub fn withdraw_params(network: Option<&str>) -> WithdrawParams {
    WithdrawParams {
        coin: "USDT".to_string(),
        amount: "12.5".parse().unwrap(),
        address: "0xdest".to_string(),
        network: network.map(str::to_string),
    }
}
