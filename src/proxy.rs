//! Outbound proxy resolution
//!
//! Exchange records carry an optional proxy string in one of three shapes,
//! tried in order:
//! 1. `user:pwd@ip:port`
//! 2. `ip:port:user:pwd`
//! 3. `ip:port`
//!
//! Anything else resolves to no proxy rather than failing the request.

use std::fmt;

use crate::error::{Error, Result};

/// Proxy credentials
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Normalized proxy connection descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDescriptor {
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

impl ProxyDescriptor {
    /// HTTP proxy URL, used for both HTTP and HTTPS traffic
    pub fn url(&self) -> String {
        match &self.auth {
            Some(auth) => format!(
                "http://{}:{}@{}:{}",
                auth.user, auth.password, self.host, self.port
            ),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Build a reqwest proxy covering every scheme
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        reqwest::Proxy::all(self.url())
            .map_err(|e| Error::ClientCreationFailure(format!("invalid proxy {}: {}", self, e)))
    }
}

/// Masked form for logs
impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.auth {
            Some(auth) => write!(f, "http://{}:***@{}:{}", auth.user, self.host, self.port),
            None => write!(f, "http://{}:{}", self.host, self.port),
        }
    }
}

/// Parse a proxy configuration string
pub fn parse(proxy: &str) -> Option<ProxyDescriptor> {
    let proxy = proxy.trim();
    if proxy.is_empty() {
        return None;
    }

    if proxy.contains('@') {
        if let Some(descriptor) = parse_at_form(proxy) {
            return Some(descriptor);
        }
    }

    let parts: Vec<&str> = proxy.split(':').collect();
    match parts.as_slice() {
        [host, port, user, password] => endpoint(host, port, Some((user, password))),
        [host, port] => endpoint(host, port, None),
        _ => None,
    }
}

fn parse_at_form(proxy: &str) -> Option<ProxyDescriptor> {
    let (auth, host) = split_exactly_two(proxy, '@')?;
    let (user, password) = split_exactly_two(auth, ':')?;
    let (host, port) = split_exactly_two(host, ':')?;
    endpoint(host, port, Some((user, password)))
}

fn split_exactly_two(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut it = s.split(sep);
    match (it.next(), it.next(), it.next()) {
        (Some(a), Some(b), None) => Some((a, b)),
        _ => None,
    }
}

fn endpoint(host: &str, port: &str, auth: Option<(&str, &str)>) -> Option<ProxyDescriptor> {
    let host = host.trim();
    if host.is_empty() || host.contains('@') {
        return None;
    }
    let port = port.trim().parse::<u16>().ok()?;
    let auth = match auth {
        Some((user, password)) if !user.is_empty() => Some(ProxyAuth {
            user: user.to_string(),
            password: password.to_string(),
        }),
        Some(_) => return None,
        None => None,
    };
    Some(ProxyDescriptor {
        host: host.to_string(),
        port,
        auth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_form() {
        let proxy = parse("u:pw@1.2.3.4:8080").unwrap();
        assert_eq!(proxy.url(), "http://u:pw@1.2.3.4:8080");
        assert_eq!(proxy.auth.as_ref().unwrap().user, "u");
    }

    #[test]
    fn test_colon_form_normalizes_identically() {
        assert_eq!(parse("1.2.3.4:8080:u:pw"), parse("u:pw@1.2.3.4:8080"));
        assert_eq!(parse(" 1.2.3.4:8080:u:pw ").unwrap().url(), "http://u:pw@1.2.3.4:8080");
    }

    #[test]
    fn test_bare_form() {
        let proxy = parse("1.2.3.4:8080").unwrap();
        assert!(proxy.auth.is_none());
        assert_eq!(proxy.url(), "http://1.2.3.4:8080");
    }

    #[test]
    fn test_malformed_is_none() {
        for input in [
            "garbage",
            "",
            "1.2.3.4",
            "1.2.3.4:8080:u",
            "u@pw@1.2.3.4:8080",
            "u:pw@1.2.3.4",
            "1.2.3.4:notaport",
            "a:b:c:d:e",
        ] {
            assert!(parse(input).is_none(), "{} should not parse", input);
        }
    }

    #[test]
    fn test_display_masks_password() {
        let proxy = parse("u:topsecret@1.2.3.4:8080").unwrap();
        assert!(!proxy.to_string().contains("topsecret"));
        assert!(!format!("{:?}", proxy).contains("topsecret"));
    }

    #[test]
    fn test_reqwest_proxy_builds() {
        assert!(parse("u:pw@1.2.3.4:8080").unwrap().to_reqwest().is_ok());
    }
}
