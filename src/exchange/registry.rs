//! Exchange credential registry
//!
//! Secrets arrive transit-sealed, are stored layered under the caller
//! password, and leave transit-sealed again. Plaintext only exists inside
//! a single call.

use std::sync::Arc;
use tracing::{info, warn};

use crate::crypto::{CredentialVault, EncryptedBlob, TransitCipher, VaultSecret};
use crate::error::{Error, Result};
use crate::storage::CustodyStore;

use super::platform::Platform;
use super::types::{ExchangeCredential, ExchangeSummary, ExchangeUpdate, ExchangeView, NewExchange};

/// New exchange as submitted by a caller (secrets transit-sealed)
#[derive(Debug, Clone, Default)]
pub struct ExchangeInput {
    pub name: String,
    pub platform: String,
    pub apikey: Option<String>,
    pub secret: Option<String>,
    pub password: Option<String>,
    pub ip: Option<String>,
}

/// Fields to rotate; absent or empty values are left alone
#[derive(Debug, Clone, Default)]
pub struct ExchangeChanges {
    pub platform: Option<String>,
    pub apikey: Option<String>,
    pub secret: Option<String>,
    pub password: Option<String>,
    pub ip: Option<String>,
}

pub struct ExchangeRegistry {
    store: Arc<dyn CustodyStore>,
    transit: TransitCipher,
}

impl ExchangeRegistry {
    pub fn new(store: Arc<dyn CustodyStore>, transit: TransitCipher) -> Self {
        Self { store, transit }
    }

    pub async fn list_names(&self) -> Result<Vec<ExchangeSummary>> {
        let names = self.store.exchange_summaries().await?;
        info!("Listing {} exchanges", names.len());
        Ok(names)
    }

    /// Exchange with its secrets re-sealed for transit; `None` when absent
    pub async fn get(&self, name: &str, password: &VaultSecret) -> Result<Option<ExchangeView>> {
        let Some(record) = self.store.find_exchange(name).await? else {
            warn!("Exchange not found: {}", name);
            return Ok(None);
        };

        let secrets = CredentialVault::open_exchange(&record, password)?;
        Ok(Some(ExchangeView {
            id: record.id,
            platform: record.platform,
            apikey: self.transit.seal_opt(secrets.api_key.as_ref()),
            secret: self.transit.seal_opt(secrets.secret.as_ref()),
            password: self.transit.seal_opt(secrets.passphrase.as_ref()),
            ip: record.ip,
            name: record.name,
        }))
    }

    pub async fn insert(&self, input: ExchangeInput, password: &VaultSecret) -> Result<ExchangeCredential> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("exchange name must not be empty".to_string()));
        }
        let platform: Platform = input.platform.parse()?;

        let record = NewExchange {
            platform: platform.id().to_string(),
            apikey: self.reseal(input.apikey.as_deref(), password)?,
            secret: self.reseal(input.secret.as_deref(), password)?,
            password: self.reseal(input.password.as_deref(), password)?,
            ip: input.ip.filter(|ip| !ip.trim().is_empty()),
            name: name.to_string(),
        };

        let stored = self.store.insert_exchange(record).await?;
        info!("Stored exchange {} ({})", stored.name, stored.platform);
        Ok(stored)
    }

    /// Rotate credentials; returns rows affected
    pub async fn update(&self, name: &str, changes: ExchangeChanges, password: &VaultSecret) -> Result<u64> {
        let platform = match changes.platform.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(p) => Some(p.parse::<Platform>()?.id().to_string()),
            None => None,
        };

        let update = ExchangeUpdate {
            platform,
            apikey: self.reseal(changes.apikey.as_deref(), password)?,
            secret: self.reseal(changes.secret.as_deref(), password)?,
            password: self.reseal(changes.password.as_deref(), password)?,
            ip: changes.ip,
        };

        let affected = self.store.update_exchange(name, update).await?;
        info!("Updated exchange {}: {} row(s)", name, affected);
        Ok(affected)
    }

    pub async fn delete(&self, name: &str) -> Result<u64> {
        let affected = self.store.delete_exchange(name).await?;
        info!("Deleted exchange {}: {} row(s)", name, affected);
        Ok(affected)
    }

    /// Transit-sealed input to at-rest blob; empty stays absent
    fn reseal(
        &self,
        sealed: Option<&str>,
        password: &VaultSecret,
    ) -> Result<Option<EncryptedBlob>> {
        let plaintext = self.transit.open_opt(sealed)?;
        Ok(CredentialVault::seal_opt(plaintext.as_ref(), password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;

    fn transit() -> TransitCipher {
        TransitCipher::new(VaultSecret::from("transit-key"), false).unwrap()
    }

    fn registry() -> ExchangeRegistry {
        ExchangeRegistry::new(Arc::new(JsonFileStore::in_memory()), transit())
    }

    fn sealed(value: &str) -> Option<String> {
        Some(transit().seal(&VaultSecret::from(value)).into_inner())
    }

    fn input(name: &str) -> ExchangeInput {
        ExchangeInput {
            name: name.to_string(),
            platform: "OKX".to_string(),
            apikey: sealed("api-key"),
            secret: sealed("api-secret"),
            password: sealed("passphrase"),
            ip: Some("1.2.3.4:8080".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_then_get_round_trip() {
        let registry = registry();
        let pw = VaultSecret::from("pw1");
        let stored = registry.insert(input("okx-main"), &pw).await.unwrap();
        assert_eq!(stored.platform, "okx");

        // At-rest blob differs from the transit blob
        assert_ne!(stored.apikey.as_ref().map(|b| b.as_str()), sealed("api-key").as_deref());

        let view = registry.get("okx-main", &pw).await.unwrap().unwrap();
        let apikey = transit().open(view.apikey.unwrap().as_str()).unwrap();
        assert_eq!(apikey.expose_secret(), "api-key");
        let passphrase = transit().open(view.password.unwrap().as_str()).unwrap();
        assert_eq!(passphrase.expose_secret(), "passphrase");

        let names = registry.list_names().await.unwrap();
        assert_eq!(names, vec![ExchangeSummary { name: "okx-main".into(), platform: "okx".into() }]);
    }

    #[tokio::test]
    async fn test_get_with_wrong_password() {
        let registry = registry();
        registry.insert(input("main"), &VaultSecret::from("pw1")).await.unwrap();
        assert!(matches!(
            registry.get("main", &VaultSecret::from("pw2")).await,
            Err(Error::DecryptionFailure)
        ));
        assert!(registry.get("missing", &VaultSecret::from("pw1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_platform() {
        let mut bad = input("main");
        bad.platform = "kraken".to_string();
        assert!(matches!(
            registry().insert(bad, &VaultSecret::from("pw")).await,
            Err(Error::UnsupportedPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rotates_only_given_fields() {
        let registry = registry();
        let pw = VaultSecret::from("pw1");
        registry.insert(input("main"), &pw).await.unwrap();

        let changes = ExchangeChanges {
            secret: sealed("rotated"),
            ..Default::default()
        };
        assert_eq!(registry.update("main", changes, &pw).await.unwrap(), 1);
        assert_eq!(registry.update("nope", ExchangeChanges::default(), &pw).await.unwrap(), 0);

        let view = registry.get("main", &pw).await.unwrap().unwrap();
        assert_eq!(transit().open(view.secret.unwrap().as_str()).unwrap().expose_secret(), "rotated");
        assert_eq!(transit().open(view.apikey.unwrap().as_str()).unwrap().expose_secret(), "api-key");
        assert_eq!(view.ip.as_deref(), Some("1.2.3.4:8080"));

        assert_eq!(registry.delete("main").await.unwrap(), 1);
        assert_eq!(registry.delete("main").await.unwrap(), 0);
    }
}
