use std::env;

use async_trait::async_trait;

use crate::errors::CredentialError;

/// Time-limited connection material. Never persisted; held in memory only
/// for the life of the current connection attempt.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub hub_address: String,
    pub device_id: String,
    pub access_token: String,
}

/// External identity service. Callable repeatedly; each call may return a
/// renewed token, which is exactly what the dispatcher relies on when the
/// hub rejects the current one.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self) -> Result<Credentials, CredentialError>;
}

/// Provider backed by environment variables (`HUB_ADDRESS`, `DEVICE_ID`,
/// `ACCESS_TOKEN`), re-read on every fetch so a rotated token in the
/// environment is picked up without a restart.
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn new() -> Self {
        dotenv::dotenv().ok();
        EnvCredentialProvider
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn fetch(&self) -> Result<Credentials, CredentialError> {
        let read = |key: &str| {
            env::var(key)
                .map_err(|_| CredentialError::Lookup(format!("{} environment variable not set", key)))
        };

        Ok(Credentials {
            hub_address: read("HUB_ADDRESS")?,
            device_id: read("DEVICE_ID")?,
            access_token: read("ACCESS_TOKEN")?,
        })
    }
}
