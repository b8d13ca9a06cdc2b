pub mod account;
pub mod run_once;
pub mod serve;

pub use account::{account_add, account_list};
pub use run_once::run_once;
pub use serve::serve;

use anyhow::{Context, Result};
use std::sync::Arc;

use trailgain::config::Config;
use trailgain::credentials::{AccountPool, CredentialBroker};
use trailgain::platform::{HttpPlatformClient, SharedPlatformClient};
use trailgain::storage::{Database, Stores};

/// Stores, platform client and broker built from one configuration
pub struct Runtime {
    pub stores: Stores,
    pub pool: AccountPool,
    pub client: SharedPlatformClient,
    pub broker: Arc<CredentialBroker>,
}

impl Runtime {
    pub fn build(config: &Config) -> Result<Self> {
        let stores = open_stores(config)?;
        let client: SharedPlatformClient = Arc::new(
            HttpPlatformClient::new(&config.platform).context("Failed to create platform client")?,
        );
        let pool = AccountPool::new(stores.accounts.clone());
        let broker = Arc::new(
            CredentialBroker::new(pool.clone(), stores.sessions.clone(), client.clone())
                .with_ttl(config.session_ttl()),
        );

        Ok(Self {
            stores,
            pool,
            client,
            broker,
        })
    }
}

pub fn open_stores(config: &Config) -> Result<Stores> {
    let db = Database::open(&config.database.path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.database.path.display()
        )
    })?;
    Ok(Stores::sqlite(&db))
}
