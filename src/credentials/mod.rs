//! Account pool and session broker
//!
//! Every scheduling cycle asks the [`CredentialBroker`] for a session. The
//! broker draws a random account, reuses its cached session while it is
//! younger than the TTL and logs in again otherwise.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Account, Session};
use crate::platform::SharedPlatformClient;
use crate::storage::{AccountStore, SessionStore, StorageError};
use crate::utils::error::PlatformError;

/// Default lifetime of a cached session
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 3;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("No accounts available in the pool")]
    NoAccountsAvailable,

    #[error("Login failed: {0}")]
    Auth(#[source] PlatformError),

    #[error("Account pool unavailable: {0}")]
    Persistence(#[from] StorageError),
}

/// Random selection over the configured accounts
#[derive(Clone)]
pub struct AccountPool {
    store: Arc<dyn AccountStore>,
}

impl AccountPool {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub fn pick_random(&self) -> Result<Account, BrokerError> {
        self.store
            .pick_random()?
            .ok_or(BrokerError::NoAccountsAvailable)
    }

    pub fn add(&self, account: &Account) -> Result<(), BrokerError> {
        self.store.create(account)?;
        info!(username = %account.username, "Account added to pool");
        Ok(())
    }

    pub fn usernames(&self) -> Result<Vec<String>, BrokerError> {
        Ok(self.store.list_usernames()?)
    }
}

/// Produces a usable session per cycle, avoiding redundant logins
pub struct CredentialBroker {
    pool: AccountPool,
    sessions: Arc<dyn SessionStore>,
    client: SharedPlatformClient,
    ttl: chrono::Duration,
}

impl CredentialBroker {
    pub fn new(
        pool: AccountPool,
        sessions: Arc<dyn SessionStore>,
        client: SharedPlatformClient,
    ) -> Self {
        Self {
            pool,
            sessions,
            client,
            ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    pub async fn acquire(&self) -> Result<Session, BrokerError> {
        self.acquire_at(Utc::now()).await
    }

    /// Session for one random account as seen at `now`
    pub async fn acquire_at(&self, now: DateTime<Utc>) -> Result<Session, BrokerError> {
        let account = self.pool.pick_random()?;

        match self.sessions.get_cached(&account.username, now - self.ttl) {
            Ok(Some(session)) if session.username == account.username => {
                debug!(username = %account.username, "Reusing cached session");
                return Ok(session);
            }
            Ok(Some(session)) => {
                warn!(
                    requested = %account.username,
                    returned = %session.username,
                    "Cached session belongs to another account, ignoring it"
                );
            }
            Ok(None) => {
                debug!(username = %account.username, "No fresh cached session");
            }
            Err(e) => {
                warn!(username = %account.username, error = %e, "Session cache lookup failed");
            }
        }

        let session = match self.client.login(&account).await {
            Ok(session) => session,
            Err(e) => {
                crate::metrics::record_login(false);
                return Err(BrokerError::Auth(e));
            }
        };
        crate::metrics::record_login(true);

        if let Err(e) = self.sessions.save(&session) {
            warn!(username = %account.username, error = %e, "Failed to cache session");
        }

        Ok(session)
    }
}
