//! Access to the hiking platform
//!
//! [`PlatformClient`] is everything the workers need from the platform.
//! [`HttpPlatformClient`] talks to the real site. With the `test-support`
//! feature, `MockPlatformClient` serves scripted answers for tests.

pub mod client;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod selectors;

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{Account, Event, RouteRecord, Session};
use crate::utils::error::PlatformError;

pub use client::HttpPlatformClient;
#[cfg(any(test, feature = "test-support"))]
pub use mock::MockPlatformClient;

/// Operations the workers perform against the platform
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Log in and return a fresh session
    async fn login(&self, account: &Account) -> Result<Session, PlatformError>;

    /// Recently concluded events, in the order the platform lists them
    async fn list_past_events(&self, session: &Session) -> Result<Vec<Event>, PlatformError>;

    /// Participant ids of an event, without duplicates
    async fn fetch_participant_ids(
        &self,
        session: &Session,
        event_id: i64,
    ) -> Result<Vec<i64>, PlatformError>;

    /// Current rating points of a user
    async fn fetch_user_points(&self, session: &Session, user_id: i64)
        -> Result<i64, PlatformError>;

    async fn fetch_route_details(
        &self,
        session: &Session,
        route_id: i64,
    ) -> Result<RouteRecord, PlatformError>;
}

pub type SharedPlatformClient = Arc<dyn PlatformClient>;
