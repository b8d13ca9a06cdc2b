//! HTTP client for the hiking platform
//!
//! - User-Agent rotation
//! - Rate limiting with governor, shared by all requests of one client
//! - Retry with exponential backoff for transient failures
//! - Session cookies sent explicitly, so concurrent workers never share a jar

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    cookie::{CookieStore, Jar},
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT},
    Client, StatusCode,
};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{selectors, PlatformClient};
use crate::config::PlatformConfig;
use crate::models::{Account, ActivityKind, Event, RouteRecord, RouteSummary, Session};
use crate::utils::error::{FetchError, PlatformError};
use crate::utils::retry::{with_retry_if, RetryConfig};

const LOGIN_PATH: &str = "/routes/login_user/";
const PAST_EVENTS_PATH: &str = "/api/routes/past_event_list/";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json";

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

fn event_path(event_id: i64) -> String {
    format!("/routes/events/{event_id}/")
}

fn user_path(user_id: i64) -> String {
    format!("/routes/user/{user_id}/")
}

fn route_path(route_id: i64) -> String {
    format!("/routes/routes_list/{route_id}/")
}

#[derive(Debug, Deserialize)]
struct PastEventList {
    #[serde(default)]
    results: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireOrganizer {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: i64,
    #[serde(default)]
    title: String,
    activity: String,
    start: DateTime<Utc>,
    route: RouteSummary,
    #[serde(default)]
    participants: Vec<i64>,
    #[serde(default)]
    organizer: Option<WireOrganizer>,
}

impl From<WireEvent> for Event {
    fn from(wire: WireEvent) -> Self {
        Self {
            id: wire.id,
            title: wire.title,
            activity: ActivityKind::from(wire.activity),
            route: wire.route,
            start_time: wire.start,
            participant_ids: wire.participants,
            organizer_id: wire.organizer.map(|o| o.id),
        }
    }
}

/// Platform client over plain HTTP
pub struct HttpPlatformClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryConfig,
}

impl HttpPlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = Client::builder().timeout(timeout).gzip(true).build()?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            base_url,
            timeout,
            rate_limiter,
            retry: RetryConfig::new(config.max_retries),
        })
    }

    /// Override the retry policy (tests use short delays)
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))
    }

    fn build_headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }

    async fn get_once(
        &self,
        session: &Session,
        url: &Url,
        accept: &'static str,
    ) -> Result<String, FetchError> {
        self.rate_limiter.until_ready().await;

        let cookie = HeaderValue::from_str(&session.cookie_header())
            .map_err(|e| FetchError::parse("session cookie", e.to_string()))?;

        let response = self
            .client
            .get(url.clone())
            .headers(self.build_headers(accept))
            .header(COOKIE, cookie)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.path().to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Authenticated GET with rate limiting and retry
    async fn get_text(
        &self,
        session: &Session,
        path: &str,
        accept: &'static str,
    ) -> Result<String, FetchError> {
        let url = self.url(path)?;
        tracing::debug!(url = %url, "Fetching");

        with_retry_if(
            &self.retry,
            || self.get_once(session, &url, accept),
            FetchError::is_transient,
        )
        .await
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn login(&self, account: &Account) -> Result<Session, PlatformError> {
        let login_url = self.url(LOGIN_PATH)?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(self.timeout)
            .gzip(true)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(FetchError::from)?;

        self.rate_limiter.until_ready().await;
        let form_page = client
            .get(login_url.clone())
            .headers(self.build_headers(ACCEPT_HTML))
            .send()
            .await
            .map_err(FetchError::from)?;
        if !form_page.status().is_success() {
            return Err(PlatformError::auth(format!(
                "login page returned {}",
                form_page.status()
            )));
        }
        let form_html = form_page.text().await.map_err(FetchError::from)?;

        let csrf_token = selectors::parse_csrf_token(&form_html)
            .or_else(|| cookie_value(&jar, &login_url, "csrftoken"))
            .unwrap_or_default();

        self.rate_limiter.until_ready().await;
        let response = client
            .post(login_url.clone())
            .headers(self.build_headers(ACCEPT_HTML))
            .header(REFERER, login_url.as_str())
            .form(&[
                ("username", account.username.as_str()),
                ("password", account.secret.as_str()),
                ("csrfmiddlewaretoken", csrf_token.as_str()),
            ])
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(PlatformError::auth(format!("login rejected with {status}")));
        }

        let session_id = cookie_value(&jar, &login_url, "sessionid").ok_or_else(|| {
            PlatformError::auth(format!("no session cookie for {}", account.username))
        })?;

        tracing::info!(username = %account.username, "Logged in to platform");
        Ok(Session {
            username: account.username.clone(),
            session_id,
            csrf_token: cookie_value(&jar, &login_url, "csrftoken"),
            acquired_at: Utc::now(),
        })
    }

    async fn list_past_events(&self, session: &Session) -> Result<Vec<Event>, PlatformError> {
        let body = self
            .get_text(session, PAST_EVENTS_PATH, ACCEPT_JSON)
            .await
            .map_err(PlatformError::structural)?;

        let list: PastEventList =
            serde_json::from_str(&body).map_err(PlatformError::structural)?;

        Ok(list.results.into_iter().map(Event::from).collect())
    }

    async fn fetch_participant_ids(
        &self,
        session: &Session,
        event_id: i64,
    ) -> Result<Vec<i64>, PlatformError> {
        let html = self
            .get_text(session, &event_path(event_id), ACCEPT_HTML)
            .await?;
        Ok(selectors::parse_participant_ids(&html)?)
    }

    async fn fetch_user_points(
        &self,
        session: &Session,
        user_id: i64,
    ) -> Result<i64, PlatformError> {
        let html = self
            .get_text(session, &user_path(user_id), ACCEPT_HTML)
            .await?;
        Ok(selectors::parse_user_points(&html)?)
    }

    async fn fetch_route_details(
        &self,
        session: &Session,
        route_id: i64,
    ) -> Result<RouteRecord, PlatformError> {
        let html = self
            .get_text(session, &route_path(route_id), ACCEPT_HTML)
            .await?;
        Ok(selectors::parse_route_details(route_id, &html)?)
    }
}

/// Value of cookie `name` the jar would send to `url`
fn cookie_value(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_event_conversion() {
        let json = r#"{
            "results": [{
                "id": 501,
                "title": "Sunrise on Pilatus",
                "activity": "HI",
                "start": "2024-06-07T06:30:00+02:00",
                "route": {
                    "route_id": 77,
                    "route_title": "Pilatus",
                    "distance": 11.2,
                    "elevation_gain": 1600,
                    "sac_scale": "T3"
                },
                "participants": [7, 8],
                "organizer": {"id": 3, "name": "Ann"}
            }]
        }"#;

        let list: PastEventList = serde_json::from_str(json).unwrap();
        let events: Vec<Event> = list.results.into_iter().map(Event::from).collect();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.id, 501);
        assert!(event.is_hiking());
        assert_eq!(event.route.id, 77);
        assert_eq!(event.route.elevation, 1600);
        assert_eq!(event.organizer_id, Some(3));
        assert_eq!(event.start_time.to_rfc3339(), "2024-06-07T04:30:00+00:00");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = PlatformConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpPlatformClient::new(&config),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_cookie_value() {
        let jar = Jar::default();
        let url = Url::parse("https://www.hiking-buddies.com/routes/login_user/").unwrap();
        jar.add_cookie_str("sessionid=s3cr3t; Path=/", &url);
        jar.add_cookie_str("csrftoken=tok; Path=/", &url);

        assert_eq!(cookie_value(&jar, &url, "sessionid"), Some("s3cr3t".to_string()));
        assert_eq!(cookie_value(&jar, &url, "csrftoken"), Some("tok".to_string()));
        assert_eq!(cookie_value(&jar, &url, "missing"), None);
    }
}
