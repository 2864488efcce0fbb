//! Authenticated session handling
//!
//! This module handles:
//! - Building the HTTP client (cookie store, user agent, explicit timeouts)
//! - Sending the vBulletin login form with connect-level retries
//!
//! The login response is never inspected: the forum answers bad credentials
//! with an ordinary page, so only delivery of the login request is verified.

use crate::config::{validate_forum, ForumConfig};
use crate::HarvestError;
use backon::{ExponentialBuilder, Retryable};
use reqwest::header::CONNECTION;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Path of the login endpoint, relative to the forum base URL
const LOGIN_PATH: &str = "login.php?do=login";

/// An authenticated transport handle
///
/// Created once per process and shared by reference with every component
/// that fetches pages. Cookies set during login live in the client.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    base_url: Url,
}

impl Session {
    /// Logs in to the forum and returns the session holding its cookies
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Connect failure | Retry, backoff `backoff-ms` doubling each attempt |
    /// | Connect failure, budget spent | `HarvestError::AuthTransport` |
    /// | Any other transport failure | `HarvestError::AuthTransport` |
    /// | Any HTTP response | Success |
    ///
    /// An invalid `[forum]` section fails with `HarvestError::Config` before
    /// any request is sent.
    pub async fn authenticate(config: &ForumConfig) -> Result<Self, HarvestError> {
        validate_forum(config)?;

        let base_url = Url::parse(&config.base_url)?;
        let login_url = base_url.join(LOGIN_PATH)?;
        let client = build_http_client(config)?;
        let form = login_form(&config.username, &config.password);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(config.backoff_ms))
            .with_factor(2.0)
            .with_max_times(config.connect_attempts.saturating_sub(1));

        let send_login = {
            let client = &client;
            let login_url = &login_url;
            let form = &form;
            move || async move {
                client
                    .post(login_url.clone())
                    .header(CONNECTION, "keep-alive")
                    .form(form)
                    .send()
                    .await
            }
        };

        let response = send_login
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(|e: &reqwest::Error| e.is_connect())
            .notify(|e: &reqwest::Error, delay: Duration| {
                tracing::warn!(
                    "Login connect failed ({}), retrying in {}ms",
                    e,
                    delay.as_millis()
                );
            })
            .await
            .map_err(|source| HarvestError::AuthTransport {
                url: login_url.to_string(),
                source,
            })?;

        tracing::debug!(
            "Login request delivered to {} (HTTP {})",
            login_url,
            response.status().as_u16()
        );
        tracing::info!("Session established for user {}", config.username);

        Ok(Self { client, base_url })
    }

    /// Wraps an existing client without logging in
    pub fn from_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The forum root; discovery starts here
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Builds the HTTP client shared by the login request and every page fetch
pub fn build_http_client(config: &ForumConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .cookie_store(true)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Lowercase hex MD5 of the password, as the vBulletin login form expects
pub fn password_digest(password: &str) -> String {
    format!("{:x}", md5::compute(password.as_bytes()))
}

/// Form fields of the login request
///
/// The plaintext field is sent empty; the digest fields carry the password.
pub fn login_form(username: &str, password: &str) -> Vec<(&'static str, String)> {
    let digest = password_digest(password);
    vec![
        ("vb_login_username", username.to_string()),
        ("vb_login_password", String::new()),
        ("vb_login_md5password", digest.clone()),
        ("vb_login_md5password_utf", digest),
        ("cookieuser", "1".to_string()),
        ("do", "login".to_string()),
        ("s", String::new()),
        ("securitytoken", "guest".to_string()),
    ]
}
