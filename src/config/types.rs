use serde::Deserialize;
use std::fmt;

/// Main configuration structure for Forum-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub forum: ForumConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Forum site and login configuration
#[derive(Clone, Deserialize)]
pub struct ForumConfig {
    /// Root of the forum; the login endpoint and discovery start here
    #[serde(rename = "base-url", default)]
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Localized prefix of the "page 1 of N" marker
    #[serde(rename = "page-marker", default = "default_page_marker")]
    pub page_marker: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connect timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Total connect attempts for the login request
    #[serde(rename = "connect-attempts", default = "default_connect_attempts")]
    pub connect_attempts: usize,

    /// First backoff delay between login attempts (milliseconds)
    #[serde(rename = "backoff-ms", default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound on the page count read from a listing's marker
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,
}

/// AMQP broker configuration, shared by the publisher and the consumer
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_broker_user")]
    pub user: String,

    #[serde(default = "default_broker_user")]
    pub password: String,

    #[serde(default = "default_vhost")]
    pub vhost: String,

    #[serde(default = "default_exchange")]
    pub exchange: String,

    #[serde(default = "default_queue")]
    pub queue: String,

    #[serde(rename = "routing-key", default = "default_routing_key")]
    pub routing_key: String,
}

/// Sink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl BrokerConfig {
    /// Name of the exchange rejected deliveries are dead-lettered to
    pub fn dead_letter_exchange(&self) -> String {
        format!("{}.dlx", self.exchange)
    }

    /// Name of the queue collecting dead-lettered deliveries
    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dead", self.queue)
    }

    /// Builds the `amqp://` URI for this broker
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            encode_component(&self.user),
            encode_component(&self.password),
            self.host,
            self.port,
            encode_component(&self.vhost)
        )
    }
}

fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: default_user_agent(),
            page_marker: default_page_marker(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            connect_attempts: default_connect_attempts(),
            backoff_ms: default_backoff_ms(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            user: default_broker_user(),
            password: default_broker_user(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            queue: default_queue(),
            routing_key: default_routing_key(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

// Secrets stay out of logs and `check` output.
impl fmt::Debug for ForumConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForumConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("page_marker", &self.page_marker)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("connect_attempts", &self.connect_attempts)
            .field("backoff_ms", &self.backoff_ms)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("exchange", &self.exchange)
            .field("queue", &self.queue)
            .field("routing_key", &self.routing_key)
            .finish()
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:122.0) Gecko/20100101 Firefox/122.0"
        .to_string()
}

fn default_page_marker() -> String {
    "Pagina 1 de".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_connect_attempts() -> usize {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_max_pages() -> u32 {
    crate::crawler::DEFAULT_MAX_PAGES
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    5672
}

fn default_broker_user() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    "forum_posts".to_string()
}

fn default_queue() -> String {
    "forum_posts".to_string()
}

fn default_routing_key() -> String {
    "posts".to_string()
}

fn default_database_path() -> String {
    "posts.db".to_string()
}
