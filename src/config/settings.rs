use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host of the REST API the notification channel rides on
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use wss:// instead of ws:// (TLS-terminated deployments)
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Path of the notification endpoint on the API host
    #[serde(default = "default_path")]
    pub path: String,
    /// Text payload sent once right after each successful connect
    #[serde(default = "default_keepalive_payload")]
    pub keepalive_payload: String,
    /// Dial timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for the retry delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor between retries; 1.0 keeps the delay flat
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Random jitter as a fraction of the computed delay (0.0 = none)
    #[serde(default)]
    pub jitter_factor: f64,
    /// Give up and enter the Failed state after this many consecutive
    /// failures; None retries forever
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8070
}

fn default_path() -> String {
    "/ws/notifications".to_string()
}

fn default_keepalive_payload() -> String {
    "ping".to_string()
}

fn default_connect_timeout() -> u64 {
    10 // 10 seconds
}

fn default_initial_delay_ms() -> u64 {
    3_000 // 3 seconds, matching the deployed flat-delay client
}

fn default_max_delay_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_multiplier() -> f64 {
    1.0 // flat delay unless raised
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "localhost")?
            .set_default("server.port", 8070)?
            .set_default("server.secure", false)?
            .set_default("websocket.path", "/ws/notifications")?
            .set_default("websocket.keepalive_payload", "ping")?
            .set_default("websocket.connect_timeout", 10)?
            .set_default("reconnect.initial_delay_ms", 3_000)?
            .set_default("reconnect.max_delay_ms", 30_000)?
            .set_default("reconnect.multiplier", 1.0)?
            .set_default("reconnect.jitter_factor", 0.0)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // NOTIFY_SERVER__HOST, NOTIFY_SERVER__PORT, NOTIFY_RECONNECT__INITIAL_DELAY_MS, etc.
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Full URL of the notification endpoint
    pub fn ws_url(&self) -> String {
        let scheme = if self.server.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}{}",
            scheme, self.server.host, self.server.port, self.websocket.path
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            websocket: WebSocketConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            keepalive_payload: default_keepalive_payload(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }
}
