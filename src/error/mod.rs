use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors internal to the notification client.
///
/// None of these reach consumer callbacks: transport faults resolve to a
/// reconnect cycle and parse faults resolve to an `Unclassified` event.
/// The type exists for construction paths (configuration loading) and for
/// logging inside the connection task.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Connect attempt timed out after {seconds}s")]
    ConnectTimeout { seconds: u64 },
}

pub type Result<T> = std::result::Result<T, ClientError>;
