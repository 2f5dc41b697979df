mod settings;

pub use settings::{ReconnectConfig, ServerConfig, Settings, WebSocketConfig};
