use anyhow::Result;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ruido_notify::config::Settings;
use ruido_notify::NotificationClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!(url = %settings.ws_url(), "Configuration loaded");

    // Start the notification client
    let client = NotificationClient::start(settings);

    // Log every classified event; a real consumer would toast the text
    // and re-fetch its data when should_refresh is set
    let _subscription = client.subscribe(|event| {
        tracing::info!(
            kind = %event.kind,
            text = %event.text,
            should_refresh = event.should_refresh,
            "Notification received"
        );
        Ok(())
    });

    // Run until SIGINT/SIGTERM
    wait_for_shutdown_signal().await;

    client.stop().await;
    tracing::info!("Monitor shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
