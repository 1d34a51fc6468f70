use std::path::Path;

use d_store::Error;
use d_store::NetworkError;
use d_store::NodeBuilder;
use d_store::Result;
use d_store::Settings;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    // Optional node-specific config file on top of CONFIG_PATH and env overrides
    let config_path = std::env::args().nth(1);
    let (graceful_tx, graceful_rx) = watch::channel(());
    let builder = NodeBuilder::new(config_path.as_deref(), graceful_rx)?;

    // Initializing Logs
    let _guard = init_observability(builder.node_settings())?;

    // Build Node
    let node = builder.build().await?;
    info!(
        node_id = node.node_id(),
        client_addr = %node.client_addr(),
        "Application started. Waiting for CTRL+C signal..."
    );

    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = node.wait().await {
        error!("node stops: {:?}", e);
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::from(NetworkError::SignalSendFailed(format!(
            "Failed to send shutdown signal: {}",
            e
        )))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(settings: &Settings) -> Result<WorkerGuard> {
    let log_dir = Path::new(&settings.cluster.log_dir);
    let file_appender = tracing_appender::rolling::never(log_dir, format!("d-store-{}.log", settings.cluster.node_id));

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
