use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use boardhub_core::{config, HubConfig};

use crate::board::BoardFactory;
use crate::error::{io_err, HubError};
use crate::events::HubEvent;
use crate::host::Host;
use crate::orchestrator::Orchestrator;
use crate::virtual_board::VirtualBoardFactory;

/// Log line format for the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log collectors.
    Json,
}

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(config_path: &Path, log_format: LogFormat) -> Result<(), HubError> {
    init_tracing(log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config_path.to_path_buf()))
}

/// Load the config at `config_path` and run virtual boards until shutdown.
pub async fn run(config_path: PathBuf) -> Result<(), HubError> {
    let config = config::load_from(&config_path)?;
    tracing::info!(config = %config_path.display(), "loaded hub config");
    run_with(config, Arc::new(VirtualBoardFactory)).await
}

/// Run the orchestrator until ctrl-c or a broker `stop` request.
///
/// Startup order: broker endpoint, then a start-all sweep in the background.
/// Shutdown is reachable while the sweep is still running; it stops the host,
/// which cascades to every board and the broker.
pub async fn run_with(config: HubConfig, factory: Arc<dyn BoardFactory>) -> Result<(), HubError> {
    let host = Host::new();
    let hub = Orchestrator::new(host.clone(), config, factory)?;

    let logger = tokio::spawn(log_events(hub.subscribe(), host.clone()));

    if let Some(socket) = hub.serve_broker().await? {
        tracing::info!(socket = %socket.display(), "broker endpoint listening");
    }

    let sweep = {
        let hub = hub.clone();
        tokio::spawn(async move {
            let settlement = hub.start_all().await;
            tracing::info!(
                fulfilled = settlement.fulfilled().count(),
                rejected = settlement.rejected().count(),
                "board sweep settled",
            );
        })
    };

    let outcome = tokio::select! {
        _ = host.stopped() => Ok(()),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down");
                Ok(())
            }
            Err(err) => Err(HubError::Protocol(format!("ctrl-c handler failed: {err}"))),
        },
    };

    host.stop().await;
    sweep.abort();
    let _ = logger.await;
    outcome
}

/// Logs board errors surfaced on the event bus until the host stops.
async fn log_events(mut rx: broadcast::Receiver<HubEvent>, host: Host) {
    loop {
        tokio::select! {
            _ = host.stopped() => break,
            event = rx.recv() => match event {
                Ok(HubEvent::Error { board, error }) => {
                    tracing::error!(board = %board, error = %error, "board error");
                }
                Ok(HubEvent::BoardRegistered(board)) => {
                    tracing::info!(board = %board, "board registered");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
