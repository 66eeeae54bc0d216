pub mod utils;

use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::listener;
use crate::{ServiceConfig, ServiceState};

/// How long spawned tasks get to wind down once shutdown is signalled
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_FILE_NAME: &str = "q2q.log";

/// Keeps a running daemon's tasks; wait on it or trigger shutdown through it.
pub struct ShutdownHandle {
    signals: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
    trigger: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Resolve once a signal or [`ShutdownHandle::shutdown`] stopped every task
    pub async fn wait(self) {
        let _ = self.signals.await;
        if tokio::time::timeout(DRAIN_TIMEOUT, join_all(self.tasks))
            .await
            .is_err()
        {
            tracing::error!("tasks still running {}s after shutdown", DRAIN_TIMEOUT.as_secs());
            std::process::exit(4);
        }
    }

    pub fn shutdown(&self) {
        let _ = self.trigger.send(());
    }
}

/// `RUST_LOG` wins over the configured level when set
fn level_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn rolling_file(dir: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::daily(dir, LOG_FILE_NAME),
    ))
}

/// Install the global subscriber: compact stdout, plus a daily file under
/// `log_dir` when one is configured. Dropping the guards flushes the writers.
fn init_logging(config: &ServiceConfig) -> Vec<WorkerGuard> {
    let (stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let mut guards = vec![stdout_guard];

    let file = match config.log_dir.as_deref().map(rolling_file) {
        Some(Ok((writer, guard))) => {
            guards.push(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_filter(level_filter(config.log_level)),
            )
        }
        Some(Err(e)) => {
            // no subscriber yet, so stderr is the only place this can go
            eprintln!("q2q: file logging disabled: {}", e);
            None
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_writer(stdout)
                .with_filter(level_filter(config.log_level)),
        )
        .with(file)
        .init();

    utils::register_panic_logger();
    utils::report_build_info();
    guards
}

/// Open the store and credentials, then spawn the listener.
///
/// Exits the process if the state cannot be built. Dropping the returned
/// handle does not stop the service.
pub async fn start_service(config: &ServiceConfig) -> (ServiceState, ShutdownHandle) {
    let (signals, trigger, shutdown_rx) = utils::graceful_shutdown_blocker();
    let state = match ServiceState::from_config(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    };

    let addr = config.listen_addr;
    let listener = tokio::spawn({
        let state = state.clone();
        async move {
            if let Err(e) = listener::run_listener(addr, state, shutdown_rx).await {
                tracing::error!("listener stopped: {}", e);
            }
        }
    });
    tracing::info!(identity = %config.identity, "q2q listening on {}", addr);

    let handle = ShutdownHandle {
        signals,
        tasks: vec![listener],
        trigger,
    };
    (state, handle)
}

/// Run the daemon in the foreground until SIGINT or SIGTERM
pub async fn spawn_service(config: &ServiceConfig) {
    let _guards = init_logging(config);
    let (_, handle) = start_service(config).await;
    handle.wait().await;
}
