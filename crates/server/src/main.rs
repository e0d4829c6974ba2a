//! delayq-server: HTTP front end for the delayed-task queue.
//!
//! Accepts `POST /` requests describing an outbound HTTP call and a delay,
//! and makes the call once the delay has passed. On SIGINT/SIGTERM the
//! listener stops taking requests and every pending call is made before exit.
//!
//! # Usage
//!
//! ```bash
//! delayq-server --port 9292
//!
//! # Profiled env vars (PROD_PORT, then PORT)
//! DELAYQ_PROFILE=prod delayq-server
//!
//! curl -X POST localhost:9292/ -H 'content-type: application/json' \
//!   -d '{"action":"POST","url":"http://localhost:9393/post","payload":{"id":1},"delay":5}'
//! ```

mod api;
mod error;
mod executable;
mod router;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use delayq_core::Config;
use delayq_queue::SchedulingQueue;

use crate::state::AppState;

/// HTTP front end for the delayed-task queue.
#[derive(Parser, Debug)]
#[command(name = "delayq-server", version, about)]
struct Cli {
    /// Config profile; keys are read as `{PROFILE}_{KEY}` before `{KEY}`.
    /// Defaults to `DELAYQ_PROFILE`.
    #[arg(long)]
    profile: Option<String>,

    /// Bind host (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides PORT).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = match &self.profile {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    delayq_core::config::load_dotenv();
    let cli = Cli::parse();
    let config = cli.into_config();
    config.validate()?;
    config.log_summary();

    let queue = Arc::new(SchedulingQueue::new(config.queue.clone())?);
    queue.start()?;

    let state = Arc::new(AppState::new(queue.clone()));
    let app = router::build_router(state);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    let stop_listener = CancellationToken::new();
    let mut server = {
        let stop = stop_listener.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
        })
    };

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        result = &mut server => {
            // The listener only exits on its own when it fails.
            warn!(?result, "listener exited unexpectedly");
        }
    }

    // Requests still in flight from here on get a 503 from the refused enqueue.
    queue.shutdown();
    stop_listener.cancel();
    if !server.is_finished() {
        let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
        match tokio::time::timeout(grace, &mut server).await {
            Ok(Ok(Ok(()))) => info!("listener stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "listener stopped with error"),
            Ok(Err(e)) => warn!(error = %e, "listener task failed"),
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "listener did not stop in time, aborting");
                server.abort();
            }
        }
    }

    let report = queue.drain().await?;
    info!(
        executed = report.executed,
        from_inbox = report.from_inbox,
        "delayq-server exited cleanly"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
