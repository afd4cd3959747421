//! `swend run`: both periodic actors until a shutdown signal.

use std::sync::Arc;

use anyhow::Context;
use swen_daemon::{ControlPoll, Runtime, Scheduler, SwenConfig};
use swen_pool::LoggingExecutor;

pub async fn execute(config: SwenConfig) -> anyhow::Result<()> {
    let mut runtime = Runtime::open(config, Some(Arc::new(LoggingExecutor)))
        .await
        .context("failed to load persisted state")?;

    println!(
        r#"
  SWEN - cost-aware placement with bounded change control
  Version: {}
  State: {}
  Tickets restored: {} (evicted {}, resent to executor {})
"#,
        env!("CARGO_PKG_VERSION"),
        runtime.config.paths.state_dir.display(),
        runtime.restored.loaded,
        runtime.restored.evicted.len(),
        runtime.restored.redispatched,
    );

    let scheduler = Scheduler::new(
        runtime.cycle.clone(),
        runtime.health.clone(),
        runtime.config.cycle.interval(),
        runtime.config.health.interval(),
        Some(ControlPoll {
            inbox: runtime.inbox.clone(),
            pool: runtime.pool.clone(),
            interval: runtime.config.cycle.control_poll(),
        }),
    );
    let handle = tokio::spawn(scheduler.clone().start());

    shutdown_signal().await;
    scheduler.shutdown().await;
    handle.await.context("scheduler task failed")?;

    runtime.shutdown().await;
    tracing::info!("swend stopped");
    Ok(())
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
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
