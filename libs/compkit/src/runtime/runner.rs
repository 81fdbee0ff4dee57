//! Process-level runner.
//!
//! Phase order: **start → wait → stop**. Shutdown can be driven by OS signals,
//! an external `CancellationToken`, or an arbitrary future.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::runtime::{shutdown, App};

/// How the runner should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Start every singleton, wait for the shutdown trigger, then stop.
///
/// A start failure is returned after rollback, without waiting.
pub async fn run(app: Arc<App>, options: ShutdownOptions) -> Result<()> {
    let cancel = match &options {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    match options {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                match shutdown::wait_for_shutdown().await {
                    Ok(()) => tracing::info!("shutdown: signal received"),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "shutdown: primary waiter failed; falling back to ctrl_c()"
                        );
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    if let Err(err) = app.start().await {
        cancel.cancel();
        return Err(err);
    }

    tracing::info!("Phase: wait");
    cancel.cancelled().await;

    app.stop().await
}
