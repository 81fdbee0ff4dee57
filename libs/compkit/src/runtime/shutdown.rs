use tokio::signal;

/// Wait for termination signals (Ctrl+C, SIGTERM).
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        sigterm.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C signal");
        }
        result = terminate => {
            result?;
            tracing::info!("Received SIGTERM signal");
        }
    }
    Ok(())
}
