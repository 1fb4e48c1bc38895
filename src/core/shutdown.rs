//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] resolves with the name of the first signal
//! received: `SIGINT`, `SIGTERM` or `SIGQUIT` on unix, Ctrl-C elsewhere.
//! `Supervisor::run` races it against fatal lifecycle errors.

/// Waits for a termination signal and returns its name.
///
/// Fails if a signal listener cannot be registered.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for Ctrl-C and returns its name.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
