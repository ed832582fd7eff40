//! Graceful-shutdown plumbing for the server binary.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returns a token that is cancelled when the process receives SIGINT,
/// SIGTERM or SIGHUP.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    tokio::spawn(async move {
        let mut interrupt =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut hangup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received, will quit"),
            _ = terminate.recv() => info!("SIGTERM received, will quit"),
            _ = hangup.recv() => info!("SIGHUP received, will quit"),
        }
        tc.cancel();
    });
    token
}
