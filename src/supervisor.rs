//! Restarts long-running services that fail.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A long-running service that can be served again after it failed.
///
/// State kept on the implementor survives a restart.
pub trait Service: Send {
    type Error: Display + Send;

    /// Runs until `cancel` fires (returning `Ok`) or the service fails.
    fn serve(
        &mut self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Serves `service`, restarting it `restart_delay` after each failure, until
/// `cancel` fires or the service stops on its own.
pub async fn supervise<S: Service>(
    name: &'static str,
    mut service: S,
    restart_delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        match service.serve(cancel.child_token()).await {
            Ok(()) => {
                log::info!("{name} stopped");
                return;
            }
            Err(err) => log::error!("{name} failed: {err}"),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(restart_delay) => {
                log::info!("restarting {name}");
            }
        }
    }
}
