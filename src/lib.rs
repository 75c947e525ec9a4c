//! Docker Graph: tracks the live state of the containers on a Docker host.
//!
//! The runtime's event stream is reconciled into an in-memory cache of
//! containers, and every change is fanned out to subscribers, such as the
//! Server-Sent-Events endpoint of the web API.
pub mod actor;
pub mod api;
pub mod config;
pub mod container;
pub mod debouncer;
pub mod error;
pub mod events;
pub mod listener;
pub mod pool;
pub mod repository;
pub mod runtime;
pub mod supervisor;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ResultOkLogExt;

/// Runs the tracker and its web API until Ctrl-C or SIGTERM.
///
/// The listener and the repository are supervised: when one of them fails it
/// is restarted after `config.restart_delay`, keeping its state.
///
/// # Errors
///
/// Fails if the API address cannot be bound or the server stops with an I/O
/// error.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            log::info!("shutting down");
            cancel.cancel();
        }
    });

    let tcp = tokio::net::TcpListener::bind(config.bind).await?;

    let pool = pool::Pool::new(runtime::DockerFactory, config.pool);
    let (dispatcher, dispatcher_service) = actor::Dispatcher::new(config.subscriber_buffer);
    let (repository, repository_service) =
        repository::Repository::new(pool.clone(), dispatcher.clone(), config.repository);
    let listener = listener::Listener::new(pool.clone(), repository);

    let tasks = [
        tokio::spawn(dispatcher_service.serve(cancel.clone())),
        tokio::spawn(supervisor::supervise(
            "repository",
            repository_service,
            config.restart_delay,
            cancel.clone(),
        )),
        tokio::spawn(supervisor::supervise(
            "listener",
            listener,
            config.restart_delay,
            cancel.clone(),
        )),
    ];

    let served = api::ApiServer::new(pool, dispatcher)
        .listen(tcp, cancel.clone())
        .await;
    cancel.cancel();

    for joined in futures_util::future::join_all(tasks).await {
        joined.ok_log_with(log::Level::Error, "service task failed");
    }
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
