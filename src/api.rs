use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::actor::{self, Dispatcher};
use crate::container::{self, Container, ContainerId};
use crate::error::ResultOkLogExt;
use crate::events::Event;
use crate::pool::{self, Pool};
use crate::runtime::{self, Connection as _, Factory, NetworkDetail, VolumeDetail};

mod models;

const LAST_EVENT_ID: &str = "last-event-id";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] pool::Error),
    #[error(transparent)]
    Runtime(#[from] runtime::Error),
    #[error("event stream unavailable: {0}")]
    Dispatcher(#[from] actor::Error),
    #[error("invalid container id: {0}")]
    InvalidId(#[from] container::Error),
}

type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidId(_) => StatusCode::NOT_FOUND,
            Self::Runtime(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            Self::Runtime(
                runtime::Error::Connect(_) | runtime::Error::Timeout(_) | runtime::Error::StreamClosed,
            )
            | Self::Pool(_)
            | Self::Dispatcher(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

struct AppState<F: Factory> {
    pool: Pool<F>,
    dispatcher: Dispatcher<Event>,
}

impl<F: Factory> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Streams every published event as Server-Sent Events.
///
/// A new stream always starts with the full current state, whatever
/// `Last-Event-ID` asks for.
async fn events<F: Factory>(
    State(state): State<AppState<F>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<SseEvent, axum::Error>>>> {
    if let Some(last) = headers.get(LAST_EVENT_ID).and_then(|v| v.to_str().ok()) {
        log::debug!("event stream resumed from `{last}`, replaying full state");
    }
    let subscription = state.dispatcher.subscribe().await?;
    log::debug!("event stream #{} opened", subscription.id());

    let stream = subscription.into_stream().map(|event| {
        SseEvent::default()
            .id(event.id().to_string())
            .json_data(&event)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_containers<F: Factory>(
    State(state): State<AppState<F>>,
) -> Result<Json<models::ContainerList>> {
    let mut conn = state.pool.get().await?;
    let listed = conn.list_containers().await;
    let ids = conn
        .check(listed)?
        .into_iter()
        .map(|summary| summary.id)
        .collect();
    Ok(Json(models::ContainerList::new(ids)))
}

async fn get_container<F: Factory>(
    State(state): State<AppState<F>>,
    Path(id): Path<String>,
) -> Result<Json<Container>> {
    let id = ContainerId::new(id)?;
    let mut conn = state.pool.get().await?;
    let inspected = conn.inspect_container(id.as_ref()).await;
    let detail = conn.check(inspected)?;
    Ok(Json(Container::from_detail(id, &detail, Utc::now())))
}

async fn get_network<F: Factory>(
    State(state): State<AppState<F>>,
    Path(id): Path<String>,
) -> Result<Json<NetworkDetail>> {
    let mut conn = state.pool.get().await?;
    let inspected = conn.inspect_network(&id).await;
    Ok(Json(conn.check(inspected)?))
}

async fn get_volume<F: Factory>(
    State(state): State<AppState<F>>,
    Path(name): Path<String>,
) -> Result<Json<VolumeDetail>> {
    let mut conn = state.pool.get().await?;
    let inspected = conn.inspect_volume(&name).await;
    Ok(Json(conn.check(inspected)?))
}

pub struct ApiServer {
    router: axum::Router,
}

impl ApiServer {
    pub fn new<F: Factory>(pool: Pool<F>, dispatcher: Dispatcher<Event>) -> Self {
        let api = axum::Router::new()
            .route("/events", get(events::<F>))
            .route("/containers", get(list_containers::<F>))
            .route("/containers/{id}", get(get_container::<F>))
            .route("/networks/{id}", get(get_network::<F>))
            .route("/volumes/{name}", get(get_volume::<F>))
            .with_state(AppState { pool, dispatcher });
        Self {
            router: axum::Router::new().nest("/api", api),
        }
    }

    /// Serves until `cancel` fires, then drains open connections.
    ///
    /// Event streams end on their own once the dispatcher stops.
    pub async fn listen(
        self,
        listener: tokio::net::TcpListener,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        if let Some(addr) = listener
            .local_addr()
            .ok_log_with(log::Level::Warn, "failed to read api address")
        {
            log::info!("api listening on http://{addr}");
        }
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move { cancel.cancelled_owned().await })
            .await
    }
}
