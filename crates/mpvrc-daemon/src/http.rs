use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use mpvrc_proto::protocol::{BackendEvent, CommandForm};

use crate::core::DaemonEvent;
use crate::fs;

#[derive(Clone)]
pub struct HttpState {
    pub event_tx: mpsc::Sender<DaemonEvent>,
    pub show_hidden: bool,
}

#[derive(Debug, Deserialize)]
struct FileSystemQuery {
    #[serde(default)]
    path: String,
    #[serde(default)]
    dir: Option<String>,
}

impl FileSystemQuery {
    /// Anything but a recognisable "true" counts as false.
    fn parent_of(&self) -> bool {
        matches!(
            self.dir.as_deref(),
            Some("1" | "t" | "T" | "true" | "TRUE" | "True")
        )
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/events", get(events))
        .route("/command", post(command))
        .route("/file-system", get(file_system))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(
    listener: TcpListener,
    state: HttpState,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!("HTTP server listening on http://{}", addr);
        }
        let app = router(state);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("HTTP server error: {}", e);
        }
    })
}

fn bad_request(message: impl ToString) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

// ── /events ───────────────────────────────────────────────────────────────────

fn to_sse(event: &BackendEvent) -> Option<Event> {
    match event.to_json() {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            warn!("events: failed to encode {:?}: {}", event, e);
            None
        }
    }
}

fn updates(rx: broadcast::Receiver<BackendEvent>) -> impl Stream<Item = BackendEvent> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("events: subscriber lagged, {} updates dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

async fn events(State(state): State<HttpState>) -> Response {
    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .event_tx
        .send(DaemonEvent::Subscribe { reply: reply_tx })
        .await
        .is_err()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, "daemon is shutting down").into_response();
    }
    let Ok(subscription) = reply_rx.await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "daemon is shutting down").into_response();
    };
    info!("events: new subscriber");

    let stream = stream::iter(subscription.startup)
        .chain(updates(subscription.updates))
        .filter_map(|event| async move { to_sse(&event) })
        .map(Ok::<_, Infallible>);

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

// ── /command ──────────────────────────────────────────────────────────────────

async fn command(State(state): State<HttpState>, Form(form): Form<CommandForm>) -> Response {
    let args = match form.decode() {
        Ok(args) => args,
        Err(e) => return bad_request(e),
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .event_tx
        .send(DaemonEvent::Command { args, reply: reply_tx })
        .await
        .is_err()
    {
        return bad_request("daemon is shutting down");
    }
    match reply_rx.await {
        Ok(Ok(data)) => Json(data).into_response(),
        Ok(Err(e)) => bad_request(e),
        Err(_) => bad_request("command dropped"),
    }
}

// ── /file-system ──────────────────────────────────────────────────────────────

async fn file_system(State(state): State<HttpState>, Query(query): Query<FileSystemQuery>) -> Response {
    match fs::list(&query.path, query.parent_of(), state.show_hidden).await {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => bad_request(e),
    }
}
