//! HTTP surface of the broadcast server.
//!
//! A single fallback handler classifies every request (see
//! [`classify`](crate::classify)) and dispatches it to the stream, player
//! page or control handlers.

use std::{io, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    control::ControlSink,
    hub::HubHandle,
    page::render_player_page,
    routing::{classify, ControlIntent, RequestKind},
};

/// State shared by every connection-handling task.
#[derive(Clone)]
pub struct HttpState {
    pub server_name: String,
    pub page_refresh_secs: u64,
    pub hub: HubHandle,
    pub control: Arc<dyn ControlSink>,
    pub shutdown: CancellationToken,
}

/// Builds the router serving the whole HTTP surface.
pub fn router(state: HttpState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<HttpState>, method: Method, uri: Uri) -> Response {
    let kind = classify(&method, uri.path());
    debug!(%method, path = uri.path(), ?kind, "HTTP request");

    match kind {
        RequestKind::Stream => stream_audio(state).await,
        RequestKind::PlayerPage => player_page(state).await,
        RequestKind::Control(intent) => control(state, intent),
        RequestKind::NotFound => not_found(),
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found",
    )
        .into_response()
}

fn control(state: HttpState, intent: ControlIntent) -> Response {
    info!(?intent, "Remote control request");
    state.control.dispatch(intent);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "OK",
    )
        .into_response()
}

async fn player_page(state: HttpState) -> Response {
    let session = match state.hub.session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Cannot snapshot session for player page");
            return (StatusCode::SERVICE_UNAVAILABLE, "Server stopping").into_response();
        }
    };

    let html = render_player_page(
        &state.server_name,
        session.metadata.as_ref(),
        state.page_refresh_secs,
    );
    let mut response = Html(html).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Handshake and live feed for one stream listener.
///
/// The cached framing header (if any) is emitted first; only then does the
/// connection join the listener set. If the session changed in between, the
/// hub queues the newer header ahead of the first live chunk.
async fn stream_audio(state: HttpState) -> Response {
    let session = match state.hub.session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Rejecting stream request");
            return (StatusCode::SERVICE_UNAVAILABLE, "Server stopping").into_response();
        }
    };

    let hub = state.hub.clone();
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        if let Some(header) = session.header.clone() {
            yield Ok::<Bytes, io::Error>(header);
        }

        let mut subscription = match hub.join(session.generation).await {
            Ok(subscription) => subscription,
            Err(e) => {
                debug!(error = %e, "Listener could not join");
                return;
            }
        };
        let listener = subscription.id;

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                chunk = subscription.rx.recv() => chunk,
            };
            match next {
                Some(chunk) => yield Ok(chunk),
                None => break,
            }
        }

        debug!(listener, "Listener feed ended");
    };

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    if let Ok(name) = HeaderValue::from_str(&state.server_name) {
        headers.insert("icy-name", name);
    }
    response
}
