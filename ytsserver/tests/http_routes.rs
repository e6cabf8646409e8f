use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use ytsserver::{router, spawn_hub, ControlIntent, HttpState, SessionMetadata};

fn app() -> (
    axum::Router,
    ytsserver::HubHandle,
    mpsc::UnboundedReceiver<ControlIntent>,
) {
    let (hub, _task) = spawn_hub(16);
    let (tx, rx) = mpsc::unbounded_channel();
    let state = HttpState {
        server_name: "Test Radio".into(),
        page_refresh_secs: 10,
        hub: hub.clone(),
        control: Arc::new(tx),
        shutdown: CancellationToken::new(),
    };
    (router(state), hub, rx)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_skip_and_stop_reach_control_sink() {
    let (app, _hub, mut rx) = app();

    let response = app.clone().oneshot(get("/api/skip")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(rx.recv().await, Some(ControlIntent::Skip));

    let response = app.oneshot(get("/api/stop")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(rx.recv().await, Some(ControlIntent::Stop));
}

#[tokio::test]
async fn test_non_get_is_404() {
    let (app, _hub, mut rx) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/skip")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Not Found");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_page_reflects_session_at_render_time() {
    let (app, hub, _rx) = app();

    let idle = body_text(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert!(idle.contains("Nothing playing"));

    hub.update_session(
        SessionMetadata {
            title: "Song A".into(),
            artist: Some("Artist A".into()),
            thumbnail: None,
        },
        None,
    )
    .await
    .unwrap();

    // unknown GET paths fall back to the player page
    let response = app.oneshot(get("/whatever")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let page = body_text(response).await;
    assert!(page.contains("Song A"));
    assert!(page.contains("Artist A"));
    assert!(page.contains("Test Radio"));
}

#[tokio::test]
async fn test_stream_headers() {
    let (app, _hub, _rx) = app();
    let response = app.oneshot(get("/stream.mp3")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert!(headers[header::CACHE_CONTROL]
        .to_str()
        .unwrap()
        .contains("no-cache"));
    assert_eq!(headers["icy-name"], "Test Radio");
}
