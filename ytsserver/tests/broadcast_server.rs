use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use ytsserver::{
    BroadcastOptions, BroadcastServer, IgnoreControl, ServerError, SessionMetadata,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn options(port: u16, bind_attempts: u16) -> BroadcastOptions {
    BroadcastOptions {
        name: "Test Radio".into(),
        bind_address: LOCALHOST,
        port,
        bind_attempts,
        listener_capacity: 64,
        page_refresh_secs: 30,
    }
}

fn server(port: u16, bind_attempts: u16) -> BroadcastServer {
    BroadcastServer::new(options(port, bind_attempts), Arc::new(IgnoreControl))
}

async fn wait_for_listeners(server: &BroadcastServer, expected: usize) {
    for _ in 0..200 {
        if server.listener_count().await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("listener count never reached {expected}");
}

/// Reads from a streaming response until `n` bytes have been received.
async fn read_bytes(response: &mut reqwest::Response, n: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    while buf.len() < n {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("timed out waiting for stream bytes")
            .unwrap()
            .expect("stream ended early");
        buf.extend_from_slice(&chunk);
    }
    buf
}

async fn connect(port: u16) -> reqwest::Response {
    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/stream.mp3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response
}

fn meta(title: &str) -> SessionMetadata {
    SessionMetadata {
        title: title.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_occupied_port_retries_next_one() {
    let blocker = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
    let busy = blocker.local_addr().unwrap().port();

    let mut server = server(busy, 10);
    let bound = server.start().await.unwrap();

    assert_ne!(bound, busy);
    assert!(bound > busy && bound < busy + 10);
    assert_eq!(server.port(), Some(bound));
    server.stop().await;
}

#[tokio::test]
async fn test_bind_failure_after_attempts_exhausted() {
    let blocker = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
    let busy = blocker.local_addr().unwrap().port();

    let mut server = server(busy, 1);
    match server.start().await {
        Err(ServerError::BindFailed { port, attempts, .. }) => {
            assert_eq!(port, busy);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected BindFailed, got {other:?}"),
    }
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_stop_twice_is_harmless() {
    let mut server = server(0, 1);
    server.start().await.unwrap();
    assert!(server.is_running());

    server.stop().await;
    server.stop().await;
    assert!(!server.is_running());
    assert!(matches!(
        server.broadcast(Bytes::from_static(b"x")).await,
        Err(ServerError::NotRunning)
    ));
}

#[tokio::test]
async fn test_listener_without_cached_header_gets_live_bytes_only() {
    let mut server = server(0, 1);
    let port = server.start().await.unwrap();

    let mut response = connect(port).await;
    wait_for_listeners(&server, 1).await;

    assert_eq!(server.broadcast(Bytes::from_static(b"live")).await.unwrap(), 1);
    assert_eq!(read_bytes(&mut response, 4).await, b"live");
    server.stop().await;
}

#[tokio::test]
async fn test_late_joiner_receives_header_before_live_bytes() {
    let mut server = server(0, 1);
    let port = server.start().await.unwrap();

    let mut early = connect(port).await;
    wait_for_listeners(&server, 1).await;

    server
        .update_session(meta("Song A"), Some(Bytes::from_static(b"HDR")))
        .await
        .unwrap();
    server.broadcast(Bytes::from_static(b"one")).await.unwrap();

    let mut late = connect(port).await;
    wait_for_listeners(&server, 2).await;
    assert_eq!(server.broadcast(Bytes::from_static(b"two")).await.unwrap(), 2);

    // the early listener only gets live bytes; the late one starts with the header
    assert_eq!(read_bytes(&mut early, 6).await, b"onetwo");
    assert_eq!(read_bytes(&mut late, 6).await, b"HDRtwo");

    let session = server.session().await.unwrap();
    assert_eq!(session.metadata.unwrap().title, "Song A");
    server.stop().await;
}

#[tokio::test]
async fn test_dead_listener_does_not_block_others() {
    let mut server = server(0, 1);
    let port = server.start().await.unwrap();

    let mut alive = connect(port).await;
    let dead = connect(port).await;
    wait_for_listeners(&server, 2).await;

    drop(dead);
    // the disconnect is noticed once hyper drops the body stream
    let mut delivered = 2;
    for _ in 0..200 {
        delivered = server.broadcast(Bytes::from_static(b"z")).await.unwrap();
        if delivered == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered, 1);
    assert_eq!(server.broadcast(Bytes::from_static(b"z")).await.unwrap(), 1);
    assert_eq!(read_bytes(&mut alive, 1).await, b"z");
    server.stop().await;
}

#[tokio::test]
async fn test_stop_ends_listener_streams() {
    let mut server = server(0, 1);
    let port = server.start().await.unwrap();

    let mut response = connect(port).await;
    wait_for_listeners(&server, 1).await;
    server.stop().await;

    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match response.chunk().await {
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
    })
    .await;
    assert!(end.is_ok(), "stream still open after stop");
}
