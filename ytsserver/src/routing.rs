//! Request classification.
//!
//! Routing does not match exact paths: a request is classified by looking
//! for well-known fragments in its path, in a fixed priority order, so that
//! players appending extensions or query strings still reach the stream.

use axum::http::Method;

/// Remote-control intents forwarded to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlIntent {
    Skip,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Stream,
    PlayerPage,
    Control(ControlIntent),
    NotFound,
}

/// Classifies a request by method and path.
///
/// Priority: audio stream, root/index page, control endpoints, any other
/// `GET` (player page), everything else `404`.
pub fn classify(method: &Method, path: &str) -> RequestKind {
    if method != Method::GET {
        return RequestKind::NotFound;
    }

    if path.contains("stream.mp3") || path.contains("/audio") {
        return RequestKind::Stream;
    }

    if path == "/" || path.is_empty() || path.starts_with("/index") {
        return RequestKind::PlayerPage;
    }

    if path.contains("/api/skip") {
        return RequestKind::Control(ControlIntent::Skip);
    }
    if path.contains("/api/stop") {
        return RequestKind::Control(ControlIntent::Stop);
    }

    RequestKind::PlayerPage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_paths() {
        assert_eq!(classify(&Method::GET, "/stream.mp3"), RequestKind::Stream);
        assert_eq!(classify(&Method::GET, "/audio"), RequestKind::Stream);
        assert_eq!(classify(&Method::GET, "/live/stream.mp3"), RequestKind::Stream);
    }

    #[test]
    fn test_page_paths() {
        assert_eq!(classify(&Method::GET, "/"), RequestKind::PlayerPage);
        assert_eq!(classify(&Method::GET, "/index.html"), RequestKind::PlayerPage);
        assert_eq!(classify(&Method::GET, "/favicon.ico"), RequestKind::PlayerPage);
    }

    #[test]
    fn test_control_paths() {
        assert_eq!(
            classify(&Method::GET, "/api/skip"),
            RequestKind::Control(ControlIntent::Skip)
        );
        assert_eq!(
            classify(&Method::GET, "/api/stop"),
            RequestKind::Control(ControlIntent::Stop)
        );
    }

    #[test]
    fn test_stream_wins_over_control() {
        // stream fragments are checked first
        assert_eq!(
            classify(&Method::GET, "/api/skip/stream.mp3"),
            RequestKind::Stream
        );
    }

    #[test]
    fn test_non_get_is_not_found() {
        assert_eq!(classify(&Method::POST, "/api/skip"), RequestKind::NotFound);
        assert_eq!(classify(&Method::HEAD, "/stream.mp3"), RequestKind::NotFound);
        assert_eq!(classify(&Method::DELETE, "/"), RequestKind::NotFound);
    }
}
