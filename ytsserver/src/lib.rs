//! # ytsserver - Multi-listener audio broadcast server
//!
//! This crate terminates HTTP connections and fans one audio byte stream out
//! to any number of listeners.
//!
//! ## Architecture
//!
//! - [`BroadcastServer`] : bind with port retry, serve, idempotent stop
//! - [`HubHandle`] : handle to the single task owning the listener set and the
//!   [`StreamSession`] (metadata + cached framing header); every mutation
//!   goes through it as a message
//! - [`classify`] : path-fragment request routing (stream, player page,
//!   control, 404)
//! - [`ControlSink`] : where `/api/skip` and `/api/stop` intents are sent
//! - [`logs`] : tracing subscriber initialisation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use ytsserver::{BroadcastOptions, BroadcastServer, IgnoreControl, SessionMetadata};
//!
//! # async fn demo() -> ytsserver::Result<()> {
//! let mut server = BroadcastServer::new(BroadcastOptions::default(), Arc::new(IgnoreControl));
//! let port = server.start().await?;
//!
//! server
//!     .update_session(
//!         SessionMetadata { title: "Song A".into(), ..Default::default() },
//!         None,
//!     )
//!     .await?;
//! server.broadcast(Bytes::from_static(b"...")).await?;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config_ext;
mod control;
mod error;
mod http;
mod hub;
mod listeners;
pub mod logs;
mod page;
mod routing;
mod server;
mod session;

pub use config_ext::BroadcastConfigExt;
pub use control::{ControlSink, IgnoreControl};
pub use error::{Result, ServerError};
pub use http::{router, HttpState};
pub use hub::{spawn_hub, HubHandle, Subscription};
pub use listeners::ListenerId;
pub use page::{escape_html, render_player_page};
pub use routing::{classify, ControlIntent, RequestKind};
pub use server::{bind_with_retry, BroadcastOptions, BroadcastServer};
pub use session::{SessionMetadata, StreamSession};
