//! Broadcast server lifecycle: bind with retry, serve, stop.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    control::ControlSink,
    error::{Result, ServerError},
    http::{router, HttpState},
    hub::{spawn_hub, HubHandle},
    session::{SessionMetadata, StreamSession},
};

/// Time left to open connections before they are aborted
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Broadcast server options
#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    /// Display name (logs, player page, `icy-name`)
    pub name: String,
    pub bind_address: IpAddr,
    /// Preferred port; the bound port may be higher if it is taken
    pub port: u16,
    /// Number of consecutive ports tried, starting at `port`
    pub bind_attempts: u16,
    /// Chunks buffered per listener before it is detached as too slow
    pub listener_capacity: usize,
    pub page_refresh_secs: u64,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            name: "YTStreamer".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            bind_attempts: 10,
            listener_capacity: 1024,
            page_refresh_secs: 30,
        }
    }
}

struct RunningServer {
    port: u16,
    hub: HubHandle,
    shutdown: CancellationToken,
    serve_task: JoinHandle<()>,
    hub_task: JoinHandle<()>,
}

/// Multi-listener HTTP audio broadcast server.
pub struct BroadcastServer {
    options: BroadcastOptions,
    control: Arc<dyn ControlSink>,
    running: Option<RunningServer>,
}

/// Binds `address:port`, retrying on the following ports.
///
/// Returns the listener and the port actually bound. Port `0` asks the OS
/// for an ephemeral port and is never retried.
pub async fn bind_with_retry(
    address: IpAddr,
    port: u16,
    attempts: u16,
) -> Result<(TcpListener, u16)> {
    let attempts = attempts.max(1);
    let mut last_error = String::from("no port available");

    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };

        match TcpListener::bind(SocketAddr::new(address, candidate)).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                if offset > 0 {
                    info!(requested = port, bound, "Preferred port busy, bound to next free port");
                }
                return Ok((listener, bound));
            }
            Err(e) => {
                warn!(port = candidate, error = %e, "Bind failed");
                last_error = e.to_string();
                if port == 0 {
                    break;
                }
            }
        }
    }

    Err(ServerError::BindFailed {
        port,
        attempts,
        last_error,
    })
}

impl BroadcastServer {
    pub fn new(options: BroadcastOptions, control: Arc<dyn ControlSink>) -> Self {
        Self {
            options,
            control,
            running: None,
        }
    }

    pub fn options(&self) -> &BroadcastOptions {
        &self.options
    }

    /// Starts listening. Returns the bound port.
    ///
    /// Calling `start` on a running server is a no-op returning the current port.
    pub async fn start(&mut self) -> Result<u16> {
        if let Some(running) = &self.running {
            return Ok(running.port);
        }

        let (listener, port) = bind_with_retry(
            self.options.bind_address,
            self.options.port,
            self.options.bind_attempts,
        )
        .await?;

        let (hub, hub_task) = spawn_hub(self.options.listener_capacity);
        let shutdown = CancellationToken::new();

        let app = router(HttpState {
            server_name: self.options.name.clone(),
            page_refresh_secs: self.options.page_refresh_secs,
            hub: hub.clone(),
            control: self.control.clone(),
            shutdown: shutdown.clone(),
        });

        let signal = shutdown.clone().cancelled_owned();
        let serve_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "HTTP server terminated with error");
            }
        });

        info!(
            "📡 {} broadcasting on http://{}:{}/stream.mp3",
            self.options.name, self.options.bind_address, port
        );

        self.running = Some(RunningServer {
            port,
            hub,
            shutdown,
            serve_task,
            hub_task,
        });
        Ok(port)
    }

    /// Stops the server: closes the listening socket, detaches every listener,
    /// drops the session. Safe to call on a stopped server.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Broadcast server already stopped");
            return;
        };

        let RunningServer {
            port,
            hub,
            shutdown,
            mut serve_task,
            mut hub_task,
        } = running;

        shutdown.cancel();
        if hub.close().await.is_err() {
            debug!("Stream hub already gone");
        }

        if tokio::time::timeout(STOP_GRACE, &mut serve_task).await.is_err() {
            warn!(port, "Connections still open after grace period, aborting");
            serve_task.abort();
        }
        if tokio::time::timeout(STOP_GRACE, &mut hub_task).await.is_err() {
            hub_task.abort();
        }

        info!(port, "Broadcast server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Port actually bound, while running.
    pub fn port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.port)
    }

    /// Handle to the stream hub, for producers running in their own task.
    pub fn hub(&self) -> Option<HubHandle> {
        self.running.as_ref().map(|r| r.hub.clone())
    }

    fn running_hub(&self) -> Result<&HubHandle> {
        self.running
            .as_ref()
            .map(|r| &r.hub)
            .ok_or(ServerError::NotRunning)
    }

    /// Installs metadata and header for the next track. Returns its generation.
    pub async fn update_session(
        &self,
        metadata: SessionMetadata,
        header: Option<Bytes>,
    ) -> Result<u64> {
        self.running_hub()?.update_session(metadata, header).await
    }

    pub async fn clear_session(&self) -> Result<u64> {
        self.running_hub()?.clear_session().await
    }

    pub async fn session(&self) -> Result<StreamSession> {
        self.running_hub()?.session().await
    }

    /// Best-effort fan-out of `chunk` to every listener.
    pub async fn broadcast(&self, chunk: Bytes) -> Result<usize> {
        self.running_hub()?.broadcast(chunk).await
    }

    pub async fn listener_count(&self) -> Result<usize> {
        self.running_hub()?.listener_count().await
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.cancel();
            running.serve_task.abort();
            running.hub_task.abort();
        }
    }
}
