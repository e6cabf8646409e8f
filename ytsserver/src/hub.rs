//! Stream hub: single owner of the listener set and the stream session.
//!
//! Every mutation (join, broadcast, session swap) is a message processed in
//! order by one task, so a listener can never observe a half-updated session
//! and a broadcast never interleaves with a join.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::{
    error::{Result, ServerError},
    listeners::{ListenerId, ListenerSet},
    session::{SessionMetadata, StreamSession},
};

const COMMAND_BUFFER: usize = 256;

/// Result of a successful join: the listener's chunk feed.
#[derive(Debug)]
pub struct Subscription {
    pub id: ListenerId,
    pub rx: mpsc::Receiver<Bytes>,
}

enum HubCommand {
    Snapshot {
        reply: oneshot::Sender<StreamSession>,
    },
    Join {
        seen_generation: u64,
        reply: oneshot::Sender<Subscription>,
    },
    Broadcast {
        generation: Option<u64>,
        chunk: Bytes,
        reply: oneshot::Sender<usize>,
    },
    UpdateSession {
        metadata: SessionMetadata,
        header: Option<Bytes>,
        reply: oneshot::Sender<u64>,
    },
    ClearSession {
        reply: oneshot::Sender<u64>,
    },
    ListenerCount {
        reply: oneshot::Sender<usize>,
    },
    Close,
}

/// Cloneable handle to a running hub task.
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HubCommand::Snapshot { .. } => "Snapshot",
            HubCommand::Join { .. } => "Join",
            HubCommand::Broadcast { .. } => "Broadcast",
            HubCommand::UpdateSession { .. } => "UpdateSession",
            HubCommand::ClearSession { .. } => "ClearSession",
            HubCommand::ListenerCount { .. } => "ListenerCount",
            HubCommand::Close => "Close",
        };
        f.write_str(name)
    }
}

impl HubHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> HubCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ServerError::HubClosed)?;
        rx.await.map_err(|_| ServerError::HubClosed)
    }

    /// Current session (metadata, cached header and generation).
    pub async fn session(&self) -> Result<StreamSession> {
        self.request(|reply| HubCommand::Snapshot { reply }).await
    }

    /// Registers a new listener.
    ///
    /// `seen_generation` is the generation whose header the caller already
    /// sent to its client. If the session moved on since, the current header
    /// is queued on the new feed ahead of any chunk.
    pub async fn join(&self, seen_generation: u64) -> Result<Subscription> {
        self.request(|reply| HubCommand::Join {
            seen_generation,
            reply,
        })
        .await
    }

    /// Sends a chunk to every listener. Returns the number of listeners reached.
    pub async fn broadcast(&self, chunk: Bytes) -> Result<usize> {
        self.request(|reply| HubCommand::Broadcast {
            generation: None,
            chunk,
            reply,
        })
        .await
    }

    /// Like [`broadcast`](Self::broadcast), but only if `generation` is still
    /// the current session. Stale chunks are dropped and reach no one.
    pub async fn broadcast_for(&self, generation: u64, chunk: Bytes) -> Result<usize> {
        self.request(|reply| HubCommand::Broadcast {
            generation: Some(generation),
            chunk,
            reply,
        })
        .await
    }

    /// Installs new metadata and framing header in one step.
    ///
    /// Returns the new session generation.
    pub async fn update_session(
        &self,
        metadata: SessionMetadata,
        header: Option<Bytes>,
    ) -> Result<u64> {
        self.request(|reply| HubCommand::UpdateSession {
            metadata,
            header,
            reply,
        })
        .await
    }

    /// Drops metadata and header. Returns the new generation.
    pub async fn clear_session(&self) -> Result<u64> {
        self.request(|reply| HubCommand::ClearSession { reply }).await
    }

    pub async fn listener_count(&self) -> Result<usize> {
        self.request(|reply| HubCommand::ListenerCount { reply })
            .await
    }

    /// Detaches every listener and ends the hub task.
    pub async fn close(&self) -> Result<()> {
        self.tx
            .send(HubCommand::Close)
            .await
            .map_err(|_| ServerError::HubClosed)
    }
}

/// Owner state of the hub task.
struct StreamHub {
    listeners: ListenerSet,
    session: StreamSession,
    listener_capacity: usize,
}

impl StreamHub {
    fn join(&mut self, seen_generation: u64) -> Subscription {
        let (tx, rx) = mpsc::channel(self.listener_capacity);

        if seen_generation != self.session.generation {
            if let Some(header) = &self.session.header {
                trace!(
                    seen_generation,
                    generation = self.session.generation,
                    "Replaying newer header to joining listener"
                );
                // fresh channel, capacity >= 1
                let _ = tx.try_send(header.clone());
            }
        }

        let id = self.listeners.add(tx);
        debug!(listener = id, listeners = self.listeners.len(), "Listener joined");
        Subscription { id, rx }
    }

    fn broadcast(&mut self, generation: Option<u64>, chunk: &Bytes) -> usize {
        if let Some(generation) = generation {
            if generation != self.session.generation {
                trace!(
                    generation,
                    current = self.session.generation,
                    "Dropping chunk from stale session"
                );
                return 0;
            }
        }
        self.listeners.broadcast(chunk)
    }

    fn update_session(&mut self, metadata: SessionMetadata, header: Option<Bytes>) -> u64 {
        self.session.generation += 1;
        info!(
            title = %metadata.title,
            generation = self.session.generation,
            header_len = header.as_ref().map(Bytes::len).unwrap_or(0),
            "Stream session updated"
        );
        self.session.metadata = Some(metadata);
        self.session.header = header;
        self.session.generation
    }

    fn clear_session(&mut self) -> u64 {
        self.session.generation += 1;
        self.session.metadata = None;
        self.session.header = None;
        debug!(generation = self.session.generation, "Stream session cleared");
        self.session.generation
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                HubCommand::Snapshot { reply } => {
                    let _ = reply.send(self.session.clone());
                }
                HubCommand::Join {
                    seen_generation,
                    reply,
                } => {
                    let subscription = self.join(seen_generation);
                    // if the requester is gone, its feed is dropped with the
                    // subscription and pruned on the next broadcast
                    let _ = reply.send(subscription);
                }
                HubCommand::Broadcast {
                    generation,
                    chunk,
                    reply,
                } => {
                    let _ = reply.send(self.broadcast(generation, &chunk));
                }
                HubCommand::UpdateSession {
                    metadata,
                    header,
                    reply,
                } => {
                    let _ = reply.send(self.update_session(metadata, header));
                }
                HubCommand::ClearSession { reply } => {
                    let _ = reply.send(self.clear_session());
                }
                HubCommand::ListenerCount { reply } => {
                    self.listeners.prune();
                    let _ = reply.send(self.listeners.len());
                }
                HubCommand::Close => break,
            }
        }

        let detached = self.listeners.len();
        self.listeners.clear();
        debug!(detached, "Stream hub stopped");
    }
}

/// Spawns a hub task and returns its handle.
///
/// `listener_capacity` is the number of chunks buffered per listener before
/// it is considered too slow and detached.
pub fn spawn_hub(listener_capacity: usize) -> (HubHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let hub = StreamHub {
        listeners: ListenerSet::new(),
        session: StreamSession::default(),
        listener_capacity: listener_capacity.max(1),
    };
    let task = tokio::spawn(hub.run(rx));
    (HubHandle { tx }, task)
}
