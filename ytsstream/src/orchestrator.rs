//! Stream orchestrator.
//!
//! One task owns the queue, the broadcast server and the pipeline state.
//! Commands from handles (console, HTTP control endpoints) and completion
//! events from the fetch/convert/broadcast tasks it spawns are processed in
//! order by that task; nothing else mutates the queue or the stream session.
//!
//! Every spawned piece of work is tagged with the id of the job that started
//! it. Skip and stop cancel the current job's token (killing subprocesses and
//! the producer) and forget the job, so late completions are ignored.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use ytsmedia::{
    is_collection_reference, stream_url, AddressProvider, ConvertRequest, Fetcher,
    MediaError, MediaMetadata, ProgressFn, Transcoder,
};
use ytsqueue::{Item, ItemStatus, Queue};
use ytsserver::{BroadcastServer, ControlIntent, ControlSink, SessionMetadata};

use crate::{
    error::{Result, StreamError},
    header::read_framing_header,
    history::{History, HistoryEntry},
    producer::{Producer, ProducerOutcome},
    settings::StreamSettings,
    status::{PipelineState, PipelineStatus},
};

/// External collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub addresses: Arc<dyn AddressProvider>,
}

enum Command {
    Submit(String),
    Skip,
    Previous,
    Stop,
    Remove {
        id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    History {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    ForgetHistory {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    ClearHistory {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

type JobId = u64;

enum Event {
    Metadata {
        job: JobId,
        item: Uuid,
        result: std::result::Result<MediaMetadata, MediaError>,
    },
    BackgroundMetadata {
        item: Uuid,
        result: std::result::Result<MediaMetadata, MediaError>,
    },
    Collection {
        /// `None` when resolved in the background while another item plays
        job: Option<JobId>,
        source: String,
        cancel: CancellationToken,
        result: std::result::Result<Vec<MediaMetadata>, MediaError>,
    },
    Progress {
        job: JobId,
        percent: f64,
    },
    Downloaded {
        job: JobId,
        result: std::result::Result<PathBuf, MediaError>,
    },
    Converted {
        job: JobId,
        result: std::result::Result<PathBuf, MediaError>,
    },
    BroadcastDone {
        job: JobId,
        result: Result<ProducerOutcome>,
    },
}

struct ActiveJob {
    id: JobId,
    /// `None` while a collection is being resolved in the foreground
    item: Option<Uuid>,
    cancel: CancellationToken,
    /// Files produced for this job, removed when it ends
    artifacts: Vec<PathBuf>,
}

/// Cloneable handle to the orchestrator task.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PipelineStatus>,
}

impl OrchestratorHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| StreamError::Closed)
    }

    /// Submits a source reference (single item or collection).
    pub fn submit(&self, source: impl Into<String>) -> Result<()> {
        self.send(Command::Submit(source.into()))
    }

    pub fn skip(&self) -> Result<()> {
        self.send(Command::Skip)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(Command::Previous)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Removes a queued item. Refused (`false`) for the item in the pipeline.
    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Remove { id, reply })?;
        rx.await.map_err(|_| StreamError::Closed)
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::History { reply })?;
        rx.await.map_err(|_| StreamError::Closed)
    }

    /// Removes one history entry, by [`HistoryEntry::key`].
    pub async fn forget_history(&self, key: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ForgetHistory {
            key: key.into(),
            reply,
        })?;
        rx.await.map_err(|_| StreamError::Closed)
    }

    pub async fn clear_history(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearHistory { reply })?;
        rx.await.map_err(|_| StreamError::Closed)
    }

    /// Stops the pipeline and ends the orchestrator task.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        rx.await.map_err(|_| StreamError::Closed)
    }

    /// Latest published status.
    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.clone()
    }
}

/// Control sink handed to the broadcast server.
///
/// The server is owned by the orchestrator, so it only keeps a weak sender:
/// the task ends once every [`OrchestratorHandle`] is dropped.
struct ServerControl {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl ControlSink for ServerControl {
    fn dispatch(&self, intent: ControlIntent) {
        let cmd = match intent {
            ControlIntent::Skip => Command::Skip,
            ControlIntent::Stop => Command::Stop,
        };
        let sent = self.tx.upgrade().is_some_and(|tx| tx.send(cmd).is_ok());
        if !sent {
            warn!(?intent, "Orchestrator gone, control intent dropped");
        }
    }
}

pub struct Orchestrator {
    queue: Queue,
    server: BroadcastServer,
    collaborators: Collaborators,
    settings: StreamSettings,
    history: Option<History>,
    /// Items whose metadata has been resolved
    resolved: HashSet<Uuid>,
    state: PipelineState,
    error: Option<String>,
    progress: f64,
    active: Option<ActiveJob>,
    next_job: JobId,
    /// Cancels fetches run outside the current job; replaced on stop
    background: CancellationToken,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<PipelineStatus>,
}

impl Orchestrator {
    /// Spawns the orchestrator task.
    ///
    /// The broadcast server is created here and starts listening when the
    /// first item is ready. The task ends on [`OrchestratorHandle::shutdown`]
    /// or once every handle has been dropped.
    pub fn spawn(
        collaborators: Collaborators,
        settings: StreamSettings,
        history: Option<History>,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PipelineStatus::default());

        let control = ServerControl {
            tx: cmd_tx.downgrade(),
        };
        let server = BroadcastServer::new(settings.server.clone(), Arc::new(control));
        let handle = OrchestratorHandle {
            tx: cmd_tx,
            status: status_rx,
        };

        let orchestrator = Orchestrator {
            queue: Queue::new(),
            server,
            collaborators,
            settings,
            history,
            resolved: HashSet::new(),
            state: PipelineState::Idle,
            error: None,
            progress: 0.0,
            active: None,
            next_job: 0,
            background: CancellationToken::new(),
            events: event_tx,
            status: status_tx,
        };

        let task = tokio::spawn(orchestrator.run(cmd_rx, event_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        info!("🎛️ Stream orchestrator started");
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        self.stop().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("All orchestrator handles dropped");
                        self.stop().await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }
        info!("Stream orchestrator stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(source) => self.submit(source).await,
            Command::Skip => self.skip().await,
            Command::Previous => self.previous().await,
            Command::Stop => self.stop().await,
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove(id));
            }
            Command::History { reply } => {
                let entries = self
                    .history
                    .as_ref()
                    .map(|h| h.entries().to_vec())
                    .unwrap_or_default();
                let _ = reply.send(entries);
            }
            Command::ForgetHistory { key, reply } => {
                let removed = self.history.as_mut().is_some_and(|h| h.remove(&key));
                if removed {
                    info!(key = %key, "History entry removed");
                }
                let _ = reply.send(removed);
            }
            Command::ClearHistory { reply } => {
                if let Some(history) = self.history.as_mut() {
                    history.clear();
                    info!("History cleared");
                }
                let _ = reply.send(());
            }
            Command::Shutdown { .. } => {}
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Metadata { job, item, result } => {
                if self.is_current(job) {
                    self.on_metadata(item, result);
                }
            }
            Event::BackgroundMetadata { item, result } => self.on_background_metadata(item, result),
            Event::Collection {
                job,
                source,
                cancel,
                result,
            } => {
                let stale = job.is_some_and(|job| !self.is_current(job)) || cancel.is_cancelled();
                if stale {
                    debug!(source = %source, "Dropping collection of a cancelled request");
                } else {
                    self.on_collection(job.is_some(), source, result);
                }
            }
            Event::Progress { job, percent } => {
                if self.is_current(job) {
                    self.on_progress(percent);
                }
            }
            Event::Downloaded { job, result } => {
                if self.is_current(job) {
                    self.on_downloaded(result);
                }
            }
            Event::Converted { job, result } => {
                if self.is_current(job) {
                    self.on_converted(result).await;
                }
            }
            Event::BroadcastDone { job, result } => {
                if self.is_current(job) {
                    self.on_broadcast_done(result).await;
                }
            }
        }
    }

    fn is_current(&self, job: JobId) -> bool {
        match &self.active {
            Some(active) if active.id == job => true,
            _ => {
                debug!(job, "Ignoring event from stale job");
                false
            }
        }
    }

    // ---- commands -------------------------------------------------------

    async fn submit(&mut self, source: String) {
        let source = source.trim().to_string();
        if source.is_empty() {
            return;
        }
        let busy = self.active.is_some();

        if is_collection_reference(&source) {
            info!(source = %source, busy, "Collection submitted");
            let (job, cancel) = if busy {
                (None, self.background.clone())
            } else {
                let cancel = CancellationToken::new();
                let id = self.begin_job(None, cancel.clone());
                self.set_state(PipelineState::FetchingMetadata);
                (Some(id), cancel)
            };
            self.spawn_collection(job, source, cancel);
            self.publish();
            return;
        }

        let item = Item::new(source);
        let id = item.id;
        info!(source = %item.source, busy, "Item submitted");
        self.queue.add(item);

        if busy {
            self.spawn_background_metadata(id);
            self.publish();
        } else {
            self.queue.select(id);
            self.start_item(id).await;
        }
    }

    async fn skip(&mut self) {
        self.cancel_active().await;
        match self.queue.next().map(|i| i.id) {
            Some(id) => {
                info!("⏭️ Skipping to next item");
                self.start_item(id).await;
            }
            None => {
                info!("Skip at end of queue, nothing left to play");
                self.go_quiet().await;
            }
        }
    }

    async fn previous(&mut self) {
        self.cancel_active().await;
        match self.queue.previous().map(|i| i.id) {
            Some(id) => {
                info!("⏮️ Back to previous item");
                self.start_item(id).await;
            }
            None => match self.queue.current().map(|i| i.id) {
                // already at the head: restart it
                Some(id) => self.start_item(id).await,
                None => self.go_quiet().await,
            },
        }
    }

    async fn stop(&mut self) {
        self.cancel_active().await;
        self.background.cancel();
        self.background = CancellationToken::new();
        if self.server.is_running() {
            self.server.stop().await;
        }
        self.error = None;
        self.progress = 0.0;
        self.set_state(PipelineState::Idle);
        info!("⏹️ Pipeline stopped");
        self.publish();
    }

    fn remove(&mut self, id: Uuid) -> bool {
        if self.active.as_ref().and_then(|a| a.item) == Some(id) {
            warn!(%id, "Refusing to remove the item in the pipeline");
            return false;
        }
        let removed = self.queue.remove(id).is_some();
        if removed {
            self.resolved.remove(&id);
            self.publish();
        }
        removed
    }

    // ---- pipeline -------------------------------------------------------

    fn begin_job(&mut self, item: Option<Uuid>, cancel: CancellationToken) -> JobId {
        self.next_job += 1;
        self.active = Some(ActiveJob {
            id: self.next_job,
            item,
            cancel,
            artifacts: Vec::new(),
        });
        self.error = None;
        self.progress = 0.0;
        self.next_job
    }

    /// Runs `id` through the pipeline, from metadata if it is still unknown,
    /// from download otherwise.
    async fn start_item(&mut self, id: Uuid) {
        self.cancel_active().await;

        let Some(source) = self.queue.get(id).map(|i| i.source.clone()) else {
            warn!(%id, "Item vanished before start");
            return;
        };

        let cancel = CancellationToken::new();
        let job = self.begin_job(Some(id), cancel.clone());
        if self.resolved.contains(&id) {
            self.begin_download(job, id, source);
        } else {
            self.set_state(PipelineState::FetchingMetadata);
            self.spawn_metadata(job, id, source, cancel);
        }
        self.publish();
    }

    fn begin_download(&mut self, job: JobId, id: Uuid, source: String) {
        self.update_item(id, |item| {
            item.status = ItemStatus::Downloading;
            item.set_progress(0.0);
        });
        self.progress = 0.0;
        self.set_state(PipelineState::Downloading);

        let Some(cancel) = self.active.as_ref().map(|a| a.cancel.clone()) else {
            return;
        };
        let fetcher = self.collaborators.fetcher.clone();
        let events = self.events.clone();
        let progress = self.progress_callback(job);
        tokio::spawn(async move {
            let result = fetcher.download(&source, progress, cancel).await;
            let _ = events.send(Event::Downloaded { job, result });
        });
    }

    fn on_metadata(&mut self, id: Uuid, result: std::result::Result<MediaMetadata, MediaError>) {
        match result {
            Ok(meta) => {
                self.apply_metadata(id, meta);
                let Some(job) = self.active.as_ref().map(|a| a.id) else {
                    return;
                };
                let Some(source) = self.queue.get(id).map(|i| i.source.clone()) else {
                    self.active = None;
                    self.set_state(PipelineState::Idle);
                    self.publish();
                    return;
                };
                self.begin_download(job, id, source);
                self.publish();
            }
            Err(e) => {
                // the item stays queued; an explicit skip or resubmit is needed
                error!(%id, error = %e, "Metadata resolution failed");
                self.active = None;
                self.fail(StreamError::from(e).to_string());
            }
        }
    }

    fn on_background_metadata(
        &mut self,
        id: Uuid,
        result: std::result::Result<MediaMetadata, MediaError>,
    ) {
        match result {
            Ok(meta) => {
                self.apply_metadata(id, meta);
                self.publish();
            }
            Err(MediaError::Cancelled) => debug!(%id, "Background metadata cancelled"),
            Err(e) => {
                warn!(%id, error = %e, "Background metadata resolution failed");
                self.error = Some(e.to_string());
                self.publish();
            }
        }
    }

    /// Enqueues the entries of a resolved collection. In the foreground, the
    /// first entry starts playing.
    fn on_collection(
        &mut self,
        foreground: bool,
        source: String,
        result: std::result::Result<Vec<MediaMetadata>, MediaError>,
    ) {
        let entries = match result {
            Ok(entries) => entries,
            Err(MediaError::Cancelled) => return,
            Err(e) => {
                error!(source = %source, error = %e, "Collection resolution failed");
                if foreground {
                    self.active = None;
                    self.fail(e.to_string());
                } else {
                    self.error = Some(e.to_string());
                    self.publish();
                }
                return;
            }
        };

        info!(source = %source, items = entries.len(), "Collection expanded");
        let mut first = None;
        for meta in entries {
            let mut item = Item::new(meta.canonical_url.clone());
            let id = item.id;
            fill_item(&mut item, meta);
            self.resolved.insert(id);
            self.queue.add(item);
            first.get_or_insert(id);
        }

        if foreground {
            // the collection job becomes the first item's pipeline
            match (first, self.active.as_ref().map(|a| a.id)) {
                (Some(id), Some(job)) => {
                    if let Some(active) = self.active.as_mut() {
                        active.item = Some(id);
                    }
                    self.queue.select(id);
                    let source = self
                        .queue
                        .get(id)
                        .map(|i| i.source.clone())
                        .unwrap_or_default();
                    self.begin_download(job, id, source);
                }
                _ => {
                    self.active = None;
                    self.set_state(PipelineState::Idle);
                }
            }
        }
        self.publish();
    }

    fn on_progress(&mut self, percent: f64) {
        let fraction = (percent / 100.0).clamp(0.0, 1.0);
        self.progress = fraction;
        if let Some(id) = self.active.as_ref().and_then(|a| a.item) {
            self.update_item(id, |item| item.set_progress(fraction));
        }
        self.publish();
    }

    fn on_downloaded(&mut self, result: std::result::Result<PathBuf, MediaError>) {
        let Some((job, id, cancel)) = self
            .active
            .as_ref()
            .and_then(|a| a.item.map(|item| (a.id, item, a.cancel.clone())))
        else {
            return;
        };

        let path = match result {
            Ok(path) => path,
            Err(e) => return self.fail_item(id, e),
        };
        if let Some(active) = self.active.as_mut() {
            active.artifacts.push(path.clone());
        }

        let Some(item) = self.update_item(id, |item| {
            item.status = ItemStatus::Converting;
            item.local_path = Some(path.clone());
            item.set_progress(0.0);
        }) else {
            return;
        };
        self.progress = 0.0;
        self.set_state(PipelineState::Converting);
        self.publish();

        let request = ConvertRequest {
            input: path,
            title: Some(item.title.clone()),
            artist: item.artist.clone(),
            thumbnail: item.thumbnail.clone(),
            duration: item.duration,
        };
        let transcoder = self.collaborators.transcoder.clone();
        let events = self.events.clone();
        let progress = self.progress_callback(job);
        tokio::spawn(async move {
            let result = transcoder.convert(request, progress, cancel).await;
            let _ = events.send(Event::Converted { job, result });
        });
    }

    async fn on_converted(&mut self, result: std::result::Result<PathBuf, MediaError>) {
        let Some((job, id, cancel)) = self
            .active
            .as_ref()
            .and_then(|a| a.item.map(|item| (a.id, item, a.cancel.clone())))
        else {
            return;
        };

        let path = match result {
            Ok(path) => path,
            Err(e) => return self.fail_item(id, e),
        };
        if let Some(active) = self.active.as_mut() {
            active.artifacts.push(path.clone());
        }

        if let Err(e) = self.start_serving(job, id, path, cancel).await {
            error!(%id, error = %e, "Cannot start broadcast");
            self.update_item(id, |item| item.status = ItemStatus::Failed);
            self.active = None;
            self.fail(e.to_string());
        }
    }

    /// Installs the new session, then starts the producer.
    ///
    /// The session (metadata + header) is in place before the producer is
    /// spawned, so no chunk of this track can precede its metadata.
    async fn start_serving(
        &mut self,
        job: JobId,
        id: Uuid,
        path: PathBuf,
        cancel: CancellationToken,
    ) -> Result<()> {
        if !self.server.is_running() {
            self.server.start().await?;
        }
        let hub = self.server.hub().ok_or(ytsserver::ServerError::NotRunning)?;

        let header = match read_framing_header(&path).await {
            Ok(header) => header,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read framing header");
                None
            }
        };

        let Some(item) = self.update_item(id, |item| {
            item.status = ItemStatus::Playing;
            item.local_path = Some(path.clone());
            item.set_progress(1.0);
        }) else {
            return Ok(());
        };

        let metadata = SessionMetadata {
            title: item.title.clone(),
            artist: item.artist.clone(),
            thumbnail: item.thumbnail.clone(),
        };
        let generation = hub.update_session(metadata, header).await?;

        if let Some(history) = self.history.as_mut() {
            history.add(&item);
        }

        let producer = Producer {
            hub,
            generation,
            path,
            settings: self.settings.clone(),
            cancel,
        };
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = producer.run().await;
            let _ = events.send(Event::BroadcastDone { job, result });
        });

        self.progress = 1.0;
        self.set_state(PipelineState::Serving);
        info!("▶️ Now playing: {}", item.display_name());
        self.publish();
        Ok(())
    }

    async fn on_broadcast_done(&mut self, result: Result<ProducerOutcome>) {
        match result {
            Ok(ProducerOutcome::Completed) => {
                debug!("Broadcast complete, advancing");
                self.finish_active().await;
                match self.queue.next().map(|i| i.id) {
                    Some(id) => self.start_item(id).await,
                    None => {
                        info!("Queue exhausted, waiting for new submissions");
                        self.go_quiet().await;
                    }
                }
            }
            Ok(ProducerOutcome::Cancelled) => {}
            Err(e) => {
                error!(error = %e, "Broadcast producer failed");
                self.finish_active().await;
                self.fail(e.to_string());
            }
        }
    }

    // ---- helpers --------------------------------------------------------

    /// Cancels the current job and rolls its item back to a resting status.
    async fn cancel_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        debug!(job = active.id, "Job cancelled");

        if let Some(id) = active.item {
            self.update_item(id, |item| {
                item.status = match item.status {
                    ItemStatus::Downloading | ItemStatus::Converting => ItemStatus::Queued,
                    ItemStatus::Playing => ItemStatus::Ready,
                    other => other,
                };
                item.local_path = None;
                item.set_progress(0.0);
            });
        }
        remove_artifacts(active.artifacts).await;
        self.progress = 0.0;
    }

    /// Ends the current job after a complete broadcast.
    async fn finish_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if let Some(id) = active.item {
            self.update_item(id, |item| {
                item.status = ItemStatus::Ready;
                item.local_path = None;
            });
        }
        remove_artifacts(active.artifacts).await;
    }

    /// Serving, with nothing on air.
    async fn go_quiet(&mut self) {
        if self.server.is_running() {
            if let Err(e) = self.server.clear_session().await {
                warn!(error = %e, "Cannot clear stream session");
            }
            self.set_state(PipelineState::Serving);
        } else {
            self.set_state(PipelineState::Idle);
        }
        self.progress = 0.0;
        self.publish();
    }

    fn fail_item(&mut self, id: Uuid, e: MediaError) {
        if matches!(e, MediaError::Cancelled) {
            return;
        }
        error!(%id, error = %e, "Pipeline failed");
        self.update_item(id, |item| item.status = ItemStatus::Failed);
        if let Some(active) = self.active.take() {
            let artifacts = active.artifacts;
            tokio::spawn(remove_artifacts(artifacts));
        }
        self.fail(e.to_string());
    }

    fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.progress = 0.0;
        self.set_state(PipelineState::Error);
        self.publish();
    }

    fn apply_metadata(&mut self, id: Uuid, meta: MediaMetadata) {
        if self.update_item(id, |item| fill_item(item, meta)).is_some() {
            self.resolved.insert(id);
        }
    }

    /// Mutates an item in place and returns a copy of the result.
    fn update_item(&mut self, id: Uuid, f: impl FnOnce(&mut Item)) -> Option<Item> {
        let item = self.queue.get_mut(id)?;
        f(item);
        Some(item.clone())
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Pipeline state");
            self.state = state;
        }
    }

    fn progress_callback(&self, job: JobId) -> ProgressFn {
        let events = self.events.clone();
        Arc::new(move |percent: f64| {
            let _ = events.send(Event::Progress { job, percent });
        })
    }

    fn spawn_metadata(&self, job: JobId, item: Uuid, source: String, cancel: CancellationToken) {
        let fetcher = self.collaborators.fetcher.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch_metadata(&source, cancel).await;
            let _ = events.send(Event::Metadata { job, item, result });
        });
    }

    fn spawn_background_metadata(&self, item: Uuid) {
        let Some(source) = self.queue.get(item).map(|i| i.source.clone()) else {
            return;
        };
        let fetcher = self.collaborators.fetcher.clone();
        let events = self.events.clone();
        let cancel = self.background.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch_metadata(&source, cancel).await;
            let _ = events.send(Event::BackgroundMetadata { item, result });
        });
    }

    fn spawn_collection(&self, job: Option<JobId>, source: String, cancel: CancellationToken) {
        let fetcher = self.collaborators.fetcher.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = fetcher
                .fetch_collection_metadata(&source, cancel.clone())
                .await;
            let _ = events.send(Event::Collection {
                job,
                source,
                cancel,
                result,
            });
        });
    }

    fn publish(&self) {
        let current = self
            .active
            .as_ref()
            .and_then(|a| a.item)
            .and_then(|id| self.queue.get(id))
            .or_else(|| self.queue.current())
            .cloned();

        let port = self.server.port();
        let stream_url = port.map(|port| {
            let address = self
                .collaborators
                .addresses
                .current_lan_address()
                .unwrap_or(self.settings.server.bind_address);
            stream_url(address, port)
        });

        let status = PipelineStatus {
            state: self.state,
            current,
            progress: self.progress,
            stream_url,
            port,
            error: self.error.clone(),
            queue: self.queue.items().to_vec(),
            current_index: self.queue.current_index(),
        };
        self.status.send_replace(status);
    }
}

fn fill_item(item: &mut Item, meta: MediaMetadata) {
    item.title = meta.title;
    item.artist = meta.artist;
    item.thumbnail = meta.thumbnail;
    item.duration = meta.duration;
}

async fn remove_artifacts(paths: Vec<PathBuf>) {
    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed work file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove work file"),
        }
    }
}
