use tokio::sync::mpsc;
use tracing::warn;

use crate::ControlIntent;

/// Receiver of remote-control intents coming from HTTP clients.
///
/// `dispatch` is called from connection-handling tasks and must not block:
/// implementations hand the intent off to their owning task and return.
pub trait ControlSink: Send + Sync + 'static {
    fn dispatch(&self, intent: ControlIntent);
}

impl ControlSink for mpsc::UnboundedSender<ControlIntent> {
    fn dispatch(&self, intent: ControlIntent) {
        if self.send(intent).is_err() {
            warn!(?intent, "Control intent dropped, receiver is gone");
        }
    }
}

/// Sink that ignores every intent.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreControl;

impl ControlSink for IgnoreControl {
    fn dispatch(&self, intent: ControlIntent) {
        warn!(?intent, "No control sink installed, ignoring intent");
    }
}
