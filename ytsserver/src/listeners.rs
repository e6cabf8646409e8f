//! Set of live stream listeners.
//!
//! Each listener is the sending half of a bounded channel whose receiving
//! half feeds one HTTP response body. Sends never block: a closed channel or
//! a full buffer counts as a failed send and detaches that listener only.

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

pub type ListenerId = u64;

#[derive(Debug)]
struct Listener {
    id: ListenerId,
    tx: mpsc::Sender<Bytes>,
}

/// Owned by the stream hub; listeners leave it through `broadcast` or `prune`.
#[derive(Debug, Default)]
pub(crate) struct ListenerSet {
    next_id: ListenerId,
    listeners: Vec<Listener>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tx: mpsc::Sender<Bytes>) -> ListenerId {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push(Listener { id, tx });
        id
    }

    /// Drops listeners whose receiving side is gone. Returns how many.
    pub fn prune(&mut self) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| !l.tx.is_closed());
        let removed = before - self.listeners.len();
        if removed > 0 {
            debug!(removed, remaining = self.listeners.len(), "Pruned closed listeners");
        }
        removed
    }

    /// Sends `chunk` to every listener and returns the number of successful sends.
    ///
    /// Closed listeners are pruned first. A listener whose send fails is
    /// removed; the chunk is not retried for it.
    pub fn broadcast(&mut self, chunk: &Bytes) -> usize {
        self.prune();

        let mut delivered = 0;
        self.listeners.retain(|l| match l.tx.try_send(chunk.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(listener = l.id, "Listener buffer full, detaching");
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(listener = l.id, "Listener closed during broadcast");
                false
            }
        });
        delivered
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_failed_listener_is_removed_others_still_served() {
        let mut set = ListenerSet::new();
        let mut receivers = Vec::new();
        for _ in 0..4 {
            let (tx, rx) = mpsc::channel(8);
            set.add(tx);
            receivers.push(Some(rx));
        }

        // listener #2 goes away
        receivers[2] = None;

        assert_eq!(set.broadcast(&chunk("a")), 3);
        assert_eq!(set.len(), 3);
        assert_eq!(set.broadcast(&chunk("b")), 3);

        for rx in receivers.iter_mut().flatten() {
            assert_eq!(rx.try_recv().unwrap(), chunk("a"));
            assert_eq!(rx.try_recv().unwrap(), chunk("b"));
        }
    }

    #[test]
    fn test_full_listener_is_detached() {
        let mut set = ListenerSet::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        set.add(slow_tx);
        set.add(fast_tx);

        assert_eq!(set.broadcast(&chunk("1")), 2);
        // slow listener never drains its single slot
        assert_eq!(set.broadcast(&chunk("2")), 1);
        assert_eq!(set.len(), 1);
        assert_eq!(set.broadcast(&chunk("3")), 1);

        assert_eq!(slow_rx.try_recv().unwrap(), chunk("1"));
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(fast_rx.try_recv().unwrap(), chunk("1"));
        assert_eq!(fast_rx.try_recv().unwrap(), chunk("2"));
        assert_eq!(fast_rx.try_recv().unwrap(), chunk("3"));
    }

    #[test]
    fn test_prune_closed_listeners() {
        let mut set = ListenerSet::new();
        let (tx1, rx1) = mpsc::channel(1);
        let (tx2, rx2) = mpsc::channel(1);
        let id1 = set.add(tx1);
        let id2 = set.add(tx2);
        assert_ne!(id1, id2);

        drop(rx1);
        assert_eq!(set.prune(), 1);
        assert_eq!(set.len(), 1);
        assert_eq!(set.prune(), 0);

        drop(rx2);
        assert_eq!(set.broadcast(&chunk("x")), 0);
        assert_eq!(set.len(), 0);
    }
}
