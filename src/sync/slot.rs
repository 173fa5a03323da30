use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::debug;

/// What a view shows for one fetched resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Loading,
    Loaded(T),
    /// Read failed; the view renders the message instead of data.
    Failed(String),
}

impl<T> Loadable<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Loadable::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }
}

/// Sequence number handed out when a fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Snapshot<T> {
    applied: u64,
    value: Loadable<T>,
}

/// Holds the most recently *started* fetch result that has completed.
///
/// A result whose ticket is older than the last applied one is dropped, so
/// completion order never decides what is shown.
pub struct LatestSlot<T> {
    issued: AtomicU64,
    state: watch::Sender<Snapshot<T>>,
}

impl<T: Clone> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> LatestSlot<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Snapshot {
            applied: 0,
            value: Loadable::Loading,
        });
        Self {
            issued: AtomicU64::new(0),
            state,
        }
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Stores `value` unless a newer ticket already landed. Returns whether
    /// it was stored.
    pub fn apply(&self, ticket: Ticket, value: Loadable<T>) -> bool {
        let mut stale_behind = 0;
        let applied = self.state.send_if_modified(|snapshot| {
            if ticket.0 > snapshot.applied {
                snapshot.applied = ticket.0;
                snapshot.value = value;
                true
            } else {
                stale_behind = snapshot.applied;
                false
            }
        });
        if !applied {
            debug!(seq = ticket.0, applied = stale_behind, "discarding stale fetch result");
        }
        applied
    }

    pub fn get(&self) -> Loadable<T> {
        self.state.borrow().value.clone()
    }

    pub fn applied_seq(&self) -> u64 {
        self.state.borrow().applied
    }

    pub fn updates(&self) -> SlotUpdates<T> {
        SlotUpdates {
            rx: self.state.subscribe(),
        }
    }
}

/// Stream of applied values, newest only.
pub struct SlotUpdates<T> {
    rx: watch::Receiver<Snapshot<T>>,
}

impl<T: Clone> SlotUpdates<T> {
    /// Waits for the next applied value. `None` once the slot is gone.
    pub async fn next(&mut self) -> Option<Loadable<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().value.clone())
    }
}
