//! Membership registry of upstream servers.
//!
//! The registry is the ground truth for which upstreams get queried.  It is
//! written by the discovery listener (additions) and by the aggregator
//! (evictions), and read once per fan-out round through [`Registry::snapshot`].
//!
//! Alongside the set the registry owns a best-effort notification mailbox
//! with room for a single address.  Every [`Registry::add`] tries to drop the
//! address into the mailbox; if it is already full the event is discarded.
//! Consumers of [`Registry::subscribe`] therefore see *some* of the
//! additions, never necessarily all of them, and must call `snapshot` when
//! they need the actual membership.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::types::UpstreamAddress;

/// Capacity of the notification mailbox.
const MAILBOX_CAPACITY: usize = 1;

/// Thread-safe set of known upstream addresses.
///
/// Cloning is cheap and every clone refers to the same membership.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    members: HashSet<UpstreamAddress>,
    mailbox: Option<Mailbox>,
}

struct Mailbox {
    tx: mpsc::Sender<UpstreamAddress>,
    rx: Arc<Mutex<mpsc::Receiver<UpstreamAddress>>>,
}

impl Mailbox {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// Read side of the registry's notification mailbox.
///
/// All handles returned by [`Registry::subscribe`] drain the same mailbox,
/// so an address delivered to one handle is not delivered to another.
#[derive(Clone)]
pub struct Notifications {
    rx: Arc<Mutex<mpsc::Receiver<UpstreamAddress>>>,
}

impl Notifications {
    /// Waits for the next announced address.
    ///
    /// Returns `None` only once the registry and all its clones are gone.
    pub async fn recv(&self) -> Option<UpstreamAddress> {
        self.rx.lock().await.recv().await
    }

    /// Takes the pending address, if any, without waiting.
    pub async fn try_recv(&self) -> Option<UpstreamAddress> {
        self.rx.lock().await.try_recv().ok()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `addr` as a member and posts it to the notification mailbox.
    ///
    /// Adding an existing member leaves the set untouched but still posts a
    /// notification.
    pub async fn add(&self, addr: UpstreamAddress) {
        let mut inner = self.inner.write().await;
        if !inner.members.contains(&addr) {
            debug!("upstream server discovered: {}", addr);
            inner.members.insert(addr.clone());
        }
        // Full mailbox means the event is dropped; membership is already recorded.
        let _ = inner.mailbox.get_or_insert_with(Mailbox::new).tx.try_send(addr);
    }

    /// Drops `addr` from the membership. Unknown addresses are ignored.
    pub async fn remove(&self, addr: &UpstreamAddress) {
        let mut inner = self.inner.write().await;
        if inner.members.remove(addr) {
            debug!("upstream server deleted: {}", addr);
        }
    }

    /// Copy of the current membership, in no particular order.
    pub async fn snapshot(&self) -> Vec<UpstreamAddress> {
        let inner = self.inner.read().await;
        inner.members.iter().cloned().collect()
    }

    pub async fn contains(&self, addr: &UpstreamAddress) -> bool {
        self.inner.read().await.members.contains(addr)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.members.is_empty()
    }

    /// Returns the notification mailbox, creating it on first use.
    pub async fn subscribe(&self) -> Notifications {
        let mut inner = self.inner.write().await;
        let mailbox = inner.mailbox.get_or_insert_with(Mailbox::new);
        Notifications {
            rx: Arc::clone(&mailbox.rx),
        }
    }
}
