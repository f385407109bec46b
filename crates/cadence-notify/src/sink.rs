//! The process-wide notification store.

use std::sync::Arc;

use cadence_core::{NotificationId, SessionKey};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::native::{NativeNotifier, NoopNotifier, Permission};
use crate::types::{NewNotification, Notification, NotificationKind, NotificationSnapshot};

/// Ordered store of user-facing notifications, newest first.
///
/// All mutations run under one lock and publish a fresh
/// [`NotificationSnapshot`] before the lock is released, so subscribers see
/// mutations in the order they happened. The unread count is recomputed
/// from the list on every read and every publish.
pub struct NotificationSink {
    entries: Mutex<Vec<Notification>>,
    /// `0` keeps everything.
    max_retained: usize,
    native: Arc<dyn NativeNotifier>,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
}

impl NotificationSink {
    /// Create a sink with no native channel.
    pub fn new(max_retained: usize) -> Self {
        Self::with_native(max_retained, Arc::new(NoopNotifier))
    }

    /// Create a sink that forwards new entries to `native` when permitted.
    pub fn with_native(max_retained: usize, native: Arc<dyn NativeNotifier>) -> Self {
        let (snapshot_tx, _) = watch::channel(NotificationSnapshot::default());
        Self {
            entries: Mutex::new(Vec::new()),
            max_retained,
            native,
            snapshot_tx,
        }
    }

    /// Add a notification at the front of the list and return its new ID.
    pub fn add(&self, notification: NewNotification) -> NotificationId {
        let stored = {
            let mut entries = self.entries.lock();
            self.insert_locked(&mut entries, notification)
        };
        self.deliver_native(&stored);
        stored.id
    }

    /// Add unless an entry of the same kind already exists for the same
    /// conversation, in which case that entry's ID is returned.
    ///
    /// The lookup and the insert happen under one lock. Without a
    /// conversation ID this behaves like [`add`](Self::add).
    pub fn add_for_conversation(&self, notification: NewNotification) -> NotificationId {
        let stored = {
            let mut entries = self.entries.lock();
            if let Some(conversation_id) = notification.conversation_id.as_ref() {
                if let Some(existing) = find(&entries, conversation_id, notification.kind) {
                    debug!(
                        notification_id = %existing,
                        conversation_id = %conversation_id,
                        "duplicate notification suppressed"
                    );
                    return existing;
                }
            }
            self.insert_locked(&mut entries, notification)
        };
        self.deliver_native(&stored);
        stored.id
    }

    /// Mark one entry read. Unknown or already-read IDs are a no-op.
    pub fn mark_read(&self, id: &NotificationId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|n| &n.id == id && !n.is_read) {
            entry.is_read = true;
            self.publish(&entries);
        }
    }

    /// Mark every entry read.
    pub fn mark_all_read(&self) {
        let mut entries = self.entries.lock();
        let mut changed = false;
        for entry in entries.iter_mut().filter(|n| !n.is_read) {
            entry.is_read = true;
            changed = true;
        }
        if changed {
            self.publish(&entries);
        }
    }

    /// Remove one entry. Unknown IDs are a no-op.
    pub fn remove(&self, id: &NotificationId) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|n| &n.id != id);
        if entries.len() != before {
            self.publish(&entries);
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            entries.clear();
            self.publish(&entries);
        }
    }

    /// Number of unread entries.
    pub fn unread_count(&self) -> usize {
        unread(&self.entries.lock())
    }

    /// Copy of all entries, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    /// Copy of one entry.
    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.entries.lock().iter().find(|n| &n.id == id).cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the sink holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> NotificationSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshots published after each mutation.
    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn insert_locked(&self, entries: &mut Vec<Notification>, notification: NewNotification) -> Notification {
        let stored = notification.into_notification(NotificationId::generate());
        entries.insert(0, stored.clone());
        self.evict(entries);
        self.publish(entries);
        debug!(notification_id = %stored.id, kind = stored.kind.as_str(), "notification added");
        stored
    }

    /// Drop the oldest entries beyond the retention cap, read ones first.
    fn evict(&self, entries: &mut Vec<Notification>) {
        if self.max_retained == 0 {
            return;
        }
        while entries.len() > self.max_retained {
            let victim = entries
                .iter()
                .rposition(|n| n.is_read)
                .unwrap_or(entries.len() - 1);
            let evicted = entries.remove(victim);
            debug!(notification_id = %evicted.id, "notification evicted");
        }
    }

    fn publish(&self, entries: &[Notification]) {
        let _ = self.snapshot_tx.send_replace(NotificationSnapshot {
            items: entries.into(),
            unread_count: unread(entries),
        });
    }

    fn deliver_native(&self, notification: &Notification) {
        if self.native.permission() != Permission::Granted {
            return;
        }
        if let Err(e) = self.native.deliver(notification) {
            warn!(notification_id = %notification.id, error = %e, "native delivery skipped");
        }
    }
}

fn find(entries: &[Notification], conversation_id: &SessionKey, kind: NotificationKind) -> Option<NotificationId> {
    entries
        .iter()
        .find(|n| n.kind == kind && n.conversation_id.as_ref() == Some(conversation_id))
        .map(|n| n.id.clone())
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink")
            .field("len", &self.len())
            .field("max_retained", &self.max_retained)
            .finish_non_exhaustive()
    }
}

fn unread(entries: &[Notification]) -> usize {
    entries.iter().filter(|n| !n.is_read).count()
}
