use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::detector::DueReminder;
use crate::record::ScheduledCallRecord;
use crate::registry::DedupRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(Uuid);

impl NotificationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub customer: ScheduledCallRecord,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CenterState {
    registry: DedupRegistry,
    active: Vec<Notification>,
}

/// Owns the dedup registry and the ordered set of undismissed popups.
///
/// Every mutation publishes the new set to subscribers while the state
/// lock is held, so subscribers observe mutations in the order they
/// happened.
#[derive(Debug)]
pub struct NotificationCenter {
    state: Mutex<CenterState>,
    publisher: watch::Sender<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new(registry: DedupRegistry) -> Self {
        let (publisher, _) = watch::channel(Vec::new());
        Self {
            state: Mutex::new(CenterState {
                registry,
                active: Vec::new(),
            }),
            publisher,
        }
    }

    /// Appends `due` unless its message was surfaced before.
    #[instrument(skip(self, due), fields(message = %due.message))]
    pub fn submit(&self, due: DueReminder, now: DateTime<Utc>) -> Option<NotificationId> {
        let mut state = self.state.lock();
        if !state.registry.remember(&due.message, now) {
            debug!("message already surfaced; suppressing");
            return None;
        }

        let notification = Notification {
            id: NotificationId::new(),
            message: due.message,
            customer: due.customer,
            raised_at: now,
        };
        let id = notification.id;
        info!(%id, message = %notification.message, "raising reminder popup");
        state.active.push(notification);
        self.publisher.send_replace(state.active.clone());
        Some(id)
    }

    pub fn submit_all<I>(&self, due: I, now: DateTime<Utc>) -> Vec<NotificationId>
    where
        I: IntoIterator<Item = DueReminder>,
    {
        due.into_iter()
            .filter_map(|reminder| self.submit(reminder, now))
            .collect()
    }

    #[instrument(skip(self))]
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut state = self.state.lock();
        let Some(position) = state.active.iter().position(|n| n.id == id) else {
            debug!("dismiss for unknown notification ignored");
            return false;
        };

        state.active.remove(position);
        self.publisher.send_replace(state.active.clone());
        true
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.state
            .lock()
            .active
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.state.lock().active.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.publisher.subscribe()
    }

    pub fn has_seen(&self, message: &str, now: DateTime<Utc>) -> bool {
        self.state.lock().registry.contains(message, now)
    }

    pub fn seen_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Forgets every surfaced message. Active popups stay up.
    pub fn reset(&self) {
        self.state.lock().registry.reset();
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DedupRegistry::default())
    }
}
