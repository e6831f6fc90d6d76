//! Publish/subscribe channel from the dispatcher to presentation layers.
//!
//! Delivery is synchronous on the dispatcher task, in subscription order.
//! The subscriber list is snapshotted before each delivery, so a callback
//! that subscribes or unsubscribes only affects later publications.
//! Callbacks must not block: a slow subscriber stalls frame processing.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of displayable messages kept for late subscribers.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Tag of the structured map-loaded event.
pub const MAP_EVENT: &str = "MAP";

/// Something the client wants a presentation layer to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Human-readable status line (handshake steps, connection problems).
    Status(String),
    /// The server loaded a field; carries the field name.
    Map(String),
    /// Incoming chat text.
    Chat(String),
    /// The server rejected a join request.
    Rejected,
}

impl Notification {
    pub fn status(text: impl Into<String>) -> Self {
        Notification::Status(text.into())
    }

    /// Two-element structured form, e.g. `("MAP", "myfield.fld")`.
    pub fn as_event(&self) -> Option<(&'static str, &str)> {
        match self {
            Notification::Map(name) => Some((MAP_EVENT, name.as_str())),
            _ => None,
        }
    }

    /// Whether this notification is a line of text for a status log.
    pub fn is_displayable(&self) -> bool {
        !matches!(self, Notification::Map(_))
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Status(text) => f.write_str(text),
            Notification::Map(name) => write!(f, "{MAP_EVENT}: {name}"),
            Notification::Chat(text) => write!(f, "Chat: {text}"),
            Notification::Rejected => f.write_str("Join request rejected"),
        }
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered list of subscriber callbacks plus a bounded message history.
pub struct NotificationBus {
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
    history: Mutex<VecDeque<String>>,
    history_limit: usize,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl NotificationBus {
    /// Create a bus keeping at most `history_limit` displayable messages.
    pub fn new(history_limit: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            history: Mutex::new(VecDeque::with_capacity(history_limit)),
            history_limit,
        }
    }

    /// Register a callback. It receives every notification published after
    /// this call returns.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = lock(&self.subscribers);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Deliver a notification to every current subscriber.
    pub fn publish(&self, notification: Notification) {
        tracing::debug!(%notification, "notify");

        if notification.is_displayable() && self.history_limit > 0 {
            let mut history = lock(&self.history);
            if history.len() == self.history_limit {
                history.pop_front();
            }
            history.push_back(notification.to_string());
        }

        let snapshot: Vec<Callback> = lock(&self.subscribers)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(&notification);
        }
    }

    /// Displayable messages published so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).iter().cloned().collect()
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .field("history_limit", &self.history_limit)
            .finish()
    }
}
