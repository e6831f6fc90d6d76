//! Server roster: who is logged in and who is airborne.
//!
//! Entries are keyed by name. Each roster update refreshes `last_seen_at` and
//! runs the flying-state transition; entries idle for longer than the timeout
//! are flagged by [`UserRegistry::evict_stale`] and removed by
//! [`UserRegistry::purge_flagged`], which hands them back so external tables
//! can drop their rows too.

use std::time::{Duration, Instant};

use crate::records::UserEntry;

/// Idle time after which a roster entry is flagged for removal.
pub const USER_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether a roster kind code denotes an airborne user.
pub fn is_flying_code(code: i16) -> bool {
    code == 1 || code == 3
}

/// Role of a roster entry as shown in user tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    /// Kind codes 0 and 1.
    Client,
    /// Every other kind code.
    Server,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Unique key.
    pub name: String,
    pub id: i32,
    /// Last roster kind code seen.
    pub kind_code: i16,
    pub iff: i16,
    pub flying: bool,
    /// Airborne time from completed flights.
    pub flying_accumulated: Duration,
    /// Start of the current flight, if airborne.
    pub flying_started_at: Option<Instant>,
    pub last_seen_at: Instant,
    /// Set by [`UserRegistry::evict_stale`].
    pub marked_for_removal: bool,
}

impl User {
    /// Create a user from its first roster sighting.
    pub fn new(entry: &UserEntry, now: Instant) -> Self {
        let mut user = Self {
            name: entry.name.clone(),
            id: entry.id,
            kind_code: entry.kind_code,
            iff: entry.iff,
            flying: false,
            flying_accumulated: Duration::ZERO,
            flying_started_at: None,
            last_seen_at: now,
            marked_for_removal: false,
        };
        user.apply_kind(entry.kind_code, now);
        user
    }

    /// Apply a roster kind code, starting or stopping the flight clock when
    /// the user crosses the flying/grounded boundary.
    fn apply_kind(&mut self, code: i16, now: Instant) {
        let flying_now = is_flying_code(code);
        match (self.flying_started_at, flying_now) {
            (None, true) => self.flying_started_at = Some(now),
            (Some(start), false) => {
                self.flying_accumulated += now.saturating_duration_since(start);
                self.flying_started_at = None;
            }
            _ => {}
        }
        self.kind_code = code;
        self.flying = flying_now;
    }

    /// Total airborne time, including the flight in progress.
    pub fn flying_time(&self, now: Instant) -> Duration {
        let running = self
            .flying_started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.flying_accumulated + running
    }

    pub fn kind(&self) -> UserKind {
        match self.kind_code {
            0 | 1 => UserKind::Client,
            _ => UserKind::Server,
        }
    }
}

/// Render a duration as `H:MM:SS`.
pub fn format_flying_time(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Result of a roster upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Ordered roster, in first-sighting order.
#[derive(Debug, Default, Clone)]
pub struct UserRegistry {
    users: Vec<User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new user or merge a roster update into the existing entry
    /// with the same name.
    pub fn upsert(&mut self, entry: &UserEntry, now: Instant) -> UpsertOutcome {
        if let Some(user) = self.users.iter_mut().find(|u| u.name == entry.name) {
            user.apply_kind(entry.kind_code, now);
            user.iff = entry.iff;
            user.id = entry.id;
            user.last_seen_at = now;
            user.marked_for_removal = false;
            return UpsertOutcome::Updated;
        }

        tracing::debug!(name = %entry.name, id = entry.id, "new user on roster");
        self.users.push(User::new(entry, now));
        UpsertOutcome::Inserted
    }

    /// Flag every user not seen for longer than `timeout`. Returns how many
    /// users are newly flagged.
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut flagged = 0;
        for user in &mut self.users {
            if !user.marked_for_removal
                && now.saturating_duration_since(user.last_seen_at) > timeout
            {
                user.marked_for_removal = true;
                flagged += 1;
            }
        }
        if flagged > 0 {
            tracing::debug!(flagged, "users flagged as stale");
        }
        flagged
    }

    /// Remove flagged users and return them.
    pub fn purge_flagged(&mut self) -> Vec<User> {
        let (removed, kept) = std::mem::take(&mut self.users)
            .into_iter()
            .partition(|u| u.marked_for_removal);
        self.users = kept;
        removed
    }

    pub fn by_id(&self, id: i32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Remove the user with the given id, if any.
    pub fn remove_by_id(&mut self, id: i32) -> Option<User> {
        let pos = self.users.iter().position(|u| u.id == id)?;
        Some(self.users.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
