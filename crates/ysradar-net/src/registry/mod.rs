//! Live registries fed by the dispatcher.
//!
//! The registries are plain data holders: no locks, no background work. The
//! client wraps them in a single [`LiveRegistries`] behind an async `RwLock`
//! so the dispatcher is the only writer and pollers read cloned snapshots.

pub mod aircraft;
pub mod navigation;
pub mod users;

pub use aircraft::{AI_USERNAME, Aircraft, AircraftRegistry};
pub use navigation::{
    NavFilter, NavPoint, NavType, NavigationRegistry, UnknownNavType,
    radar_point_from_ground_object,
};
pub use users::{
    USER_TIMEOUT, UpsertOutcome, User, UserKind, UserRegistry, format_flying_time,
    is_flying_code,
};

/// The three registries maintained by one connection.
#[derive(Debug, Default, Clone)]
pub struct LiveRegistries {
    pub users: UserRegistry,
    pub aircraft: AircraftRegistry,
    pub navigation: NavigationRegistry,
}

impl LiveRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, e.g. before a new session starts.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
