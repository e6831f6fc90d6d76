//! Live aircraft keyed by numeric id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ysradar_math::{degrees_from_heading_signed, meters_to_flight_level, uu_to_degrees};

use super::users::UserRegistry;
use crate::records::FlightState;

/// Username given to aircraft with no matching roster entry.
pub const AI_USERNAME: &str = "AI";

/// Latest telemetry for one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct Aircraft {
    pub id: u32,
    pub x: f32,
    /// Altitude in meters.
    pub y: f32,
    pub z: f32,
    /// Native angle units, display sign convention.
    pub yaw: i32,
    pub pitch: i16,
    pub roll: i16,
    /// Speed components in m/s.
    pub velocity: [f64; 3],
    /// Track in degrees, derived from velocity.
    pub heading: f64,
    pub speed_knots: f64,
    pub horizontal_speed_knots: f64,
    pub fuel: i16,
    pub username: String,
    /// Operator-assigned callsign. Survives telemetry updates.
    pub callsign_override: Option<String>,
    pub first_seen_at: Instant,
    pub last_decoded_at: Instant,
}

impl Aircraft {
    fn from_state(state: &FlightState, username: String, now: Instant) -> Self {
        Self {
            id: state.id,
            x: state.x,
            y: state.y,
            z: state.z,
            yaw: state.yaw,
            pitch: state.pitch,
            roll: state.roll,
            velocity: state.velocity(),
            heading: state.heading(),
            speed_knots: state.speed_knots(),
            horizontal_speed_knots: state.horizontal_speed_knots(),
            fuel: state.fuel,
            username,
            callsign_override: None,
            first_seen_at: now,
            last_decoded_at: now,
        }
    }

    /// Callsign override if set, else the username.
    pub fn callsign(&self) -> &str {
        self.callsign_override.as_deref().unwrap_or(&self.username)
    }

    pub fn altitude(&self) -> f32 {
        self.y
    }

    /// Flight level string for the current altitude.
    pub fn flight_level(&self) -> String {
        meters_to_flight_level(f64::from(self.y))
    }

    /// Nose heading from yaw, in `[0, 360)` degrees.
    pub fn yaw_heading(&self) -> f64 {
        degrees_from_heading_signed(uu_to_degrees(f64::from(self.yaw)))
    }

    /// Time since this aircraft was first seen.
    pub fn flight_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_seen_at)
    }
}

/// All aircraft currently reported by the server.
#[derive(Debug, Default, Clone)]
pub struct AircraftRegistry {
    planes: HashMap<u32, Aircraft>,
}

impl AircraftRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the aircraft described by `state`.
    ///
    /// The username comes from the roster entry with the same id, or
    /// [`AI_USERNAME`] when none exists. Records with id 0 are ignored and
    /// `false` is returned.
    pub fn upsert(&mut self, state: &FlightState, users: &UserRegistry, now: Instant) -> bool {
        if state.id == 0 {
            return false;
        }

        let username = i32::try_from(state.id)
            .ok()
            .and_then(|id| users.by_id(id))
            .map(|u| u.name.clone())
            .unwrap_or_else(|| AI_USERNAME.to_string());

        match self.planes.get_mut(&state.id) {
            Some(plane) => {
                let callsign = plane.callsign_override.take();
                let first_seen = plane.first_seen_at;
                *plane = Aircraft::from_state(state, username, now);
                plane.callsign_override = callsign;
                plane.first_seen_at = first_seen;
            }
            None => {
                tracing::debug!(id = state.id, %username, "new aircraft");
                self.planes
                    .insert(state.id, Aircraft::from_state(state, username, now));
            }
        }
        true
    }

    pub fn remove(&mut self, id: u32) -> Option<Aircraft> {
        self.planes.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Aircraft> {
        self.planes.get(&id)
    }

    /// Set or clear the callsign override. Returns `false` for unknown ids.
    pub fn set_callsign(&mut self, id: u32, callsign: Option<String>) -> bool {
        match self.planes.get_mut(&id) {
            Some(plane) => {
                plane.callsign_override = callsign;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aircraft> {
        self.planes.values()
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}
