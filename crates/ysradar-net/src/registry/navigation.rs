//! Navigation aids promoted from scenery ground objects.
//!
//! Only ground objects (type code 65537) whose template name resolves to a
//! recognized [`NavType`] become [`NavPoint`]s. The [`NavFilter`] decides
//! which names are recognized and carries an alias table for sceneries that
//! use custom template names such as `ILS[CJAP]`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ysradar_math::yaw_radians_to_rotation;

use crate::records::{GROUND_OBJECT_KIND, GroundObject};

/// Kind of navigation aid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavType {
    Ils,
    VorDme,
    Ndb,
}

impl NavType {
    pub const ALL: [NavType; 3] = [NavType::Ils, NavType::VorDme, NavType::Ndb];

    /// Template name used by the simulator.
    pub fn as_str(self) -> &'static str {
        match self {
            NavType::Ils => "ILS",
            NavType::VorDme => "VORDME",
            NavType::Ndb => "NDB",
        }
    }
}

impl fmt::Display for NavType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a navigation type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown navigation type: {0}")]
pub struct UnknownNavType(pub String);

impl FromStr for NavType {
    type Err = UnknownNavType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NavType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownNavType(s.to_string()))
    }
}

/// Which ground-object names are promoted to navigation points.
#[derive(Debug, Clone)]
pub struct NavFilter {
    recognized: Vec<NavType>,
    aliases: HashMap<String, NavType>,
}

impl Default for NavFilter {
    fn default() -> Self {
        Self {
            recognized: NavType::ALL.to_vec(),
            aliases: HashMap::new(),
        }
    }
}

impl NavFilter {
    /// Build a filter from configured type names and an alias table mapping
    /// scenery object names to type names. Unknown names are logged and
    /// skipped.
    pub fn new(types: &[String], aliases: &HashMap<String, String>) -> Self {
        let recognized = types
            .iter()
            .filter_map(|name| match name.parse::<NavType>() {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("ignoring nav type: {e}");
                    None
                }
            })
            .collect();

        let aliases = aliases
            .iter()
            .filter_map(|(alias, target)| match target.parse::<NavType>() {
                Ok(t) => Some((alias.clone(), t)),
                Err(e) => {
                    tracing::warn!(%alias, "ignoring ground feature alias: {e}");
                    None
                }
            })
            .collect();

        Self {
            recognized,
            aliases,
        }
    }

    /// Resolve an object template name to a recognized navigation type.
    pub fn resolve(&self, name: &str) -> Option<NavType> {
        let kind = match self.aliases.get(name) {
            Some(kind) => *kind,
            None => name.parse().ok()?,
        };
        self.recognized.contains(&kind).then_some(kind)
    }
}

/// A navigation aid on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct NavPoint {
    pub id: i32,
    pub kind: NavType,
    /// Display name, e.g. the beacon identifier.
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Rotation in heading degrees.
    pub rotation: f64,
}

impl NavPoint {
    /// Map-plane position `(x, z)`.
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.z)
    }
}

/// Promote a ground object to a navigation point, or `None` when it is not a
/// recognized navigation aid.
pub fn radar_point_from_ground_object(ground: &GroundObject, filter: &NavFilter) -> Option<NavPoint> {
    if ground.kind != GROUND_OBJECT_KIND {
        return None;
    }
    let kind = filter.resolve(&ground.name)?;

    Some(NavPoint {
        id: ground.id,
        kind,
        name: ground.name2.clone(),
        x: ground.x,
        y: ground.y,
        z: -ground.z,
        rotation: yaw_radians_to_rotation(f64::from(ground.yaw)),
    })
}

/// Navigation points keyed by object id.
#[derive(Debug, Default, Clone)]
pub struct NavigationRegistry {
    points: HashMap<i32, NavPoint>,
}

impl NavigationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, point: NavPoint) {
        self.points.insert(point.id, point);
    }

    pub fn remove(&mut self, id: i32) -> Option<NavPoint> {
        self.points.remove(&id)
    }

    pub fn get(&self, id: i32) -> Option<&NavPoint> {
        self.points.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NavPoint> {
        self.points.values()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
