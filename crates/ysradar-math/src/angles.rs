//! Angular conversions.
//!
//! The simulator stores attitude in "uu", a fixed-point unit with 65536 steps
//! per full turn. Headings on the wire are signed: 0 is north, positive values
//! turn east, negative values turn west, and ±180 is south.

/// Native angle units in one full rotation.
pub const UU_PER_TURN: f64 = 65536.0;

/// Convert native angle units to degrees (`uu * 360 / 65536`).
///
/// This must stay numerically identical for telemetry and scenery data, so
/// both go through this function.
pub fn uu_to_degrees(uu: f64) -> f64 {
    uu * (360.0 / UU_PER_TURN)
}

/// Map a signed heading in degrees onto `[0, 360)`.
///
/// The fractional part is truncated toward zero first, so `-0.4` maps to `0`
/// and `-1.0` maps to `359`.
pub fn degrees_from_heading_signed(raw: f64) -> f64 {
    let whole = raw.trunc();
    if whole < 0.0 {
        360.0 - whole.abs()
    } else {
        whole
    }
}

/// Heading in degrees from the horizontal velocity components.
///
/// Returns 0 when either component is exactly zero, matching the ground
/// station displays the protocol was built against.
pub fn heading_from_velocity(vx: f64, vz: f64) -> f64 {
    if vx == 0.0 || vz == 0.0 {
        return 0.0;
    }
    vx.atan2(vz).to_degrees()
}

/// Convert a scenery yaw (radians) into a map rotation in degrees.
pub fn yaw_radians_to_rotation(yaw: f64) -> f64 {
    180.0 - yaw.to_degrees()
}
