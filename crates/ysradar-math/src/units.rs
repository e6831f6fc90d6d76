/// 1 m/s = 1.94384 knots
pub const KNOTS_PER_METER_PER_SECOND: f64 = 1.94384;

/// 1 nautical mile = 1852 m (exact by definition)
pub const METERS_PER_NAUTICAL_MILE: f64 = 1852.0;

/// 1 m = 3.28084 ft
const FEET_PER_METER: f64 = 3.28084;

/// Convert meters per second to knots.
pub fn ms_to_knots(ms: f64) -> f64 {
    ms * KNOTS_PER_METER_PER_SECOND
}

/// Convert meters to nautical miles.
pub fn meters_to_nautical_miles(m: f64) -> f64 {
    m / METERS_PER_NAUTICAL_MILE
}

/// Convert meters to feet.
pub fn meters_to_feet(m: f64) -> f64 {
    m * FEET_PER_METER
}

/// Format an altitude in meters as a flight level.
///
/// Flight levels below 100 are zero-padded to three digits:
/// - 300 m -> "009"
/// - 3048 m -> "100"
pub fn meters_to_flight_level(m: f64) -> String {
    let fl = (meters_to_feet(m) / 100.0).trunc() as i64;
    if (0..100).contains(&fl) {
        format!("{fl:03}")
    } else {
        fl.to_string()
    }
}
