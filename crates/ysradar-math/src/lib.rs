//! Angle and unit conversions shared by the protocol client and the scenery tooling.

mod angles;
mod units;

pub use angles::{
    UU_PER_TURN, degrees_from_heading_signed, heading_from_velocity, uu_to_degrees,
    yaw_radians_to_rotation,
};
pub use units::{
    KNOTS_PER_METER_PER_SECOND, METERS_PER_NAUTICAL_MILE, meters_to_feet,
    meters_to_flight_level, meters_to_nautical_miles, ms_to_knots,
};
