//! Plain-text traffic table written to the log.

use std::fmt::Write as _;
use std::time::Instant;

use ysradar_math::meters_to_nautical_miles;
use ysradar_net::registry::{UserKind, format_flying_time};
use ysradar_net::{Aircraft, NavPoint, User};

/// One line per aircraft, sorted by callsign.
pub fn traffic_table(planes: &[Aircraft]) -> String {
    let mut rows: Vec<&Aircraft> = planes.iter().collect();
    rows.sort_by(|a, b| a.callsign().cmp(b.callsign()).then(a.id.cmp(&b.id)));

    let mut out = format!(
        "{:<16} {:>6} {:>5} {:>5} {:>5} {:>7}",
        "CALLSIGN", "ID", "FL", "KT", "HDG", "RNG NM"
    );
    for plane in rows {
        let range = f64::from(plane.x).hypot(f64::from(plane.z));
        let _ = write!(
            out,
            "\n{:<16} {:>6} {:>5} {:>5.0} {:>5.0} {:>7.1}",
            plane.callsign(),
            plane.id,
            plane.flight_level(),
            plane.speed_knots,
            plane.heading,
            meters_to_nautical_miles(range),
        );
    }
    out
}

/// One line per user with role and airborne time.
pub fn roster_table(users: &[User], now: Instant) -> String {
    let mut out = format!("{:<16} {:>6} {:<7} {:>9}", "USER", "ID", "ROLE", "FLYING");
    for user in users {
        let role = match user.kind() {
            UserKind::Client => "client",
            UserKind::Server => "server",
        };
        let flag = if user.marked_for_removal { " (stale)" } else { "" };
        let _ = write!(
            out,
            "\n{:<16} {:>6} {:<7} {:>9}{flag}",
            user.name,
            user.id,
            role,
            format_flying_time(user.flying_time(now)),
        );
    }
    out
}

/// Count of navigation aids per type, e.g. `ILS 3, NDB 1`.
pub fn nav_summary(points: &[NavPoint]) -> String {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for point in points {
        let name = point.kind.as_str();
        match counts.iter_mut().find(|(n, _)| *n == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name, 1)),
        }
    }
    counts.sort();
    counts
        .iter()
        .map(|(name, count)| format!("{name} {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}
