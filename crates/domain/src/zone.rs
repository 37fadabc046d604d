//! Zone geometry — circular geofences and enter/leave detection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A point on the earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Read `latitude`/`longitude` attributes out of a state snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &Value) -> Option<Self> {
        let attributes = snapshot.get("attributes")?;
        Some(Self {
            latitude: attributes.get("latitude")?.as_f64()?,
            longitude: attributes.get("longitude")?.as_f64()?,
        })
    }

    /// Great-circle distance using the haversine formula.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Circular geofence as published by a hub `zone.*` entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub entity_id: String,
    pub center: Location,
    /// Radius in meters.
    pub radius: f64,
}

impl Zone {
    /// Build a zone after checking the radius.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRadius`] for a non-positive radius.
    pub fn new(
        entity_id: impl Into<String>,
        center: Location,
        radius: f64,
    ) -> Result<Self, ValidationError> {
        if radius.is_nan() || radius <= 0.0 {
            return Err(ValidationError::InvalidRadius(radius));
        }
        Ok(Self {
            entity_id: entity_id.into(),
            center,
            radius,
        })
    }

    /// Read a zone out of a zone entity's state snapshot.
    ///
    /// Returns `None` if the snapshot lacks coordinates or a valid radius.
    #[must_use]
    pub fn from_snapshot(entity_id: &str, snapshot: &Value) -> Option<Self> {
        let center = Location::from_snapshot(snapshot)?;
        let radius = snapshot.get("attributes")?.get("radius")?.as_f64()?;
        Self::new(entity_id, center, radius).ok()
    }

    #[must_use]
    pub fn contains(&self, location: &Location) -> bool {
        self.center.distance_to(location) <= self.radius
    }
}

/// Direction of a zone boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneTransition {
    Enter,
    Leave,
}

impl std::fmt::Display for ZoneTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enter => f.write_str("enter"),
            Self::Leave => f.write_str("leave"),
        }
    }
}

/// Which crossings a zone node reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneEvent {
    #[default]
    Enter,
    Leave,
    EnterLeave,
}

impl ZoneEvent {
    #[must_use]
    pub fn accepts(self, transition: ZoneTransition) -> bool {
        matches!(
            (self, transition),
            (Self::EnterLeave, _)
                | (Self::Enter, ZoneTransition::Enter)
                | (Self::Leave, ZoneTransition::Leave)
        )
    }
}

/// Crossing of `zone` between two locations, if any.
#[must_use]
pub fn transition(zone: &Zone, old: &Location, new: &Location) -> Option<ZoneTransition> {
    match (zone.contains(old), zone.contains(new)) {
        (false, true) => Some(ZoneTransition::Enter),
        (true, false) => Some(ZoneTransition::Leave),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn home() -> Zone {
        Zone::new(
            "zone.home",
            Location {
                latitude: 52.3731,
                longitude: 4.8922,
            },
            100.0,
        )
        .unwrap()
    }

    const INSIDE: Location = Location {
        latitude: 52.3732,
        longitude: 4.8923,
    };
    const OUTSIDE: Location = Location {
        latitude: 52.3800,
        longitude: 4.9000,
    };

    #[test]
    fn should_measure_zero_distance_to_self() {
        assert!(INSIDE.distance_to(&INSIDE) < 1e-6);
    }

    #[test]
    fn should_measure_roughly_one_degree_of_latitude() {
        let a = Location {
            latitude: 0.0,
            longitude: 0.0,
        };
        let b = Location {
            latitude: 1.0,
            longitude: 0.0,
        };
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 100.0, "distance was {d}");
    }

    #[test]
    fn should_detect_enter_and_leave() {
        let zone = home();
        assert_eq!(
            transition(&zone, &OUTSIDE, &INSIDE),
            Some(ZoneTransition::Enter)
        );
        assert_eq!(
            transition(&zone, &INSIDE, &OUTSIDE),
            Some(ZoneTransition::Leave)
        );
        assert_eq!(transition(&zone, &INSIDE, &INSIDE), None);
    }

    #[test]
    fn should_reject_non_positive_radius() {
        let result = Zone::new("zone.x", INSIDE, 0.0);
        assert_eq!(result, Err(ValidationError::InvalidRadius(0.0)));
    }

    #[test]
    fn should_read_zone_from_snapshot() {
        let snapshot = json!({
            "state": "0",
            "attributes": {"latitude": 52.3731, "longitude": 4.8922, "radius": 100.0},
        });
        let zone = Zone::from_snapshot("zone.home", &snapshot).unwrap();
        assert_eq!(zone, home());
    }

    #[test]
    fn should_ignore_snapshot_without_radius() {
        let snapshot = json!({"attributes": {"latitude": 1.0, "longitude": 2.0}});
        assert!(Zone::from_snapshot("zone.home", &snapshot).is_none());
    }

    #[test]
    fn should_filter_transitions_by_configured_event() {
        assert!(ZoneEvent::Enter.accepts(ZoneTransition::Enter));
        assert!(!ZoneEvent::Enter.accepts(ZoneTransition::Leave));
        assert!(ZoneEvent::Leave.accepts(ZoneTransition::Leave));
        assert!(ZoneEvent::EnterLeave.accepts(ZoneTransition::Enter));
        assert!(ZoneEvent::EnterLeave.accepts(ZoneTransition::Leave));
    }
}
