//! # Core Type Definitions
//!
//! This module contains the fundamental types shared by the spatial index,
//! the geolocation cache and the projection functions.
//!
//! ## Key Types
//!
//! - [`ObjectId`] - Opaque identifier of a monitored object
//! - [`ObjectClass`] - Closed classification of monitored entities
//! - [`GeoLocation`] - Latitude/longitude with a set/unset discriminator
//! - [`MonitoredObject`] - Read-only snapshot of an object as seen by the cache
//! - [`Area`] - Latitude/longitude rectangle used for queries and coverage
//! - [`MapPoint`] / [`MapSize`] - Pixel positions and extents on the virtual map

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Identifiers & Classification
// ============================================================================

/// Identifier of a monitored object.
///
/// The value is assigned by the monitoring server and carries no meaning for
/// the cache beyond identity. `ObjectId(0)` is reserved as [`ObjectId::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Placeholder meaning "no object", used to disable parent filtering.
    pub const NONE: ObjectId = ObjectId(0);

    /// Returns `true` for [`ObjectId::NONE`].
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a monitored entity.
///
/// Only the first six variants can appear on the map; everything else the
/// server knows about (interfaces, templates, dashboards, ...) is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Node,
    MobileDevice,
    Cluster,
    Container,
    Rack,
    Sensor,
    Other,
}

impl ObjectClass {
    /// Whether objects of this class are tracked by the geolocation cache.
    pub fn is_geo_indexed(self) -> bool {
        !matches!(self, ObjectClass::Other)
    }
}

// ============================================================================
// Geolocation
// ============================================================================

/// Source of an object's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoLocationKind {
    /// No location known; coordinates are meaningless.
    #[default]
    Unset,
    /// Entered by an operator.
    Manual,
    /// Reported by a GPS receiver (mobile devices).
    Gps,
    /// Derived from network information.
    Network,
}

/// Geographic position of an object in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Where the position came from, or `Unset`
    #[serde(default)]
    pub kind: GeoLocationKind,
    /// Latitude in degrees, positive north
    #[serde(default)]
    pub latitude: f64,
    /// Longitude in degrees, positive east
    #[serde(default)]
    pub longitude: f64,
}

impl GeoLocation {
    /// Creates a manually entered location.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_kind(GeoLocationKind::Manual, latitude, longitude)
    }

    /// Creates a location with an explicit source.
    pub fn with_kind(kind: GeoLocationKind, latitude: f64, longitude: f64) -> Self {
        Self {
            kind,
            latitude,
            longitude,
        }
    }

    /// An unset location.
    pub fn unset() -> Self {
        Self::default()
    }

    /// Returns `true` unless the location kind is `Unset`.
    pub fn is_set(&self) -> bool {
        self.kind != GeoLocationKind::Unset
    }

    /// Value equality of the coordinates, ignoring the location source.
    pub fn same_position(&self, other: &GeoLocation) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_set() {
            return write!(f, "<unset>");
        }
        let ns = if self.latitude < 0.0 { 'S' } else { 'N' };
        let ew = if self.longitude < 0.0 { 'W' } else { 'E' };
        write!(
            f,
            "{} {:.6} {} {:.6}",
            ns,
            self.latitude.abs(),
            ew,
            self.longitude.abs()
        )
    }
}

// ============================================================================
// Monitored Objects
// ============================================================================

/// Snapshot of a monitored object.
///
/// Objects are owned by the session; the cache only ever holds shared
/// `Arc<MonitoredObject>` references and never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredObject {
    pub id: ObjectId,
    pub class: ObjectClass,
    pub name: String,
    #[serde(default)]
    pub geolocation: GeoLocation,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub parent_ids: Vec<ObjectId>,
    #[serde(default)]
    pub child_ids: Vec<ObjectId>,
}

impl MonitoredObject {
    /// Creates an object without location, attributes or links.
    pub fn new(id: impl Into<ObjectId>, class: ObjectClass, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class,
            name: name.into(),
            geolocation: GeoLocation::unset(),
            custom_attributes: BTreeMap::new(),
            parent_ids: Vec::new(),
            child_ids: Vec::new(),
        }
    }

    /// Builder-style location setter.
    pub fn located_at(mut self, latitude: f64, longitude: f64) -> Self {
        self.geolocation = GeoLocation::new(latitude, longitude);
        self
    }

    /// Builder-style parent link.
    pub fn with_parent(mut self, parent: impl Into<ObjectId>) -> Self {
        self.parent_ids.push(parent.into());
        self
    }

    /// Builder-style custom attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    /// Whether this object belongs in the spatial index right now.
    pub fn is_mappable(&self) -> bool {
        self.class.is_geo_indexed() && self.geolocation.is_set()
    }
}

// ============================================================================
// Areas
// ============================================================================

/// Rectangle in latitude/longitude space.
///
/// Latitude bounds may be given in either order. Longitude is read from the
/// top-left corner eastwards: when `top_left_lon > bottom_right_lon` the area
/// crosses the antimeridian and covers `[top_left_lon, ∞) ∪ (-∞, bottom_right_lon]`.
/// All edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub top_left_lat: f64,
    pub top_left_lon: f64,
    pub bottom_right_lat: f64,
    pub bottom_right_lon: f64,
}

impl Area {
    pub fn new(top_left_lat: f64, top_left_lon: f64, bottom_right_lat: f64, bottom_right_lon: f64) -> Self {
        Self {
            top_left_lat,
            top_left_lon,
            bottom_right_lat,
            bottom_right_lon,
        }
    }

    /// The whole world, including points outside the nominal coordinate range.
    pub fn everything() -> Self {
        Self::new(f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Southern and northern latitude bound.
    pub fn lat_range(&self) -> (f64, f64) {
        if self.top_left_lat <= self.bottom_right_lat {
            (self.top_left_lat, self.bottom_right_lat)
        } else {
            (self.bottom_right_lat, self.top_left_lat)
        }
    }

    /// Returns `true` if the area wraps across the ±180° meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.top_left_lon > self.bottom_right_lon
    }

    /// One or two closed longitude intervals covered by this area.
    pub fn lon_ranges(&self) -> Vec<(f64, f64)> {
        if self.crosses_antimeridian() {
            vec![
                (self.top_left_lon, f64::INFINITY),
                (f64::NEG_INFINITY, self.bottom_right_lon),
            ]
        } else {
            vec![(self.top_left_lon, self.bottom_right_lon)]
        }
    }

    /// Inclusive point containment test.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let (south, north) = self.lat_range();
        if !(south..=north).contains(&latitude) {
            return false;
        }
        if self.crosses_antimeridian() {
            longitude >= self.top_left_lon || longitude <= self.bottom_right_lon
        } else {
            (self.top_left_lon..=self.bottom_right_lon).contains(&longitude)
        }
    }
}

// ============================================================================
// Map Geometry
// ============================================================================

/// Position on the virtual (whole-world) map in pixels, origin at top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Offsets the point by the given pixel deltas.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Truncates to whole pixels for drawing.
    pub fn to_pixel(self) -> (i64, i64) {
        (self.x as i64, self.y as i64)
    }
}

/// Extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MapSize {
    pub width: u32,
    pub height: u32,
}

impl MapSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_class_geo_indexed() {
        for class in [
            ObjectClass::Node,
            ObjectClass::MobileDevice,
            ObjectClass::Cluster,
            ObjectClass::Container,
            ObjectClass::Rack,
            ObjectClass::Sensor,
        ] {
            assert!(class.is_geo_indexed(), "{class:?} should be indexed");
        }
        assert!(!ObjectClass::Other.is_geo_indexed());
    }

    #[test]
    fn test_unset_location_is_not_set() {
        assert!(!GeoLocation::unset().is_set());
        assert!(GeoLocation::new(0.0, 0.0).is_set());
    }

    #[test]
    fn test_same_position_ignores_kind() {
        let manual = GeoLocation::new(10.0, 20.0);
        let gps = GeoLocation::with_kind(GeoLocationKind::Gps, 10.0, 20.0);
        assert!(manual.same_position(&gps));
        assert!(!manual.same_position(&GeoLocation::new(10.0, 21.0)));
    }

    #[test]
    fn test_location_display() {
        assert_eq!(
            GeoLocation::new(-33.5, 151.25).to_string(),
            "S 33.500000 E 151.250000"
        );
        assert_eq!(GeoLocation::unset().to_string(), "<unset>");
    }

    #[test]
    fn test_area_contains_is_inclusive() {
        let area = Area::new(40.0, 10.0, 30.0, 20.0);
        assert!(area.contains(40.0, 10.0));
        assert!(area.contains(30.0, 20.0));
        assert!(area.contains(35.0, 15.0));
        assert!(!area.contains(40.0001, 15.0));
        assert!(!area.contains(35.0, 9.9999));
    }

    #[test]
    fn test_area_latitude_order_insensitive() {
        let upside_down = Area::new(30.0, 10.0, 40.0, 20.0);
        assert!(upside_down.contains(35.0, 15.0));
        assert_eq!(upside_down.lat_range(), (30.0, 40.0));
    }

    #[test]
    fn test_area_across_antimeridian() {
        let area = Area::new(10.0, 170.0, -10.0, -170.0);
        assert!(area.crosses_antimeridian());
        assert!(area.contains(0.0, 175.0));
        assert!(area.contains(0.0, -175.0));
        assert!(area.contains(0.0, 180.0));
        assert!(!area.contains(0.0, 0.0));
        assert_eq!(area.lon_ranges().len(), 2);
    }

    #[test]
    fn test_everything_contains_out_of_range_points() {
        let area = Area::everything();
        assert!(area.contains(0.0, 0.0));
        assert!(area.contains(95.0, 400.0));
        assert!(area.contains(-95.0, -400.0));
    }

    #[test]
    fn test_monitored_object_deserializes_with_defaults() {
        let json = r#"{"id": 7, "class": "mobile_device", "name": "truck-7"}"#;
        let object: MonitoredObject = serde_json::from_str(json).expect("valid object json");
        assert_eq!(object.id, ObjectId(7));
        assert_eq!(object.class, ObjectClass::MobileDevice);
        assert!(!object.geolocation.is_set());
        assert!(object.parent_ids.is_empty());
        assert!(!object.is_mappable());
    }
}
