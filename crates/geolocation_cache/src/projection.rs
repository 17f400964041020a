//! Web Mercator projection for slippy-map views
//!
//! Converts between geographic coordinates and pixel positions on the
//! virtual map, a square of `2^zoom` tiles of [`TILE_SIZE`] pixels covering
//! the whole world with the origin at the north-west corner. Also computes
//! the area a viewport covers and the tiles needed to draw it.
//!
//! All functions are pure. Zoom levels above [`MAX_ZOOM`] are clamped.

use crate::error::GeoCacheError;
use crate::types::{Area, GeoLocation, MapPoint, MapSize};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Edge length of a map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Latitude limit of the Web Mercator projection, in degrees.
pub const MAX_LATITUDE: f64 = 85.0511;

/// Highest supported zoom level.
pub const MAX_ZOOM: u8 = 22;

#[inline]
fn clamp_zoom(zoom: u8) -> u8 {
    zoom.min(MAX_ZOOM)
}

#[inline]
fn map_extent(zoom: u8) -> f64 {
    (TILE_SIZE as f64) * 2.0_f64.powi(clamp_zoom(zoom) as i32)
}

#[inline]
fn tiles_per_side(zoom: u8) -> i64 {
    1_i64 << clamp_zoom(zoom)
}

/// Size of the whole-world map at `zoom`.
pub fn virtual_map_size(zoom: u8) -> MapSize {
    let side = TILE_SIZE << clamp_zoom(zoom);
    MapSize::new(side, side)
}

/// Projects a location onto the virtual map.
///
/// Latitudes beyond [`MAX_LATITUDE`] are not clamped and project outside the
/// map (to infinity at the poles).
pub fn coordinate_to_display(location: &GeoLocation, zoom: u8) -> MapPoint {
    let size = map_extent(zoom);
    let x = (location.longitude + 180.0) / 360.0 * size;
    let lat_rad = location.latitude.to_radians();
    let y = (1.0 - (PI / 4.0 + lat_rad / 2.0).tan().ln() / PI) / 2.0 * size;
    MapPoint::new(x, y)
}

/// Inverse of [`coordinate_to_display`].
///
/// The latitude is clamped to `±MAX_LATITUDE`. With `normalize_longitude`,
/// longitudes past the antimeridian are folded back into `[-180, 180]`.
pub fn display_to_coordinates(point: MapPoint, zoom: u8, normalize_longitude: bool) -> GeoLocation {
    let size = map_extent(zoom);

    let mut longitude = point.x * (360.0 / size) - 180.0;
    if normalize_longitude {
        if longitude > 180.0 {
            longitude = longitude % 180.0 - 180.0;
        } else if longitude < -180.0 {
            longitude = longitude % 180.0 + 180.0;
        }
    }

    let latitude = (PI * (1.0 - point.y * (2.0 / size)))
        .sinh()
        .atan()
        .to_degrees()
        .clamp(-MAX_LATITUDE, MAX_LATITUDE);

    GeoLocation::new(latitude, longitude)
}

/// Which viewport point a base location is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapAnchor {
    #[default]
    Center,
    TopLeft,
    BottomRight,
}

impl MapAnchor {
    /// Numeric code used on the wire.
    pub fn code(self) -> i32 {
        match self {
            MapAnchor::Center => 0,
            MapAnchor::TopLeft => 1,
            MapAnchor::BottomRight => 2,
        }
    }
}

impl TryFrom<i32> for MapAnchor {
    type Error = GeoCacheError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MapAnchor::Center),
            1 => Ok(MapAnchor::TopLeft),
            2 => Ok(MapAnchor::BottomRight),
            other => Err(GeoCacheError::InvalidAnchor(other)),
        }
    }
}

impl FromStr for MapAnchor {
    type Err = GeoCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" => Ok(MapAnchor::Center),
            "top-left" | "top_left" => Ok(MapAnchor::TopLeft),
            "bottom-right" | "bottom_right" => Ok(MapAnchor::BottomRight),
            other => match other.parse::<i32>() {
                Ok(code) => MapAnchor::try_from(code),
                Err(_) => Err(GeoCacheError::InvalidConfig(format!(
                    "unknown map anchor '{s}' (expected center, top-left or bottom-right)"
                ))),
            },
        }
    }
}

impl fmt::Display for MapAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapAnchor::Center => "center",
            MapAnchor::TopLeft => "top-left",
            MapAnchor::BottomRight => "bottom-right",
        };
        f.write_str(name)
    }
}

/// Pixel position of a viewport's top-left corner on the virtual map, for a
/// viewport of `map_size` pixels whose `anchor` point sits at `base`.
pub fn viewport_origin(map_size: MapSize, base: &GeoLocation, anchor: MapAnchor, zoom: u8) -> MapPoint {
    let anchor_point = coordinate_to_display(base, zoom);
    let width = map_size.width as f64;
    let height = map_size.height as f64;
    match anchor {
        MapAnchor::Center => anchor_point.offset(-width / 2.0, -height / 2.0),
        MapAnchor::TopLeft => anchor_point,
        MapAnchor::BottomRight => anchor_point.offset(-width, -height),
    }
}

/// Position of `location` relative to a viewport whose top-left corner is at
/// `origin`. The x coordinate wraps around the world, so objects just across
/// the antimeridian land next to the viewport edge instead of a world away.
pub fn project_into_viewport(location: &GeoLocation, origin: MapPoint, zoom: u8) -> MapPoint {
    let point = coordinate_to_display(location, zoom);
    MapPoint::new(
        (point.x - origin.x).rem_euclid(map_extent(zoom)),
        point.y - origin.y,
    )
}

/// Geographic area shown by a viewport of `map_size` pixels whose `anchor`
/// point sits at `base`.
///
/// Corner longitudes are normalized, so a viewport straddling the
/// antimeridian yields an area with `top_left_lon > bottom_right_lon`. A
/// viewport at least as wide as the world covers every longitude.
pub fn calculate_coverage(map_size: MapSize, base: &GeoLocation, anchor: MapAnchor, zoom: u8) -> Area {
    let top_left = viewport_origin(map_size, base, anchor, zoom);
    let bottom_right = top_left.offset(map_size.width as f64, map_size.height as f64);

    let top_left = display_to_coordinates(top_left, zoom, true);
    let bottom_right = display_to_coordinates(bottom_right, zoom, true);
    if map_size.width as f64 >= map_extent(zoom) {
        return Area::new(top_left.latitude, -180.0, bottom_right.latitude, 180.0);
    }
    Area::new(
        top_left.latitude,
        top_left.longitude,
        bottom_right.latitude,
        bottom_right.longitude,
    )
}

// ============================================================================
// Tiles
// ============================================================================

/// Slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Column, 0 at the antimeridian going east
    pub x: u32,
    /// Row, 0 at the north edge
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    /// Pixel position of the tile's north-west corner on the virtual map.
    pub fn origin(&self) -> MapPoint {
        MapPoint::new(
            self.x as f64 * TILE_SIZE as f64,
            self.y as f64 * TILE_SIZE as f64,
        )
    }

    /// Geographic position of the tile's north-west corner.
    pub fn north_west(&self) -> GeoLocation {
        display_to_coordinates(self.origin(), self.zoom, false)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Tile containing `location`. Positions off the map edge snap to the
/// nearest edge tile.
pub fn tile_for_location(location: &GeoLocation, zoom: u8) -> TileCoord {
    let zoom = clamp_zoom(zoom);
    let point = coordinate_to_display(location, zoom);
    let last = (tiles_per_side(zoom) - 1) as f64;
    let tile = TILE_SIZE as f64;

    TileCoord {
        x: (point.x / tile).floor().clamp(0.0, last) as u32,
        y: (point.y / tile).floor().clamp(0.0, last) as u32,
        zoom,
    }
}

/// Block of tiles covering a viewport.
///
/// Columns are unbounded and wrap around the world when iterated, so a
/// viewport crossing the antimeridian still gets contiguous tiles. Rows are
/// limited to the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileRange {
    pub zoom: u8,
    pub first_x: i64,
    pub last_x: i64,
    pub first_y: i64,
    pub last_y: i64,
    /// Where the first tile's north-west corner lands, relative to the
    /// viewport's top-left pixel
    pub offset: MapPoint,
}

impl TileRange {
    pub fn columns(&self) -> usize {
        (self.last_x - self.first_x + 1).max(0) as usize
    }

    pub fn rows(&self) -> usize {
        (self.last_y - self.first_y + 1).max(0) as usize
    }

    pub fn len(&self) -> usize {
        self.columns() * self.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles in row-major order.
    pub fn iter(&self) -> TileRangeIter {
        TileRangeIter {
            range: *self,
            position: 0,
        }
    }
}

impl IntoIterator for &TileRange {
    type Item = TileCoord;
    type IntoIter = TileRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the tiles of a [`TileRange`].
#[derive(Debug, Clone)]
pub struct TileRangeIter {
    range: TileRange,
    position: usize,
}

impl Iterator for TileRangeIter {
    type Item = TileCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.range.len() {
            return None;
        }
        let columns = self.range.columns();
        let column = (self.position % columns) as i64;
        let row = (self.position / columns) as i64;
        self.position += 1;

        let n = tiles_per_side(self.range.zoom);
        Some(TileCoord {
            x: (self.range.first_x + column).rem_euclid(n) as u32,
            y: (self.range.first_y + row) as u32,
            zoom: self.range.zoom,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.range.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TileRangeIter {}

/// Tiles needed to draw a viewport of `map_size` pixels centred on `center`.
pub fn tiles_for_viewport(map_size: MapSize, center: &GeoLocation, zoom: u8) -> TileRange {
    let zoom = clamp_zoom(zoom);
    let tile = TILE_SIZE as f64;
    let center_point = coordinate_to_display(center, zoom);
    let left = center_point.x - map_size.width as f64 / 2.0;
    let top = center_point.y - map_size.height as f64 / 2.0;
    let right = left + map_size.width as f64;
    let bottom = top + map_size.height as f64;

    let first_x = (left / tile).floor() as i64;
    let last_x = (right / tile).ceil() as i64 - 1;
    let first_y = ((top / tile).floor() as i64).max(0);
    let last_y = ((bottom / tile).ceil() as i64 - 1).min(tiles_per_side(zoom) - 1);

    TileRange {
        zoom,
        first_x,
        last_x,
        first_y,
        last_y,
        offset: MapPoint::new(
            first_x as f64 * tile - left,
            first_y as f64 * tile - top,
        ),
    }
}
