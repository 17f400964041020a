//! # Geolocation Cache
//!
//! An in-memory spatial cache of monitored-object locations, built for map
//! views that repeatedly ask which objects fall inside the visible area.
//!
//! ## Core Features
//!
//! - **Spatial Index**: Bucket quad-tree (default) or R*-tree behind one trait
//! - **Incremental Updates**: Follows object changes, deletions and full syncs
//! - **Listeners**: Callbacks for every position the index gains, moves or loses
//! - **Projection Math**: Web Mercator pixel conversion, viewport coverage and tiles
//!
//! ## Architecture Overview
//!
//! - [`GeolocationCache`] holds the object map and the index behind one mutex
//! - [`ObjectProvider`] is the seam to whatever owns the objects; [`LocalSession`]
//!   is an in-memory implementation publishing [`SessionNotification`]s
//! - [`spawn_notification_pump`] connects a notification channel to a cache
//! - [`projection`] is pure math and does not touch the cache
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use geolocation_cache::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Arc::new(LocalSession::with_objects(
//!         vec![MonitoredObject::new(1, ObjectClass::Node, "edge-router").located_at(52.52, 13.40)],
//!         1024,
//!     ));
//!     let cache = Arc::new(GeolocationCache::new(session.clone(), &CacheConfig::default())?);
//!     cache.initialize();
//!     let pump = spawn_notification_pump(cache.clone(), session.subscribe());
//!
//!     let area = projection::calculate_coverage(
//!         MapSize::new(1024, 768),
//!         &GeoLocation::new(52.5, 13.4),
//!         MapAnchor::Center,
//!         8,
//!     );
//!     for object in cache.objects_in_area(&area, ObjectId::NONE, "") {
//!         println!("{} at {}", object.name, object.geolocation);
//!     }
//!
//!     session.close();
//!     pump.await.ok();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod listener;
pub mod projection;
pub mod session;
pub mod spatial;
pub mod types;

#[cfg(test)]
mod tests;

pub use cache::{CacheStats, GeolocationCache};
pub use config::{CacheConfig, IndexSettings};
pub use error::GeoCacheError;
pub use listener::{GeoLocationListener, ListenerId, ListenerRegistry};
pub use projection::{
    calculate_coverage, coordinate_to_display, display_to_coordinates, project_into_viewport,
    tile_for_location, tiles_for_viewport, viewport_origin, virtual_map_size, MapAnchor,
    TileCoord, TileRange, MAX_LATITUDE, MAX_ZOOM, TILE_SIZE,
};
pub use session::{
    spawn_notification_pump, LocalSession, ObjectProvider, PumpSummary, SessionNotification,
};
pub use spatial::{create_index, IndexBackend, QuadTree, RTreeIndex, SpatialIndex, SpatialIndexStats};
pub use types::{
    Area, GeoLocation, GeoLocationKind, MapPoint, MapSize, MonitoredObject, ObjectClass, ObjectId,
};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoCacheError>;
