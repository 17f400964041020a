//! Spatial indexing of object positions
//!
//! This module provides the point index the geolocation cache keeps its
//! located objects in. Two interchangeable backends implement
//! [`SpatialIndex`]: a bucket quad-tree (the default) and an R*-tree backed by
//! the `rstar` crate. Both answer rectangular queries exactly.

mod quadtree;
mod rtree;

pub use quadtree::{QuadTree, DEFAULT_MAX_DEPTH, DEFAULT_MAX_ENTRIES};
pub use rtree::RTreeIndex;

use crate::config::IndexSettings;
use crate::types::{Area, ObjectId};
use serde::{Deserialize, Serialize};

/// A point store keyed by object id.
///
/// The index is a dumb store: it does not know about object classes or
/// location kinds, and it does not enforce the one-entry-per-id rule. Callers
/// must `remove` an id before inserting it again at a new position.
pub trait SpatialIndex: Send + std::fmt::Debug {
    /// Adds a point.
    ///
    /// Precondition: `id` is not currently present. Violations are caught by
    /// a debug assertion only; in release builds the stale entry would stay
    /// in the structure.
    fn insert(&mut self, latitude: f64, longitude: f64, id: ObjectId);

    /// Removes the entry for `id`. Returns whether anything was removed.
    fn remove(&mut self, id: ObjectId) -> bool;

    /// Returns every id whose point lies within `area` (inclusive bounds).
    ///
    /// Result order is unspecified.
    fn query(&mut self, area: &Area) -> Vec<ObjectId>;

    /// Clears the whole structure.
    fn remove_all(&mut self);

    /// Replaces the contents with `points` given as `(latitude, longitude, id)`.
    ///
    /// Ids must be unique. Backends that can build in one pass override this.
    fn rebuild_from(&mut self, points: Vec<(f64, f64, ObjectId)>) {
        self.remove_all();
        for (latitude, longitude, id) in points {
            self.insert(latitude, longitude, id);
        }
    }

    /// Number of stored points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry for `id` exists.
    fn contains(&self, id: ObjectId) -> bool;

    /// Stored `(latitude, longitude)` of `id`.
    fn location_of(&self, id: ObjectId) -> Option<(f64, f64)>;

    /// Operation counters and structure shape.
    fn stats(&self) -> SpatialIndexStats;
}

/// Available index implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Bucket point quad-tree over the world bounds
    #[default]
    QuadTree,
    /// R*-tree from the `rstar` crate
    RTree,
}

/// Builds an empty index as described by the settings.
pub fn create_index(settings: &IndexSettings) -> Box<dyn SpatialIndex> {
    match settings.backend {
        IndexBackend::QuadTree => Box::new(QuadTree::<ObjectId>::new(
            settings.max_entries_per_node,
            settings.max_depth,
        )),
        IndexBackend::RTree => Box::new(RTreeIndex::new()),
    }
}

/// Statistics for analyzing index behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialIndexStats {
    pub total_insertions: u64,
    pub total_removals: u64,
    pub total_queries: u64,
    pub total_clears: u64,
    pub last_query_result_count: usize,
    /// Points currently stored
    pub object_count: usize,
    /// Points stored outside the tree proper (out of world bounds or non-finite)
    pub overflow_count: usize,
    pub max_depth: usize,
    pub leaf_nodes: usize,
    pub internal_nodes: usize,
}
