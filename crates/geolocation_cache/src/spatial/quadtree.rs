//! Bucket point quad-tree over latitude/longitude
//!
//! The root covers the whole world (`[-180, 180] × [-90, 90]`). Leaves hold up
//! to `max_entries` points and split into four quadrants when they overflow,
//! until `max_depth` is reached. Removing points collapses a subtree back into
//! a leaf once it fits into a single bucket again.
//!
//! Points outside the world bounds (or with non-finite coordinates) are kept
//! in a flat overflow list that every query scans, so results stay exact for
//! any input.

use super::{SpatialIndex, SpatialIndexStats};
use crate::types::{Area, ObjectId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Default bucket size before a leaf splits
pub const DEFAULT_MAX_ENTRIES: usize = 16;
/// Default maximum subdivision depth (cells of roughly 0.005° at the bottom)
pub const DEFAULT_MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

const WORLD: Bounds = Bounds {
    west: -180.0,
    south: -90.0,
    east: 180.0,
    north: 90.0,
};

/// Closed query rectangle, already split at the antimeridian.
#[derive(Debug, Clone, Copy)]
struct Window {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl Window {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }
}

impl Bounds {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    fn intersects(&self, w: &Window) -> bool {
        self.south <= w.north && self.north >= w.south && self.west <= w.east && self.east >= w.west
    }

    fn inside(&self, w: &Window) -> bool {
        self.south >= w.south && self.north <= w.north && self.west >= w.west && self.east <= w.east
    }

    fn mid(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Quadrant index: bit 0 = east half, bit 1 = north half.
    ///
    /// Points on a split line go to the east/north side, whose closed bounds
    /// include that line.
    fn quadrant(&self, lat: f64, lon: f64) -> usize {
        let (mid_lat, mid_lon) = self.mid();
        (((lat >= mid_lat) as usize) << 1) | (lon >= mid_lon) as usize
    }

    fn split(&self) -> [Bounds; 4] {
        let (mid_lat, mid_lon) = self.mid();
        [
            Bounds { west: self.west, south: self.south, east: mid_lon, north: mid_lat },
            Bounds { west: mid_lon, south: self.south, east: self.east, north: mid_lat },
            Bounds { west: self.west, south: mid_lat, east: mid_lon, north: self.north },
            Bounds { west: mid_lon, south: mid_lat, east: self.east, north: self.north },
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    lat: f64,
    lon: f64,
    id: T,
}

#[derive(Debug)]
struct Node<T> {
    bounds: Bounds,
    entries: Vec<Entry<T>>,
    children: Option<Box<[Node<T>; 4]>>,
    /// Number of entries in this subtree
    len: usize,
}

/// Shape of a subtree, gathered by a full walk.
#[derive(Debug, Default)]
struct Shape {
    max_depth: usize,
    leaf_nodes: usize,
    internal_nodes: usize,
}

impl<T: Copy + Eq> Node<T> {
    fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            len: 0,
        }
    }

    fn insert(&mut self, entry: Entry<T>, depth: usize, max_entries: usize, max_depth: usize) {
        self.len += 1;
        if let Some(children) = &mut self.children {
            let q = self.bounds.quadrant(entry.lat, entry.lon);
            children[q].insert(entry, depth + 1, max_entries, max_depth);
            return;
        }

        self.entries.push(entry);
        if self.entries.len() > max_entries && depth < max_depth {
            self.subdivide(depth, max_entries, max_depth);
        }
    }

    fn subdivide(&mut self, depth: usize, max_entries: usize, max_depth: usize) {
        let [sw, se, nw, ne] = self.bounds.split();
        let mut children = Box::new([Node::new(sw), Node::new(se), Node::new(nw), Node::new(ne)]);
        for entry in self.entries.drain(..) {
            let q = self.bounds.quadrant(entry.lat, entry.lon);
            children[q].insert(entry, depth + 1, max_entries, max_depth);
        }
        self.entries.shrink_to_fit();
        self.children = Some(children);
    }

    fn remove(&mut self, lat: f64, lon: f64, id: T, max_entries: usize) -> bool {
        let removed = match &mut self.children {
            Some(children) => {
                let q = self.bounds.quadrant(lat, lon);
                children[q].remove(lat, lon, id, max_entries)
            }
            None => match self.entries.iter().position(|e| e.id == id) {
                Some(pos) => {
                    self.entries.swap_remove(pos);
                    true
                }
                None => false,
            },
        };

        if removed {
            self.len -= 1;
            if self.children.is_some() && self.len <= max_entries {
                self.collapse();
            }
        }
        removed
    }

    /// Pulls every entry of the subtree back into this node.
    fn collapse(&mut self) {
        if let Some(children) = self.children.take() {
            let mut entries = Vec::with_capacity(self.len);
            for child in children.iter() {
                child.collect_all(&mut entries);
            }
            self.entries = entries;
        }
    }

    fn collect_all(&self, out: &mut Vec<Entry<T>>) {
        out.extend_from_slice(&self.entries);
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_all(out);
            }
        }
    }

    fn query(&self, window: &Window, out: &mut Vec<T>) {
        if self.len == 0 || !self.bounds.intersects(window) {
            return;
        }
        match &self.children {
            Some(children) if self.bounds.inside(window) => {
                for child in children.iter() {
                    child.collect_ids(out);
                }
            }
            Some(children) => {
                for child in children.iter() {
                    child.query(window, out);
                }
            }
            None => out.extend(
                self.entries
                    .iter()
                    .filter(|e| window.contains(e.lat, e.lon))
                    .map(|e| e.id),
            ),
        }
    }

    fn collect_ids(&self, out: &mut Vec<T>) {
        out.extend(self.entries.iter().map(|e| e.id));
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_ids(out);
            }
        }
    }

    fn shape(&self, depth: usize, shape: &mut Shape) {
        shape.max_depth = shape.max_depth.max(depth);
        match &self.children {
            Some(children) => {
                shape.internal_nodes += 1;
                for child in children.iter() {
                    child.shape(depth + 1, shape);
                }
            }
            None => shape.leaf_nodes += 1,
        }
    }
}

/// Point quad-tree storing opaque ids.
///
/// Generic over the stored id so it can be used outside the cache; the cache
/// itself uses `QuadTree<ObjectId>` through [`SpatialIndex`].
///
/// # Examples
///
/// ```rust
/// use geolocation_cache::spatial::QuadTree;
/// use geolocation_cache::Area;
///
/// let mut tree = QuadTree::new(4, 8);
/// tree.insert(48.85, 2.35, "paris");
/// tree.insert(51.51, -0.13, "london");
///
/// let hits = tree.query(&Area::new(50.0, 1.0, 48.0, 3.0));
/// assert_eq!(hits, vec!["paris"]);
/// ```
#[derive(Debug)]
pub struct QuadTree<T> {
    root: Node<T>,
    overflow: Vec<Entry<T>>,
    locations: HashMap<T, (f64, f64)>,
    max_entries: usize,
    max_depth: usize,
    stats: SpatialIndexStats,
}

impl<T: Copy + Eq + Hash + Debug> QuadTree<T> {
    /// Creates an empty tree.
    ///
    /// `max_entries` is clamped to at least 1.
    pub fn new(max_entries: usize, max_depth: usize) -> Self {
        Self {
            root: Node::new(WORLD),
            overflow: Vec::new(),
            locations: HashMap::new(),
            max_entries: max_entries.max(1),
            max_depth,
            stats: SpatialIndexStats::default(),
        }
    }

    /// Adds a point.
    ///
    /// Precondition: `id` is not already present; call [`QuadTree::remove`]
    /// first when a point moves.
    pub fn insert(&mut self, latitude: f64, longitude: f64, id: T) {
        debug_assert!(
            !self.locations.contains_key(&id),
            "QuadTree::insert called for {id:?} which is already indexed"
        );
        let entry = Entry {
            lat: latitude,
            lon: longitude,
            id,
        };
        if WORLD.contains(latitude, longitude) {
            self.root
                .insert(entry, 0, self.max_entries, self.max_depth);
        } else {
            self.overflow.push(entry);
        }
        self.locations.insert(id, (latitude, longitude));
        self.stats.total_insertions += 1;
    }

    /// Removes the point stored for `id`.
    pub fn remove(&mut self, id: &T) -> bool {
        let Some((lat, lon)) = self.locations.remove(id) else {
            return false;
        };
        let removed = if WORLD.contains(lat, lon) {
            self.root.remove(lat, lon, *id, self.max_entries)
        } else {
            match self.overflow.iter().position(|e| e.id == *id) {
                Some(pos) => {
                    self.overflow.swap_remove(pos);
                    true
                }
                None => false,
            }
        };
        debug_assert!(removed, "location table and tree disagree about {id:?}");
        if removed {
            self.stats.total_removals += 1;
        }
        removed
    }

    /// Ids of all points inside `area`.
    pub fn query(&mut self, area: &Area) -> Vec<T> {
        let (south, north) = area.lat_range();
        let mut out = Vec::new();
        for (west, east) in area.lon_ranges() {
            let window = Window {
                west,
                south,
                east,
                north,
            };
            self.root.query(&window, &mut out);
        }
        out.extend(
            self.overflow
                .iter()
                .filter(|e| area.contains(e.lat, e.lon))
                .map(|e| e.id),
        );

        self.stats.total_queries += 1;
        self.stats.last_query_result_count = out.len();
        out
    }

    /// Drops every point and resets the tree to a single empty leaf.
    pub fn remove_all(&mut self) {
        self.root = Node::new(WORLD);
        self.overflow.clear();
        self.locations.clear();
        self.stats.total_clears += 1;
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, id: &T) -> bool {
        self.locations.contains_key(id)
    }

    /// Stored `(latitude, longitude)` for `id`.
    pub fn location_of(&self, id: &T) -> Option<(f64, f64)> {
        self.locations.get(id).copied()
    }

    pub fn stats(&self) -> SpatialIndexStats {
        let mut shape = Shape::default();
        self.root.shape(0, &mut shape);
        SpatialIndexStats {
            object_count: self.len(),
            overflow_count: self.overflow.len(),
            max_depth: shape.max_depth,
            leaf_nodes: shape.leaf_nodes,
            internal_nodes: shape.internal_nodes,
            ..self.stats.clone()
        }
    }
}

impl<T: Copy + Eq + Hash + Debug> Default for QuadTree<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_DEPTH)
    }
}

impl SpatialIndex for QuadTree<ObjectId> {
    fn insert(&mut self, latitude: f64, longitude: f64, id: ObjectId) {
        QuadTree::insert(self, latitude, longitude, id);
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        QuadTree::remove(self, &id)
    }

    fn query(&mut self, area: &Area) -> Vec<ObjectId> {
        QuadTree::query(self, area)
    }

    fn remove_all(&mut self) {
        QuadTree::remove_all(self);
    }

    fn len(&self) -> usize {
        QuadTree::len(self)
    }

    fn contains(&self, id: ObjectId) -> bool {
        QuadTree::contains(self, &id)
    }

    fn location_of(&self, id: ObjectId) -> Option<(f64, f64)> {
        QuadTree::location_of(self, &id)
    }

    fn stats(&self) -> SpatialIndexStats {
        QuadTree::stats(self)
    }
}
