//! R*-tree based spatial indexing
//!
//! This module provides a 2D point index backed by the `rstar` crate. Points
//! are stored as `[longitude, latitude]` so the envelope axes line up with
//! map x/y.

use super::{SpatialIndex, SpatialIndexStats};
use crate::types::{Area, ObjectId};
use rstar::{ParentNode, RTree, RTreeNode, RTreeObject, AABB};
use std::collections::HashMap;

/// Entry stored inside the R-tree.
#[derive(Debug, Clone, Copy)]
struct SpatialEntry {
    id: ObjectId,
    point: [f64; 2],
}

impl SpatialEntry {
    fn new(id: ObjectId, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            point: [longitude, latitude],
        }
    }

    fn latitude(&self) -> f64 {
        self.point[1]
    }

    fn longitude(&self) -> f64 {
        self.point[0]
    }

    fn is_finite(&self) -> bool {
        self.point.iter().all(|c| c.is_finite())
    }
}

impl PartialEq for SpatialEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// R*-tree point index keyed by object id
#[derive(Debug)]
pub struct RTreeIndex {
    /// Underlying R-tree
    tree: RTree<SpatialEntry>,
    /// Cached entries for efficient removals
    entries: HashMap<ObjectId, SpatialEntry>,
    /// Points with NaN/infinite coordinates, which the tree cannot order
    non_finite: Vec<SpatialEntry>,
    /// Performance statistics
    stats: SpatialIndexStats,
}

impl RTreeIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self {
            tree: RTree::new(),
            entries: HashMap::new(),
            non_finite: Vec::new(),
            stats: SpatialIndexStats::default(),
        }
    }

    fn node_stats(&self) -> (usize, usize, usize) {
        fn walk(node: &ParentNode<SpatialEntry>, depth: usize, acc: &mut (usize, usize, usize)) {
            acc.0 = acc.0.max(depth);
            acc.2 += 1;
            let mut has_leaf = false;
            for child in node.children() {
                match child {
                    RTreeNode::Leaf(_) => has_leaf = true,
                    RTreeNode::Parent(parent) => walk(parent, depth + 1, acc),
                }
            }
            if has_leaf {
                acc.1 += 1;
            }
        }

        // (max depth, nodes holding points, all nodes)
        let mut acc = (0, 0, 0);
        walk(self.tree.root(), 0, &mut acc);
        acc
    }
}

impl Default for RTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex for RTreeIndex {
    fn insert(&mut self, latitude: f64, longitude: f64, id: ObjectId) {
        debug_assert!(
            !self.entries.contains_key(&id),
            "RTreeIndex::insert called for {id} which is already indexed"
        );
        let entry = SpatialEntry::new(id, latitude, longitude);
        if entry.is_finite() {
            self.tree.insert(entry);
        } else {
            self.non_finite.push(entry);
        }
        self.entries.insert(id, entry);
        self.stats.total_insertions += 1;
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        let Some(existing) = self.entries.remove(&id) else {
            return false;
        };
        let removed = if existing.is_finite() {
            self.tree.remove(&existing).is_some()
        } else {
            let before = self.non_finite.len();
            self.non_finite.retain(|e| e.id != id);
            self.non_finite.len() != before
        };
        if removed {
            self.stats.total_removals += 1;
        }
        removed
    }

    fn query(&mut self, area: &Area) -> Vec<ObjectId> {
        let (south, north) = area.lat_range();
        let mut results: Vec<ObjectId> = Vec::new();
        for (west, east) in area.lon_ranges() {
            let envelope = AABB::from_corners([west, south], [east, north]);
            results.extend(self.tree.locate_in_envelope(&envelope).map(|e| e.id));
        }
        results.extend(
            self.non_finite
                .iter()
                .filter(|e| area.contains(e.latitude(), e.longitude()))
                .map(|e| e.id),
        );

        self.stats.total_queries += 1;
        self.stats.last_query_result_count = results.len();
        results
    }

    fn remove_all(&mut self) {
        self.tree = RTree::new();
        self.entries.clear();
        self.non_finite.clear();
        self.stats.total_clears += 1;
    }

    /// Builds the tree in one pass using `rstar` bulk loading.
    fn rebuild_from(&mut self, points: Vec<(f64, f64, ObjectId)>) {
        self.entries.clear();
        self.non_finite.clear();
        let mut finite = Vec::with_capacity(points.len());
        for (lat, lon, id) in points {
            let entry = SpatialEntry::new(id, lat, lon);
            let previous = self.entries.insert(id, entry);
            debug_assert!(previous.is_none(), "RTreeIndex::rebuild_from got {id} twice");
            if entry.is_finite() {
                finite.push(entry);
            } else {
                self.non_finite.push(entry);
            }
        }
        self.tree = RTree::bulk_load(finite);
        self.stats.total_clears += 1;
        self.stats.total_insertions += self.entries.len() as u64;
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    fn location_of(&self, id: ObjectId) -> Option<(f64, f64)> {
        self.entries
            .get(&id)
            .map(|e| (e.latitude(), e.longitude()))
    }

    fn stats(&self) -> SpatialIndexStats {
        let (max_depth, leaf_nodes, nodes) = self.node_stats();
        SpatialIndexStats {
            object_count: self.entries.len(),
            overflow_count: self.non_finite.len(),
            max_depth,
            leaf_nodes,
            internal_nodes: nodes - leaf_nodes,
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_query() {
        let mut index = RTreeIndex::new();
        index.insert(10.0, 20.0, ObjectId(1));
        index.insert(30.0, 40.0, ObjectId(2));

        assert_eq!(index.len(), 2);
        assert!(index.contains(ObjectId(1)));

        let results = index.query(&Area::new(15.0, 15.0, 5.0, 25.0));
        assert_eq!(results, vec![ObjectId(1)]);

        let mut wider = index.query(&Area::new(35.0, 15.0, 5.0, 45.0));
        wider.sort();
        assert_eq!(wider, vec![ObjectId(1), ObjectId(2)]);
    }

    #[test]
    fn test_move_requires_remove_first() {
        let mut index = RTreeIndex::new();
        index.insert(0.0, 0.0, ObjectId(9));
        assert!(index.remove(ObjectId(9)));
        index.insert(0.0, 20.0, ObjectId(9));

        assert!(index.query(&Area::new(1.0, -1.0, -1.0, 1.0)).is_empty());
        assert_eq!(
            index.query(&Area::new(1.0, 19.0, -1.0, 21.0)),
            vec![ObjectId(9)]
        );
    }

    #[test]
    fn test_remove_by_id() {
        let mut index = RTreeIndex::new();
        index.insert(5.0, 5.0, ObjectId(1));
        assert_eq!(index.len(), 1);

        assert!(index.remove(ObjectId(1)));
        assert!(!index.remove(ObjectId(1)));
        assert_eq!(index.len(), 0);
        assert_eq!(index.stats().total_removals, 1);
    }

    #[test]
    fn test_non_finite_points() {
        let mut index = RTreeIndex::new();
        index.insert(f64::NAN, 0.0, ObjectId(1));
        index.insert(0.0, f64::INFINITY, ObjectId(2));

        assert_eq!(index.stats().overflow_count, 2);
        assert_eq!(index.query(&Area::everything()), vec![ObjectId(2)]);
        assert!(index.remove(ObjectId(1)));
        assert!(index.remove(ObjectId(2)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_bulk_rebuild_matches_incremental() {
        let points: Vec<(f64, f64, ObjectId)> = (0..100)
            .map(|i| ((i % 10) as f64, (i / 10) as f64, ObjectId(i)))
            .collect();
        let mut bulk = RTreeIndex::new();
        bulk.insert(50.0, 50.0, ObjectId(500));
        bulk.rebuild_from(points.clone());
        let mut incremental = RTreeIndex::new();
        for (lat, lon, id) in points {
            incremental.insert(lat, lon, id);
        }

        let area = Area::new(4.0, 2.0, 1.0, 6.0);
        let mut a = bulk.query(&area);
        let mut b = incremental.query(&area);
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4 * 5);

        assert!(!bulk.contains(ObjectId(500)));
        assert_eq!(bulk.len(), 100);
        let stats = bulk.stats();
        assert_eq!(stats.total_insertions, 101);
        assert_eq!(stats.total_clears, 1);
        assert_eq!(stats.object_count, 100);
    }

    #[test]
    fn test_bulk_rebuild_keeps_non_finite_points() {
        let mut index = RTreeIndex::new();
        index.rebuild_from(vec![(1.0, 1.0, ObjectId(1)), (f64::NAN, 0.0, ObjectId(2))]);

        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().overflow_count, 1);
        assert!(index.remove(ObjectId(2)));
        assert_eq!(index.query(&Area::everything()), vec![ObjectId(1)]);
    }
}
