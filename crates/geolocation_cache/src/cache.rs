//! The geolocation cache
//!
//! [`GeolocationCache`] mirrors the located objects of a session in a spatial
//! index so that map views can ask "what is inside this rectangle" without
//! walking every object. The object map and the index live behind a single
//! mutex and are always mutated together; listener callbacks run only after
//! that mutex is released.

use crate::config::CacheConfig;
use crate::error::GeoCacheError;
use crate::listener::{GeoLocationListener, ListenerId, ListenerRegistry};
use crate::session::{ObjectProvider, SessionNotification};
use crate::spatial::{create_index, SpatialIndex, SpatialIndexStats};
use crate::types::{Area, GeoLocation, MonitoredObject, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Objects and their index entries. Invariant: an id is a key of `objects`
/// exactly when it is stored in `index`, at `objects[id].geolocation`.
struct CacheState {
    objects: HashMap<ObjectId, Arc<MonitoredObject>>,
    index: Box<dyn SpatialIndex>,
}

impl CacheState {
    fn rebuild(&mut self, objects: impl IntoIterator<Item = Arc<MonitoredObject>>) {
        self.objects = objects.into_iter().map(|o| (o.id, o)).collect();
        let points = self
            .objects
            .values()
            .map(|o| (o.geolocation.latitude, o.geolocation.longitude, o.id))
            .collect();
        self.index.rebuild_from(points);
    }

    fn insert(&mut self, object: Arc<MonitoredObject>) {
        let location = object.geolocation;
        self.index
            .insert(location.latitude, location.longitude, object.id);
        self.objects.insert(object.id, object);
    }

    fn remove(&mut self, id: ObjectId) -> Option<Arc<MonitoredObject>> {
        let removed = self.objects.remove(&id)?;
        self.index.remove(id);
        Some(removed)
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    rebuilds: AtomicU64,
    index_updates: AtomicU64,
    ignored_updates: AtomicU64,
    queries: AtomicU64,
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Objects currently indexed
    pub object_count: usize,
    /// Registered geolocation listeners
    pub listener_count: usize,
    /// Full rebuilds since creation
    pub rebuilds: u64,
    /// Incremental changes that mutated the index
    pub index_updates: u64,
    /// Incremental changes that left the index untouched
    pub ignored_updates: u64,
    /// Area queries answered
    pub queries: u64,
    /// Index-level statistics
    pub index: SpatialIndexStats,
}

/// Spatial cache of located monitored objects.
///
/// The cache is safe to share between threads (`Arc<GeolocationCache>`).
/// It never owns objects, only shared snapshots handed out by the
/// [`ObjectProvider`] or by change notifications.
pub struct GeolocationCache {
    provider: Arc<dyn ObjectProvider>,
    state: Mutex<CacheState>,
    listeners: ListenerRegistry,
    counters: CacheCounters,
}

impl GeolocationCache {
    /// Creates an empty cache. Call [`initialize`](Self::initialize) to load
    /// the provider's objects.
    pub fn new(provider: Arc<dyn ObjectProvider>, config: &CacheConfig) -> Result<Self, GeoCacheError> {
        config.validate()?;
        debug!("Creating geolocation cache with {:?} index", config.index.backend);
        Ok(Self {
            provider,
            state: Mutex::new(CacheState {
                objects: HashMap::new(),
                index: create_index(&config.index),
            }),
            listeners: ListenerRegistry::new(),
            counters: CacheCounters::default(),
        })
    }

    /// Rebuilds the cache from every object the provider knows.
    ///
    /// Returns the number of indexed objects. Listeners receive
    /// [`cache_rebuilt`](GeoLocationListener::cache_rebuilt) instead of one
    /// notification per object.
    pub fn initialize(&self) -> usize {
        let started = Instant::now();
        let (indexed, seen) = {
            let mut state = self.lock_state();
            let objects = self.provider.all_objects();
            let seen = objects.len();
            state.rebuild(objects.into_iter().filter(|o| o.is_mappable()));
            (state.objects.len(), seen)
        };
        self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);

        info!(
            "🗺️ Geolocation cache rebuilt: {} of {} objects indexed in {:?}",
            indexed,
            seen,
            started.elapsed()
        );
        self.listeners.notify_rebuilt();
        indexed
    }

    /// Applies a created or modified object.
    ///
    /// Returns `true` if the index changed, in which case listeners were
    /// told the object's previous indexed position (if any). Objects of
    /// non-indexed classes are ignored, and a change that keeps the position
    /// only refreshes the stored snapshot.
    pub fn on_object_changed(&self, object: Arc<MonitoredObject>) -> bool {
        if !object.class.is_geo_indexed() {
            self.counters.ignored_updates.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let id = object.id;
        let location = object.geolocation;
        let previous = {
            let mut state = self.lock_state();
            let stored = state.objects.get(&id).map(|o| o.geolocation);

            match stored {
                None if !location.is_set() => None,
                Some(old) if !location.is_set() => {
                    state.remove(id);
                    debug!("Object {} lost its location, removed from index", id);
                    Some(Some(old))
                }
                None => {
                    state.insert(Arc::clone(&object));
                    debug!("Object {} indexed at {}", id, location);
                    Some(None)
                }
                Some(old) if old.same_position(&location) => {
                    state.objects.insert(id, Arc::clone(&object));
                    None
                }
                Some(old) => {
                    state.remove(id);
                    state.insert(Arc::clone(&object));
                    debug!("Object {} moved from {} to {}", id, old, location);
                    Some(Some(old))
                }
            }
        };

        match previous {
            Some(previous) => {
                self.counters.index_updates.fetch_add(1, Ordering::Relaxed);
                self.listeners.notify_changed(&object, previous.as_ref());
                true
            }
            None => {
                self.counters.ignored_updates.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Drops a deleted object. Returns `false` if it was not indexed.
    pub fn remove_object(&self, id: ObjectId) -> bool {
        let removed = self.lock_state().remove(id);
        let Some(object) = removed else {
            return false;
        };
        debug!("Object {} deleted, removed from index", id);
        self.counters.index_updates.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .notify_changed(&object, Some(&object.geolocation));
        true
    }

    /// Routes a session notification to the matching operation.
    pub fn handle_notification(&self, notification: &SessionNotification) {
        match notification {
            SessionNotification::ObjectChanged(object) => {
                self.on_object_changed(Arc::clone(object));
            }
            SessionNotification::ObjectDeleted(id) => {
                self.remove_object(*id);
            }
            SessionNotification::ObjectSyncCompleted => {
                self.initialize();
            }
        }
    }

    /// Objects located within `area`.
    ///
    /// With `parent` other than [`ObjectId::NONE`] only descendants of that
    /// object (through parent links, at any depth) are returned. A non-empty
    /// `name_filter` keeps objects whose name contains it, ignoring case.
    /// The result is a fresh list in no particular order.
    pub fn objects_in_area(&self, area: &Area, parent: ObjectId, name_filter: &str) -> Vec<Arc<MonitoredObject>> {
        let candidates: Vec<Arc<MonitoredObject>> = {
            let mut state = self.lock_state();
            let ids = state.index.query(area);
            ids.iter()
                .filter_map(|id| state.objects.get(id).cloned())
                .collect()
        };
        self.counters.queries.fetch_add(1, Ordering::Relaxed);

        let needle = name_filter.to_lowercase();
        let total = candidates.len();
        let result: Vec<Arc<MonitoredObject>> = candidates
            .into_iter()
            .filter(|object| parent.is_none() || self.is_descendant_of(object, parent))
            .filter(|object| needle.is_empty() || object.name.to_lowercase().contains(&needle))
            .collect();

        trace!(
            "Area query {:?} (parent {}, filter {:?}): {} of {} candidates",
            area,
            parent,
            name_filter,
            result.len(),
            total
        );
        result
    }

    /// Walks parent links upwards from `object` looking for `ancestor`.
    fn is_descendant_of(&self, object: &MonitoredObject, ancestor: ObjectId) -> bool {
        let mut visited: HashSet<ObjectId> = HashSet::from([object.id]);
        let mut pending: VecDeque<ObjectId> = object.parent_ids.iter().copied().collect();

        while let Some(id) = pending.pop_front() {
            if id == ancestor {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(parent) = self.provider.find_object(id) {
                pending.extend(parent.parent_ids.iter().copied());
            }
        }
        false
    }

    /// Registers a listener for index changes.
    pub fn add_listener(&self, listener: Arc<dyn GeoLocationListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    /// Unregisters a listener. Returns `false` if the id is unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.lock_state().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.lock_state().objects.contains_key(&id)
    }

    /// Indexed location of an object.
    pub fn location_of(&self, id: ObjectId) -> Option<GeoLocation> {
        self.lock_state().objects.get(&id).map(|o| o.geolocation)
    }

    pub fn stats(&self) -> CacheStats {
        let (object_count, index) = {
            let state = self.lock_state();
            (state.objects.len(), state.index.stats())
        };
        CacheStats {
            object_count,
            listener_count: self.listeners.len(),
            rebuilds: self.counters.rebuilds.load(Ordering::Relaxed),
            index_updates: self.counters.index_updates.load(Ordering::Relaxed),
            ignored_updates: self.counters.ignored_updates.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
            index,
        }
    }

    /// Checks that the object map and the index describe the same points.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let state = self.lock_state();
        state.objects.len() == state.index.len()
            && state.objects.values().all(|object| {
                state.index.location_of(object.id).is_some_and(|(lat, lon)| {
                    (lat == object.geolocation.latitude || (lat.is_nan() && object.geolocation.latitude.is_nan()))
                        && (lon == object.geolocation.longitude
                            || (lon.is_nan() && object.geolocation.longitude.is_nan()))
                })
            })
    }

    // Every mutation leaves the state consistent before any code that could
    // panic runs, so a poisoned lock still guards valid data.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for GeolocationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("GeolocationCache")
            .field("objects", &state.objects.len())
            .field("index", &state.index)
            .field("listeners", &self.listeners)
            .finish()
    }
}
