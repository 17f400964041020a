//! Geolocation change listeners
//!
//! Listeners are held in a [`ListenerRegistry`] that has its own locking,
//! independent of the cache data lock. Notifications iterate over a snapshot
//! of the registry, so a callback may register or unregister listeners, or
//! query the cache, without deadlocking.

use crate::types::{GeoLocation, MonitoredObject};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Receives notifications about objects whose indexed position changed.
pub trait GeoLocationListener: Send + Sync {
    /// Called after `object` was added to, moved within or removed from the
    /// spatial index. `previous` is the position the index held before the
    /// change, or `None` if the object was not indexed.
    fn geolocation_changed(&self, object: &MonitoredObject, previous: Option<&GeoLocation>);

    /// Called after the cache was rebuilt from scratch. Per-object
    /// notifications are not sent for a rebuild.
    fn cache_rebuilt(&self) {}
}

impl<F> GeoLocationListener for F
where
    F: Fn(&MonitoredObject, Option<&GeoLocation>) + Send + Sync,
{
    fn geolocation_changed(&self, object: &MonitoredObject, previous: Option<&GeoLocation>) {
        self(object, previous)
    }
}

/// Handle returned by [`ListenerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concurrent set of listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<ListenerId, Arc<dyn GeoLocationListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener and returns the id to remove it with.
    pub fn register(&self, listener: Arc<dyn GeoLocationListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.insert(id, listener);
        trace!("👂 Registered geolocation listener {}", id);
        id
    }

    /// Removes a listener. Returns `false` if the id is unknown.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers a change notification to every listener.
    pub fn notify_changed(&self, object: &MonitoredObject, previous: Option<&GeoLocation>) {
        for listener in self.snapshot() {
            listener.geolocation_changed(object, previous);
        }
    }

    /// Tells every listener that the cache was rebuilt.
    pub fn notify_rebuilt(&self) {
        for listener in self.snapshot() {
            listener.cache_rebuilt();
        }
    }

    // Shard locks must not be held while callbacks run.
    fn snapshot(&self) -> Vec<Arc<dyn GeoLocationListener>> {
        self.listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
