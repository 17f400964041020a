//! Connection to the object store the cache mirrors
//!
//! The cache reads objects through [`ObjectProvider`] and follows changes via
//! [`SessionNotification`]s. [`LocalSession`] is an in-memory provider that
//! publishes notifications on a `tokio::sync::broadcast` channel, and
//! [`spawn_notification_pump`] feeds such a channel into a cache.

use crate::cache::GeolocationCache;
use crate::types::{MonitoredObject, ObjectId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Read access to the monitored objects known to the session.
pub trait ObjectProvider: Send + Sync {
    /// Every object currently known.
    fn all_objects(&self) -> Vec<Arc<MonitoredObject>>;

    /// Looks up a single object.
    fn find_object(&self, id: ObjectId) -> Option<Arc<MonitoredObject>>;
}

/// Change events emitted by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionNotification {
    /// An object was created or modified
    ObjectChanged(Arc<MonitoredObject>),
    /// An object was deleted on the server
    ObjectDeleted(ObjectId),
    /// A full object synchronization finished
    ObjectSyncCompleted,
}

/// In-memory session.
///
/// Mutations update the object map first and publish afterwards, so a
/// subscriber handling a notification always sees the new state through
/// [`ObjectProvider`].
#[derive(Debug)]
pub struct LocalSession {
    objects: DashMap<ObjectId, Arc<MonitoredObject>>,
    sender: RwLock<Option<broadcast::Sender<SessionNotification>>>,
}

impl LocalSession {
    /// Creates an empty session whose channel buffers `capacity` notifications.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: DashMap::new(),
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Creates a session pre-populated without publishing anything.
    pub fn with_objects(objects: impl IntoIterator<Item = MonitoredObject>, capacity: usize) -> Self {
        let session = Self::new(capacity);
        for object in objects {
            session.objects.insert(object.id, Arc::new(object));
        }
        session
    }

    /// New receiver for notifications published from now on.
    ///
    /// After [`close`](Self::close) the receiver reports the channel as closed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Inserts or replaces an object and publishes `ObjectChanged`.
    pub fn upsert(&self, object: impl Into<Arc<MonitoredObject>>) {
        let object = object.into();
        self.objects.insert(object.id, Arc::clone(&object));
        self.publish(SessionNotification::ObjectChanged(object));
    }

    /// Deletes an object and publishes `ObjectDeleted`. Returns `false` if the
    /// object was unknown, in which case nothing is published.
    pub fn delete(&self, id: ObjectId) -> bool {
        if self.objects.remove(&id).is_none() {
            return false;
        }
        self.publish(SessionNotification::ObjectDeleted(id));
        true
    }

    /// Replaces the whole object set and publishes `ObjectSyncCompleted`.
    pub fn replace_all(&self, objects: impl IntoIterator<Item = MonitoredObject>) {
        self.objects.clear();
        for object in objects {
            self.objects.insert(object.id, Arc::new(object));
        }
        self.publish(SessionNotification::ObjectSyncCompleted);
    }

    /// Applies a notification received from elsewhere to the object map and
    /// republishes it.
    pub fn apply(&self, notification: SessionNotification) {
        match notification {
            SessionNotification::ObjectChanged(object) => self.upsert(object),
            SessionNotification::ObjectDeleted(id) => {
                if !self.delete(id) {
                    debug!("Ignoring deletion of unknown object {}", id);
                }
            }
            SessionNotification::ObjectSyncCompleted => {
                self.publish(SessionNotification::ObjectSyncCompleted)
            }
        }
    }

    /// Stops publishing. Receivers drain what is buffered and then see the
    /// channel closed.
    pub fn close(&self) {
        let mut guard = self.sender.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!("Session notification channel closed");
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn publish(&self, notification: SessionNotification) {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            trace!("Session closed, dropping {:?}", notification);
            return;
        };
        // No receivers is not an error for a session.
        if sender.send(notification).is_err() {
            trace!("No subscribers for session notification");
        }
    }
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new(crate::config::CacheConfig::default().notification_capacity)
    }
}

impl ObjectProvider for LocalSession {
    fn all_objects(&self) -> Vec<Arc<MonitoredObject>> {
        self.objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn find_object(&self, id: ObjectId) -> Option<Arc<MonitoredObject>> {
        self.objects.get(&id).map(|entry| Arc::clone(entry.value()))
    }
}

/// What a notification pump did before its channel closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpSummary {
    /// Notifications handed to the cache
    pub processed: u64,
    /// Notifications lost because the pump fell behind
    pub skipped: u64,
    /// Full rebuilds done to recover from lost notifications
    pub recoveries: u64,
}

/// Spawns a task that applies session notifications to `cache` until the
/// channel closes.
///
/// When the receiver lags, the skipped notifications are gone and the
/// incremental state can no longer be trusted, so the cache is rebuilt from
/// the provider.
pub fn spawn_notification_pump(
    cache: Arc<GeolocationCache>,
    mut receiver: broadcast::Receiver<SessionNotification>,
) -> JoinHandle<PumpSummary> {
    tokio::spawn(async move {
        info!("📡 Geolocation notification pump started");
        let mut summary = PumpSummary::default();

        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    cache.handle_notification(&notification);
                    summary.processed += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "⚠️ Notification pump lagged, {} notifications lost; rebuilding geolocation cache",
                        skipped
                    );
                    summary.skipped += skipped;
                    summary.recoveries += 1;
                    cache.initialize();
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!(
            "📡 Geolocation notification pump stopped: {} processed, {} skipped, {} recoveries",
            summary.processed, summary.skipped, summary.recoveries
        );
        summary
    })
}
