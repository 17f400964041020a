use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::cache::GeolocationCache;
use crate::config::CacheConfig;
use crate::listener::GeoLocationListener;
use crate::projection::{calculate_coverage, MapAnchor};
use crate::session::{spawn_notification_pump, LocalSession, ObjectProvider, SessionNotification};
use crate::spatial::IndexBackend;
use crate::types::{Area, GeoLocation, MapSize, MonitoredObject, ObjectClass, ObjectId};

const BACKENDS: [IndexBackend; 2] = [IndexBackend::QuadTree, IndexBackend::RTree];

fn config_for(backend: IndexBackend) -> CacheConfig {
    let mut config = CacheConfig::default();
    config.index.backend = backend;
    config.index.max_entries_per_node = 4;
    config
}

fn node(id: u64, lat: f64, lon: f64) -> MonitoredObject {
    MonitoredObject::new(id, ObjectClass::Node, format!("node-{id}")).located_at(lat, lon)
}

fn ids(objects: &[Arc<MonitoredObject>]) -> HashSet<ObjectId> {
    objects.iter().map(|o| o.id).collect()
}

#[derive(Default)]
struct ChangeLog(Mutex<Vec<(ObjectId, Option<GeoLocation>)>>);

impl GeoLocationListener for ChangeLog {
    fn geolocation_changed(&self, object: &MonitoredObject, previous: Option<&GeoLocation>) {
        self.0.lock().unwrap().push((object.id, previous.copied()));
    }
}

#[test]
fn full_rebuild_indexes_only_located_objects() {
    for backend in BACKENDS {
        let session = Arc::new(LocalSession::with_objects(
            vec![
                node(1, 10.0, 20.0),
                node(2, 30.0, 40.0),
                MonitoredObject::new(3, ObjectClass::Container, "unplaced"),
            ],
            16,
        ));
        let cache = GeolocationCache::new(session, &config_for(backend)).unwrap();

        assert_eq!(cache.initialize(), 2);
        let everything = cache.objects_in_area(&Area::everything(), ObjectId::NONE, "");
        assert_eq!(ids(&everything), HashSet::from([ObjectId(1), ObjectId(2)]));
        assert!(cache.is_consistent(), "{backend:?}");
    }
}

#[test]
fn second_rebuild_replaces_index_contents() {
    for backend in BACKENDS {
        let session = Arc::new(LocalSession::with_objects(
            (1..=50).map(|i| node(i, i as f64, -(i as f64))),
            16,
        ));
        let cache = GeolocationCache::new(session.clone(), &config_for(backend)).unwrap();
        assert_eq!(cache.initialize(), 50);

        session.delete(ObjectId(10));
        session.upsert(node(10_000, -60.0, 170.0));
        assert_eq!(cache.initialize(), 50);

        assert!(!cache.contains(ObjectId(10)));
        assert_eq!(cache.location_of(ObjectId(10_000)), Some(GeoLocation::new(-60.0, 170.0)));
        let stats = cache.stats();
        assert_eq!(stats.index.object_count, 50);
        assert_eq!(stats.index.total_clears, 2, "{backend:?}");
        assert_eq!(stats.index.total_insertions, 100, "{backend:?}");
        assert!(cache.is_consistent(), "{backend:?}");
    }
}

#[test]
fn location_change_moves_index_entry_and_reports_previous() {
    for backend in BACKENDS {
        let session = Arc::new(LocalSession::with_objects(vec![node(5, 10.0, 20.0)], 16));
        let cache = GeolocationCache::new(session, &config_for(backend)).unwrap();
        cache.initialize();
        let log = Arc::new(ChangeLog::default());
        cache.add_listener(log.clone());

        assert!(cache.on_object_changed(Arc::new(node(5, 10.0, 21.0))));

        let old_box = Area::new(10.5, 19.5, 9.5, 20.5);
        let new_box = Area::new(10.5, 20.5, 9.5, 21.5);
        assert!(cache.objects_in_area(&old_box, ObjectId::NONE, "").is_empty());
        assert_eq!(
            ids(&cache.objects_in_area(&new_box, ObjectId::NONE, "")),
            HashSet::from([ObjectId(5)])
        );

        let changes = log.0.lock().unwrap();
        assert_eq!(
            changes.as_slice(),
            &[(ObjectId(5), Some(GeoLocation::new(10.0, 20.0)))]
        );
        assert!(cache.is_consistent(), "{backend:?}");
    }
}

#[test]
fn parent_filter_returns_descendants_only() {
    let a = node(1, 5.0, 5.0);
    let b = node(2, 5.5, 5.5).with_parent(1);
    let session = Arc::new(LocalSession::with_objects(vec![a, b], 16));
    let cache = GeolocationCache::new(session, &CacheConfig::default()).unwrap();
    cache.initialize();

    let area = Area::new(10.0, 0.0, 0.0, 10.0);
    let found = cache.objects_in_area(&area, ObjectId(1), "");
    assert_eq!(ids(&found), HashSet::from([ObjectId(2)]));
    assert_eq!(cache.objects_in_area(&area, ObjectId::NONE, "").len(), 2);
}

#[test]
fn zoomed_out_viewport_finds_objects_around_the_world() {
    for backend in BACKENDS {
        let session = Arc::new(LocalSession::with_objects(
            vec![node(1, 0.0, 0.0), node(2, 10.0, 90.0), node(3, -40.0, -170.0)],
            16,
        ));
        let cache = GeolocationCache::new(session, &config_for(backend)).unwrap();
        cache.initialize();

        for zoom in [0, 1] {
            let area = calculate_coverage(
                MapSize::new(1024, 768),
                &GeoLocation::new(0.0, 0.0),
                MapAnchor::Center,
                zoom,
            );
            let found = cache.objects_in_area(&area, ObjectId::NONE, "");
            assert_eq!(
                ids(&found),
                HashSet::from([ObjectId(1), ObjectId(2), ObjectId(3)]),
                "{backend:?} at zoom {zoom}"
            );
        }
    }
}

#[test]
fn repeated_change_is_idempotent() {
    for backend in BACKENDS {
        let cache = GeolocationCache::new(Arc::new(LocalSession::default()), &config_for(backend)).unwrap();
        let log = Arc::new(ChangeLog::default());
        cache.add_listener(log.clone());

        let object = Arc::new(node(7, -33.9, 151.2));
        assert!(cache.on_object_changed(object.clone()));
        let before = cache.stats().index;
        for _ in 0..3 {
            assert!(!cache.on_object_changed(object.clone()));
        }
        let after = cache.stats().index;

        assert_eq!(log.0.lock().unwrap().len(), 1);
        assert_eq!(before.total_insertions, after.total_insertions);
        assert_eq!(before.total_removals, after.total_removals);
        assert_eq!(cache.len(), 1);
    }
}

#[test]
fn random_update_sequence_keeps_map_and_index_consistent() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    for backend in BACKENDS {
        let mut rng = StdRng::seed_from_u64(42);
        let cache = GeolocationCache::new(Arc::new(LocalSession::default()), &config_for(backend)).unwrap();

        for _ in 0..2_000 {
            let id = rng.gen_range(1..=60u64);
            match rng.gen_range(0..10) {
                0 => {
                    cache.remove_object(ObjectId(id));
                }
                1 => {
                    cache.on_object_changed(Arc::new(MonitoredObject::new(id, ObjectClass::Node, "gone")));
                }
                2 => {
                    let class = if rng.gen_bool(0.5) { ObjectClass::Other } else { ObjectClass::Rack };
                    cache.on_object_changed(Arc::new(
                        MonitoredObject::new(id, class, "mixed").located_at(1.0, 1.0),
                    ));
                }
                _ => {
                    let lat = rng.gen_range(-90.0..=90.0);
                    let lon = rng.gen_range(-180.0..=180.0);
                    cache.on_object_changed(Arc::new(node(id, lat, lon)));
                }
            }
        }

        assert!(cache.is_consistent(), "{backend:?}");
        let everything = cache.objects_in_area(&Area::everything(), ObjectId::NONE, "");
        assert_eq!(everything.len(), cache.len());
    }
}

#[tokio::test]
async fn session_round_trip_through_pump() {
    let session = Arc::new(LocalSession::with_objects(vec![node(1, 0.0, 0.0)], 64));
    let cache = Arc::new(GeolocationCache::new(session.clone(), &CacheConfig::default()).unwrap());
    cache.initialize();
    let log = Arc::new(ChangeLog::default());
    cache.add_listener(log.clone());

    let pump = spawn_notification_pump(cache.clone(), session.subscribe());
    session.upsert(node(1, 1.0, 1.0));
    session.upsert(node(2, 2.0, 2.0));
    session.delete(ObjectId(1));
    session.replace_all(vec![node(3, 3.0, 3.0), node(4, 4.0, 4.0)]);
    session.close();

    let summary = pump.await.unwrap();
    assert_eq!(summary.processed, 4);
    assert_eq!(
        ids(&cache.objects_in_area(&Area::everything(), ObjectId::NONE, "")),
        HashSet::from([ObjectId(3), ObjectId(4)])
    );
    assert_eq!(session.all_objects().len(), 2);

    let changes = log.0.lock().unwrap();
    assert_eq!(
        changes.as_slice(),
        &[
            (ObjectId(1), Some(GeoLocation::new(0.0, 0.0))),
            (ObjectId(2), None),
            (ObjectId(1), Some(GeoLocation::new(1.0, 1.0))),
        ]
    );
}

#[test]
fn replayed_json_notifications_apply_in_order() {
    let session = Arc::new(LocalSession::default());
    let cache = GeolocationCache::new(session.clone(), &CacheConfig::default()).unwrap();
    let lines = [
        r#"{"type":"object_changed","data":{"id":9,"class":"mobile_device","name":"van","geolocation":{"kind":"gps","latitude":47.0,"longitude":8.0}}}"#,
        r#"{"type":"object_changed","data":{"id":9,"class":"mobile_device","name":"van","geolocation":{"kind":"gps","latitude":47.5,"longitude":8.5}}}"#,
    ];
    for line in lines {
        let notification: SessionNotification = serde_json::from_str(line).unwrap();
        cache.handle_notification(&notification);
    }
    assert_eq!(
        cache.location_of(ObjectId(9)).map(|l| (l.latitude, l.longitude)),
        Some((47.5, 8.5))
    );
}
