//! Main application logic.
//!
//! `Application` wires a [`LocalSession`] to a [`GeolocationCache`], replays
//! recorded session notifications through the notification pump and then
//! answers a single viewport query, producing a [`MapReport`].

use crate::{cli::CliArgs, config::AppConfig};
use geolocation_cache::{
    calculate_coverage, display_to_coordinates, project_into_viewport, spawn_notification_pump,
    tiles_for_viewport, viewport_origin, Area, CacheStats, GeoCacheError, GeoLocation,
    GeolocationCache, LocalSession, MapAnchor, MapPoint, MapSize, MonitoredObject, ObjectClass,
    ObjectId, PumpSummary, SessionNotification, TileCoord,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything geomap prints for one run.
#[derive(Debug, Clone, Serialize)]
pub struct MapReport {
    /// Location the viewport is pinned to
    pub anchor: GeoLocation,
    pub anchor_mode: MapAnchor,
    pub zoom: u8,
    pub viewport: MapSize,
    /// Geographic area the viewport covers
    pub area: Area,
    pub tiles: TileSummary,
    /// Visible objects ordered by id
    pub objects: Vec<VisibleObject>,
    pub cache: CacheStats,
    pub pump: PumpSummary,
}

/// Tiles needed to draw the viewport.
#[derive(Debug, Clone, Serialize)]
pub struct TileSummary {
    pub count: usize,
    pub columns: usize,
    pub rows: usize,
    /// Top-left tile
    pub first: Option<TileCoord>,
    /// Pixel position of the first tile relative to the viewport
    pub offset: MapPoint,
}

/// An object inside the viewport and where to draw it.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleObject {
    pub id: ObjectId,
    pub name: String,
    pub class: ObjectClass,
    pub location: GeoLocation,
    /// Pixel column within the viewport
    pub x: i64,
    /// Pixel row within the viewport
    pub y: i64,
}

/// Reads a JSON array of objects.
pub async fn load_objects(path: &Path) -> Result<Vec<MonitoredObject>, GeoCacheError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Reads session notifications, one JSON document per line. Blank lines and
/// lines starting with `#` are skipped.
pub async fn load_updates(path: &Path) -> Result<Vec<SessionNotification>, GeoCacheError> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut updates = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let notification = serde_json::from_str(line).map_err(|e| {
            GeoCacheError::Serialization(format!("{}:{}: {e}", path.display(), number + 1))
        })?;
        updates.push(notification);
    }
    Ok(updates)
}

/// One geomap run.
pub struct Application {
    config: AppConfig,
    objects_path: Option<PathBuf>,
    updates_path: Option<PathBuf>,
    parent: ObjectId,
    filter: String,
}

impl Application {
    /// Creates an application from parsed arguments and the already
    /// overridden and validated configuration.
    pub fn new(args: CliArgs, config: AppConfig) -> Self {
        Self {
            config,
            objects_path: args.objects_path,
            updates_path: args.updates_path,
            parent: args.parent.map(ObjectId).unwrap_or(ObjectId::NONE),
            filter: args.filter.unwrap_or_default(),
        }
    }

    /// Loads the objects, replays updates and queries the viewport.
    pub async fn run(&self) -> Result<MapReport, Box<dyn std::error::Error>> {
        let objects = match &self.objects_path {
            Some(path) => load_objects(path).await?,
            None => Vec::new(),
        };
        info!("📦 Loaded {} objects", objects.len());

        let session = Arc::new(LocalSession::with_objects(
            objects,
            self.config.cache.notification_capacity,
        ));
        let cache = Arc::new(GeolocationCache::new(session.clone(), &self.config.cache)?);
        cache.initialize();
        let pump = spawn_notification_pump(cache.clone(), session.subscribe());

        if let Some(path) = &self.updates_path {
            let updates = load_updates(path).await?;
            info!("🔁 Replaying {} session notifications", updates.len());
            for notification in updates {
                session.apply(notification);
                tokio::task::yield_now().await;
            }
        }
        session.close();
        let pump_summary = pump.await?;

        let report = self.query_viewport(&cache, pump_summary);
        info!(
            "🗺️ {} objects visible in {}x{} viewport at zoom {}",
            report.objects.len(),
            report.viewport.width,
            report.viewport.height,
            report.zoom
        );
        Ok(report)
    }

    fn query_viewport(&self, cache: &GeolocationCache, pump: PumpSummary) -> MapReport {
        let viewport = &self.config.viewport;
        let zoom = viewport.zoom;
        let size = viewport.size();
        let anchor = GeoLocation::new(viewport.latitude, viewport.longitude);

        let area = calculate_coverage(size, &anchor, viewport.anchor, zoom);
        let origin = viewport_origin(size, &anchor, viewport.anchor, zoom);
        debug!("Viewport anchored at {} covers {:?}", anchor, area);

        let center = display_to_coordinates(
            origin.offset(size.width as f64 / 2.0, size.height as f64 / 2.0),
            zoom,
            true,
        );
        let tiles = tiles_for_viewport(size, &center, zoom);

        let mut objects: Vec<VisibleObject> = cache
            .objects_in_area(&area, self.parent, &self.filter)
            .iter()
            .map(|object| {
                let (x, y) = project_into_viewport(&object.geolocation, origin, zoom).to_pixel();
                VisibleObject {
                    id: object.id,
                    name: object.name.clone(),
                    class: object.class,
                    location: object.geolocation,
                    x,
                    y,
                }
            })
            .collect();
        objects.sort_by_key(|object| object.id);

        MapReport {
            anchor,
            anchor_mode: viewport.anchor,
            zoom,
            viewport: size,
            area,
            tiles: TileSummary {
                count: tiles.len(),
                columns: tiles.columns(),
                rows: tiles.rows(),
                first: tiles.iter().next(),
                offset: tiles.offset,
            },
            objects,
            cache: cache.stats(),
            pump,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const OBJECTS: &str = r#"[
        {"id": 1, "class": "container", "name": "Europe"},
        {"id": 2, "class": "node", "name": "berlin-core", "parent_ids": [1],
         "geolocation": {"kind": "manual", "latitude": 52.52, "longitude": 13.40}},
        {"id": 3, "class": "node", "name": "paris-edge", "parent_ids": [1],
         "geolocation": {"kind": "manual", "latitude": 48.86, "longitude": 2.35}},
        {"id": 4, "class": "sensor", "name": "sydney-temp",
         "geolocation": {"kind": "manual", "latitude": -33.87, "longitude": 151.21}},
        {"id": 5, "class": "other", "name": "berlin-iface",
         "geolocation": {"kind": "manual", "latitude": 52.52, "longitude": 13.40}}
    ]"#;

    const UPDATES: &str = r#"
# truck drives from Hamburg towards Berlin
{"type":"object_changed","data":{"id":6,"class":"mobile_device","name":"truck-6","geolocation":{"kind":"gps","latitude":53.55,"longitude":9.99}}}
{"type":"object_changed","data":{"id":6,"class":"mobile_device","name":"truck-6","geolocation":{"kind":"gps","latitude":52.80,"longitude":12.00}}}
{"type":"object_deleted","data":3}
"#;

    fn write_inputs(dir: &TempDir) -> (PathBuf, PathBuf) {
        let objects = dir.path().join("objects.json");
        let updates = dir.path().join("updates.jsonl");
        std::fs::write(&objects, OBJECTS).unwrap();
        std::fs::write(&updates, UPDATES).unwrap();
        (objects, updates)
    }

    fn europe_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.viewport.latitude = 50.0;
        config.viewport.longitude = 10.0;
        config.viewport.zoom = 4;
        config.viewport.width = 800;
        config.viewport.height = 600;
        config
    }

    fn args_with(objects: &Path, updates: Option<&Path>, extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "geomap".to_string(),
            "--objects".to_string(),
            objects.display().to_string(),
        ];
        if let Some(updates) = updates {
            argv.push("--updates".to_string());
            argv.push(updates.display().to_string());
        }
        argv.extend(extra.iter().map(|s| s.to_string()));
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn ids(report: &MapReport) -> Vec<u64> {
        report.objects.iter().map(|o| o.id.0).collect()
    }

    #[tokio::test]
    async fn test_snapshot_only() {
        let dir = TempDir::new().unwrap();
        let (objects, _) = write_inputs(&dir);

        let app = Application::new(args_with(&objects, None, &[]), europe_config());
        let report = app.run().await.unwrap();

        assert_eq!(ids(&report), vec![2, 3]);
        assert_eq!(report.cache.object_count, 3);
        assert_eq!(report.pump.processed, 0);
        for object in &report.objects {
            assert!((0..800).contains(&object.x), "{object:?}");
            assert!((0..600).contains(&object.y), "{object:?}");
        }
        // Berlin is north-east of Paris.
        assert!(report.objects[0].x > report.objects[1].x);
        assert!(report.objects[0].y < report.objects[1].y);
    }

    #[tokio::test]
    async fn test_replayed_updates() {
        let dir = TempDir::new().unwrap();
        let (objects, updates) = write_inputs(&dir);

        let app = Application::new(args_with(&objects, Some(&updates), &[]), europe_config());
        let report = app.run().await.unwrap();

        assert_eq!(report.pump.processed, 3);
        assert_eq!(ids(&report), vec![2, 6]);
        let truck = &report.objects[1];
        assert_eq!((truck.location.latitude, truck.location.longitude), (52.80, 12.00));
    }

    #[tokio::test]
    async fn test_world_view_shows_every_located_object() {
        let dir = TempDir::new().unwrap();
        let (objects, _) = write_inputs(&dir);

        let mut config = AppConfig::default();
        config.viewport.zoom = 0;
        let report = Application::new(args_with(&objects, None, &[]), config)
            .run()
            .await
            .unwrap();

        assert_eq!(ids(&report), vec![2, 3, 4]);
        assert_eq!((report.area.top_left_lon, report.area.bottom_right_lon), (-180.0, 180.0));
    }

    #[tokio::test]
    async fn test_parent_and_name_filters() {
        let dir = TempDir::new().unwrap();
        let (objects, _) = write_inputs(&dir);

        let app = Application::new(
            args_with(&objects, None, &["--parent", "1", "--filter", "PARIS"]),
            europe_config(),
        );
        let report = app.run().await.unwrap();
        assert_eq!(ids(&report), vec![3]);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let dir = TempDir::new().unwrap();
        let (objects, _) = write_inputs(&dir);
        let report = Application::new(args_with(&objects, None, &[]), europe_config())
            .run()
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["anchor_mode"], "center");
        assert_eq!(json["objects"][0]["name"], "berlin-core");
        assert!(json["tiles"]["count"].as_u64().unwrap() >= 12);
    }

    #[tokio::test]
    async fn test_bad_update_line_reports_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"type\":\"object_sync_completed\"}\n{\"type\":\"teleport\"}\n").unwrap();

        let err = load_updates(&path).await.unwrap_err();
        assert!(err.to_string().contains(":2:"), "{err}");
    }

    #[tokio::test]
    async fn test_missing_objects_file() {
        let dir = TempDir::new().unwrap();
        let result = load_objects(&dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(GeoCacheError::Io(_))));
    }
}
