//! Offline operations behind the `topomap` command line: measuring GeoJSON,
//! GPX and KML files, reprojecting coordinates, and moving features in and out of a
//! directory-backed snapshot store.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use catalog::{DirectorySnapshotStore, InMemorySnapshotStore, StorageError};
use compute::Measurement;
use foundation::math::{Crs, ProjectionError, reproject};
use foundation::SystemClock;
use scene::geojson::{self, GeoJsonError, Import};
use scene::tracks::{self, TrackError};
use scene::{Feature, FeatureStore, RestoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Io(String),
    #[error(transparent)]
    GeoJson(#[from] GeoJsonError),
    #[error(transparent)]
    Tracks(#[from] TrackError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("store is unreadable: {0}")]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// One line of `measure` / `list` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    pub id: String,
    pub kind: &'static str,
    pub measurement: Option<Measurement>,
    pub display: Vec<String>,
}

impl FeatureRow {
    pub fn of(feature: &Feature) -> Self {
        let measurement = Measurement::of(&feature.geometry);
        let display = measurement
            .map(|m| {
                m.display()
                    .into_iter()
                    .map(|(label, value)| format!("{label}: {value}"))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: feature.id.to_string(),
            kind: feature.kind().as_str(),
            measurement,
            display,
        }
    }

    pub fn to_line(&self) -> String {
        if self.display.is_empty() {
            format!("{}\t{}", self.id, self.kind)
        } else {
            format!("{}\t{}\t{}", self.id, self.kind, self.display.join(", "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub rejected: usize,
    pub skipped: usize,
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ToolError::Io(format!("read {}: {e}", path.display())))
}

/// Picks the reader from the file extension; anything else is GeoJSON.
fn read_features(path: &Path) -> Result<Import> {
    let text = read_file(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("gpx") => Ok(tracks::import_gpx(&text)?),
        Some("kml") => Ok(tracks::import_kml(&text)?),
        _ => Ok(geojson::import_str(&text)?),
    }
}

fn open_store(dir: &Path) -> Result<FeatureStore<DirectorySnapshotStore>> {
    let sink = DirectorySnapshotStore::open(dir)?;
    let mut store = FeatureStore::new(sink, Rc::new(SystemClock));
    // A corrupt snapshot is reported rather than overwritten.
    let report = store.restore_from_sink()?;
    if report.dropped > 0 {
        tracing::warn!(dropped = report.dropped, "invalid records skipped while loading the store");
    }
    Ok(store)
}

/// Measures every feature of a file without persisting anything.
pub fn measure(path: &Path) -> Result<Vec<FeatureRow>> {
    let import = read_features(path)?;
    if import.skipped > 0 {
        tracing::warn!(skipped = import.skipped, "unsupported geometries ignored");
    }
    let mut scratch = FeatureStore::new(InMemorySnapshotStore::new(), Rc::new(SystemClock));
    for (idx, result) in scratch.add_many(import.drafts).into_iter().enumerate() {
        if let Err(e) = result {
            tracing::warn!(feature = idx, error = %e, "feature rejected");
        }
    }
    Ok(scratch.list().iter().map(FeatureRow::of).collect())
}

pub fn reproject_point(from: Crs, to: Crs, x: f64, y: f64) -> Result<[f64; 2]> {
    Ok(reproject([x, y], from, to)?)
}

/// Adds the features of a GeoJSON, GPX or KML file to the store in `dir`.
pub fn import(path: &Path, dir: &Path) -> Result<ImportReport> {
    let parsed = read_features(path)?;
    let mut store = open_store(dir)?;
    let mut report = ImportReport {
        skipped: parsed.skipped,
        ..ImportReport::default()
    };
    for result in store.add_many(parsed.drafts) {
        match result {
            Ok(_) => report.added += 1,
            Err(e) => {
                tracing::warn!(error = %e, "feature rejected");
                report.rejected += 1;
            }
        }
    }
    if let Some(e) = store.take_persist_error() {
        return Err(e.into());
    }
    tracing::info!(added = report.added, rejected = report.rejected, "import finished");
    Ok(report)
}

/// The store in `dir` as a pretty-printed `FeatureCollection`.
pub fn export(dir: &Path) -> Result<String> {
    let store = open_store(dir)?;
    let collection = geojson::export_collection(store.list());
    serde_json::to_string_pretty(&collection).map_err(|e| ToolError::Io(e.to_string()))
}

pub fn list(dir: &Path) -> Result<Vec<FeatureRow>> {
    let store = open_store(dir)?;
    Ok(store.list().iter().map(FeatureRow::of).collect())
}

/// Writes `text` to `out`, or stdout when absent.
pub fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => fs::write(path, text)
            .map_err(|e| ToolError::Io(format!("write {}: {e}", path.display()))),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use foundation::math::Crs;
    use serde_json::{Value, json};

    use super::{ToolError, export, import, list, measure, reproject_point};

    fn collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "trail",
                    "properties": { "name": "Trail" },
                    "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [0.0, 0.01], [0.01, 0.01]] }
                },
                {
                    "type": "Feature",
                    "id": "camp",
                    "properties": {},
                    "geometry": { "type": "Point", "coordinates": [0.0, 0.0] }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0]] }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Circle", "coordinates": [0.0, 0.0] }
                }
            ]
        })
    }

    fn write_collection(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("input.geojson");
        fs::write(&path, collection().to_string()).unwrap();
        path
    }

    #[test]
    fn measure_reports_lines_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let rows = measure(&write_collection(dir.path())).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "trail");
        assert_eq!(rows[0].to_line(), "trail\tLineString\tDistance: 2.22 km");
        assert_eq!(rows[1].to_line(), "camp\tPoint");
        assert!(rows[1].measurement.is_none());
    }

    #[test]
    fn import_accumulates_and_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_collection(dir.path());
        let store = dir.path().join("store");

        let report = import(&input, &store).unwrap();
        assert_eq!((report.added, report.rejected, report.skipped), (2, 1, 1));

        // Ids already in the store are rejected on a second import.
        let again = import(&input, &store).unwrap();
        assert_eq!((again.added, again.rejected), (0, 3));

        let listed = list(&store).unwrap();
        assert_eq!(listed.len(), 2);

        let exported: Value = serde_json::from_str(&export(&store).unwrap()).unwrap();
        assert_eq!(exported["type"], "FeatureCollection");
        assert_eq!(exported["features"][0]["id"], "trail");
        assert_eq!(exported["features"][0]["properties"]["name"], "Trail");
    }

    #[test]
    fn gpx_files_are_read_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.GPX");
        fs::write(
            &path,
            r#"<?xml version="1.0"?>
<gpx version="1.1" creator="topomap" xmlns="http://www.topografix.com/GPX/1/1">
  <rte>
    <name>Loop</name>
    <rtept lat="0.0" lon="0.0"></rtept>
    <rtept lat="0.01" lon="0.0"></rtept>
    <rtept lat="0.01" lon="0.01"></rtept>
  </rte>
</gpx>"#,
        )
        .unwrap();

        let rows = measure(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "LineString");
        assert_eq!(rows[0].display, vec!["Distance: 2.22 km".to_string()]);

        let report = import(&path, &dir.path().join("store")).unwrap();
        assert_eq!((report.added, report.rejected), (1, 0));
        assert!(matches!(
            import(&dir.path().join("missing.kml"), &dir.path().join("store")),
            Err(ToolError::Io(_))
        ));
    }

    #[test]
    fn corrupt_store_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("mapDrawFeatures.json"), "{not json").unwrap();

        let err = import(&write_collection(dir.path()), &store).unwrap_err();
        assert!(matches!(err, ToolError::Restore(_)));
        assert_eq!(
            fs::read_to_string(store.join("mapDrawFeatures.json")).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn reproject_between_named_systems() {
        let [x, y] = reproject_point(Crs::Wgs84, Crs::UTM_29N, -9.0, 0.0).unwrap();
        assert!((x - 500_000.0).abs() < 1e-3, "x {x}");
        assert!(y.abs() < 1e-3, "y {y}");
        assert!(matches!(
            reproject_point(Crs::Wgs84, Crs::Merchich, 0.0, 95.0),
            Err(ToolError::Projection(_))
        ));
    }
}
