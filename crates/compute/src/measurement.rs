use std::collections::HashMap;

use foundation::FeatureId;
use foundation::math::{line_length_km, polygon_area_km2, polygon_perimeter_km};
use scene::{Feature, FeatureChange, Geometry};
use serde::Serialize;

use crate::format::{format_area_km2, format_distance_km};

/// Derived values of one feature. Points have none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Measurement {
    #[serde(rename_all = "camelCase")]
    Line { distance_km: f64 },
    #[serde(rename_all = "camelCase")]
    Polygon { area_km2: f64, perimeter_km: f64 },
}

impl Measurement {
    pub fn of(geometry: &Geometry) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => None,
            Geometry::LineString(line) => Some(Measurement::Line {
                distance_km: line_length_km(line),
            }),
            Geometry::Polygon(rings) => {
                let outer = rings.first()?;
                Some(Measurement::Polygon {
                    area_km2: polygon_area_km2(rings),
                    perimeter_km: polygon_perimeter_km(outer),
                })
            }
        }
    }

    /// Display strings, e.g. `("Distance", "2.22 km")`.
    pub fn display(&self) -> Vec<(&'static str, String)> {
        match *self {
            Measurement::Line { distance_km } => {
                vec![("Distance", format_distance_km(distance_km))]
            }
            Measurement::Polygon {
                area_km2,
                perimeter_km,
            } => vec![
                ("Area", format_area_km2(area_km2)),
                ("Perimeter", format_distance_km(perimeter_km)),
            ],
        }
    }
}

/// Measurements keyed by feature id, kept in step with the feature store.
#[derive(Debug, Default)]
pub struct MeasurementPresenter {
    cache: HashMap<FeatureId, Measurement>,
}

impl MeasurementPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &FeatureId) -> Option<Measurement> {
        self.cache.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Recomputes everything from `features`.
    pub fn rebuild(&mut self, features: &[Feature]) {
        self.cache.clear();
        for f in features {
            self.recompute(f);
        }
    }

    /// Applies drained store changes; `features` is the store's current list.
    pub fn apply(&mut self, changes: &[FeatureChange], features: &[Feature]) {
        for change in changes {
            match change {
                FeatureChange::Reset => self.rebuild(features),
                FeatureChange::Removed(id) => {
                    self.cache.remove(id);
                }
                FeatureChange::Updated {
                    geometry_changed: false,
                    ..
                } => {}
                FeatureChange::Added(id) | FeatureChange::Updated { id, .. } => {
                    match features.iter().find(|f| &f.id == id) {
                        Some(f) => self.recompute(f),
                        // Removed again later in the same batch.
                        None => {
                            self.cache.remove(id);
                        }
                    }
                }
            }
        }
    }

    fn recompute(&mut self, feature: &Feature) {
        match Measurement::of(&feature.geometry) {
            Some(m) => {
                tracing::trace!(id = %feature.id, ?m, "measurement updated");
                self.cache.insert(feature.id.clone(), m);
            }
            None => {
                self.cache.remove(&feature.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use catalog::InMemorySnapshotStore;
    use foundation::math::{LngLat, haversine_distance_m};
    use foundation::{FeatureId, ManualClock};
    use scene::{FeatureDraft, FeaturePatch, FeatureStore, Geometry};

    use super::{Measurement, MeasurementPresenter};

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "expected {a} ~= {b}");
    }

    fn ll(lng: f64, lat: f64) -> LngLat {
        LngLat::new(lng, lat)
    }

    fn store() -> FeatureStore<InMemorySnapshotStore> {
        FeatureStore::new(InMemorySnapshotStore::new(), Rc::new(ManualClock::new(0)))
    }

    fn sync(p: &mut MeasurementPresenter, s: &mut FeatureStore<InMemorySnapshotStore>) {
        let changes = s.drain_changes();
        p.apply(&changes, s.list());
    }

    #[test]
    fn line_distance_is_sum_of_segments() {
        let mut s = store();
        let mut p = MeasurementPresenter::new();
        let pts = [ll(0.0, 0.0), ll(0.0, 0.01), ll(0.01, 0.01)];
        let id = s
            .add(FeatureDraft::new(Geometry::LineString(pts.to_vec())))
            .unwrap();
        sync(&mut p, &mut s);

        let expected_km =
            (haversine_distance_m(pts[0], pts[1]) + haversine_distance_m(pts[1], pts[2])) / 1_000.0;
        let Some(Measurement::Line { distance_km }) = p.get(&id) else {
            panic!("expected a line measurement");
        };
        assert_close(distance_km, expected_km, 1e-9);
        assert_eq!(p.get(&id).unwrap().display()[0].1, "2.22 km");
    }

    #[test]
    fn polygon_measurement_and_formatting() {
        let mut s = store();
        let mut p = MeasurementPresenter::new();
        let id = s
            .add(FeatureDraft::new(Geometry::Polygon(vec![vec![
                ll(0.0, 0.0),
                ll(0.0, 0.01),
                ll(0.01, 0.01),
                ll(0.01, 0.0),
                ll(0.0, 0.0),
            ]])))
            .unwrap();
        sync(&mut p, &mut s);
        let Some(Measurement::Polygon {
            area_km2,
            perimeter_km,
        }) = p.get(&id)
        else {
            panic!("expected a polygon measurement");
        };
        assert!(area_km2 > 1.0 && area_km2 < 1.4, "area {area_km2}");
        assert_close(perimeter_km, 4.448, 0.01);
        let display = p.get(&id).unwrap().display();
        assert_eq!(display[0].0, "Area");
        assert!(display[0].1.ends_with(" km²"));
    }

    #[test]
    fn updates_and_removals_follow_the_store() {
        let mut s = store();
        let mut p = MeasurementPresenter::new();
        let id = s
            .add(FeatureDraft::new(Geometry::LineString(vec![
                ll(0.0, 0.0),
                ll(0.0, 0.001),
            ])))
            .unwrap();
        sync(&mut p, &mut s);
        let before = p.get(&id).unwrap();

        s.update(
            &id,
            FeaturePatch::geometry(Geometry::LineString(vec![ll(0.0, 0.0), ll(0.0, 0.002)])),
        )
        .unwrap();
        sync(&mut p, &mut s);
        assert_ne!(p.get(&id).unwrap(), before);

        s.remove(&id);
        sync(&mut p, &mut s);
        assert_eq!(p.get(&id), None);
        assert!(p.is_empty());
    }

    #[test]
    fn points_have_no_measurement_and_reset_rebuilds() {
        let mut s = store();
        let mut p = MeasurementPresenter::new();
        let point = s
            .add(FeatureDraft::new(Geometry::Point(ll(1.0, 1.0))))
            .unwrap();
        let line = s
            .add(FeatureDraft::new(Geometry::LineString(vec![ll(0.0, 0.0), ll(1.0, 0.0)])))
            .unwrap();
        sync(&mut p, &mut s);
        assert_eq!(p.get(&point), None);
        assert_eq!(p.len(), 1);

        let blob = s.snapshot().unwrap();
        s.clear();
        sync(&mut p, &mut s);
        assert!(p.is_empty());

        s.restore(&blob).unwrap();
        sync(&mut p, &mut s);
        assert!(p.get(&line).is_some());
        assert_eq!(p.get(&FeatureId::new("missing")), None);
    }

    #[test]
    fn measurement_serializes_with_kind_tag() {
        let m = Measurement::Polygon {
            area_km2: 1.5,
            perimeter_km: 5.0,
        };
        assert_eq!(
            serde_json::to_value(m).unwrap(),
            serde_json::json!({ "kind": "polygon", "areaKm2": 1.5, "perimeterKm": 5.0 })
        );
    }
}
