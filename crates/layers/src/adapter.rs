use foundation::math::LngLat;
use foundation::{FeatureId, LngLatBounds};
use runtime::ToolEffect;
use scene::{Feature, Marker};
use serde_json::Value;

use crate::engine::{DrawInteraction, EngineFailure, MapEngine, Platform, ScreenPoint};
use crate::event::{EventNormalizer, MapEvent, normalizer_for};
use crate::layer::Layer;
use crate::terrain::{DEM_SOURCE_ID, TerrainLayer};
use crate::vector::{FEATURES_SOURCE, FeatureLayer, MARKERS_SOURCE, MarkerLayer};

/// What the adapter did about an engine error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Switched to the fallback style; nothing to show beyond a warning.
    FellBack { from: String, to: String },
    /// No safe recovery; show the error with a retry affordance.
    Surfaced { retry: bool },
}

/// Bridges the session's stores and tool modes to one map engine.
///
/// The adapter never mutates features itself: engine events come back out of
/// [`MapAdapter::normalize`] for the caller to apply to the stores.
pub struct MapAdapter {
    engine: Box<dyn MapEngine>,
    normalizer: Box<dyn EventNormalizer>,
    active_style: String,
    fallback_style: String,
    fallback_spent: bool,
    terrain: Option<TerrainLayer>,
    feature_layer: FeatureLayer,
    marker_layer: MarkerLayer,
    materialized: bool,
}

impl MapAdapter {
    pub fn new(
        engine: Box<dyn MapEngine>,
        style: impl Into<String>,
        fallback_style: impl Into<String>,
    ) -> Self {
        let normalizer = normalizer_for(engine.platform());
        Self {
            engine,
            normalizer,
            active_style: style.into(),
            fallback_style: fallback_style.into(),
            fallback_spent: false,
            terrain: None,
            feature_layer: FeatureLayer::default(),
            marker_layer: MarkerLayer::default(),
            materialized: false,
        }
    }

    pub fn platform(&self) -> Platform {
        self.engine.platform()
    }

    pub fn active_style(&self) -> &str {
        &self.active_style
    }

    pub fn terrain(&self) -> Option<&TerrainLayer> {
        self.terrain.as_ref()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    pub fn normalize(&self, name: &str, payload: &Value) -> Vec<MapEvent> {
        self.normalizer.normalize(name, payload)
    }

    /// Performs the engine side of tool-mode transitions.
    pub fn apply(&mut self, effects: &[ToolEffect]) -> Result<(), EngineFailure> {
        let mut draw_disabled = false;
        for effect in effects {
            match effect {
                ToolEffect::DiscardInProgress | ToolEffect::Disarm => {
                    if !draw_disabled {
                        self.engine.disable_draw_mode()?;
                        draw_disabled = true;
                    }
                }
                ToolEffect::Arm(tool) => {
                    self.engine
                        .enable_draw_mode(&DrawInteraction::Draw(*tool))?;
                    draw_disabled = false;
                }
                ToolEffect::Edit(id) => {
                    self.engine
                        .enable_draw_mode(&DrawInteraction::Edit(id.clone()))?;
                    draw_disabled = false;
                }
            }
        }
        Ok(())
    }

    /// Creates every engine-side source and layer from current store contents.
    pub fn materialize(
        &mut self,
        features: &[Feature],
        markers: &[Marker],
    ) -> Result<(), EngineFailure> {
        self.put_source(FEATURES_SOURCE, &FeatureLayer::extract(features))?;
        for spec in self.feature_layer.specs() {
            self.engine.render_layer(&spec)?;
        }
        self.put_source(MARKERS_SOURCE, &MarkerLayer::extract(markers))?;
        for spec in self.marker_layer.specs() {
            self.engine.render_layer(&spec)?;
        }
        self.apply_terrain()?;
        self.materialized = true;
        tracing::debug!(
            features = features.len(),
            markers = markers.len(),
            "engine layers materialized"
        );
        Ok(())
    }

    /// Re-creates layers after the engine dropped them with its style.
    /// Ends any style-error episode.
    pub fn on_style_reloaded(
        &mut self,
        features: &[Feature],
        markers: &[Marker],
    ) -> Result<(), EngineFailure> {
        self.fallback_spent = false;
        self.materialized = false;
        self.materialize(features, markers)
    }

    pub fn sync_features(&mut self, features: &[Feature]) -> Result<(), EngineFailure> {
        if !self.materialized {
            return Ok(());
        }
        self.engine
            .update_source(FEATURES_SOURCE, &FeatureLayer::extract(features))
    }

    pub fn sync_markers(&mut self, markers: &[Marker]) -> Result<(), EngineFailure> {
        if !self.materialized {
            return Ok(());
        }
        self.engine
            .update_source(MARKERS_SOURCE, &MarkerLayer::extract(markers))
    }

    /// Handles an engine error. A failing satellite style falls back to the
    /// default style once per episode.
    pub fn on_engine_error(&mut self, reason: &str) -> ErrorOutcome {
        let style_specific = self.active_style.contains("satellite");
        if !style_specific || self.fallback_spent || self.active_style == self.fallback_style {
            tracing::warn!(reason, style = %self.active_style, "map engine error");
            return ErrorOutcome::Surfaced { retry: true };
        }

        self.fallback_spent = true;
        let from = std::mem::replace(&mut self.active_style, self.fallback_style.clone());
        self.materialized = false;
        tracing::warn!(reason, %from, to = %self.fallback_style, "style failed, falling back");
        match self.engine.set_style(&self.fallback_style) {
            Ok(()) => ErrorOutcome::FellBack {
                from,
                to: self.fallback_style.clone(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "fallback style failed");
                ErrorOutcome::Surfaced { retry: true }
            }
        }
    }

    /// Switches style. Returns `false` when `url` is already active.
    pub fn set_style(&mut self, url: &str) -> Result<bool, EngineFailure> {
        if url == self.active_style {
            return Ok(false);
        }
        self.engine.set_style(url)?;
        self.active_style = url.to_string();
        self.fallback_spent = false;
        // Layers come back on the next StyleReloaded.
        self.materialized = false;
        Ok(true)
    }

    /// Enables (with the given exaggeration) or disables 3D terrain.
    pub fn set_terrain(&mut self, exaggeration: Option<f64>) -> Result<(), EngineFailure> {
        if exaggeration.is_some() && !self.engine.supports_terrain() {
            return Err(EngineFailure::Unsupported("terrain".to_string()));
        }
        let previous = self.terrain.take();
        self.terrain = exaggeration.map(TerrainLayer::new);
        if !self.materialized {
            return Ok(());
        }
        if self.terrain.is_some() {
            return self.apply_terrain();
        }
        let Some(old) = previous else {
            return Ok(());
        };
        self.engine.set_terrain(None)?;
        for spec in old.specs() {
            self.engine.remove_layer(&spec.id)?;
        }
        Ok(())
    }

    fn apply_terrain(&mut self) -> Result<(), EngineFailure> {
        let Some(terrain) = &self.terrain else {
            return Ok(());
        };
        if !self.engine.supports_terrain() {
            return Ok(());
        }
        let (spec, layers) = (terrain.spec(), terrain.specs());
        self.put_source(DEM_SOURCE_ID, &TerrainLayer::dem_source())?;
        self.engine.set_terrain(Some(&spec))?;
        for layer in layers {
            self.engine.render_layer(&layer)?;
        }
        Ok(())
    }

    pub fn frame(&mut self, bounds: LngLatBounds) -> Result<(), EngineFailure> {
        self.engine.fit_bounds(bounds)
    }

    pub fn project(&self, at: LngLat) -> ScreenPoint {
        self.engine.project(at)
    }

    pub fn unproject(&self, at: ScreenPoint) -> LngLat {
        self.engine.unproject(at)
    }

    /// Ids the engine's drawing control holds that the store does not know.
    pub fn uncommitted(&self, is_known: impl Fn(&FeatureId) -> bool) -> Vec<FeatureId> {
        self.engine
            .drawn_feature_ids()
            .into_iter()
            .filter(|id| !is_known(id))
            .collect()
    }

    /// Releases the engine, dropping any in-progress interaction.
    pub fn detach(mut self) -> Box<dyn MapEngine> {
        if let Err(e) = self.engine.disable_draw_mode() {
            tracing::warn!(error = %e, "failed to disable drawing on detach");
        }
        self.engine
    }

    fn put_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure> {
        // The engine may still hold the source when no style reload happened.
        match self.engine.add_source(id, data) {
            Ok(()) => Ok(()),
            Err(_) => self.engine.update_source(id, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use catalog::InMemorySnapshotStore;
    use foundation::math::LngLat;
    use foundation::{FeatureId, LngLatBounds, ManualClock};
    use runtime::{DrawTool, ToolEffect};
    use scene::{FeatureDraft, FeatureStore, Geometry};

    use super::{ErrorOutcome, MapAdapter};
    use crate::engine::{DrawInteraction, Platform};
    use crate::headless::{EngineCall, HeadlessEngine};
    use crate::layer::LayerId;

    const OUTDOORS: &str = "mapbox://styles/mapbox/outdoors-v12";
    const SATELLITE: &str = "mapbox://styles/mapbox/satellite-streets-v12";

    fn adapter(platform: Platform) -> (MapAdapter, HeadlessEngine) {
        let engine = HeadlessEngine::new(platform);
        let adapter = MapAdapter::new(Box::new(engine.clone()), OUTDOORS, OUTDOORS);
        (adapter, engine)
    }

    fn store_with_line() -> FeatureStore<InMemorySnapshotStore> {
        let mut store =
            FeatureStore::new(InMemorySnapshotStore::new(), Rc::new(ManualClock::new(0)));
        store
            .add(FeatureDraft::new(Geometry::LineString(vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(0.0, 0.01),
            ])))
            .unwrap();
        store
    }

    #[test]
    fn arm_and_cancel_map_to_draw_calls() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        a.apply(&[ToolEffect::Arm(DrawTool::Polygon)]).unwrap();
        a.apply(&[ToolEffect::DiscardInProgress, ToolEffect::Disarm])
            .unwrap();
        assert_eq!(
            engine.take_calls(),
            vec![
                EngineCall::EnableDraw(DrawInteraction::Draw(DrawTool::Polygon)),
                EngineCall::DisableDraw,
            ]
        );
    }

    #[test]
    fn style_reload_rematerializes_without_touching_store() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        let store = store_with_line();
        a.materialize(store.list(), &[]).unwrap();
        a.set_terrain(Some(1.5)).unwrap();
        let before = store.list().to_vec();

        engine.wipe_style();
        assert!(engine.state().layers.is_empty());
        a.on_style_reloaded(store.list(), &[]).unwrap();

        let state = engine.state();
        assert!(state.sources.contains_key("drawn-features"));
        assert!(state.sources.contains_key("markers"));
        assert!(state.sources.contains_key("mapbox-dem"));
        assert!(state.layers.contains(&LayerId::new("drawn-line")));
        assert!(state.layers.contains(&LayerId::new("sky")));
        assert_eq!(state.terrain.as_ref().map(|t| t.exaggeration), Some(1.5));
        assert_eq!(
            state.sources["drawn-features"]["features"]
                .as_array()
                .map(Vec::len),
            Some(1)
        );
        assert_eq!(store.list(), before.as_slice());
    }

    #[test]
    fn satellite_error_falls_back_once_per_episode() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        assert!(a.set_style(SATELLITE).unwrap());
        engine.take_calls();

        let first = a.on_engine_error("tile request failed");
        assert_eq!(
            first,
            ErrorOutcome::FellBack {
                from: SATELLITE.to_string(),
                to: OUTDOORS.to_string()
            }
        );
        assert_eq!(a.active_style(), OUTDOORS);
        assert_eq!(
            engine.take_calls(),
            vec![EngineCall::SetStyle(OUTDOORS.to_string())]
        );

        // The fallback style itself erroring is surfaced, not retried.
        assert_eq!(
            a.on_engine_error("still failing"),
            ErrorOutcome::Surfaced { retry: true }
        );
        assert!(engine.take_calls().is_empty());
    }

    #[test]
    fn episode_ends_on_successful_reload() {
        let (mut a, _engine) = adapter(Platform::Mapbox);
        a.set_style(SATELLITE).unwrap();
        assert!(matches!(a.on_engine_error("x"), ErrorOutcome::FellBack { .. }));
        a.on_style_reloaded(&[], &[]).unwrap();

        a.set_style(SATELLITE).unwrap();
        assert!(matches!(a.on_engine_error("x"), ErrorOutcome::FellBack { .. }));
    }

    #[test]
    fn non_style_errors_are_surfaced() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        assert_eq!(
            a.on_engine_error("network down"),
            ErrorOutcome::Surfaced { retry: true }
        );
        assert!(engine.take_calls().is_empty());
    }

    #[test]
    fn same_style_is_a_no_op() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        assert!(!a.set_style(OUTDOORS).unwrap());
        assert!(engine.take_calls().is_empty());
    }

    #[test]
    fn terrain_unsupported_on_google() {
        let (mut a, _engine) = adapter(Platform::Google);
        assert!(a.set_terrain(Some(1.5)).is_err());
        assert!(a.terrain().is_none());
        assert_eq!(a.platform(), Platform::Google);
    }

    #[test]
    fn sync_before_materialize_is_deferred() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        let store = store_with_line();
        a.sync_features(store.list()).unwrap();
        assert!(engine.take_calls().is_empty());
        a.materialize(&[], &[]).unwrap();
        engine.take_calls();
        a.sync_features(store.list()).unwrap();
        assert_eq!(
            engine.take_calls(),
            vec![EngineCall::UpdateSource("drawn-features".to_string())]
        );
    }

    #[test]
    fn uncommitted_and_detach() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        a.apply(&[ToolEffect::Arm(DrawTool::Line)]).unwrap();
        engine.begin_uncommitted("half-drawn");
        let known = FeatureId::new("kept");
        engine.begin_uncommitted(known.clone());
        assert_eq!(
            a.uncommitted(|id| id == &known),
            vec![FeatureId::new("half-drawn")]
        );
        let _engine = a.detach();
        assert!(engine.state().drawn.is_empty());
        assert!(engine.state().draw.is_none());
    }

    #[test]
    fn frame_fits_bounds() {
        let (mut a, engine) = adapter(Platform::Mapbox);
        let b = LngLatBounds::new(LngLat::new(-8.0, 31.0), LngLat::new(-6.0, 32.0));
        a.frame(b).unwrap();
        assert_eq!(engine.take_calls(), vec![EngineCall::FitBounds(b)]);
        let p = a.project(LngLat::new(-7.0, 31.5));
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
    }
}
