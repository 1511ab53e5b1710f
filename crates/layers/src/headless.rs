//! In-process engine with no rendering, used by tests and the CLI.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::math::LngLat;
use foundation::{FeatureId, LngLatBounds};
use serde_json::Value;

use crate::engine::{DrawInteraction, EngineFailure, MapEngine, Platform, ScreenPoint};
use crate::layer::{LayerId, LayerSpec};
use crate::terrain::TerrainSpec;

/// One recorded capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    AddSource(String),
    UpdateSource(String),
    RemoveSource(String),
    RenderLayer(LayerId),
    RemoveLayer(LayerId),
    FitBounds(LngLatBounds),
    EnableDraw(DrawInteraction),
    DisableDraw,
    SetStyle(String),
    SetTerrain(Option<TerrainSpec>),
}

#[derive(Debug, Default)]
pub struct HeadlessState {
    pub calls: Vec<EngineCall>,
    pub sources: BTreeMap<String, Value>,
    pub layers: Vec<LayerId>,
    pub style: Option<String>,
    pub terrain: Option<TerrainSpec>,
    pub draw: Option<DrawInteraction>,
    /// Ids the drawing control holds, including uncommitted ones.
    pub drawn: Vec<FeatureId>,
    pub fail_style_loads: bool,
}

/// Clones share state so a test can keep a handle after boxing the engine.
#[derive(Debug, Clone)]
pub struct HeadlessEngine {
    platform: Platform,
    center: LngLat,
    /// Pixels per degree.
    scale: f64,
    terrain_capable: bool,
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessEngine {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            center: LngLat::new(0.0, 0.0),
            scale: 256.0,
            terrain_capable: platform == Platform::Mapbox,
            state: Rc::default(),
        }
    }

    pub fn state(&self) -> std::cell::Ref<'_, HeadlessState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, HeadlessState> {
        self.state.borrow_mut()
    }

    pub fn take_calls(&self) -> Vec<EngineCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    /// Simulates the user placing vertices that were never committed.
    pub fn begin_uncommitted(&self, id: impl Into<FeatureId>) {
        self.state.borrow_mut().drawn.push(id.into());
    }

    /// Simulates the engine dropping every source and layer on a style change.
    pub fn wipe_style(&self) {
        let mut state = self.state.borrow_mut();
        state.sources.clear();
        state.layers.clear();
        state.terrain = None;
    }

    fn record(&self, call: EngineCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl MapEngine for HeadlessEngine {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn add_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure> {
        self.record(EngineCall::AddSource(id.to_string()));
        let mut state = self.state.borrow_mut();
        if state.sources.contains_key(id) {
            return Err(EngineFailure::Engine(format!("source `{id}` already exists")));
        }
        state.sources.insert(id.to_string(), data.clone());
        Ok(())
    }

    fn update_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure> {
        self.record(EngineCall::UpdateSource(id.to_string()));
        let mut state = self.state.borrow_mut();
        match state.sources.get_mut(id) {
            Some(slot) => {
                *slot = data.clone();
                Ok(())
            }
            None => Err(EngineFailure::Engine(format!("no source `{id}`"))),
        }
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineFailure> {
        self.record(EngineCall::RemoveSource(id.to_string()));
        self.state.borrow_mut().sources.remove(id);
        Ok(())
    }

    fn render_layer(&mut self, layer: &LayerSpec) -> Result<(), EngineFailure> {
        self.record(EngineCall::RenderLayer(layer.id.clone()));
        let mut state = self.state.borrow_mut();
        if let Some(source) = &layer.source {
            if !state.sources.contains_key(source) {
                return Err(EngineFailure::Engine(format!(
                    "layer `{}` references missing source `{source}`",
                    layer.id
                )));
            }
        }
        if !state.layers.contains(&layer.id) {
            state.layers.push(layer.id.clone());
        }
        Ok(())
    }

    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineFailure> {
        self.record(EngineCall::RemoveLayer(id.clone()));
        self.state.borrow_mut().layers.retain(|l| l != id);
        Ok(())
    }

    fn project(&self, at: LngLat) -> ScreenPoint {
        ScreenPoint::new(
            (at.lng - self.center.lng) * self.scale,
            (self.center.lat - at.lat) * self.scale,
        )
    }

    fn unproject(&self, at: ScreenPoint) -> LngLat {
        LngLat::new(
            self.center.lng + at.x / self.scale,
            self.center.lat - at.y / self.scale,
        )
    }

    fn fit_bounds(&mut self, bounds: LngLatBounds) -> Result<(), EngineFailure> {
        self.record(EngineCall::FitBounds(bounds));
        self.center = bounds.center();
        Ok(())
    }

    fn enable_draw_mode(&mut self, interaction: &DrawInteraction) -> Result<(), EngineFailure> {
        self.record(EngineCall::EnableDraw(interaction.clone()));
        self.state.borrow_mut().draw = Some(interaction.clone());
        Ok(())
    }

    fn disable_draw_mode(&mut self) -> Result<(), EngineFailure> {
        self.record(EngineCall::DisableDraw);
        let mut state = self.state.borrow_mut();
        state.draw = None;
        state.drawn.clear();
        Ok(())
    }

    fn drawn_feature_ids(&self) -> Vec<FeatureId> {
        self.state.borrow().drawn.clone()
    }

    fn set_style(&mut self, url: &str) -> Result<(), EngineFailure> {
        self.record(EngineCall::SetStyle(url.to_string()));
        let mut state = self.state.borrow_mut();
        if state.fail_style_loads {
            return Err(EngineFailure::StyleLoad {
                url: url.to_string(),
                reason: "style request failed".to_string(),
            });
        }
        state.style = Some(url.to_string());
        Ok(())
    }

    fn supports_terrain(&self) -> bool {
        self.terrain_capable
    }

    fn set_terrain(&mut self, terrain: Option<&TerrainSpec>) -> Result<(), EngineFailure> {
        self.record(EngineCall::SetTerrain(terrain.cloned()));
        if !self.terrain_capable {
            return Err(EngineFailure::Unsupported("terrain".to_string()));
        }
        self.state.borrow_mut().terrain = terrain.cloned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use foundation::math::LngLat;

    use super::{EngineCall, HeadlessEngine};
    use crate::engine::{MapEngine, Platform, ScreenPoint};

    #[test]
    fn project_round_trips() {
        let engine = HeadlessEngine::new(Platform::Mapbox);
        let p = LngLat::new(-7.25, 31.5);
        let back = engine.unproject(engine.project(p));
        assert!((back.lng - p.lng).abs() < 1e-12);
        assert!((back.lat - p.lat).abs() < 1e-12);
        assert_eq!(engine.project(LngLat::new(0.0, 0.0)), ScreenPoint::new(0.0, 0.0));
    }

    #[test]
    fn clones_share_recorded_calls() {
        let engine = HeadlessEngine::new(Platform::Google);
        let mut boxed: Box<dyn MapEngine> = Box::new(engine.clone());
        boxed.set_style("roadmap").unwrap();
        assert!(boxed.set_terrain(None).is_err());
        assert_eq!(
            engine.take_calls(),
            vec![
                EngineCall::SetStyle("roadmap".to_string()),
                EngineCall::SetTerrain(None)
            ]
        );
    }
}
