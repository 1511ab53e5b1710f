use std::rc::Rc;

use catalog::LocalStorageSnapshotStore;
use console_error_panic_hook::set_once;
use foundation::math::LngLat;
use foundation::{FeatureId, LngLatBounds, MarkerId, SystemClock};
use js_sys::{Array, Function, Reflect};
use layers::terrain::TerrainSpec;
use layers::{DrawInteraction, EngineFailure, LayerId, LayerSpec, MapEngine, Platform, ScreenPoint};
use runtime::DrawTool;
use scene::MarkerDraft;
use serde_json::{Value, json};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::config::SessionConfig;
use crate::session::{MapSession, preferred_platform};
use crate::view::{marker_patch_from_json, properties_from_json};

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

fn to_js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn js_failure(e: JsValue) -> EngineFailure {
    EngineFailure::Engine(e.as_string().unwrap_or_else(|| format!("{e:?}")))
}

fn to_js(value: &Value) -> Result<JsValue, EngineFailure> {
    js_sys::JSON::parse(&value.to_string()).map_err(js_failure)
}

/// Engine backed by a JS host object wrapping the real SDK instance.
///
/// The host exposes `platform` plus methods named after the capability
/// calls (`addSource`, `renderLayer`, `enableDrawMode`, ...). Payloads are
/// passed as plain JS objects.
struct JsEngine {
    host: JsValue,
    platform: Platform,
}

impl JsEngine {
    fn new(host: JsValue) -> Result<Self, JsValue> {
        let platform = Reflect::get(&host, &JsValue::from_str("platform"))?
            .as_string()
            .unwrap_or_default()
            .parse::<Platform>()
            .map_err(to_js_error)?;
        Ok(Self { host, platform })
    }

    fn call(&self, method: &str, args: &[JsValue]) -> Result<JsValue, EngineFailure> {
        let f = Reflect::get(&self.host, &JsValue::from_str(method)).map_err(js_failure)?;
        let f: Function = f
            .dyn_into()
            .map_err(|_| EngineFailure::Unsupported(format!("host method `{method}`")))?;
        let array = Array::new();
        for arg in args {
            array.push(arg);
        }
        f.apply(&self.host, &array).map_err(js_failure)
    }

    fn pair(value: &JsValue) -> (f64, f64) {
        let array = Array::from(value);
        (
            array.get(0).as_f64().unwrap_or(f64::NAN),
            array.get(1).as_f64().unwrap_or(f64::NAN),
        )
    }
}

impl MapEngine for JsEngine {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn add_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure> {
        self.call("addSource", &[JsValue::from_str(id), to_js(data)?])
            .map(drop)
    }

    fn update_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure> {
        self.call("updateSource", &[JsValue::from_str(id), to_js(data)?])
            .map(drop)
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineFailure> {
        self.call("removeSource", &[JsValue::from_str(id)]).map(drop)
    }

    fn render_layer(&mut self, layer: &LayerSpec) -> Result<(), EngineFailure> {
        self.call("renderLayer", &[to_js(&layer.to_style_json())?])
            .map(drop)
    }

    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineFailure> {
        self.call("removeLayer", &[JsValue::from_str(id.as_str())])
            .map(drop)
    }

    fn project(&self, at: LngLat) -> ScreenPoint {
        match self.call("project", &[JsValue::from_f64(at.lng), JsValue::from_f64(at.lat)]) {
            Ok(v) => {
                let (x, y) = Self::pair(&v);
                ScreenPoint::new(x, y)
            }
            Err(e) => {
                tracing::warn!(error = %e, "project failed");
                ScreenPoint::new(f64::NAN, f64::NAN)
            }
        }
    }

    fn unproject(&self, at: ScreenPoint) -> LngLat {
        match self.call("unproject", &[JsValue::from_f64(at.x), JsValue::from_f64(at.y)]) {
            Ok(v) => {
                let (lng, lat) = Self::pair(&v);
                LngLat::new(lng, lat)
            }
            Err(e) => {
                tracing::warn!(error = %e, "unproject failed");
                LngLat::new(f64::NAN, f64::NAN)
            }
        }
    }

    fn fit_bounds(&mut self, bounds: LngLatBounds) -> Result<(), EngineFailure> {
        let b = json!([[bounds.min.lng, bounds.min.lat], [bounds.max.lng, bounds.max.lat]]);
        self.call("fitBounds", &[to_js(&b)?]).map(drop)
    }

    fn enable_draw_mode(&mut self, interaction: &DrawInteraction) -> Result<(), EngineFailure> {
        let args = match interaction {
            DrawInteraction::Draw(tool) => [JsValue::from_str(tool.as_str()), JsValue::NULL],
            DrawInteraction::Edit(id) => {
                [JsValue::from_str("edit"), JsValue::from_str(id.as_str())]
            }
        };
        self.call("enableDrawMode", &args).map(drop)
    }

    fn disable_draw_mode(&mut self) -> Result<(), EngineFailure> {
        self.call("disableDrawMode", &[]).map(drop)
    }

    fn drawn_feature_ids(&self) -> Vec<FeatureId> {
        match self.call("getAllDrawnFeatureIds", &[]) {
            Ok(v) => Array::from(&v)
                .iter()
                .filter_map(|id| id.as_string())
                .map(FeatureId::new)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list drawn features");
                Vec::new()
            }
        }
    }

    fn set_style(&mut self, url: &str) -> Result<(), EngineFailure> {
        self.call("setStyle", &[JsValue::from_str(url)]).map(drop)
    }

    fn supports_terrain(&self) -> bool {
        match self.call("supportsTerrain", &[]) {
            Ok(v) => v.as_bool().unwrap_or(false),
            Err(_) => self.platform == Platform::Mapbox,
        }
    }

    fn set_terrain(&mut self, terrain: Option<&TerrainSpec>) -> Result<(), EngineFailure> {
        let arg = match terrain {
            Some(spec) => to_js(&spec.to_json())?,
            None => JsValue::NULL,
        };
        self.call("setTerrain", &[arg]).map(drop)
    }
}

/// Session handle owned by the page. Drop it (or call `dispose`) on unmount.
#[wasm_bindgen]
pub struct WebMapSession {
    inner: MapSession<LocalStorageSnapshotStore>,
}

#[wasm_bindgen]
impl WebMapSession {
    #[wasm_bindgen(constructor)]
    pub fn new(host: JsValue, config_json: Option<String>) -> Result<WebMapSession, JsValue> {
        let config = SessionConfig::from_json(config_json.as_deref().unwrap_or_default())
            .map_err(to_js_error)?;
        let store = LocalStorageSnapshotStore::new("").map_err(to_js_error)?;
        let engine = JsEngine::new(host)?;
        Ok(Self {
            inner: MapSession::new(store, Box::new(engine), Rc::new(SystemClock), config),
        })
    }

    pub fn preferred_platform() -> Result<String, JsValue> {
        let store = LocalStorageSnapshotStore::new("").map_err(to_js_error)?;
        Ok(preferred_platform(&store).to_string())
    }

    pub fn status(&self) -> String {
        self.inner.status_json().to_string()
    }

    pub fn select_tool(&mut self, tool: &str) -> Result<(), JsValue> {
        let tool = tool.parse::<DrawTool>().map_err(|e| JsValue::from_str(&e))?;
        self.inner.select_tool(tool).map_err(to_js_error)
    }

    pub fn select_feature(&mut self, id: &str) -> Result<(), JsValue> {
        self.inner
            .select_feature(FeatureId::new(id))
            .map_err(to_js_error)
    }

    pub fn deselect(&mut self) -> Result<(), JsValue> {
        self.inner.deselect().map_err(to_js_error)
    }

    pub fn cancel(&mut self) -> Result<(), JsValue> {
        self.inner.cancel().map_err(to_js_error)
    }

    /// Forwards one SDK callback. `payload_json` is the event object as JSON.
    /// Returns `{ handled, created }`; `created` lists the ids of committed
    /// features so overlays without ids of their own can be tagged.
    pub fn handle_event(&mut self, name: &str, payload_json: &str) -> Result<String, JsValue> {
        let payload: Value = if payload_json.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(payload_json).map_err(to_js_error)?
        };
        let outcome = self.inner.handle_raw_event(name, &payload);
        serde_json::to_string(&outcome).map_err(to_js_error)
    }

    /// Host timer hook; returns true when the ready deadline just passed.
    pub fn tick(&mut self) -> bool {
        self.inner.tick().is_some()
    }

    pub fn retry(&mut self) -> Result<(), JsValue> {
        self.inner.retry().map_err(to_js_error)
    }

    pub fn features_json(&self) -> String {
        self.inner.features_json().to_string()
    }

    pub fn measurements_json(&self) -> String {
        self.inner.measurements_json().to_string()
    }

    pub fn markers_json(&self) -> String {
        self.inner.markers_json().to_string()
    }

    pub fn notices_json(&self) -> String {
        self.inner.notices_json().to_string()
    }

    pub fn dismiss_notice(&mut self, id: f64) -> bool {
        self.inner.dismiss_notice(id as u64)
    }

    pub fn remove_feature(&mut self, id: &str) -> bool {
        self.inner.remove_feature(&FeatureId::new(id))
    }

    /// `properties_json` is a flat object merged into the feature's properties.
    pub fn update_feature_properties(
        &mut self,
        id: &str,
        properties_json: &str,
    ) -> Result<(), JsValue> {
        let properties = properties_from_json(properties_json).map_err(to_js_error)?;
        self.inner
            .update_feature_properties(&FeatureId::new(id), properties)
            .map_err(to_js_error)
    }

    pub fn clear_features(&mut self) {
        self.inner.clear_features();
    }

    pub fn arm_marker_placement(&mut self) -> Result<(), JsValue> {
        self.inner.arm_marker_placement().map_err(to_js_error)
    }

    pub fn create_marker(&mut self, lng: f64, lat: f64, title: &str) -> Result<String, JsValue> {
        self.inner
            .create_marker(MarkerDraft::new(LngLat::new(lng, lat), title))
            .map(|id| id.to_string())
            .map_err(to_js_error)
    }

    /// `form_json` holds the edited fields; `"image": null` clears the image.
    pub fn update_marker(&mut self, id: &str, form_json: &str) -> Result<(), JsValue> {
        let patch = marker_patch_from_json(form_json).map_err(to_js_error)?;
        self.inner
            .update_marker(&MarkerId::new(id), patch)
            .map_err(to_js_error)
    }

    pub fn remove_marker(&mut self, id: &str) -> bool {
        self.inner.remove_marker(&MarkerId::new(id))
    }

    /// Returns the import summary as JSON.
    pub fn import_geojson(&mut self, text: &str) -> Result<String, JsValue> {
        let summary = self.inner.import_geojson(text).map_err(to_js_error)?;
        serde_json::to_string(&summary).map_err(to_js_error)
    }

    pub fn import_gpx(&mut self, text: &str) -> Result<String, JsValue> {
        let summary = self.inner.import_gpx(text).map_err(to_js_error)?;
        serde_json::to_string(&summary).map_err(to_js_error)
    }

    pub fn import_kml(&mut self, text: &str) -> Result<String, JsValue> {
        let summary = self.inner.import_kml(text).map_err(to_js_error)?;
        serde_json::to_string(&summary).map_err(to_js_error)
    }

    pub fn export_geojson(&self) -> String {
        self.inner.export_geojson().to_string()
    }

    pub fn frame_all(&mut self) -> Result<(), JsValue> {
        self.inner.frame_all().map_err(to_js_error)
    }

    pub fn set_style(&mut self, url: &str) -> Result<bool, JsValue> {
        self.inner.set_style(url).map_err(to_js_error)
    }

    pub fn set_terrain(&mut self, enabled: bool) -> Result<(), JsValue> {
        self.inner.set_terrain(enabled).map_err(to_js_error)
    }

    pub fn switch_engine(&mut self, host: JsValue) -> Result<(), JsValue> {
        let engine = JsEngine::new(host)?;
        self.inner
            .switch_engine(Box::new(engine))
            .map_err(to_js_error)
    }

    pub fn dispose(&mut self) {
        drop(self.inner.dispose());
    }
}
