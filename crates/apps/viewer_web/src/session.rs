use std::cell::RefCell;
use std::rc::Rc;

use catalog::{PLATFORM_KEY, SnapshotStore};
use compute::analysis::{ElevationProfile, sample_line};
use compute::{Measurement, MeasurementPresenter};
use foundation::math::LngLat;
use foundation::{Clock, FeatureId, LngLatBounds, MarkerId};
use layers::{ErrorOutcome, MapAdapter, MapEngine, MapEvent, Platform};
use runtime::{
    DrawTool, Event, EventBus, NotReadyReason, Notice, NoticeBoard, ReadinessGate, Severity,
    ToolEffect, ToolMode, ToolModeController,
};
use scene::{geojson, tracks};
use scene::{
    Feature, FeatureError, FeaturePatch, FeatureStore, Geometry, Marker, MarkerDraft, MarkerPatch,
    MarkerStore, Properties,
};
use serde::Serialize;
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Tells the UI what to re-render.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    FeaturesChanged,
    MarkersChanged,
    ModeChanged(ToolMode),
    NoticePosted(u64),
    EngineSwitched(Platform),
}

/// What one raw engine callback did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    /// Normalized events produced by the callback.
    pub handled: usize,
    /// Ids of features committed by it. Hosts whose overlays carry no ids
    /// tag them with these and echo them back on later edits.
    pub created: Vec<FeatureId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub rejected: usize,
    pub skipped: usize,
}

type Shared<S> = Rc<RefCell<S>>;

/// Platform last chosen by the user, `mapbox` when nothing usable is stored.
pub fn preferred_platform(sink: &impl SnapshotStore) -> Platform {
    sink.read(PLATFORM_KEY)
        .ok()
        .flatten()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

/// Everything one map view owns, from construction to [`MapSession::dispose`].
///
/// Features, markers and the platform preference share one snapshot sink.
/// Raw engine callbacks enter through [`MapSession::handle_raw_event`]; the
/// host drives the readiness deadline with [`MapSession::tick`].
pub struct MapSession<S: SnapshotStore> {
    config: SessionConfig,
    clock: Rc<dyn Clock>,
    prefs: Shared<S>,
    features: FeatureStore<Shared<S>>,
    markers: MarkerStore<Shared<S>>,
    tools: ToolModeController,
    last_mode: ToolMode,
    gate: ReadinessGate,
    adapter: Option<MapAdapter>,
    measurements: MeasurementPresenter,
    notices: NoticeBoard,
    events: EventBus<SessionEvent>,
    placing_marker: bool,
}

impl<S: SnapshotStore> MapSession<S> {
    pub fn new(
        sink: S,
        engine: Box<dyn MapEngine>,
        clock: Rc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let prefs = Rc::new(RefCell::new(sink));
        let mut session = Self {
            gate: ReadinessGate::new(config.ready_timeout_ms),
            config,
            features: FeatureStore::new(Rc::clone(&prefs), Rc::clone(&clock)),
            markers: MarkerStore::new(Rc::clone(&prefs), Rc::clone(&clock)),
            clock,
            prefs,
            tools: ToolModeController::new(),
            last_mode: ToolMode::Idle,
            adapter: None,
            measurements: MeasurementPresenter::new(),
            notices: NoticeBoard::new(),
            events: EventBus::new(),
            placing_marker: false,
        };
        session.restore();
        session.attach(engine);
        session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `None` once disposed.
    pub fn platform(&self) -> Option<Platform> {
        self.adapter.as_ref().map(MapAdapter::platform)
    }

    pub fn active_style(&self) -> Option<&str> {
        self.adapter.as_ref().map(MapAdapter::active_style)
    }

    pub fn terrain_enabled(&self) -> bool {
        self.adapter.as_ref().is_some_and(|a| a.terrain().is_some())
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn is_disposed(&self) -> bool {
        self.adapter.is_none()
    }

    pub fn mode(&self) -> &ToolMode {
        self.tools.mode()
    }

    pub fn is_placing_marker(&self) -> bool {
        self.placing_marker
    }

    pub fn features(&self) -> &[Feature] {
        self.features.list()
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn markers(&self) -> &[Marker] {
        self.markers.list()
    }

    pub fn measurement(&self, id: &FeatureId) -> Option<Measurement> {
        self.measurements.get(id)
    }

    pub fn notices(&self) -> &[Notice] {
        self.notices.active()
    }

    pub fn dismiss_notice(&mut self, id: u64) -> bool {
        self.notices.dismiss(id)
    }

    pub fn drain_events(&mut self) -> Vec<Event<SessionEvent>> {
        self.events.drain()
    }

    // Tool modes

    /// Tool button press; pressing the active tool again returns to idle.
    pub fn select_tool(&mut self, tool: DrawTool) -> Result<(), SessionError> {
        self.ensure_attached()?;
        self.placing_marker = false;
        let effects = match self.tools.select_tool(tool) {
            Ok(effects) => effects,
            Err(e) => return self.fail(e),
        };
        self.run_effects(&effects)
    }

    pub fn select_feature(&mut self, id: FeatureId) -> Result<(), SessionError> {
        self.ensure_attached()?;
        if !self.features.contains(&id) {
            return self.fail(FeatureError::NotFound(id));
        }
        let effects = match self.tools.select_feature(id) {
            Ok(effects) => effects,
            Err(e) => return self.fail(e),
        };
        self.run_effects(&effects)
    }

    pub fn deselect(&mut self) -> Result<(), SessionError> {
        self.ensure_attached()?;
        let effects = self.tools.deselect();
        self.run_effects(&effects)
    }

    /// Escape: drops any in-progress geometry and marker placement.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.ensure_attached()?;
        self.placing_marker = false;
        let effects = self.tools.cancel();
        self.run_effects(&effects)
    }

    /// The next map click creates a marker there.
    pub fn arm_marker_placement(&mut self) -> Result<(), SessionError> {
        self.ensure_attached()?;
        if let Some(reason) = self.gate.reason() {
            return self.fail(SessionError::PlacementNotReady(reason));
        }
        let effects = self.tools.deselect();
        self.run_effects(&effects)?;
        self.placing_marker = true;
        Ok(())
    }

    // Engine events

    /// Feeds one raw SDK callback through the platform's normalizer.
    pub fn handle_raw_event(&mut self, name: &str, payload: &Value) -> EventOutcome {
        let Some(adapter) = self.adapter.as_ref() else {
            tracing::debug!(name, "event after dispose ignored");
            return EventOutcome::default();
        };
        let events = adapter.normalize(name, payload);
        let mut outcome = EventOutcome {
            handled: events.len(),
            created: Vec::new(),
        };
        for event in events {
            outcome.created.extend(self.handle_event(event));
        }
        outcome
    }

    /// Returns the id of the feature the event committed, if any.
    pub fn handle_event(&mut self, event: MapEvent) -> Option<FeatureId> {
        if self.adapter.is_none() {
            tracing::debug!(?event, "event after dispose ignored");
            return None;
        }
        let mut created = None;
        match event {
            MapEvent::EngineReady => self.on_ready(),
            MapEvent::StyleReloaded => self.on_style_reloaded(),
            MapEvent::EngineError(reason) => self.on_engine_error(&reason),
            MapEvent::FeatureCreated(draft) => {
                let was_drawing = self.tools.is_drawing();
                match self.features.add(draft) {
                    Ok(id) => {
                        tracing::debug!(%id, "drawn feature committed");
                        if was_drawing {
                            let effects = self.tools.complete();
                            let _ = self.run_effects(&effects);
                        }
                        created = Some(id);
                    }
                    // The geometry stays in the draw control so the user can fix it.
                    Err(e) => self.report(&e.into()),
                }
                self.settle();
            }
            MapEvent::FeatureUpdated { id, geometry } => {
                let _ = self.update_feature_geometry(&id, geometry);
            }
            MapEvent::FeatureDeleted(id) => {
                self.remove_feature(&id);
            }
            MapEvent::FeatureSelected(id) => {
                let _ = self.select_feature(id);
            }
            MapEvent::SelectionCleared => {
                if matches!(self.tools.mode(), ToolMode::EditSelected(_)) {
                    let _ = self.deselect();
                }
            }
            MapEvent::Click(at) => {
                if self.placing_marker {
                    self.placing_marker = false;
                    let _ = self.create_marker(MarkerDraft::placed_at(at));
                }
            }
        }
        created
    }

    /// Checks the ready deadline. Reports the timeout once.
    pub fn tick(&mut self) -> Option<NotReadyReason> {
        let reason = self.gate.poll(self.clock.now())?;
        let effects = self.tools.set_engine_unavailable(reason);
        let _ = self.run_effects(&effects);
        self.post(
            Severity::Error,
            format!("The map did not finish loading ({reason}); drawing is unavailable"),
            true,
        );
        Some(reason)
    }

    /// Retry affordance: waits for the engine again and re-creates layers
    /// if it is already up.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        self.ensure_attached()?;
        if matches!(self.gate.reason(), Some(NotReadyReason::TimedOut { .. })) {
            self.gate.attach(self.clock.now());
            self.tools.set_engine_unavailable(NotReadyReason::Loading);
            return Ok(());
        }
        if !self.gate.is_ready() {
            return Ok(());
        }
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.on_style_reloaded(self.features.list(), self.markers.list()),
            None => return Err(SessionError::Disposed),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn on_ready(&mut self) {
        if !self.gate.mark_ready() {
            return;
        }
        self.tools.set_engine_ready();
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.materialize(self.features.list(), self.markers.list()),
            None => return,
        };
        tracing::info!(platform = ?self.platform(), "map engine ready");
        if let Err(e) = result {
            self.report(&e.into());
        }
    }

    fn on_style_reloaded(&mut self) {
        // Layers are created on the ready event; earlier style loads carry nothing.
        if !self.gate.is_ready() {
            return;
        }
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.on_style_reloaded(self.features.list(), self.markers.list()),
            None => return,
        };
        if let Err(e) = result {
            self.report(&e.into());
        }
    }

    fn on_engine_error(&mut self, reason: &str) {
        let outcome = match self.adapter.as_mut() {
            Some(adapter) => adapter.on_engine_error(reason),
            None => return,
        };
        match outcome {
            ErrorOutcome::FellBack { from, to } => {
                self.post(
                    Severity::Warning,
                    format!("Map style {from} failed to load; switched to {to}"),
                    false,
                );
            }
            ErrorOutcome::Surfaced { retry } => {
                self.post(Severity::Error, format!("Map error: {reason}"), retry);
            }
        }
    }

    // Features

    pub fn update_feature_geometry(
        &mut self,
        id: &FeatureId,
        geometry: Geometry,
    ) -> Result<(), SessionError> {
        let result = self.features.update(id, FeaturePatch::geometry(geometry));
        self.settle();
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Merges edit-form properties into a feature.
    pub fn update_feature_properties(
        &mut self,
        id: &FeatureId,
        properties: Properties,
    ) -> Result<(), SessionError> {
        let patch = FeaturePatch {
            geometry: None,
            properties,
        };
        let result = self.features.update(id, patch);
        self.settle();
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Idempotent; `false` when the id was unknown.
    pub fn remove_feature(&mut self, id: &FeatureId) -> bool {
        let removed = self.features.remove(id);
        let effects = self.tools.forget_feature(id);
        let _ = self.run_effects(&effects);
        self.settle();
        removed
    }

    pub fn clear_features(&mut self) {
        let effects = self.tools.deselect();
        let _ = self.run_effects(&effects);
        self.features.clear();
        self.settle();
    }

    /// Bulk-adds a GeoJSON document and frames what was accepted.
    pub fn import_geojson(&mut self, text: &str) -> Result<ImportSummary, SessionError> {
        match geojson::import_str(text) {
            Ok(import) => Ok(self.add_import(import, "geojson")),
            Err(e) => self.fail(e),
        }
    }

    /// GPX waypoints, routes and track segments.
    pub fn import_gpx(&mut self, text: &str) -> Result<ImportSummary, SessionError> {
        match tracks::import_gpx(text) {
            Ok(import) => Ok(self.add_import(import, "gpx")),
            Err(e) => self.fail(e),
        }
    }

    /// KML placemarks and loose geometry.
    pub fn import_kml(&mut self, text: &str) -> Result<ImportSummary, SessionError> {
        match tracks::import_kml(text) {
            Ok(import) => Ok(self.add_import(import, "kml")),
            Err(e) => self.fail(e),
        }
    }

    fn add_import(&mut self, import: geojson::Import, format: &'static str) -> ImportSummary {
        let mut summary = ImportSummary {
            skipped: import.skipped,
            ..ImportSummary::default()
        };
        let mut accepted = Vec::new();
        let mut first_error = None;
        for result in self.features.add_many(import.drafts) {
            match result {
                Ok(id) => accepted.push(id),
                Err(e) => {
                    summary.rejected += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        summary.added = accepted.len();

        let bounds = LngLatBounds::from_points(
            accepted
                .iter()
                .filter_map(|id| self.features.get(id))
                .flat_map(|f| f.geometry.positions()),
        );
        let framed = match (bounds, self.adapter.as_mut()) {
            (Some(bounds), Some(adapter)) => adapter.frame(bounds),
            _ => Ok(()),
        };
        if let Err(e) = framed {
            self.report(&e.into());
        }
        self.settle();

        if let Some(e) = first_error {
            self.post(
                Severity::Warning,
                format!("{} imported features were rejected: {e}", summary.rejected),
                false,
            );
        }
        self.post(
            Severity::Info,
            format!("Imported {} features", summary.added),
            false,
        );
        tracing::info!(
            format,
            added = summary.added,
            rejected = summary.rejected,
            skipped = summary.skipped,
            "features imported"
        );
        summary
    }

    pub fn export_geojson(&self) -> Value {
        geojson::export_collection(self.features.list())
    }

    /// Elevation profile of a line feature, one sample per vertex.
    pub fn elevation_profile(
        &mut self,
        id: &FeatureId,
        elevations_m: &[f64],
    ) -> Result<ElevationProfile, SessionError> {
        let line = self.line_of(id)?;
        match ElevationProfile::from_samples(&line, elevations_m) {
            Ok(profile) => Ok(profile),
            Err(e) => self.fail(e),
        }
    }

    /// Evenly spaced positions along a line feature for terrain queries.
    pub fn profile_sample_points(
        &mut self,
        id: &FeatureId,
        samples: usize,
    ) -> Result<Vec<LngLat>, SessionError> {
        let line = self.line_of(id)?;
        Ok(sample_line(&line, samples))
    }

    fn line_of(&mut self, id: &FeatureId) -> Result<Vec<LngLat>, SessionError> {
        match self.features.get(id).map(|f| &f.geometry) {
            Some(Geometry::LineString(line)) => Ok(line.clone()),
            Some(_) => self.fail(FeatureError::InvalidGeometry(format!(
                "feature `{id}` is not a line"
            ))),
            None => self.fail(FeatureError::NotFound(id.clone())),
        }
    }

    // Markers

    pub fn create_marker(&mut self, draft: MarkerDraft) -> Result<MarkerId, SessionError> {
        let result = self.markers.create(draft);
        self.settle();
        match result {
            Ok(id) => Ok(id),
            Err(e) => self.fail(e),
        }
    }

    pub fn update_marker(&mut self, id: &MarkerId, patch: MarkerPatch) -> Result<(), SessionError> {
        let result = self.markers.update(id, patch);
        self.settle();
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    pub fn remove_marker(&mut self, id: &MarkerId) -> bool {
        let removed = self.markers.remove(id);
        self.settle();
        removed
    }

    // Map presentation

    /// Returns `false` when `url` is already the active style.
    pub fn set_style(&mut self, url: &str) -> Result<bool, SessionError> {
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.set_style(url),
            None => return Err(SessionError::Disposed),
        };
        match result {
            Ok(changed) => Ok(changed),
            Err(e) => self.fail(e),
        }
    }

    pub fn set_terrain(&mut self, enabled: bool) -> Result<(), SessionError> {
        let exaggeration = enabled.then_some(self.config.terrain_exaggeration);
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.set_terrain(exaggeration),
            None => return Err(SessionError::Disposed),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Frames every feature and marker.
    pub fn frame_all(&mut self) -> Result<(), SessionError> {
        let bounds = LngLatBounds::from_points(
            self.features
                .list()
                .iter()
                .flat_map(|f| f.geometry.positions())
                .chain(self.markers.list().iter().map(|m| &m.location)),
        );
        let Some(bounds) = bounds else {
            return Ok(());
        };
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.frame(bounds),
            None => return Err(SessionError::Disposed),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    // Lifecycle

    /// Moves the session onto another engine. Committed features and markers
    /// carry over; uncommitted drawing is discarded. Layers are rebuilt once
    /// the new engine reports ready.
    pub fn switch_engine(&mut self, engine: Box<dyn MapEngine>) -> Result<(), SessionError> {
        let Some(old) = self.adapter.take() else {
            return Err(SessionError::Disposed);
        };
        let discarded = old.uncommitted(|id| self.features.contains(id));
        if !discarded.is_empty() {
            tracing::info!(count = discarded.len(), "discarding uncommitted drawing");
        }
        let from = old.platform();
        let terrain = old.terrain().map(|t| t.exaggeration);
        drop(old.detach());

        self.placing_marker = false;
        // The old engine already left draw mode on detach.
        self.tools.set_engine_unavailable(NotReadyReason::Loading);
        self.note_mode();

        let to = engine.platform();
        self.attach(engine);
        let carried = match (terrain, self.adapter.as_mut()) {
            (Some(exaggeration), Some(adapter)) => adapter.set_terrain(Some(exaggeration)),
            _ => Ok(()),
        };
        if let Err(e) = carried {
            tracing::debug!(error = %e, "terrain not carried over");
            self.post(
                Severity::Info,
                format!("3D terrain is not available on {to}"),
                false,
            );
        }
        tracing::info!(%from, %to, "map engine switched");
        self.emit(SessionEvent::EngineSwitched(to));
        Ok(())
    }

    /// Ends the session. Later engine events are ignored. Returns the engine
    /// so the host can tear it down.
    pub fn dispose(&mut self) -> Option<Box<dyn MapEngine>> {
        let adapter = self.adapter.take()?;
        self.placing_marker = false;
        self.tools.set_engine_unavailable(NotReadyReason::Detached);
        self.gate.detach();
        self.note_mode();
        tracing::info!(platform = %adapter.platform(), "map session disposed");
        Some(adapter.detach())
    }

    fn restore(&mut self) {
        match self.features.restore_from_sink() {
            Ok(report) if report.dropped > 0 => {
                self.post(
                    Severity::Warning,
                    format!("{} saved features were invalid and skipped", report.dropped),
                    false,
                );
            }
            Ok(_) => {}
            Err(e) => self.report(&e.into()),
        }
        if let Err(e) = self.markers.restore_from_sink() {
            self.report(&e.into());
        }
        self.features.drain_changes();
        self.markers.drain_changes();
        self.measurements.rebuild(self.features.list());
    }

    fn attach(&mut self, engine: Box<dyn MapEngine>) {
        let platform = engine.platform();
        self.adapter = Some(MapAdapter::new(
            engine,
            &self.config.default_style,
            &self.config.fallback_style,
        ));
        self.gate.attach(self.clock.now());
        if let Err(e) = self.prefs.borrow_mut().write(PLATFORM_KEY, platform.as_str()) {
            tracing::warn!(error = %e, "failed to remember map platform");
        }
    }

    fn ensure_attached(&self) -> Result<(), SessionError> {
        match self.adapter {
            Some(_) => Ok(()),
            None => Err(SessionError::Disposed),
        }
    }

    fn run_effects(&mut self, effects: &[ToolEffect]) -> Result<(), SessionError> {
        let result = match (effects.is_empty(), self.adapter.as_mut()) {
            (true, _) => Ok(()),
            (false, Some(adapter)) => adapter.apply(effects).map_err(SessionError::from),
            (false, None) => Err(SessionError::Disposed),
        };
        self.note_mode();
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn note_mode(&mut self) {
        if self.tools.mode() != &self.last_mode {
            self.last_mode = self.tools.mode().clone();
            self.emit(SessionEvent::ModeChanged(self.last_mode.clone()));
        }
    }

    /// Pushes drained store changes to measurements and the engine.
    fn settle(&mut self) {
        let changes = self.features.drain_changes();
        if !changes.is_empty() {
            self.measurements.apply(&changes, self.features.list());
            let synced = match self.adapter.as_mut() {
                Some(adapter) => adapter.sync_features(self.features.list()),
                None => Ok(()),
            };
            if let Err(e) = synced {
                self.report(&e.into());
            }
            self.emit(SessionEvent::FeaturesChanged);
        }

        if !self.markers.drain_changes().is_empty() {
            let synced = match self.adapter.as_mut() {
                Some(adapter) => adapter.sync_markers(self.markers.list()),
                None => Ok(()),
            };
            if let Err(e) = synced {
                self.report(&e.into());
            }
            self.emit(SessionEvent::MarkersChanged);
        }

        if let Some(e) = self.features.take_persist_error() {
            self.report(&e.into());
        }
        if let Some(e) = self.markers.take_persist_error() {
            self.report(&e.into());
        }
    }

    fn post(&mut self, severity: Severity, message: impl Into<String>, retry: bool) -> u64 {
        let id = self.notices.post(severity, message, retry, self.clock.now());
        self.emit(SessionEvent::NoticePosted(id));
        id
    }

    fn report(&mut self, err: &SessionError) {
        self.post(err.severity(), err.to_string(), err.retryable());
    }

    fn fail<T>(&mut self, err: impl Into<SessionError>) -> Result<T, SessionError> {
        let err = err.into();
        self.report(&err);
        Err(err)
    }

    fn emit(&mut self, event: SessionEvent) {
        self.events.emit(self.clock.now(), event);
    }
}
