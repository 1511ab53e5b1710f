use std::fmt;

use foundation::FeatureId;
use thiserror::Error;

/// Geometry a draw tool creates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DrawTool {
    Point,
    Line,
    Polygon,
}

impl DrawTool {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawTool::Point => "point",
            DrawTool::Line => "line",
            DrawTool::Polygon => "polygon",
        }
    }
}

impl std::str::FromStr for DrawTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point" | "draw_point" => Ok(DrawTool::Point),
            "line" | "draw_line_string" => Ok(DrawTool::Line),
            "polygon" | "draw_polygon" => Ok(DrawTool::Polygon),
            other => Err(format!("unknown draw tool `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    Idle,
    DrawPoint,
    DrawLine,
    DrawPolygon,
    EditSelected(FeatureId),
}

impl ToolMode {
    fn draw(tool: DrawTool) -> Self {
        match tool {
            DrawTool::Point => ToolMode::DrawPoint,
            DrawTool::Line => ToolMode::DrawLine,
            DrawTool::Polygon => ToolMode::DrawPolygon,
        }
    }

    pub fn draw_tool(&self) -> Option<DrawTool> {
        match self {
            ToolMode::DrawPoint => Some(DrawTool::Point),
            ToolMode::DrawLine => Some(DrawTool::Line),
            ToolMode::DrawPolygon => Some(DrawTool::Polygon),
            ToolMode::Idle | ToolMode::EditSelected(_) => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ToolMode::Idle)
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolMode::Idle => f.write_str("idle"),
            ToolMode::DrawPoint => f.write_str("draw_point"),
            ToolMode::DrawLine => f.write_str("draw_line"),
            ToolMode::DrawPolygon => f.write_str("draw_polygon"),
            ToolMode::EditSelected(id) => write!(f, "edit_selected({id})"),
        }
    }
}

/// Why a transition was refused because of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// Still waiting for the engine's ready event.
    Loading,
    /// The ready event did not arrive before the deadline.
    TimedOut { waited_ms: i64 },
    /// No engine is attached (switching platforms or disposed).
    Detached,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::Loading => f.write_str("still loading"),
            NotReadyReason::TimedOut { waited_ms } => {
                write!(f, "no ready signal after {waited_ms} ms")
            }
            NotReadyReason::Detached => f.write_str("no engine attached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("map is not ready ({reason}); cannot enter {requested}")]
    NotReady {
        requested: ToolMode,
        reason: NotReadyReason,
    },
}

/// Engine-side work a transition asks the adapter to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEffect {
    /// Enable the engine draw interaction for a tool.
    Arm(DrawTool),
    /// Throw away uncommitted geometry of the current interaction.
    DiscardInProgress,
    /// Return the engine to plain navigation.
    Disarm,
    /// Enable vertex editing of an existing feature.
    Edit(FeatureId),
}

/// Drawing-mode state machine for one map session.
#[derive(Debug)]
pub struct ToolModeController {
    mode: ToolMode,
    readiness: Option<NotReadyReason>,
}

impl Default for ToolModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolModeController {
    /// Starts idle, waiting for the engine.
    pub fn new() -> Self {
        Self {
            mode: ToolMode::Idle,
            readiness: Some(NotReadyReason::Loading),
        }
    }

    pub fn mode(&self) -> &ToolMode {
        &self.mode
    }

    /// True while a draw interaction is armed and may hold uncommitted geometry.
    pub fn is_drawing(&self) -> bool {
        self.mode.draw_tool().is_some()
    }

    pub fn is_engine_ready(&self) -> bool {
        self.readiness.is_none()
    }

    pub fn set_engine_ready(&mut self) {
        self.readiness = None;
    }

    /// Marks the engine unavailable and drops back to idle.
    pub fn set_engine_unavailable(&mut self, reason: NotReadyReason) -> Vec<ToolEffect> {
        self.readiness = Some(reason);
        let effects = if self.is_drawing() {
            vec![ToolEffect::DiscardInProgress]
        } else {
            Vec::new()
        };
        self.transition(ToolMode::Idle, "engine unavailable");
        effects
    }

    /// Tool button press. Pressing the active tool again toggles back to idle.
    pub fn select_tool(&mut self, tool: DrawTool) -> Result<Vec<ToolEffect>, ToolError> {
        let target = ToolMode::draw(tool);
        if self.mode == target {
            return Ok(self.deselect());
        }
        self.ensure_ready(&target)?;

        let mut effects = Vec::new();
        match &self.mode {
            ToolMode::Idle => {}
            ToolMode::DrawPoint | ToolMode::DrawLine | ToolMode::DrawPolygon => {
                effects.push(ToolEffect::DiscardInProgress)
            }
            ToolMode::EditSelected(_) => effects.push(ToolEffect::Disarm),
        }
        effects.push(ToolEffect::Arm(tool));
        self.transition(target, "tool selected");
        Ok(effects)
    }

    /// Selects an existing feature for editing.
    pub fn select_feature(&mut self, id: FeatureId) -> Result<Vec<ToolEffect>, ToolError> {
        let target = ToolMode::EditSelected(id.clone());
        if self.mode == target {
            return Ok(Vec::new());
        }
        self.ensure_ready(&target)?;

        let mut effects = Vec::new();
        if self.is_drawing() {
            effects.push(ToolEffect::DiscardInProgress);
        }
        effects.push(ToolEffect::Edit(id));
        self.transition(target, "feature selected");
        Ok(effects)
    }

    /// Tool deselect or explicit cancel.
    pub fn deselect(&mut self) -> Vec<ToolEffect> {
        let effects = match &self.mode {
            ToolMode::Idle => return Vec::new(),
            ToolMode::EditSelected(_) => vec![ToolEffect::Disarm],
            _ => vec![ToolEffect::DiscardInProgress, ToolEffect::Disarm],
        };
        self.transition(ToolMode::Idle, "deselected");
        effects
    }

    pub fn cancel(&mut self) -> Vec<ToolEffect> {
        self.deselect()
    }

    /// The engine committed the geometry being drawn or edited.
    pub fn complete(&mut self) -> Vec<ToolEffect> {
        if self.mode.is_idle() {
            return Vec::new();
        }
        self.transition(ToolMode::Idle, "completed");
        vec![ToolEffect::Disarm]
    }

    /// The feature being edited disappeared.
    pub fn forget_feature(&mut self, id: &FeatureId) -> Vec<ToolEffect> {
        match &self.mode {
            ToolMode::EditSelected(current) if current == id => {
                self.transition(ToolMode::Idle, "edited feature removed");
                vec![ToolEffect::Disarm]
            }
            _ => Vec::new(),
        }
    }

    fn ensure_ready(&self, requested: &ToolMode) -> Result<(), ToolError> {
        match self.readiness {
            None => Ok(()),
            Some(reason) => Err(ToolError::NotReady {
                requested: requested.clone(),
                reason,
            }),
        }
    }

    fn transition(&mut self, next: ToolMode, cause: &'static str) {
        if self.mode != next {
            tracing::debug!(from = %self.mode, to = %next, cause, "tool mode transition");
        }
        self.mode = next;
    }
}
