use serde::Deserialize;

// ─── Config ───────────────────────────────────────────────────────────────

/// Engine-wide settings injected into every canvas.
///
/// Only derived geometry and defaults live here; nothing in this struct
/// changes how tokens are read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Nominal width of a behaviour box, used by `check_dimensions`.
    pub behaviour_width: f32,

    /// Nominal height of a behaviour box.
    pub behaviour_height: f32,

    /// Extra room added past the far edge of the furthest item.
    pub canvas_padding: f32,

    /// Frame delay given to links created interactively. Default: **1**.
    pub default_frame_delay: u32,

    /// Size of a freshly created comment.
    pub comment_width: f32,
    pub comment_height: f32,

    /// Write property values without their metadata when saving a container.
    /// Default: **false**.
    pub slim_tokens: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            behaviour_width: 120.0,
            behaviour_height: 40.0,
            canvas_padding: 500.0,
            default_frame_delay: 1,
            comment_width: 150.0,
            comment_height: 60.0,
            slim_tokens: false,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields fall back to defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
