use serde::Deserialize;

/// Editor-side settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Undo steps kept per container. Default: **100**.
    pub undo_depth: usize,

    /// How far each successive paste lands from the copied items.
    pub paste_offset: f32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_depth: 100,
            paste_offset: 20.0,
        }
    }
}

impl EditorConfig {
    /// Parse from JSON; missing fields fall back to defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
