//! Copy and paste of canvas fragments.
//!
//! A copied fragment is an ordinary container token restricted to the
//! selection. Pasting imports it with fresh ids; links inside the fragment
//! resolve against the fragment's own ids, so they land on the pasted
//! behaviours rather than on the originals.

use crate::error::EditorError;
use hatch_core::{
    Canvas, ContainerDirectory, ContainerToken, LoadReport, Placement, ShallowId,
};

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    fragment: Option<ContainerToken>,
    /// Pastes since the last copy; each lands one offset further away.
    pastes: u32,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.as_ref().is_none_or(|f| f.items.is_empty())
    }

    /// Copy `ids` from `canvas`. Links are kept only when both ends are copied.
    pub fn copy(&mut self, canvas: &Canvas, ids: &[ShallowId]) {
        let fragment = canvas.tokenize(Some(ids));
        log::debug!("copied {} item(s)", fragment.items.len());
        self.fragment = Some(fragment);
        self.pastes = 0;
    }

    /// Paste the fragment into `canvas`, shifted by `offset` per paste.
    pub fn paste(
        &mut self,
        canvas: &mut Canvas,
        offset: f32,
        directory: &dyn ContainerDirectory,
    ) -> Result<LoadReport, EditorError> {
        if self.is_empty() {
            return Err(EditorError::EmptyClipboard);
        }
        self.pastes += 1;
        let shift = offset * self.pastes as f32;
        let Some(fragment) = &self.fragment else {
            return Err(EditorError::EmptyClipboard);
        };
        let shifted = shift_fragment(fragment, shift, shift);
        Ok(canvas.import(&shifted, directory)?)
    }

    /// Serialized fragment, for the system clipboard.
    pub fn to_json(&self) -> Option<String> {
        self.fragment.as_ref().and_then(|f| f.to_json().ok())
    }

    /// Take a fragment from the system clipboard.
    pub fn set_json(&mut self, json: &str) -> Result<(), EditorError> {
        let fragment = ContainerToken::from_json(json).map_err(hatch_core::GraphError::from)?;
        self.fragment = Some(fragment);
        self.pastes = 0;
        Ok(())
    }
}

fn shift_fragment(fragment: &ContainerToken, dx: f32, dy: f32) -> ContainerToken {
    let mut out = fragment.clone();
    for item in out.items.iter_mut().filter(|i| !i.is_link()) {
        let (left, top) = Placement::from_css(item.left.as_deref(), item.top.as_deref())
            .offset(dx, dy)
            .to_css();
        item.left = Some(left);
        item.top = Some(top);
    }
    out
}
