//! The vocabulary of user edits.
//!
//! Gestures on the canvas become `GraphMutation`s. Most of them touch only
//! the open canvas and are expressed as a `CanvasEdit`; the two that need the
//! rest of the project (template lookup, instance dependency check) are
//! separate variants resolved by the session before the canvas is borrowed.

use hatch_core::{
    AssetId, Canvas, ContainerId, GraphResult, Name, Placement, PortalRef, PortalType, Prop,
    PropValue, ScriptId, ShallowId,
};

/// An edit applied to one canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEdit {
    AddAsset {
        alias: String,
        asset: Option<AssetId>,
        placement: Placement,
    },
    AddScript {
        alias: String,
        script: Option<ScriptId>,
        placement: Placement,
    },
    AddGate {
        portal_type: PortalType,
        property: Prop,
        placement: Placement,
    },
    AddComment {
        text: String,
        placement: Placement,
    },
    AddShortcut {
        original: ShallowId,
        placement: Placement,
    },
    RemoveItems {
        ids: Vec<ShallowId>,
    },
    Link {
        start: PortalRef,
        end: PortalRef,
    },
    Unlink {
        link: ShallowId,
    },
    SetFrameDelay {
        link: ShallowId,
        frame_delay: u32,
    },
    SetPortalValue {
        portal: PortalRef,
        value: PropValue,
    },
    EditPortal {
        portal: PortalRef,
        property: Prop,
    },
    AddPortal {
        behaviour: ShallowId,
        kind: PortalType,
        property: Prop,
    },
    RemovePortal {
        behaviour: ShallowId,
        portal: Name,
    },
    Rename {
        behaviour: ShallowId,
        alias: String,
    },
    SetText {
        behaviour: ShallowId,
        text: String,
    },
    Move {
        behaviour: ShallowId,
        placement: Placement,
    },
    RefreshShortcut {
        shortcut: ShallowId,
    },
    RemoveOrphanedShortcuts,
}

impl CanvasEdit {
    /// Apply to `canvas`. Returns the id of the item created, if any.
    pub fn apply(self, canvas: &mut Canvas) -> GraphResult<Option<ShallowId>> {
        let created = match self {
            CanvasEdit::AddAsset {
                alias,
                asset,
                placement,
            } => Some(canvas.add_asset(&alias, asset, placement)?),
            CanvasEdit::AddScript {
                alias,
                script,
                placement,
            } => Some(canvas.add_script(&alias, script, placement)?),
            CanvasEdit::AddGate {
                portal_type,
                property,
                placement,
            } => Some(canvas.add_gate(portal_type, property, placement)?),
            CanvasEdit::AddComment { text, placement } => Some(canvas.add_comment(&text, placement)?),
            CanvasEdit::AddShortcut {
                original,
                placement,
            } => Some(canvas.add_shortcut(original, placement)?),
            CanvasEdit::RemoveItems { ids } => {
                canvas.remove_items(&ids)?;
                None
            }
            CanvasEdit::Link { start, end } => Some(canvas.create_link(start, end)?),
            CanvasEdit::Unlink { link } => {
                canvas.remove_link(link)?;
                None
            }
            CanvasEdit::SetFrameDelay { link, frame_delay } => {
                canvas.set_frame_delay(link, frame_delay)?;
                None
            }
            CanvasEdit::SetPortalValue { portal, value } => {
                canvas.set_portal_value(portal, value)?;
                None
            }
            CanvasEdit::EditPortal { portal, property } => {
                canvas.edit_portal(portal, property)?;
                None
            }
            CanvasEdit::AddPortal {
                behaviour,
                kind,
                property,
            } => {
                canvas.add_portal(behaviour, kind, property)?;
                None
            }
            CanvasEdit::RemovePortal { behaviour, portal } => {
                canvas.remove_portal(behaviour, portal)?;
                None
            }
            CanvasEdit::Rename { behaviour, alias } => {
                canvas.rename_behaviour(behaviour, &alias)?;
                None
            }
            CanvasEdit::SetText { behaviour, text } => {
                canvas.set_text(behaviour, &text)?;
                None
            }
            CanvasEdit::Move {
                behaviour,
                placement,
            } => {
                canvas.move_item(behaviour, placement)?;
                None
            }
            CanvasEdit::RefreshShortcut { shortcut } => {
                canvas.refresh_shortcut(shortcut)?;
                None
            }
            CanvasEdit::RemoveOrphanedShortcuts => {
                canvas.remove_orphaned_shortcuts()?;
                None
            }
        };
        Ok(created)
    }
}

/// Any edit a session can apply to its open container.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphMutation {
    /// Instantiate a registered behaviour template.
    AddTemplate {
        template: String,
        placement: Placement,
    },
    /// Embed another container, subject to the dependency check.
    AddInstance {
        target: ContainerId,
        placement: Placement,
    },
    Canvas(CanvasEdit),
}

impl From<CanvasEdit> for GraphMutation {
    fn from(edit: CanvasEdit) -> Self {
        GraphMutation::Canvas(edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatch_core::{EngineConfig, IdGenerator, PropertyType};

    fn canvas() -> Canvas {
        Canvas::new(ContainerId::new("main"), IdGenerator::new(), EngineConfig::default())
    }

    #[test]
    fn add_edits_report_the_new_id() {
        let mut c = canvas();
        let id = CanvasEdit::AddComment {
            text: "hi".into(),
            placement: Placement::default(),
        }
        .apply(&mut c)
        .unwrap();
        assert!(id.is_some());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn failed_edit_leaves_canvas_alone() {
        let mut c = canvas();
        let gate = CanvasEdit::AddGate {
            portal_type: PortalType::Input,
            property: Prop::empty("go", PropertyType::Bool),
            placement: Placement::default(),
        }
        .apply(&mut c)
        .unwrap()
        .unwrap();
        let err = CanvasEdit::RemovePortal {
            behaviour: gate,
            portal: Name::intern("go"),
        }
        .apply(&mut c);
        assert!(err.is_err());
        assert_eq!(c.behaviour(gate).unwrap().portals.len(), 1);
    }
}
