//! Directed edges between portals.

use crate::id::ShallowId;
use crate::portal::PortalRef;
use crate::prop::EditableSet;
use crate::token::{ItemToken, ItemType};

/// A resolved edge from a source portal to a sink portal.
///
/// Only exists once both endpoints are bound; unresolved links live as
/// `Hydrated` values during loading and never reach the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: ShallowId,
    pub start: PortalRef,
    pub end: PortalRef,
    /// Frames to wait before the signal crosses this link.
    pub frame_delay: u32,
    pub properties: EditableSet,
}

impl Link {
    pub fn new(id: ShallowId, start: PortalRef, end: PortalRef, frame_delay: u32) -> Self {
        Self {
            id,
            start,
            end,
            frame_delay,
            properties: EditableSet::new(),
        }
    }

    /// True if either end sits on `behaviour`.
    pub fn touches(&self, behaviour: ShallowId) -> bool {
        self.start.behaviour == behaviour || self.end.behaviour == behaviour
    }

    /// Portals are written by name, behaviours by shallow id, so the record
    /// stays valid when the target behaviour is rebuilt later in the batch.
    ///
    /// Link properties are declared on the link alone, so they are always
    /// written in full form; a slim value map could not be read back.
    pub fn tokenize(&self) -> ItemToken {
        let mut token = ItemToken::new(self.id, ItemType::Link);
        token.start_portal = Some(self.start.portal);
        token.end_portal = Some(self.end.portal);
        token.start_behaviour = Some(self.start.behaviour);
        token.end_behaviour = Some(self.end.behaviour);
        token.frame_delay = Some(self.frame_delay);
        if !self.properties.is_empty() {
            token.properties = Some(self.properties.tokenize(false));
        }
        token
    }
}
