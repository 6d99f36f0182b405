//! Behaviours: the nodes of the graph.
//!
//! Every node kind shares one struct; kind-specific payload lives in
//! `BehaviourKind`. Templates (`BehaviourDefinition`) describe plain nodes and
//! are kept in a `TemplateRegistry` handed to whoever instantiates them.

use crate::error::{GraphError, GraphResult};
use crate::geometry::{Bounds, Placement};
use crate::id::{AssetId, ContainerId, Name, ScriptId, ShallowId};
use crate::portal::{Portal, PortalType};
use crate::prop::{Prop, PropValue, PropertyType};
use indexmap::IndexMap;
use std::collections::HashSet;

// ─── Kinds ───────────────────────────────────────────────────────────────

/// Kind-specific payload of a behaviour.
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviourKind {
    /// Instantiated from a template.
    Plain,
    /// Container-level IO gate. `portal_type` is the gate's role as seen
    /// from outside the container.
    Portal { portal_type: PortalType },
    /// Wraps an asset held in its `Asset` parameter portal.
    Asset,
    /// Backed by a persisted script. `None` until the script is saved.
    Script { script_id: Option<ScriptId> },
    /// Ghost alias of another behaviour on the same canvas.
    Shortcut { original: Option<ShallowId> },
    /// Embeds another container.
    Instance { container: ContainerId },
    /// Freeform note.
    Comment { width: f32, height: f32 },
}

// ─── Behaviour ───────────────────────────────────────────────────────────

/// A node on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Behaviour {
    pub id: ShallowId,
    /// Display name chosen by the user.
    pub alias: String,
    /// Body text (comments) or a description.
    pub text: String,
    /// Template name this node was built from.
    pub behaviour_type: String,
    pub portals: Vec<Portal>,
    pub can_ghost: bool,
    pub requires_update: bool,
    pub placement: Placement,
    pub kind: BehaviourKind,
}

/// Portal names used by the built-in node kinds.
pub mod portal_names {
    pub const ASSET: &str = "Asset";
    pub const EXECUTE: &str = "Execute";
    pub const EXIT: &str = "Exit";
}

impl Behaviour {
    /// An empty node of the given kind.
    pub fn new(id: ShallowId, alias: impl Into<String>, kind: BehaviourKind) -> Self {
        let alias = alias.into();
        Self {
            id,
            behaviour_type: alias.clone(),
            alias,
            text: String::new(),
            portals: Vec::new(),
            can_ghost: !matches!(
                kind,
                BehaviourKind::Shortcut { .. } | BehaviourKind::Comment { .. }
            ),
            requires_update: false,
            placement: Placement::default(),
            kind,
        }
    }

    /// Asset node: one `Asset` parameter holding `asset`, one product
    /// re-exposing it.
    pub fn asset(id: ShallowId, alias: impl Into<String>, asset: Option<AssetId>) -> Self {
        let mut b = Self::new(id, alias, BehaviourKind::Asset);
        b.behaviour_type = String::from("Asset");
        b.portals.push(Portal::new(
            PortalType::Parameter,
            Prop::new(
                portal_names::ASSET,
                PropValue::Asset(asset.clone()),
                PropertyType::Asset,
            ),
            false,
        ));
        b.portals.push(Portal::new(
            PortalType::Product,
            Prop::new("Value", PropValue::Asset(asset), PropertyType::Asset),
            false,
        ));
        b
    }

    /// Script node with flow in/out.
    pub fn script(id: ShallowId, alias: impl Into<String>, script_id: Option<ScriptId>) -> Self {
        let mut b = Self::new(id, alias, BehaviourKind::Script { script_id });
        b.behaviour_type = String::from("Script");
        b.portals.push(Portal::new(
            PortalType::Input,
            Prop::empty(portal_names::EXECUTE, PropertyType::Bool),
            false,
        ));
        b.portals.push(Portal::new(
            PortalType::Output,
            Prop::empty(portal_names::EXIT, PropertyType::Bool),
            false,
        ));
        b
    }

    /// Container IO gate.
    ///
    /// Inside the canvas the gate shows the opposite face: a container input
    /// is a source for the nodes behind it, a container output is a sink.
    pub fn gate(id: ShallowId, portal_type: PortalType, property: Prop) -> Self {
        let inner = match portal_type {
            PortalType::Input => PortalType::Output,
            PortalType::Output => PortalType::Input,
            PortalType::Parameter => PortalType::Product,
            PortalType::Product => PortalType::Parameter,
        };
        let mut b = Self::new(
            id,
            property.name.as_str().to_string(),
            BehaviourKind::Portal { portal_type },
        );
        b.behaviour_type = String::from("Portal");
        b.portals.push(Portal::new(inner, property, false));
        b
    }

    /// Freeform comment.
    pub fn comment(id: ShallowId, text: impl Into<String>, width: f32, height: f32) -> Self {
        let mut b = Self::new(id, "Comment", BehaviourKind::Comment { width, height });
        b.text = text.into();
        b
    }

    /// Instance of another container, exposing `portals` built from the
    /// target's gates.
    pub fn instance(
        id: ShallowId,
        alias: impl Into<String>,
        container: ContainerId,
        portals: Vec<Portal>,
    ) -> Self {
        let mut b = Self::new(id, alias, BehaviourKind::Instance { container });
        b.behaviour_type = String::from("Instance");
        b.portals = portals;
        b
    }

    /// Shortcut with no original yet; call `set_original_node` to bind it.
    pub fn shortcut(id: ShallowId) -> Self {
        Self::new(id, "", BehaviourKind::Shortcut { original: None })
    }

    pub fn is_shortcut(&self) -> bool {
        matches!(self.kind, BehaviourKind::Shortcut { .. })
    }

    /// Id of the aliased behaviour, for shortcuts.
    pub fn original(&self) -> Option<ShallowId> {
        match self.kind {
            BehaviourKind::Shortcut { original } => original,
            _ => None,
        }
    }

    /// Target container, for instances.
    pub fn instance_of(&self) -> Option<&ContainerId> {
        match &self.kind {
            BehaviourKind::Instance { container } => Some(container),
            _ => None,
        }
    }

    pub fn portal(&self, name: Name) -> Option<&Portal> {
        self.portals.iter().find(|p| p.name == name)
    }

    pub fn portal_mut(&mut self, name: Name) -> Option<&mut Portal> {
        self.portals.iter_mut().find(|p| p.name == name)
    }

    /// Add a portal. Shortcuts and comments refuse; names stay unique.
    pub fn add_portal(&mut self, portal: Portal) -> GraphResult<()> {
        match self.kind {
            BehaviourKind::Shortcut { .. } => return Err(GraphError::ShortcutShape(self.id)),
            BehaviourKind::Comment { .. } => return Err(GraphError::NoPortals(self.id)),
            _ => {}
        }
        if self.portal(portal.name).is_some() {
            return Err(GraphError::DuplicatePortalName(portal.name));
        }
        self.portals.push(portal);
        Ok(())
    }

    /// Remove a user-added portal. Structural portals are refused.
    /// The caller must detach the portal's links first.
    pub fn remove_portal(&mut self, name: Name) -> GraphResult<Portal> {
        if self.is_shortcut() {
            return Err(GraphError::ShortcutShape(self.id));
        }
        let pos = self
            .portals
            .iter()
            .position(|p| p.name == name)
            .ok_or(GraphError::UnknownPortal {
                behaviour: self.id,
                portal: name,
            })?;
        if !self.portals[pos].custom {
            return Err(GraphError::StructuralPortal(name));
        }
        Ok(self.portals.remove(pos))
    }

    /// Bind a shortcut to `original`.
    ///
    /// Only the id is kept. With `build_portals` the original's portals are
    /// copied by value; later changes to the original do not propagate.
    pub fn set_original_node(&mut self, original: &Behaviour, build_portals: bool) {
        if let BehaviourKind::Shortcut { original: slot } = &mut self.kind {
            *slot = Some(original.id);
            self.alias = original.alias.clone();
            self.behaviour_type = original.behaviour_type.clone();
            if build_portals {
                self.portals = original.portals.iter().map(Portal::detached).collect();
            }
        }
    }

    /// Rectangle used for canvas sizing.
    pub fn bounds(&self, default_width: f32, default_height: f32) -> Bounds {
        let (width, height) = match self.kind {
            BehaviourKind::Comment { width, height } => (width, height),
            _ => (default_width, default_height),
        };
        Bounds {
            x: self.placement.left,
            y: self.placement.top,
            width,
            height,
        }
    }
}

// ─── Templates ───────────────────────────────────────────────────────────

/// One portal declared by a template.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalTemplate {
    pub kind: PortalType,
    pub property: Prop,
}

impl PortalTemplate {
    pub fn new(kind: PortalType, property: Prop) -> Self {
        Self { kind, property }
    }
}

/// Blueprint for plain behaviours.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourDefinition {
    pub name: String,
    pub portals: Vec<PortalTemplate>,
    pub can_ghost: bool,
    pub requires_update: bool,
}

impl BehaviourDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            portals: Vec::new(),
            can_ghost: true,
            requires_update: false,
        }
    }

    pub fn with_portal(mut self, kind: PortalType, property: Prop) -> Self {
        self.portals.push(PortalTemplate::new(kind, property));
        self
    }

    /// Build a behaviour from this template.
    ///
    /// Fails with `DuplicatePortalName` if two portal templates share a name;
    /// nothing is built in that case.
    pub fn instantiate(&self, id: ShallowId) -> GraphResult<Behaviour> {
        let mut seen = HashSet::new();
        for t in &self.portals {
            if !seen.insert(t.property.name) {
                return Err(GraphError::DuplicatePortalName(t.property.name));
            }
        }
        let mut b = Behaviour::new(id, self.name.clone(), BehaviourKind::Plain);
        b.can_ghost = self.can_ghost;
        b.requires_update = self.requires_update;
        b.portals = self
            .portals
            .iter()
            .map(|t| Portal::new(t.kind, t.property.clone(), false))
            .collect();
        Ok(b)
    }
}

/// Named behaviour templates available to a session.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: IndexMap<String, BehaviourDefinition>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous one with the same name.
    pub fn register(&mut self, definition: BehaviourDefinition) {
        log::debug!("registered behaviour template `{}`", definition.name);
        self.templates.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> GraphResult<&BehaviourDefinition> {
        self.templates
            .get(name)
            .ok_or_else(|| GraphError::UnknownTemplate(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}
