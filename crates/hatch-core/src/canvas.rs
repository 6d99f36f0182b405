//! The editing surface of one container.
//!
//! A `Canvas` owns every item of its container's graph, keyed by shallow id
//! in insertion order. It is the only place items are created, linked, edited
//! or removed, and it keeps three derived things in step with those edits:
//! each portal's `links` list, the scene reference counts for assets and
//! groups, and the outbox of `GraphEvent`s for the owner to drain.

use crate::behaviour::{Behaviour, BehaviourDefinition, BehaviourKind};
use crate::config::EngineConfig;
use crate::container::{AnyContainer, ContainerDirectory};
use crate::error::{GraphError, GraphResult};
use crate::events::{GraphEvent, PropOwner};
use crate::geometry::{Bounds, Dimensions, Placement};
use crate::id::{AssetId, ContainerId, IdGenerator, Name, ScriptId, ShallowId};
use crate::lifecycle::{CanvasItem, ItemsMap, LoadReport, hydrate, tokenize_behaviour};
use crate::link::Link;
use crate::portal::{Portal, PortalRef, PortalType};
use crate::project::InstanceGrant;
use crate::prop::{Prop, PropValue};
use crate::references::{RefTransition, SceneReferences};
use crate::token::ContainerToken;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

/// The graph of one container.
#[derive(Debug)]
pub struct Canvas {
    container: ContainerId,
    items: IndexMap<ShallowId, CanvasItem>,
    ids: IdGenerator,
    config: EngineConfig,
    scene_references: SceneReferences,
    dimensions: Dimensions,
    outbox: Vec<GraphEvent>,
    disposed: bool,
}

impl Canvas {
    /// Create an empty canvas. `ids` is the session's shared generator.
    pub fn new(container: ContainerId, ids: IdGenerator, config: EngineConfig) -> Self {
        Self {
            container,
            items: IndexMap::new(),
            ids,
            config,
            scene_references: SceneReferences::new(),
            dimensions: Dimensions::default(),
            outbox: Vec::new(),
            disposed: false,
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn container(&self) -> &ContainerId {
        &self.container
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &CanvasItem> {
        self.items.values()
    }

    pub fn item(&self, id: ShallowId) -> Option<&CanvasItem> {
        self.items.get(&id)
    }

    pub fn behaviour(&self, id: ShallowId) -> Option<&Behaviour> {
        self.items.get(&id).and_then(CanvasItem::as_behaviour)
    }

    pub fn link(&self, id: ShallowId) -> Option<&Link> {
        self.items.get(&id).and_then(CanvasItem::as_link)
    }

    pub fn behaviours(&self) -> impl Iterator<Item = &Behaviour> {
        self.items.values().filter_map(CanvasItem::as_behaviour)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.items.values().filter_map(CanvasItem::as_link)
    }

    pub fn portal(&self, at: PortalRef) -> Option<&Portal> {
        self.behaviour(at.behaviour)?.portal(at.portal)
    }

    pub fn scene_references(&self) -> &SceneReferences {
        &self.scene_references
    }

    /// Last value computed by `check_dimensions`.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Shortcuts currently aliasing `original`.
    pub fn shortcuts_of(&self, original: ShallowId) -> Vec<ShallowId> {
        self.behaviours()
            .filter(|b| b.original() == Some(original))
            .map(|b| b.id)
            .collect()
    }

    /// Container gates, as the portals an instance of this container exposes.
    pub fn gate_portals(&self) -> Vec<Portal> {
        self.behaviours()
            .filter_map(|b| match b.kind {
                BehaviourKind::Portal { portal_type } => {
                    let inner = b.portals.first()?;
                    Some(Portal::new(portal_type, inner.property.clone(), false))
                }
                _ => None,
            })
            .collect()
    }

    /// Take every event queued since the last call.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ─── Adding behaviours ───────────────────────────────────────────────

    /// Admit a behaviour built by the caller.
    ///
    /// Refused when its id is taken or two of its portals share a name.
    /// Instances must come through `add_instance`.
    pub fn add_behaviour(&mut self, behaviour: Behaviour) -> GraphResult<ShallowId> {
        if behaviour.instance_of().is_some() {
            return Err(GraphError::UngrantedInstance(behaviour.id));
        }
        self.insert_behaviour(behaviour)
    }

    fn insert_behaviour(&mut self, behaviour: Behaviour) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        if self.items.contains_key(&behaviour.id) {
            return Err(GraphError::DuplicateItem(behaviour.id));
        }
        let mut seen = HashSet::new();
        for p in &behaviour.portals {
            if !seen.insert(p.name) {
                return Err(GraphError::DuplicatePortalName(p.name));
            }
        }
        self.ids.generate_local_id(behaviour.id);
        let id = behaviour.id;
        self.admit(CanvasItem::Behaviour(behaviour));
        self.check_dimensions();
        Ok(id)
    }

    /// Build a plain behaviour from a template and add it.
    pub fn instantiate(
        &mut self,
        template: &BehaviourDefinition,
        placement: Placement,
    ) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let mut b = template.instantiate(self.ids.next())?;
        b.placement = placement;
        self.add_behaviour(b)
    }

    pub fn add_asset(
        &mut self,
        alias: &str,
        asset: Option<AssetId>,
        placement: Placement,
    ) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let mut b = Behaviour::asset(self.ids.next(), alias, asset);
        b.placement = placement;
        self.add_behaviour(b)
    }

    pub fn add_script(
        &mut self,
        alias: &str,
        script: Option<ScriptId>,
        placement: Placement,
    ) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let mut b = Behaviour::script(self.ids.next(), alias, script);
        b.placement = placement;
        self.add_behaviour(b)
    }

    /// Record the id a script received once persisted.
    pub fn set_script_id(&mut self, id: ShallowId, script: ScriptId) -> GraphResult<()> {
        self.ensure_live()?;
        let b = self.behaviour_mut(id)?;
        if let BehaviourKind::Script { script_id } = &mut b.kind {
            *script_id = Some(script);
            Ok(())
        } else {
            Err(GraphError::NotABehaviour(id))
        }
    }

    /// Add a container IO gate.
    pub fn add_gate(
        &mut self,
        portal_type: PortalType,
        property: Prop,
        placement: Placement,
    ) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let mut b = Behaviour::gate(self.ids.next(), portal_type, property);
        b.placement = placement;
        self.add_behaviour(b)
    }

    pub fn add_comment(&mut self, text: &str, placement: Placement) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let mut b = Behaviour::comment(
            self.ids.next(),
            text,
            self.config.comment_width,
            self.config.comment_height,
        );
        b.placement = placement;
        self.add_behaviour(b)
    }

    /// Add a ghost of `original`. Ghosting a ghost aliases its original.
    pub fn add_shortcut(&mut self, original: ShallowId, placement: Placement) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let mut target = self.behaviour(original).ok_or(GraphError::UnknownItem(original))?;
        if let Some(root) = target.original() {
            target = self.behaviour(root).ok_or(GraphError::UnknownItem(root))?;
        }
        if !target.can_ghost {
            return Err(GraphError::CannotGhost(target.id));
        }
        let mut ghost = Behaviour::shortcut(self.ids.next());
        ghost.set_original_node(target, true);
        ghost.placement = placement;
        self.add_behaviour(ghost)
    }

    /// Add an instance of another container. The grant proves the
    /// dependency check already passed for this canvas's container.
    pub fn add_instance(&mut self, grant: InstanceGrant, placement: Placement) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        if grant.parent != self.container {
            return Err(GraphError::UnknownContainer(grant.parent));
        }
        let mut b = Behaviour::instance(self.ids.next(), grant.alias, grant.target, grant.portals);
        b.placement = placement;
        self.insert_behaviour(b)
    }

    // ─── Removing ────────────────────────────────────────────────────────

    /// Remove an item. Removing a behaviour removes its links first; its
    /// shortcuts stay and become orphans.
    pub fn remove_item(&mut self, id: ShallowId) -> GraphResult<CanvasItem> {
        self.ensure_live()?;
        match self.items.get(&id) {
            None => Err(GraphError::UnknownItem(id)),
            Some(CanvasItem::Link(_)) => self.remove_link(id).map(CanvasItem::Link),
            Some(CanvasItem::Behaviour(_)) => {
                let attached: Vec<ShallowId> =
                    self.links().filter(|l| l.touches(id)).map(|l| l.id).collect();
                for link in attached {
                    self.remove_link(link)?;
                }
                let item = self
                    .items
                    .shift_remove(&id)
                    .ok_or(GraphError::UnknownItem(id))?;
                if let CanvasItem::Behaviour(b) = &item {
                    for p in &b.portals {
                        self.track_portal(p.kind, &p.property.value, false);
                    }
                }
                self.emit(GraphEvent::ItemRemoved {
                    container: self.container.clone(),
                    item: id,
                });
                self.check_dimensions();
                Ok(item)
            }
        }
    }

    /// Remove several items; unknown ids are skipped (a link may already
    /// have gone with its behaviour).
    pub fn remove_items(&mut self, ids: &[ShallowId]) -> GraphResult<Vec<CanvasItem>> {
        self.ensure_live()?;
        let mut removed = Vec::new();
        for &id in ids {
            if self.items.contains_key(&id) {
                removed.push(self.remove_item(id)?);
            }
        }
        Ok(removed)
    }

    // ─── Links ───────────────────────────────────────────────────────────

    /// Connect `start` to `end`, gated by `Portal::check_portal_link`.
    pub fn create_link(&mut self, start: PortalRef, end: PortalRef) -> GraphResult<ShallowId> {
        self.ensure_live()?;
        let source = self.require_portal(start)?;
        let sink = self.require_portal(end)?;
        if !sink.check_portal_link(source) {
            return Err(GraphError::IllegalLink {
                start: start.portal,
                end: end.portal,
            });
        }
        if self.links().any(|l| l.start == start && l.end == end) {
            return Err(GraphError::DuplicateLink {
                start: start.portal,
                end: end.portal,
            });
        }
        let link = Link::new(self.ids.next(), start, end, self.config.default_frame_delay);
        let id = link.id;
        self.admit(CanvasItem::Link(link));
        Ok(id)
    }

    /// Remove a link and detach it from both portals.
    pub fn remove_link(&mut self, id: ShallowId) -> GraphResult<Link> {
        self.ensure_live()?;
        match self.items.get(&id) {
            Some(CanvasItem::Link(_)) => {}
            Some(_) => return Err(GraphError::NotALink(id)),
            None => return Err(GraphError::UnknownItem(id)),
        }
        let Some(CanvasItem::Link(link)) = self.items.shift_remove(&id) else {
            return Err(GraphError::NotALink(id));
        };
        for end in [link.start, link.end] {
            if let Some(p) = self.portal_mut(end) {
                p.remove_link(id);
            }
        }
        self.emit(GraphEvent::ItemRemoved {
            container: self.container.clone(),
            item: id,
        });
        Ok(link)
    }

    pub fn set_frame_delay(&mut self, id: ShallowId, frame_delay: u32) -> GraphResult<()> {
        self.ensure_live()?;
        match self.items.get_mut(&id) {
            Some(CanvasItem::Link(l)) => {
                l.frame_delay = frame_delay;
                Ok(())
            }
            Some(_) => Err(GraphError::NotALink(id)),
            None => Err(GraphError::UnknownItem(id)),
        }
    }

    /// Declare a property on a link's own set.
    pub fn add_link_property(&mut self, id: ShallowId, property: Prop) -> GraphResult<()> {
        self.ensure_live()?;
        match self.items.get_mut(&id) {
            Some(CanvasItem::Link(l)) => l.properties.add(property),
            Some(_) => Err(GraphError::NotALink(id)),
            None => Err(GraphError::UnknownItem(id)),
        }
    }

    /// Edit a property on a link's own set.
    pub fn set_link_property(&mut self, id: ShallowId, name: Name, value: PropValue) -> GraphResult<()> {
        self.ensure_live()?;
        let edits = match self.items.get_mut(&id) {
            Some(CanvasItem::Link(l)) => {
                l.properties.set_value(name, value)?;
                l.properties.take_edits()
            }
            Some(_) => return Err(GraphError::NotALink(id)),
            None => return Err(GraphError::UnknownItem(id)),
        };
        for edit in edits {
            self.emit(GraphEvent::PropertyEdited {
                container: self.container.clone(),
                owner: PropOwner::Link(id),
                name: edit.name,
            });
        }
        Ok(())
    }

    // ─── Portals ─────────────────────────────────────────────────────────

    /// Add a user portal to a behaviour.
    pub fn add_portal(&mut self, behaviour: ShallowId, kind: PortalType, property: Prop) -> GraphResult<()> {
        self.ensure_live()?;
        let portal = Portal::new(kind, property, true);
        let value = portal.property.value.clone();
        self.behaviour_mut(behaviour)?.add_portal(portal)?;
        self.track_portal(kind, &value, true);
        Ok(())
    }

    /// Remove a user portal and every link attached to it.
    pub fn remove_portal(&mut self, behaviour: ShallowId, name: Name) -> GraphResult<Portal> {
        self.ensure_live()?;
        let b = self.behaviour(behaviour).ok_or(GraphError::UnknownItem(behaviour))?;
        if b.is_shortcut() {
            return Err(GraphError::ShortcutShape(behaviour));
        }
        let portal = b.portal(name).ok_or(GraphError::UnknownPortal {
            behaviour,
            portal: name,
        })?;
        if !portal.custom {
            return Err(GraphError::StructuralPortal(name));
        }
        for link in portal.links.clone() {
            self.remove_link(link)?;
        }
        let removed = self.behaviour_mut(behaviour)?.remove_portal(name)?;
        self.track_portal(removed.kind, &removed.property.value, false);
        Ok(removed)
    }

    /// Replace a portal's property (rename, retype, revalue). Links stay
    /// attached and follow a rename.
    pub fn edit_portal(&mut self, at: PortalRef, property: Prop) -> GraphResult<()> {
        self.ensure_live()?;
        let b = self.behaviour(at.behaviour).ok_or(GraphError::UnknownItem(at.behaviour))?;
        if b.is_shortcut() {
            return Err(GraphError::ShortcutShape(at.behaviour));
        }
        let portal = self.require_portal(at)?;
        let new_name = property.name;
        if new_name != at.portal && b.portal(new_name).is_some() {
            return Err(GraphError::DuplicatePortalName(new_name));
        }
        let (kind, old_value, links) = (portal.kind, portal.property.value.clone(), portal.links.clone());

        self.track_portal(kind, &old_value, false);
        self.track_portal(kind, &property.value, true);
        if let Some(p) = self.portal_mut(at) {
            p.edit(property);
        }
        if new_name != at.portal {
            let renamed = PortalRef::new(at.behaviour, new_name);
            for id in links {
                if let Some(CanvasItem::Link(l)) = self.items.get_mut(&id) {
                    if l.start == at {
                        l.start = renamed;
                    }
                    if l.end == at {
                        l.end = renamed;
                    }
                }
            }
        }
        self.emit(GraphEvent::PropertyEdited {
            container: self.container.clone(),
            owner: PropOwner::Portal {
                behaviour: at.behaviour,
                portal: new_name,
            },
            name: new_name,
        });
        Ok(())
    }

    /// Set the value carried by a portal, keeping scene references in step.
    pub fn set_portal_value(&mut self, at: PortalRef, value: PropValue) -> GraphResult<()> {
        self.ensure_live()?;
        let portal = self.require_portal(at)?;
        let (kind, old) = (portal.kind, portal.property.value.clone());
        self.track_portal(kind, &old, false);
        self.track_portal(kind, &value, true);
        if let Some(p) = self.portal_mut(at) {
            p.property.value = value;
        }
        self.emit(GraphEvent::PropertyEdited {
            container: self.container.clone(),
            owner: PropOwner::Portal {
                behaviour: at.behaviour,
                portal: at.portal,
            },
            name: at.portal,
        });
        Ok(())
    }

    // ─── Behaviour edits ─────────────────────────────────────────────────

    /// Rename a behaviour and broadcast the new alias to its shortcuts.
    pub fn rename_behaviour(&mut self, id: ShallowId, alias: &str) -> GraphResult<()> {
        self.ensure_live()?;
        self.behaviour_mut(id)?.alias = alias.to_string();
        let mut renamed = vec![id];
        renamed.extend(self.on_behaviour_rename(id, alias));
        for behaviour in renamed {
            self.emit(GraphEvent::BehaviourRenamed {
                container: self.container.clone(),
                behaviour,
                alias: alias.to_string(),
            });
        }
        Ok(())
    }

    fn on_behaviour_rename(&mut self, original: ShallowId, alias: &str) -> Vec<ShallowId> {
        let ghosts = self.shortcuts_of(original);
        for &g in &ghosts {
            if let Some(CanvasItem::Behaviour(b)) = self.items.get_mut(&g) {
                b.alias = alias.to_string();
            }
        }
        ghosts
    }

    pub fn set_text(&mut self, id: ShallowId, text: &str) -> GraphResult<()> {
        self.ensure_live()?;
        self.behaviour_mut(id)?.text = text.to_string();
        Ok(())
    }

    /// Move a behaviour. Returns the links whose geometry must be redrawn.
    pub fn move_item(&mut self, id: ShallowId, placement: Placement) -> GraphResult<Vec<ShallowId>> {
        self.ensure_live()?;
        let b = self.behaviour_mut(id)?;
        b.placement = placement;
        let links: Vec<ShallowId> = b
            .portals
            .iter()
            .flat_map(|p| p.update_all_links().iter().copied())
            .collect();
        self.check_dimensions();
        Ok(links)
    }

    /// Re-snapshot a shortcut's portals from its original.
    ///
    /// Links on portals that still exist survive; the rest are removed.
    pub fn refresh_shortcut(&mut self, shortcut: ShallowId) -> GraphResult<()> {
        self.ensure_live()?;
        let ghost = self.behaviour(shortcut).ok_or(GraphError::UnknownItem(shortcut))?;
        let original = ghost.original().ok_or(GraphError::ShortcutShape(shortcut))?;
        let source = self
            .behaviour(original)
            .ok_or(GraphError::UnknownItem(original))?
            .clone();

        let keep: HashSet<Name> = source.portals.iter().map(|p| p.name).collect();
        let stale: Vec<ShallowId> = ghost
            .portals
            .iter()
            .filter(|p| !keep.contains(&p.name))
            .flat_map(|p| p.links.iter().copied())
            .collect();
        for link in stale {
            self.remove_link(link)?;
        }

        let old = std::mem::take(&mut self.behaviour_mut(shortcut)?.portals);
        for p in &old {
            self.track_portal(p.kind, &p.property.value, false);
        }
        let mut fresh: Vec<Portal> = source.portals.iter().map(Portal::detached).collect();
        for p in &mut fresh {
            if let Some(prev) = old.iter().find(|o| o.name == p.name) {
                p.links = prev.links.clone();
            }
        }
        for p in &fresh {
            self.track_portal(p.kind, &p.property.value, true);
        }
        let b = self.behaviour_mut(shortcut)?;
        b.portals = fresh;
        b.alias = source.alias;
        Ok(())
    }

    // ─── Integrity ───────────────────────────────────────────────────────

    /// Shortcuts whose original is gone.
    pub fn orphaned_shortcuts(&self) -> Vec<ShallowId> {
        self.behaviours()
            .filter(|b| b.is_shortcut())
            .filter(|b| match b.original() {
                Some(o) => self.behaviour(o).is_none(),
                None => true,
            })
            .map(|b| b.id)
            .collect()
    }

    /// Remove every orphaned shortcut. Returns the removed ids.
    pub fn remove_orphaned_shortcuts(&mut self) -> GraphResult<Vec<ShallowId>> {
        let orphans = self.orphaned_shortcuts();
        self.remove_items(&orphans)?;
        if !orphans.is_empty() {
            log::debug!("removed {} orphaned shortcut(s) from `{}`", orphans.len(), self.container);
        }
        Ok(orphans)
    }

    /// Instances pointing at `container`.
    pub fn instances_of(&self, container: &ContainerId) -> Vec<ShallowId> {
        self.behaviours()
            .filter(|b| b.instance_of() == Some(container))
            .map(|b| b.id)
            .collect()
    }

    /// Containers this canvas instantiates.
    pub fn dependencies(&self) -> Vec<ContainerId> {
        let mut seen = HashSet::new();
        self.behaviours()
            .filter_map(Behaviour::instance_of)
            .filter(|c| seen.insert((*c).clone()))
            .cloned()
            .collect()
    }

    // ─── Serialization ───────────────────────────────────────────────────

    /// Tokenize the whole graph, or only `subset` (clipboard export).
    ///
    /// Scripts without an id are skipped, and so is any link that would
    /// point at a skipped or excluded behaviour.
    pub fn tokenize(&self, subset: Option<&[ShallowId]>) -> ContainerToken {
        self.tokenize_items(subset, false)
    }

    /// Every item, unsaved scripts included. The result is only meaningful
    /// within this session and is what undo restores.
    pub fn snapshot(&self) -> ContainerToken {
        self.tokenize_items(None, true)
    }

    fn tokenize_items(&self, subset: Option<&[ShallowId]>, keep_unsaved: bool) -> ContainerToken {
        let wanted: Option<HashSet<ShallowId>> = subset.map(|s| s.iter().copied().collect());
        let included = |id: &ShallowId| wanted.as_ref().is_none_or(|w| w.contains(id));

        let mut emitted = HashSet::new();
        let mut items = Vec::new();
        for b in self.behaviours().filter(|b| included(&b.id)) {
            if let Some(token) = tokenize_behaviour(b, keep_unsaved) {
                emitted.insert(b.id);
                items.push((b.id, token));
            }
        }
        for l in self.links().filter(|l| included(&l.id)) {
            if emitted.contains(&l.start.behaviour) && emitted.contains(&l.end.behaviour) {
                items.push((l.id, l.tokenize()));
            }
        }
        // Keep canvas order on the wire
        items.sort_by_key(|(id, _)| self.items.get_index_of(id));
        ContainerToken {
            items: items.into_iter().map(|(_, t)| t).collect(),
            properties: Value::Null,
        }
    }

    /// Load a token, accepting any instance target.
    pub fn detokenize(&mut self, data: &ContainerToken, clear_items: bool) -> GraphResult<LoadReport> {
        self.detokenize_with(data, clear_items, &AnyContainer)
    }

    /// Load a token.
    ///
    /// `clear_items` replaces the graph; otherwise items are appended. Items
    /// keep their token id when it is free on this canvas and get a fresh
    /// one otherwise. Unresolvable items are dropped and listed in the report.
    pub fn detokenize_with(
        &mut self,
        data: &ContainerToken,
        clear_items: bool,
        directory: &dyn ContainerDirectory,
    ) -> GraphResult<LoadReport> {
        self.ensure_live()?;
        if clear_items {
            self.clear()?;
        }
        self.load(data, directory, false)
    }

    /// Append a token with every item on a fresh id (paste, duplicate).
    pub fn import(&mut self, data: &ContainerToken, directory: &dyn ContainerDirectory) -> GraphResult<LoadReport> {
        self.ensure_live()?;
        self.load(data, directory, true)
    }

    fn load(
        &mut self,
        data: &ContainerToken,
        directory: &dyn ContainerDirectory,
        fresh_ids: bool,
    ) -> GraphResult<LoadReport> {
        let mut report = LoadReport::default();
        let mut claimed = HashSet::new();
        let mut hydrated = Vec::with_capacity(data.items.len());
        for token in &data.items {
            let id = self.assign_id(token.shallow_id, fresh_ids, &mut claimed);
            match hydrate(token.clone(), id, &self.config) {
                Ok(h) => hydrated.push(h),
                Err(dropped) => {
                    log::warn!("`{}`: dropping item {}: {:?}", self.container, dropped.original, dropped.reason);
                    report.dropped.push(dropped);
                }
            }
        }

        let (mut map, repeated) = ItemsMap::build(&mut hydrated);
        for dropped in repeated {
            log::warn!("`{}`: dropping item {}: token id used twice", self.container, dropped.original);
            report.dropped.push(dropped);
        }
        let mut pending: Vec<_> = hydrated.into_iter().enumerate().collect();
        pending.sort_by_key(|(_, h)| h.link_phase());

        let mut linked = Vec::with_capacity(pending.len());
        for (pos, h) in pending {
            match h.link(&map, directory) {
                Ok(item) => linked.push((pos, item)),
                Err(dropped) => {
                    log::warn!("`{}`: dropping item {}: {:?}", self.container, dropped.original, dropped.reason);
                    map.forget(dropped.original);
                    report.dropped.push(dropped);
                }
            }
        }

        linked.sort_by_key(|(pos, _)| *pos);
        let mut links = Vec::new();
        for (_, item) in linked {
            report.loaded.push(item.id());
            if let CanvasItem::Link(l) = &item {
                links.push((l.id, l.start, l.end));
            }
            self.insert_item(item);
        }
        // A link may precede its behaviours in the token; attach once all are in
        for (id, start, end) in links {
            self.attach_link(id, start, end);
        }
        self.check_dimensions();
        log::debug!(
            "`{}`: loaded {} item(s), dropped {}",
            self.container,
            report.loaded.len(),
            report.dropped.len()
        );
        Ok(report)
    }

    /// Parse and load a JSON token string.
    pub fn load_json(&mut self, json: &str, clear_items: bool) -> GraphResult<LoadReport> {
        let token = ContainerToken::from_json(json)?;
        self.detokenize(&token, clear_items)
    }

    // ─── Derived state ───────────────────────────────────────────────────

    /// Recompute the minimum canvas size from item rectangles.
    pub fn check_dimensions(&mut self) -> Dimensions {
        let (w, h) = (self.config.behaviour_width, self.config.behaviour_height);
        let rects: Vec<Bounds> = self.behaviours().map(|b| b.bounds(w, h)).collect();
        self.dimensions = Dimensions::covering(&rects, self.config.canvas_padding);
        self.dimensions
    }

    /// Rebuild scene reference counts from scratch, emitting events for
    /// resources that appeared or vanished relative to the cached counts.
    pub fn build_scene_references(&mut self) {
        let mut fresh = SceneReferences::new();
        for b in self.behaviours() {
            for p in b.portals.iter().filter(|p| p.kind == PortalType::Parameter) {
                for a in p.property.value.asset_refs() {
                    fresh.add_asset(a);
                }
                if let Some(g) = p.property.value.group_ref() {
                    fresh.add_group(g);
                }
            }
        }
        let old = std::mem::replace(&mut self.scene_references, fresh);
        let mut transitions = Vec::new();
        for (a, _) in self.scene_references.assets() {
            if old.asset_count(a).is_none() {
                transitions.push(RefTransition::AssetAdded(a.clone()));
            }
        }
        for (a, _) in old.assets() {
            if self.scene_references.asset_count(a).is_none() {
                transitions.push(RefTransition::AssetRemoved(a.clone()));
            }
        }
        for (g, _) in self.scene_references.groups() {
            if old.group_count(g).is_none() {
                transitions.push(RefTransition::GroupAdded(g.clone()));
            }
        }
        for (g, _) in old.groups() {
            if self.scene_references.group_count(g).is_none() {
                transitions.push(RefTransition::GroupRemoved(g.clone()));
            }
        }
        for t in transitions {
            self.emit_transition(t);
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────────

    /// Remove every item, links first.
    pub fn clear(&mut self) -> GraphResult<()> {
        self.ensure_live()?;
        let links: Vec<ShallowId> = self.links().map(|l| l.id).collect();
        for id in links {
            self.remove_link(id)?;
        }
        let rest: Vec<ShallowId> = self.items.keys().copied().collect();
        for id in rest {
            self.remove_item(id)?;
        }
        self.check_dimensions();
        Ok(())
    }

    /// Tear the canvas down. Later mutations fail with `Disposed`.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(err) = self.clear() {
            log::warn!("`{}`: error while disposing: {err}", self.container);
        }
        for t in self.scene_references.drain() {
            self.emit_transition(t);
        }
        self.disposed = true;
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn ensure_live(&self) -> GraphResult<()> {
        if self.disposed {
            return Err(GraphError::Disposed(self.container.clone()));
        }
        Ok(())
    }

    fn assign_id(&self, original: ShallowId, fresh: bool, claimed: &mut HashSet<ShallowId>) -> ShallowId {
        if !fresh && !self.items.contains_key(&original) && claimed.insert(original) {
            self.ids.generate_local_id(original);
            return original;
        }
        loop {
            let id = self.ids.next();
            if !self.items.contains_key(&id) && claimed.insert(id) {
                return id;
            }
        }
    }

    /// Insert a resolved item and bring derived state up to date.
    fn admit(&mut self, item: CanvasItem) {
        let ends = item.as_link().map(|l| (l.id, l.start, l.end));
        self.insert_item(item);
        if let Some((id, start, end)) = ends {
            self.attach_link(id, start, end);
        }
    }

    /// Store an item and count the resources its portals reference. A link
    /// is not attached to its portals here; see `attach_link`.
    fn insert_item(&mut self, item: CanvasItem) {
        let id = item.id();
        if let CanvasItem::Behaviour(b) = &item {
            let values: Vec<_> = b
                .portals
                .iter()
                .map(|p| (p.kind, p.property.value.clone()))
                .collect();
            for (kind, value) in values {
                self.track_portal(kind, &value, true);
            }
        }
        self.items.insert(id, item);
        self.emit(GraphEvent::ItemAdded {
            container: self.container.clone(),
            item: id,
        });
    }

    fn attach_link(&mut self, id: ShallowId, start: PortalRef, end: PortalRef) {
        for at in [start, end] {
            match self.portal_mut(at) {
                Some(p) => {
                    p.add_link(id);
                }
                None => log::warn!("`{}`: link {id} has no portal at {at:?}", self.container),
            }
        }
    }

    fn behaviour_mut(&mut self, id: ShallowId) -> GraphResult<&mut Behaviour> {
        match self.items.get_mut(&id) {
            Some(CanvasItem::Behaviour(b)) => Ok(b),
            Some(_) => Err(GraphError::NotABehaviour(id)),
            None => Err(GraphError::UnknownItem(id)),
        }
    }

    fn portal_mut(&mut self, at: PortalRef) -> Option<&mut Portal> {
        match self.items.get_mut(&at.behaviour)? {
            CanvasItem::Behaviour(b) => b.portal_mut(at.portal),
            CanvasItem::Link(_) => None,
        }
    }

    fn require_portal(&self, at: PortalRef) -> GraphResult<&Portal> {
        let b = match self.items.get(&at.behaviour) {
            Some(CanvasItem::Behaviour(b)) => b,
            Some(_) => return Err(GraphError::NotABehaviour(at.behaviour)),
            None => return Err(GraphError::UnknownItem(at.behaviour)),
        };
        b.portal(at.portal).ok_or(GraphError::UnknownPortal {
            behaviour: at.behaviour,
            portal: at.portal,
        })
    }

    /// Count (or uncount) the resources a portal value points at. Only
    /// parameter portals take part.
    fn track_portal(&mut self, kind: PortalType, value: &PropValue, add: bool) {
        if kind != PortalType::Parameter {
            return;
        }
        let mut transitions = Vec::new();
        for a in value.asset_refs() {
            let t = if add {
                self.scene_references.add_asset(a)
            } else {
                self.scene_references.remove_asset(a)
            };
            transitions.extend(t);
        }
        if let Some(g) = value.group_ref() {
            let t = if add {
                self.scene_references.add_group(g)
            } else {
                self.scene_references.remove_group(g)
            };
            transitions.extend(t);
        }
        for t in transitions {
            self.emit_transition(t);
        }
    }

    fn emit_transition(&mut self, t: RefTransition) {
        let container = self.container.clone();
        self.emit(match t {
            RefTransition::AssetAdded(asset) => GraphEvent::AssetAdded { container, asset },
            RefTransition::AssetRemoved(asset) => GraphEvent::AssetRemoved { container, asset },
            RefTransition::GroupAdded(group) => GraphEvent::GroupAdded { container, group },
            RefTransition::GroupRemoved(group) => GraphEvent::GroupRemoved { container, group },
        });
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        log::trace!("{event:?}");
        self.outbox.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prop::PropertyType;
    use pretty_assertions::assert_eq;

    fn canvas() -> Canvas {
        Canvas::new(ContainerId::new("main"), IdGenerator::new(), EngineConfig::default())
    }

    fn emitter() -> BehaviourDefinition {
        BehaviourDefinition::new("Emitter")
            .with_portal(PortalType::Output, Prop::empty("out", PropertyType::Bool))
            .with_portal(PortalType::Product, Prop::empty("value", PropertyType::Number))
    }

    fn receiver() -> BehaviourDefinition {
        BehaviourDefinition::new("Receiver")
            .with_portal(PortalType::Input, Prop::empty("in", PropertyType::Bool))
            .with_portal(PortalType::Parameter, Prop::empty("amount", PropertyType::Number))
            .with_portal(PortalType::Parameter, Prop::empty("texture", PropertyType::Asset))
    }

    #[test]
    fn link_updates_both_portals() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let y = c.instantiate(&receiver(), Placement::default()).unwrap();
        let l = c
            .create_link(PortalRef::new(x, "out"), PortalRef::new(y, "in"))
            .unwrap();

        assert_eq!(c.portal(PortalRef::new(x, "out")).unwrap().links.as_slice(), &[l]);
        assert_eq!(c.portal(PortalRef::new(y, "in")).unwrap().links.as_slice(), &[l]);

        c.remove_link(l).unwrap();
        assert!(c.portal(PortalRef::new(x, "out")).unwrap().links.is_empty());
        assert!(c.portal(PortalRef::new(y, "in")).unwrap().links.is_empty());
    }

    #[test]
    fn illegal_and_duplicate_links_are_refused() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let y = c.instantiate(&receiver(), Placement::default()).unwrap();

        let err = c
            .create_link(PortalRef::new(x, "out"), PortalRef::new(y, "amount"))
            .unwrap_err();
        assert!(matches!(err, GraphError::IllegalLink { .. }));

        c.create_link(PortalRef::new(x, "value"), PortalRef::new(y, "amount"))
            .unwrap();
        let err = c
            .create_link(PortalRef::new(x, "value"), PortalRef::new(y, "amount"))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateLink { .. }));
        assert_eq!(c.links().count(), 1);
    }

    #[test]
    fn removing_behaviour_removes_its_links() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let y = c.instantiate(&receiver(), Placement::default()).unwrap();
        c.create_link(PortalRef::new(x, "out"), PortalRef::new(y, "in"))
            .unwrap();

        c.remove_item(x).unwrap();
        assert_eq!(c.links().count(), 0);
        assert!(c.portal(PortalRef::new(y, "in")).unwrap().links.is_empty());
    }

    #[test]
    fn asset_values_are_counted_and_announced() {
        let mut c = canvas();
        let y = c.instantiate(&receiver(), Placement::default()).unwrap();
        let tex = AssetId::new("tex");
        c.drain_events();

        c.set_portal_value(PortalRef::new(y, "texture"), PropValue::Asset(Some(tex.clone())))
            .unwrap();
        assert_eq!(c.scene_references().asset_count(&tex), Some(1));
        let events = c.drain_events();
        assert!(events.contains(&GraphEvent::AssetAdded {
            container: ContainerId::new("main"),
            asset: tex.clone(),
        }));

        c.set_portal_value(PortalRef::new(y, "texture"), PropValue::Asset(None))
            .unwrap();
        assert_eq!(c.scene_references().asset_count(&tex), None);
        assert!(c.drain_events().contains(&GraphEvent::AssetRemoved {
            container: ContainerId::new("main"),
            asset: tex,
        }));
    }

    #[test]
    fn edit_portal_rename_follows_links() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let y = c.instantiate(&receiver(), Placement::default()).unwrap();
        let l = c
            .create_link(PortalRef::new(x, "out"), PortalRef::new(y, "in"))
            .unwrap();

        c.edit_portal(PortalRef::new(y, "in"), Prop::empty("trigger", PropertyType::Bool))
            .unwrap();
        assert_eq!(c.link(l).unwrap().end, PortalRef::new(y, "trigger"));
        assert_eq!(c.portal(PortalRef::new(y, "trigger")).unwrap().links.as_slice(), &[l]);
    }

    #[test]
    fn rename_broadcasts_to_shortcuts() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let ghost = c.add_shortcut(x, Placement::new(200.0, 0.0)).unwrap();

        c.rename_behaviour(x, "Spawner").unwrap();
        assert_eq!(c.behaviour(ghost).unwrap().alias, "Spawner");
    }

    #[test]
    fn shortcut_of_shortcut_aliases_the_original() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let g1 = c.add_shortcut(x, Placement::default()).unwrap();
        let g2 = c.add_shortcut(g1, Placement::default()).unwrap();
        assert_eq!(c.behaviour(g2).unwrap().original(), Some(x));
    }

    #[test]
    fn removing_custom_portal_drops_its_links() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let y = c.instantiate(&receiver(), Placement::default()).unwrap();
        c.add_portal(y, PortalType::Input, Prop::empty("extra", PropertyType::Bool))
            .unwrap();
        c.create_link(PortalRef::new(x, "out"), PortalRef::new(y, "extra"))
            .unwrap();

        c.remove_portal(y, Name::intern("extra")).unwrap();
        assert_eq!(c.links().count(), 0);
        assert!(c.portal(PortalRef::new(x, "out")).unwrap().links.is_empty());

        let err = c.remove_portal(y, Name::intern("in")).unwrap_err();
        assert!(matches!(err, GraphError::StructuralPortal(_)));
    }

    #[test]
    fn check_dimensions_covers_items() {
        let mut c = canvas();
        c.instantiate(&emitter(), Placement::new(400.0, 300.0)).unwrap();
        c.add_comment("note", Placement::new(10.0, 900.0)).unwrap();
        let cfg = EngineConfig::default();
        let dims = c.dimensions();
        assert_eq!(dims.width, 400.0 + cfg.behaviour_width + cfg.canvas_padding);
        assert_eq!(dims.height, 900.0 + cfg.comment_height + cfg.canvas_padding);
    }

    #[test]
    fn disposed_canvas_refuses_mutation() {
        let mut c = canvas();
        c.instantiate(&emitter(), Placement::default()).unwrap();
        c.dispose();
        assert!(c.is_empty());
        assert!(matches!(
            c.add_comment("late", Placement::default()),
            Err(GraphError::Disposed(_))
        ));
    }

    #[test]
    fn unsaved_script_is_left_out_with_its_links() {
        let mut c = canvas();
        let x = c.instantiate(&emitter(), Placement::default()).unwrap();
        let s = c.add_script("Logic", None, Placement::default()).unwrap();
        c.create_link(PortalRef::new(x, "out"), PortalRef::new(s, "Execute"))
            .unwrap();

        let token = c.tokenize(None);
        assert_eq!(token.items.len(), 1);
        assert_eq!(c.snapshot().items.len(), 3);

        c.set_script_id(s, ScriptId::new("script-1")).unwrap();
        assert_eq!(c.tokenize(None).items.len(), 3);
    }

    #[test]
    fn instances_need_a_grant() {
        let mut c = canvas();
        let b = Behaviour::instance(ShallowId(7), "Other", ContainerId::new("other"), Vec::new());
        assert!(matches!(
            c.add_behaviour(b),
            Err(GraphError::UngrantedInstance(ShallowId(7)))
        ));
        assert!(c.is_empty());
    }
}
