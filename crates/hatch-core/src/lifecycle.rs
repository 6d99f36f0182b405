//! Item lifecycle across the serialization boundary.
//!
//! Loading is a two-phase protocol with an explicit state per item:
//!
//! 1. `hydrate` turns an `ItemToken` into a `Hydrated` value. Scalars are
//!    restored; cross references (link endpoints, shortcut originals) are kept
//!    as raw token fields and cannot be read back out.
//! 2. Once *every* item of the batch is hydrated, an `ItemsMap` is built from
//!    original shallow ids, and `Hydrated::link` resolves references against
//!    it, producing a `CanvasItem`. Anything that cannot be resolved is
//!    dropped and reported instead.
//!
//! Because the map is complete before any link runs, a link may appear before
//! the behaviours it connects.

use crate::behaviour::{Behaviour, BehaviourKind};
use crate::config::EngineConfig;
use crate::container::ContainerDirectory;
use crate::geometry::Placement;
use crate::id::{ContainerId, Name, ShallowId};
use crate::link::Link;
use crate::portal::{Portal, PortalRef, PortalType};
use crate::prop::EditableSet;
use crate::token::{ItemToken, ItemType};
use std::collections::HashMap;

// ─── Linked items ────────────────────────────────────────────────────────

/// A fully resolved item owned by a canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasItem {
    Behaviour(Behaviour),
    Link(Link),
}

impl CanvasItem {
    pub fn id(&self) -> ShallowId {
        match self {
            CanvasItem::Behaviour(b) => b.id,
            CanvasItem::Link(l) => l.id,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            CanvasItem::Behaviour(b) => behaviour_item_type(&b.kind),
            CanvasItem::Link(_) => ItemType::Link,
        }
    }

    pub fn as_behaviour(&self) -> Option<&Behaviour> {
        match self {
            CanvasItem::Behaviour(b) => Some(b),
            CanvasItem::Link(_) => None,
        }
    }

    pub fn as_behaviour_mut(&mut self) -> Option<&mut Behaviour> {
        match self {
            CanvasItem::Behaviour(b) => Some(b),
            CanvasItem::Link(_) => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            CanvasItem::Link(l) => Some(l),
            CanvasItem::Behaviour(_) => None,
        }
    }

    /// Persistable token for this item, or `None` if it cannot be
    /// finalized yet.
    pub fn tokenize(&self) -> Option<ItemToken> {
        match self {
            CanvasItem::Behaviour(b) => tokenize_behaviour(b, false),
            CanvasItem::Link(l) => Some(l.tokenize()),
        }
    }
}

pub fn behaviour_item_type(kind: &BehaviourKind) -> ItemType {
    match kind {
        BehaviourKind::Plain => ItemType::Behaviour,
        BehaviourKind::Portal { .. } => ItemType::BehaviourPortal,
        BehaviourKind::Asset => ItemType::BehaviourAsset,
        BehaviourKind::Script { .. } => ItemType::BehaviourScript,
        BehaviourKind::Shortcut { .. } => ItemType::BehaviourShortcut,
        BehaviourKind::Instance { .. } => ItemType::BehaviourInstance,
        BehaviourKind::Comment { .. } => ItemType::BehaviourComment,
    }
}

/// Serialize a behaviour.
///
/// Scripts that were never persisted have no id to point at. They are
/// skipped unless `keep_unsaved` is set, in which case the token carries no
/// `scriptId` and only makes sense within this session (undo snapshots).
pub fn tokenize_behaviour(b: &Behaviour, keep_unsaved: bool) -> Option<ItemToken> {
    let mut token = ItemToken::new(b.id, behaviour_item_type(&b.kind));
    let (left, top) = b.placement.to_css();
    token.left = Some(left);
    token.top = Some(top);
    token.alias = Some(b.alias.clone());
    if !b.text.is_empty() {
        token.text = Some(b.text.clone());
    }
    token.behaviour_type = Some(b.behaviour_type.clone());
    token.can_ghost = Some(b.can_ghost);
    if b.requires_update {
        token.requires_update = Some(true);
    }

    match &b.kind {
        BehaviourKind::Plain | BehaviourKind::Asset => {
            token.portals = b.portals.iter().map(Portal::tokenize).collect();
        }
        BehaviourKind::Portal { portal_type } => {
            token.portal = b.portals.first().map(Portal::tokenize);
            token.portal_type = Some(*portal_type);
        }
        BehaviourKind::Script { script_id } => {
            if script_id.is_none() && !keep_unsaved {
                log::debug!("skipping unsaved script behaviour {}", b.id);
                return None;
            }
            token.script_id = script_id.clone();
            token.portals = b.portals.iter().map(Portal::tokenize).collect();
        }
        BehaviourKind::Shortcut { original } => {
            token.original_id = *original;
            token.portals = b.portals.iter().map(Portal::tokenize).collect();
        }
        BehaviourKind::Instance { container } => {
            token.container_id = Some(container.clone());
            token.portals = b.portals.iter().map(Portal::tokenize).collect();
        }
        BehaviourKind::Comment { width, height } => {
            token.width = Some(*width);
            token.height = Some(*height);
        }
    }
    Some(token)
}

// ─── Drop reporting ──────────────────────────────────────────────────────

/// Why an item was left out of a load.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// A required token field is absent.
    MissingField(&'static str),
    /// A link endpoint names a behaviour that is not in the batch.
    MissingBehaviour(ShallowId),
    /// A link endpoint names a portal the behaviour does not have.
    MissingPortal { behaviour: ShallowId, portal: Name },
    /// A shortcut's original is not in the batch.
    MissingOriginal(ShallowId),
    /// An instance points at a container the project does not know.
    UnknownContainer(ContainerId),
    /// An earlier item of the batch already carries this token id.
    DuplicateId,
}

/// One item that did not survive loading.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedItem {
    /// Id the item had in the token.
    pub original: ShallowId,
    pub kind: ItemType,
    pub reason: DropReason,
}

/// Outcome of `Canvas::detokenize`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Items added to the canvas.
    pub loaded: Vec<ShallowId>,
    /// Items left out because a reference could not be resolved.
    pub dropped: Vec<DroppedItem>,
}

impl LoadReport {
    /// True when nothing was dropped.
    pub fn is_lossless(&self) -> bool {
        self.dropped.is_empty()
    }
}

// ─── Hydrated items ──────────────────────────────────────────────────────

/// A behaviour restored from its token, references still unresolved.
#[derive(Debug)]
pub struct HydratedBehaviour {
    original: ShallowId,
    behaviour: Behaviour,
    original_ref: Option<ShallowId>,
}

/// A link restored from its token, endpoints still raw.
#[derive(Debug)]
pub struct HydratedLink {
    original: ShallowId,
    id: ShallowId,
    start_behaviour: ShallowId,
    start_portal: Name,
    end_behaviour: ShallowId,
    end_portal: Name,
    frame_delay: u32,
    properties: EditableSet,
}

/// An item between phase 2 and phase 3 of loading.
#[derive(Debug)]
pub enum Hydrated {
    Behaviour(HydratedBehaviour),
    Link(HydratedLink),
}

impl Hydrated {
    /// The id this item had in the token.
    pub fn original(&self) -> ShallowId {
        match self {
            Hydrated::Behaviour(b) => b.original,
            Hydrated::Link(l) => l.original,
        }
    }

    /// The id the item will have on the canvas.
    pub fn id(&self) -> ShallowId {
        match self {
            Hydrated::Behaviour(b) => b.behaviour.id,
            Hydrated::Link(l) => l.id,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Hydrated::Behaviour(b) => behaviour_item_type(&b.behaviour.kind),
            Hydrated::Link(_) => ItemType::Link,
        }
    }

    /// Shortcuts resolve after every other behaviour so their original is
    /// known to have survived.
    pub fn link_phase(&self) -> u8 {
        match self {
            Hydrated::Behaviour(b) if b.behaviour.is_shortcut() => 1,
            Hydrated::Behaviour(_) => 0,
            Hydrated::Link(_) => 2,
        }
    }

    /// Resolve references and produce the final item.
    pub fn link(
        self,
        map: &ItemsMap,
        directory: &dyn ContainerDirectory,
    ) -> Result<CanvasItem, DroppedItem> {
        let kind = self.item_type();
        let original = self.original();
        let dropped = |reason| DroppedItem {
            original,
            kind,
            reason,
        };
        match self {
            Hydrated::Behaviour(mut h) => {
                match &mut h.behaviour.kind {
                    BehaviourKind::Shortcut { original: slot } => {
                        let target = h.original_ref.ok_or(dropped(DropReason::MissingField("originalId")))?;
                        let resolved = map
                            .resolve(target)
                            .filter(|s| s.kind != ItemType::Link && s.original != original)
                            .ok_or(dropped(DropReason::MissingOriginal(target)))?;
                        *slot = Some(resolved.id);
                    }
                    BehaviourKind::Instance { container } => {
                        if !directory.contains(container) {
                            return Err(dropped(DropReason::UnknownContainer(container.clone())));
                        }
                    }
                    _ => {}
                }
                Ok(CanvasItem::Behaviour(h.behaviour))
            }
            Hydrated::Link(h) => {
                let start = resolve_endpoint(map, h.start_behaviour, h.start_portal).map_err(dropped)?;
                let end = resolve_endpoint(map, h.end_behaviour, h.end_portal).map_err(dropped)?;
                let mut link = Link::new(h.id, start, end, h.frame_delay);
                link.properties = h.properties;
                Ok(CanvasItem::Link(link))
            }
        }
    }
}

fn resolve_endpoint(map: &ItemsMap, behaviour: ShallowId, portal: Name) -> Result<PortalRef, DropReason> {
    let slot = map
        .resolve(behaviour)
        .filter(|s| s.kind != ItemType::Link)
        .ok_or(DropReason::MissingBehaviour(behaviour))?;
    if !slot.portals.contains(&portal) {
        return Err(DropReason::MissingPortal { behaviour, portal });
    }
    Ok(PortalRef::new(slot.id, portal))
}

/// Phase 2: restore scalar fields. `id` is the id the item gets on the canvas.
pub fn hydrate(token: ItemToken, id: ShallowId, config: &EngineConfig) -> Result<Hydrated, DroppedItem> {
    let original = token.shallow_id;
    let kind = token.kind;
    let missing = |field| DroppedItem {
        original,
        kind,
        reason: DropReason::MissingField(field),
    };

    if token.is_link() {
        let properties = match &token.properties {
            Some(data) => EditableSet::detokenize(data).unwrap_or_else(|err| {
                log::warn!("link {original}: ignoring unreadable properties: {err}");
                EditableSet::new()
            }),
            None => EditableSet::new(),
        };
        return Ok(Hydrated::Link(HydratedLink {
            original,
            id,
            start_behaviour: token.start_behaviour.ok_or(missing("startBehaviour"))?,
            start_portal: token.start_portal.ok_or(missing("startPortal"))?,
            end_behaviour: token.end_behaviour.ok_or(missing("endBehaviour"))?,
            end_portal: token.end_portal.ok_or(missing("endPortal"))?,
            frame_delay: token.frame_delay.unwrap_or(config.default_frame_delay),
            properties,
        }));
    }

    let mut original_ref = None;
    let mut portals: Vec<Portal> = token.portals.into_iter().map(Portal::detokenize).collect();
    let behaviour_kind = match kind {
        ItemType::Behaviour => BehaviourKind::Plain,
        ItemType::BehaviourAsset => BehaviourKind::Asset,
        ItemType::BehaviourComment => {
            portals.clear();
            BehaviourKind::Comment {
                width: token.width.unwrap_or(config.comment_width),
                height: token.height.unwrap_or(config.comment_height),
            }
        }
        ItemType::BehaviourInstance => BehaviourKind::Instance {
            container: token.container_id.ok_or(missing("containerId"))?,
        },
        ItemType::BehaviourScript => BehaviourKind::Script {
            script_id: token.script_id,
        },
        ItemType::BehaviourPortal => {
            let portal = Portal::detokenize(token.portal.ok_or(missing("portal"))?);
            let portal_type = token.portal_type.unwrap_or(match portal.kind {
                PortalType::Output => PortalType::Input,
                PortalType::Input => PortalType::Output,
                PortalType::Product => PortalType::Parameter,
                PortalType::Parameter => PortalType::Product,
            });
            portals = vec![portal];
            BehaviourKind::Portal { portal_type }
        }
        ItemType::BehaviourShortcut => {
            original_ref = Some(token.original_id.ok_or(missing("originalId"))?);
            BehaviourKind::Shortcut { original: None }
        }
        ItemType::Link => unreachable!("links handled above"),
    };

    let alias = token.alias.unwrap_or_default();
    let mut behaviour = Behaviour::new(id, alias, behaviour_kind);
    if let Some(t) = token.behaviour_type {
        behaviour.behaviour_type = t;
    }
    behaviour.text = token.text.unwrap_or_default();
    if let Some(can_ghost) = token.can_ghost {
        behaviour.can_ghost = can_ghost;
    }
    behaviour.requires_update = token.requires_update.unwrap_or(false);
    behaviour.placement = Placement::from_css(token.left.as_deref(), token.top.as_deref());
    behaviour.portals = portals;

    Ok(Hydrated::Behaviour(HydratedBehaviour {
        original,
        behaviour,
        original_ref,
    }))
}

// ─── Items map ───────────────────────────────────────────────────────────

/// What the link phase may know about another item of the batch.
#[derive(Debug, Clone)]
pub struct MapSlot {
    /// Id the item had in the token.
    pub original: ShallowId,
    /// Id the item has on the canvas.
    pub id: ShallowId,
    pub kind: ItemType,
    pub portals: Vec<Name>,
}

/// Original shallow id → slot, for every item of the batch.
#[derive(Debug, Default)]
pub struct ItemsMap {
    slots: HashMap<ShallowId, MapSlot>,
}

impl ItemsMap {
    /// Index a fully hydrated batch.
    ///
    /// A token id names one item. Later items repeating an id are taken out
    /// of `items` and returned as dropped, so references bind to the first.
    pub fn build(items: &mut Vec<Hydrated>) -> (Self, Vec<DroppedItem>) {
        let mut slots = HashMap::with_capacity(items.len());
        let mut dropped = Vec::new();
        items.retain(|item| {
            let original = item.original();
            if slots.contains_key(&original) {
                dropped.push(DroppedItem {
                    original,
                    kind: item.item_type(),
                    reason: DropReason::DuplicateId,
                });
                return false;
            }
            let portals = match item {
                Hydrated::Behaviour(b) => b.behaviour.portals.iter().map(|p| p.name).collect(),
                Hydrated::Link(_) => Vec::new(),
            };
            slots.insert(
                original,
                MapSlot {
                    original,
                    id: item.id(),
                    kind: item.item_type(),
                    portals,
                },
            );
            true
        });
        (Self { slots }, dropped)
    }

    pub fn resolve(&self, original: ShallowId) -> Option<&MapSlot> {
        self.slots.get(&original)
    }

    /// Remove an item that failed to link so later phases cannot bind to it.
    pub fn forget(&mut self, original: ShallowId) {
        self.slots.remove(&original);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::AnyContainer;
    use crate::portal::PortalToken;
    use crate::prop::{Prop, PropertyType};

    fn behaviour_token(id: u32, portal: &str, kind: PortalType) -> ItemToken {
        let mut t = ItemToken::new(ShallowId(id), ItemType::Behaviour);
        t.portals = vec![PortalToken {
            name: Name::intern(portal),
            kind,
            custom: false,
            property: Prop::empty(portal, PropertyType::Bool).to_token(),
        }];
        t
    }

    fn link_token(id: u32, from: u32, to: u32) -> ItemToken {
        let mut t = ItemToken::new(ShallowId(id), ItemType::Link);
        t.start_behaviour = Some(ShallowId(from));
        t.start_portal = Some(Name::intern("out"));
        t.end_behaviour = Some(ShallowId(to));
        t.end_portal = Some(Name::intern("in"));
        t
    }

    fn hydrate_all(tokens: Vec<ItemToken>) -> Vec<Hydrated> {
        let config = EngineConfig::default();
        tokens
            .into_iter()
            .map(|t| {
                let id = ShallowId(t.shallow_id.0 + 100);
                hydrate(t, id, &config).unwrap()
            })
            .collect()
    }

    #[test]
    fn link_resolves_to_new_ids() {
        let mut items = hydrate_all(vec![
            link_token(3, 1, 2),
            behaviour_token(1, "out", PortalType::Output),
            behaviour_token(2, "in", PortalType::Input),
        ]);
        let (map, dropped) = ItemsMap::build(&mut items);
        assert!(dropped.is_empty());
        let mut linked = items.into_iter().map(|h| h.link(&map, &AnyContainer));
        let link = linked.next().unwrap().unwrap();
        let link = link.as_link().unwrap();
        assert_eq!(link.start.behaviour, ShallowId(101));
        assert_eq!(link.end.behaviour, ShallowId(102));
    }

    #[test]
    fn missing_portal_drops_link() {
        let mut items = hydrate_all(vec![
            behaviour_token(1, "other", PortalType::Output),
            behaviour_token(2, "in", PortalType::Input),
            link_token(3, 1, 2),
        ]);
        let (map, _) = ItemsMap::build(&mut items);
        let err = items
            .into_iter()
            .nth(2)
            .unwrap()
            .link(&map, &AnyContainer)
            .unwrap_err();
        assert!(matches!(err.reason, DropReason::MissingPortal { .. }));
    }

    #[test]
    fn link_without_endpoint_is_dropped_at_hydration() {
        let mut t = link_token(3, 1, 2);
        t.start_portal = None;
        let err = hydrate(t, ShallowId(0), &EngineConfig::default()).unwrap_err();
        assert_eq!(err.reason, DropReason::MissingField("startPortal"));
    }

    #[test]
    fn repeated_token_id_keeps_the_first_item() {
        let config = EngineConfig::default();
        let mut items: Vec<Hydrated> = [
            behaviour_token(1, "out", PortalType::Output),
            behaviour_token(1, "in", PortalType::Input),
        ]
        .into_iter()
        .zip([10, 11])
        .map(|(t, id)| hydrate(t, ShallowId(id), &config).unwrap())
        .collect();

        let (map, dropped) = ItemsMap::build(&mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(map.resolve(ShallowId(1)).unwrap().id, ShallowId(10));
        assert_eq!(
            dropped,
            vec![DroppedItem {
                original: ShallowId(1),
                kind: ItemType::Behaviour,
                reason: DropReason::DuplicateId,
            }]
        );
    }

    #[test]
    fn unsaved_script_is_only_kept_on_request() {
        let script = Behaviour::script(ShallowId(1), "Logic", None);
        assert!(tokenize_behaviour(&script, false).is_none());

        let token = tokenize_behaviour(&script, true).unwrap();
        assert_eq!(token.script_id, None);
        let restored = hydrate(token, ShallowId(1), &EngineConfig::default()).unwrap();
        assert_eq!(restored.item_type(), ItemType::BehaviourScript);
    }
}
