//! Reference counts of shared resources used by one canvas.
//!
//! A count is the number of live parameter portals whose value points at the
//! resource. Entries exist only while the count is positive. The counts are a
//! cache: `Canvas::build_scene_references` recomputes them from portals.

use crate::id::{AssetId, GroupId};
use std::collections::HashMap;

/// A 0→1 or 1→0 crossing reported by `SceneReferences`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTransition {
    AssetAdded(AssetId),
    AssetRemoved(AssetId),
    GroupAdded(GroupId),
    GroupRemoved(GroupId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneReferences {
    assets: HashMap<AssetId, usize>,
    groups: HashMap<GroupId, usize>,
}

impl SceneReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset_count(&self, id: &AssetId) -> Option<usize> {
        self.assets.get(id).copied()
    }

    pub fn group_count(&self, id: &GroupId) -> Option<usize> {
        self.groups.get(id).copied()
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, usize)> {
        self.assets.iter().map(|(k, v)| (k, *v))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupId, usize)> {
        self.groups.iter().map(|(k, v)| (k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.groups.is_empty()
    }

    pub fn add_asset(&mut self, id: &AssetId) -> Option<RefTransition> {
        let count = self.assets.entry(id.clone()).or_insert(0);
        *count += 1;
        (*count == 1).then(|| RefTransition::AssetAdded(id.clone()))
    }

    pub fn remove_asset(&mut self, id: &AssetId) -> Option<RefTransition> {
        let count = self.assets.get_mut(id)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        self.assets.remove(id);
        Some(RefTransition::AssetRemoved(id.clone()))
    }

    pub fn add_group(&mut self, id: &GroupId) -> Option<RefTransition> {
        let count = self.groups.entry(id.clone()).or_insert(0);
        *count += 1;
        (*count == 1).then(|| RefTransition::GroupAdded(id.clone()))
    }

    pub fn remove_group(&mut self, id: &GroupId) -> Option<RefTransition> {
        let count = self.groups.get_mut(id)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        self.groups.remove(id);
        Some(RefTransition::GroupRemoved(id.clone()))
    }

    /// Drop every entry, reporting a removal for each.
    pub fn drain(&mut self) -> Vec<RefTransition> {
        let mut out: Vec<RefTransition> = self
            .assets
            .drain()
            .map(|(id, _)| RefTransition::AssetRemoved(id))
            .collect();
        out.extend(self.groups.drain().map(|(id, _)| RefTransition::GroupRemoved(id)));
        out
    }
}
