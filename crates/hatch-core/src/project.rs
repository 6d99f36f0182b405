//! The container registry of one editing session.
//!
//! `Project` replaces global registries: it holds the containers, the shared
//! id generator, the engine config, and the behaviour templates, and it is
//! the only place container-to-container references are checked.

use crate::behaviour::TemplateRegistry;
use crate::config::EngineConfig;
use crate::container::{AnyContainer, Container, ContainerDirectory};
use crate::error::{GraphError, GraphResult};
use crate::geometry::Placement;
use crate::id::{ContainerId, IdGenerator, ShallowId};
use crate::lifecycle::LoadReport;
use crate::portal::Portal;
use crate::token::ContainerToken;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Proof that instancing `target` inside `parent` passed the dependency
/// check. Only `Project::authorize_instance` builds one, so a canvas cannot
/// admit an instance that skipped the check.
#[derive(Debug)]
pub struct InstanceGrant {
    pub(crate) parent: ContainerId,
    pub(crate) target: ContainerId,
    pub(crate) alias: String,
    pub(crate) portals: Vec<Portal>,
}

impl InstanceGrant {
    pub fn parent(&self) -> &ContainerId {
        &self.parent
    }

    pub fn target(&self) -> &ContainerId {
        &self.target
    }
}

#[derive(Debug, Default)]
pub struct Project {
    containers: IndexMap<ContainerId, Container>,
    ids: IdGenerator,
    config: EngineConfig,
    templates: TemplateRegistry,
    /// Instance targets named by loaded containers that are not loaded yet.
    awaited: HashSet<ContainerId>,
}

impl ContainerDirectory for Project {
    fn contains(&self, id: &ContainerId) -> bool {
        self.containers.contains_key(id) || self.awaited.contains(id)
    }
}

impl Project {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.templates
    }

    // ─── Registry ────────────────────────────────────────────────────────

    pub fn create_container(&mut self, id: ContainerId, name: &str) -> GraphResult<&mut Container> {
        if self.containers.contains_key(&id) {
            return Err(GraphError::DuplicateContainer(id));
        }
        log::debug!("creating container `{id}`");
        self.awaited.remove(&id);
        let container = Container::new(id.clone(), name, self.ids.clone(), self.config.clone());
        Ok(self.containers.entry(id).or_insert(container))
    }

    /// Load a persisted container.
    ///
    /// Containers arrive one at a time, so an instance may name a container
    /// that is not loaded yet. Such targets are kept and listed by
    /// `awaited_containers` until they load or `prune_unresolved_instances`
    /// gives up on them.
    pub fn load_container(
        &mut self,
        id: ContainerId,
        name: &str,
        token: &ContainerToken,
    ) -> GraphResult<LoadReport> {
        let report = self
            .create_container(id.clone(), name)?
            .detokenize(token, &AnyContainer)?;
        self.await_targets_of(&id);
        Ok(report)
    }

    /// Replace a registered container's content from a token, with the same
    /// instance rules as `load_container`.
    pub fn reload_container(&mut self, id: &ContainerId, token: &ContainerToken) -> GraphResult<LoadReport> {
        let report = self.require_mut(id)?.detokenize(token, &AnyContainer)?;
        self.await_targets_of(id);
        Ok(report)
    }

    fn await_targets_of(&mut self, id: &ContainerId) {
        let Some(container) = self.containers.get(id) else {
            return;
        };
        let missing: Vec<ContainerId> = container
            .canvas()
            .dependencies()
            .into_iter()
            .filter(|target| !self.containers.contains_key(target))
            .collect();
        for target in missing {
            log::debug!("`{id}` instances `{target}`, which is not loaded yet");
            self.awaited.insert(target);
        }
    }

    /// Instance targets that loaded containers name but nobody loaded.
    pub fn awaited_containers(&self) -> impl Iterator<Item = &ContainerId> {
        self.awaited.iter()
    }

    /// Give up on awaited containers: remove every instance of them.
    /// Returns the removed instances with the container that held them.
    pub fn prune_unresolved_instances(&mut self) -> GraphResult<Vec<(ContainerId, ShallowId)>> {
        let mut pruned = Vec::new();
        for target in std::mem::take(&mut self.awaited) {
            for container in self.containers.values_mut() {
                let stale = container.canvas().instances_of(&target);
                if stale.is_empty() {
                    continue;
                }
                log::warn!("`{}`: dropping {} instance(s) of missing `{target}`", container.id, stale.len());
                container.canvas_mut().remove_items(&stale)?;
                pruned.extend(stale.into_iter().map(|item| (container.id.clone(), item)));
            }
        }
        Ok(pruned)
    }

    /// Remove and dispose a container. Every instance of it on other canvases
    /// is removed as well.
    pub fn remove_container(&mut self, id: &ContainerId) -> GraphResult<Container> {
        let mut removed = self
            .containers
            .shift_remove(id)
            .ok_or_else(|| GraphError::UnknownContainer(id.clone()))?;
        removed.dispose();
        for other in self.containers.values_mut() {
            let stale = other.canvas().instances_of(id);
            if !stale.is_empty() {
                log::debug!("pruning {} instance(s) of `{id}` from `{}`", stale.len(), other.id);
                other.canvas_mut().remove_items(&stale)?;
            }
        }
        Ok(removed)
    }

    pub fn container(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn container_mut(&mut self, id: &ContainerId) -> Option<&mut Container> {
        self.containers.get_mut(id)
    }

    pub fn require(&self, id: &ContainerId) -> GraphResult<&Container> {
        self.containers
            .get(id)
            .ok_or_else(|| GraphError::UnknownContainer(id.clone()))
    }

    pub fn require_mut(&mut self, id: &ContainerId) -> GraphResult<&mut Container> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownContainer(id.clone()))
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn containers_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        self.containers.values_mut()
    }

    /// Snapshot of the registered and awaited ids, usable as a directory
    /// while one container is borrowed mutably.
    pub fn directory(&self) -> HashSet<ContainerId> {
        self.containers.keys().chain(&self.awaited).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    // ─── Dependencies ────────────────────────────────────────────────────

    /// Would an instance of `target` inside `parent` close a cycle?
    ///
    /// Walks instance references depth-first from `target`; reaching
    /// `parent` means yes. A container instancing itself always is.
    pub fn is_cyclic_dependency(&self, parent: &ContainerId, target: &ContainerId) -> bool {
        if parent == target {
            return true;
        }
        let mut visited: HashSet<&ContainerId> = HashSet::from([target]);
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            let Some(container) = self.containers.get(current) else {
                continue;
            };
            for dep in container.canvas().behaviours().filter_map(|b| b.instance_of()) {
                if dep == parent {
                    return true;
                }
                if visited.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// Run the dependency check for a new instance and hand back the grant
    /// a canvas needs to admit it.
    pub fn authorize_instance(&self, parent: &ContainerId, target: &ContainerId) -> GraphResult<InstanceGrant> {
        self.require(parent)?;
        let target_container = self.require(target)?;
        if self.is_cyclic_dependency(parent, target) {
            log::warn!("refusing instance of `{target}` inside `{parent}`: cycle");
            return Err(GraphError::CyclicDependency {
                parent: parent.clone(),
                target: target.clone(),
            });
        }
        Ok(InstanceGrant {
            parent: parent.clone(),
            target: target.clone(),
            alias: target_container.name.clone(),
            portals: target_container.canvas().gate_portals(),
        })
    }

    /// Check, then add an instance of `target` to `parent`'s canvas.
    pub fn add_instance(
        &mut self,
        parent: &ContainerId,
        target: &ContainerId,
        placement: Placement,
    ) -> GraphResult<ShallowId> {
        let grant = self.authorize_instance(parent, target)?;
        self.require_mut(parent)?
            .canvas_mut()
            .add_instance(grant, placement)
    }

    /// Instance references between containers as a graph. Edges run from the
    /// instancing container to the instanced one; unknown targets are left out.
    pub fn dependency_graph(&self) -> (DiGraph<ContainerId, ()>, HashMap<ContainerId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let index: HashMap<ContainerId, NodeIndex> = self
            .containers
            .keys()
            .map(|id| (id.clone(), graph.add_node(id.clone())))
            .collect();
        for container in self.containers.values() {
            let from = index[&container.id];
            for dep in container.canvas().dependencies() {
                if let Some(&to) = index.get(&dep) {
                    graph.update_edge(from, to, ());
                }
            }
        }
        (graph, index)
    }

    /// Whole-project acyclicity check, run before saving.
    pub fn validate_dependencies(&self) -> GraphResult<()> {
        let (graph, _) = self.dependency_graph();
        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| GraphError::DependencyCycle(graph[cycle.node_id()].clone()))
    }

    /// Containers in an order where each comes after everything it instances.
    pub fn load_order(&self) -> GraphResult<Vec<ContainerId>> {
        let (graph, _) = self.dependency_graph();
        let sorted = toposort(&graph, None)
            .map_err(|cycle| GraphError::DependencyCycle(graph[cycle.node_id()].clone()))?;
        Ok(sorted.into_iter().rev().map(|n| graph[n].clone()).collect())
    }
}
