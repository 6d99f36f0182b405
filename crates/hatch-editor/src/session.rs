//! The editing session: one project, one open container, its history.
//!
//! Every gesture goes through `EditorSession::apply`, which records an undo
//! step and then forwards the canvas outboxes to the session's sink. Saves
//! and loads are split into a `begin_*` half that hands a record or ticket to
//! the caller and a `finish_*` half that applies the store's answer, so the
//! store may answer late, or not at all.

use crate::clipboard::Clipboard;
use crate::commands::CommandStack;
use crate::config::EditorConfig;
use crate::error::{EditorError, StoreError};
use crate::mutation::GraphMutation;
use crate::persist::{ContainerRecord, ContainerStore, PendingRequests, RequestId, RequestKind, RequestTicket};
use hatch_core::{Container, ContainerId, LoadReport, NotificationSink, Project, ShallowId};
use std::collections::HashMap;

pub struct EditorSession<S: NotificationSink> {
    project: Project,
    active: Option<ContainerId>,
    histories: HashMap<ContainerId, CommandStack>,
    clipboard: Clipboard,
    pending: PendingRequests,
    /// Records handed out by `begin_save`, by request.
    in_flight: HashMap<RequestId, ContainerRecord>,
    config: EditorConfig,
    sink: S,
}

/// Run `edit` on container `id` and record it on that container's history.
fn record<T>(
    histories: &mut HashMap<ContainerId, CommandStack>,
    project: &mut Project,
    undo_depth: usize,
    id: &ContainerId,
    description: &str,
    edit: impl FnOnce(&mut Container) -> Result<T, EditorError>,
) -> Result<T, EditorError> {
    let container = project.require_mut(id)?;
    histories
        .entry(id.clone())
        .or_insert_with(|| CommandStack::new(undo_depth))
        .execute(container, description, edit)
}

impl<S: NotificationSink> EditorSession<S> {
    pub fn new(project: Project, config: EditorConfig, sink: S) -> Self {
        Self {
            project,
            active: None,
            histories: HashMap::new(),
            clipboard: Clipboard::new(),
            pending: PendingRequests::new(),
            in_flight: HashMap::new(),
            config,
            sink,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Direct project access. Edits made through it bypass the history;
    /// call `flush_events` afterwards.
    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn clipboard_mut(&mut self) -> &mut Clipboard {
        &mut self.clipboard
    }

    // ─── Containers ──────────────────────────────────────────────────────

    /// Make `id` the container edits apply to.
    pub fn open(&mut self, id: &ContainerId) -> Result<(), EditorError> {
        self.project.require(id)?;
        log::debug!("opening `{id}`");
        self.active = Some(id.clone());
        Ok(())
    }

    pub fn active(&self) -> Option<&ContainerId> {
        self.active.as_ref()
    }

    pub fn active_container(&self) -> Result<&Container, EditorError> {
        let id = self.active.as_ref().ok_or(EditorError::NoActiveContainer)?;
        Ok(self.project.require(id)?)
    }

    fn active_id(&self) -> Result<ContainerId, EditorError> {
        self.active.clone().ok_or(EditorError::NoActiveContainer)
    }

    /// Create an empty container and open it.
    pub fn create_container(&mut self, id: ContainerId, name: &str) -> Result<(), EditorError> {
        self.project.create_container(id.clone(), name)?;
        self.active = Some(id);
        Ok(())
    }

    /// Remove a container from the project. Its pending requests and history
    /// go with it, and instances of it elsewhere are pruned.
    pub fn remove_container(&mut self, id: &ContainerId) -> Result<(), EditorError> {
        let mut removed = self.project.remove_container(id)?;
        self.pending.invalidate(id);
        self.in_flight.retain(|_, r| &r.id != id);
        self.histories.remove(id);
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        for event in removed.drain_events() {
            self.sink.notify(&event);
        }
        self.flush_events();
        Ok(())
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    /// Apply `mutation` to the open container as one undo step.
    pub fn apply(
        &mut self,
        mutation: GraphMutation,
        description: &str,
    ) -> Result<Option<ShallowId>, EditorError> {
        let id = self.active_id()?;
        let depth = self.config.undo_depth;
        let result = match mutation {
            GraphMutation::AddTemplate {
                template,
                placement,
            } => {
                let definition = self.project.templates().get(&template)?.clone();
                record(&mut self.histories, &mut self.project, depth, &id, description, |c| {
                    Ok(Some(c.canvas_mut().instantiate(&definition, placement)?))
                })
            }
            GraphMutation::AddInstance { target, placement } => {
                let grant = self.project.authorize_instance(&id, &target)?;
                record(&mut self.histories, &mut self.project, depth, &id, description, |c| {
                    Ok(Some(c.canvas_mut().add_instance(grant, placement)?))
                })
            }
            GraphMutation::Canvas(edit) => {
                record(&mut self.histories, &mut self.project, depth, &id, description, |c| {
                    Ok(edit.apply(c.canvas_mut())?)
                })
            }
        };
        self.flush_events();
        result
    }

    /// Start a gesture that should undo as one step.
    pub fn begin_batch(&mut self) -> Result<(), EditorError> {
        let id = self.active_id()?;
        let container = self.project.require(&id)?;
        self.histories
            .entry(id)
            .or_insert_with(|| CommandStack::new(self.config.undo_depth))
            .begin_batch(container);
        Ok(())
    }

    pub fn end_batch(&mut self, description: &str) -> Result<(), EditorError> {
        let id = self.active_id()?;
        let container = self.project.require(&id)?;
        if let Some(history) = self.histories.get_mut(&id) {
            history.end_batch(container, description);
        }
        Ok(())
    }

    /// Undo the last step on the open container. Returns its description.
    pub fn undo(&mut self) -> Result<Option<String>, EditorError> {
        self.step(true)
    }

    pub fn redo(&mut self) -> Result<Option<String>, EditorError> {
        self.step(false)
    }

    fn step(&mut self, undo: bool) -> Result<Option<String>, EditorError> {
        let id = self.active_id()?;
        let known = self.project.directory();
        let Some(history) = self.histories.get_mut(&id) else {
            return Ok(None);
        };
        let container = self.project.require_mut(&id)?;
        let description = if undo {
            history.undo(container, &known)?
        } else {
            history.redo(container, &known)?
        };
        self.flush_events();
        Ok(description)
    }

    pub fn can_undo(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|id| self.histories.get(id))
            .is_some_and(CommandStack::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|id| self.histories.get(id))
            .is_some_and(CommandStack::can_redo)
    }

    // ─── Clipboard ───────────────────────────────────────────────────────

    pub fn copy(&mut self, ids: &[ShallowId]) -> Result<(), EditorError> {
        let id = self.active_id()?;
        let container = self.project.require(&id)?;
        self.clipboard.copy(container.canvas(), ids);
        Ok(())
    }

    /// Copy `ids`, then remove them as one undo step.
    pub fn cut(&mut self, ids: &[ShallowId]) -> Result<(), EditorError> {
        self.copy(ids)?;
        let id = self.active_id()?;
        let depth = self.config.undo_depth;
        let result = record(&mut self.histories, &mut self.project, depth, &id, "cut", |c| {
            c.canvas_mut().remove_items(ids)?;
            Ok(())
        });
        self.flush_events();
        result
    }

    /// Paste the clipboard into the open container. Returns the new ids.
    pub fn paste(&mut self) -> Result<Vec<ShallowId>, EditorError> {
        let id = self.active_id()?;
        let known = self.project.directory();
        let depth = self.config.undo_depth;
        let offset = self.config.paste_offset;
        let clipboard = &mut self.clipboard;
        let result = record(&mut self.histories, &mut self.project, depth, &id, "paste", |c| {
            clipboard.paste(c.canvas_mut(), offset, &known)
        });
        self.flush_events();
        let report = result?;
        if !report.is_lossless() {
            log::warn!("paste into `{id}` dropped {} item(s)", report.dropped.len());
        }
        Ok(report.loaded)
    }

    // ─── Notifications ───────────────────────────────────────────────────

    /// Forward every queued canvas event to the sink.
    pub fn flush_events(&mut self) {
        for container in self.project.containers_mut() {
            for event in container.drain_events() {
                self.sink.notify(&event);
            }
        }
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Prepare a save of container `id`.
    ///
    /// The whole project must be free of instance cycles; otherwise nothing
    /// is handed out. The returned record goes to the store, the ticket
    /// comes back with its answer.
    pub fn begin_save(&mut self, id: &ContainerId) -> Result<(RequestTicket, ContainerRecord), EditorError> {
        self.project.validate_dependencies()?;
        let record = ContainerRecord::from_container(self.project.require(id)?)?;
        let ticket = self.pending.issue(id, RequestKind::Save);
        self.in_flight.insert(ticket.request, record.clone());
        Ok((ticket, record))
    }

    /// Apply the store's answer to a save.
    ///
    /// Returns `Ok(false)` when the ticket was superseded and the answer was
    /// ignored. A store failure is passed through; the container stays
    /// unsaved. The container is only marked saved when it still matches
    /// what was sent.
    pub fn finish_save(
        &mut self,
        ticket: &RequestTicket,
        outcome: Result<ContainerId, StoreError>,
    ) -> Result<bool, EditorError> {
        let sent = self.in_flight.remove(&ticket.request);
        if !self.pending.resolve(ticket) {
            return Ok(false);
        }
        let stored_as = outcome?;
        if stored_as != ticket.container {
            log::debug!("`{}` stored as `{stored_as}`", ticket.container);
        }
        let Some(container) = self.project.container_mut(&ticket.container) else {
            return Ok(false);
        };
        let unchanged = match sent {
            Some(sent) => ContainerRecord::from_container(container)? == sent,
            None => false,
        };
        if unchanged {
            container.mark_saved();
        }
        Ok(true)
    }

    /// Announce a load of container `id`.
    pub fn begin_load(&mut self, id: &ContainerId) -> RequestTicket {
        self.pending.issue(id, RequestKind::Load)
    }

    /// Apply the store's answer to a load.
    ///
    /// A stale answer returns `Ok(None)`. A fresh one replaces the container
    /// if it exists, or registers it otherwise, and clears its history.
    pub fn finish_load(
        &mut self,
        ticket: &RequestTicket,
        outcome: Result<ContainerRecord, StoreError>,
    ) -> Result<Option<LoadReport>, EditorError> {
        if !self.pending.resolve(ticket) {
            return Ok(None);
        }
        let record = outcome?;
        let token = record.token()?;
        let report = if self.project.container(&ticket.container).is_some() {
            self.project.reload_container(&ticket.container, &token)?
        } else {
            self.project
                .load_container(ticket.container.clone(), &record.name, &token)?
        };
        if !report.is_lossless() {
            log::warn!(
                "loading `{}` dropped {} item(s)",
                ticket.container,
                report.dropped.len()
            );
        }
        if let Some(history) = self.histories.get_mut(&ticket.container) {
            history.clear();
        }
        self.flush_events();
        Ok(Some(report))
    }

    /// Save through a store that answers immediately.
    pub fn save_with(&mut self, store: &mut dyn ContainerStore, id: &ContainerId) -> Result<(), EditorError> {
        let (ticket, record) = self.begin_save(id)?;
        let outcome = store.save(&record);
        self.finish_save(&ticket, outcome)?;
        Ok(())
    }

    /// Load through a store that answers immediately.
    pub fn load_with(&mut self, store: &dyn ContainerStore, id: &ContainerId) -> Result<LoadReport, EditorError> {
        let ticket = self.begin_load(id);
        let outcome = store.load(id);
        Ok(self.finish_load(&ticket, outcome)?.unwrap_or_default())
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::CanvasEdit;
    use hatch_core::{
        BehaviourDefinition, EngineConfig, EventLog, GraphError, GraphEvent, Placement, PortalType,
        Prop, PropertyType, TemplateRegistry,
    };
    use pretty_assertions::assert_eq;

    fn cid(s: &str) -> ContainerId {
        ContainerId::new(s)
    }

    fn session() -> EditorSession<EventLog> {
        let mut templates = TemplateRegistry::new();
        templates.register(
            BehaviourDefinition::new("Toggle")
                .with_portal(PortalType::Input, Prop::empty("in", PropertyType::Bool))
                .with_portal(PortalType::Output, Prop::empty("out", PropertyType::Bool)),
        );
        let project = Project::new(EngineConfig::default()).with_templates(templates);
        let mut s = EditorSession::new(project, EditorConfig::default(), EventLog::new());
        s.create_container(cid("main"), "Main").unwrap();
        s
    }

    fn comment(text: &str) -> GraphMutation {
        CanvasEdit::AddComment {
            text: text.into(),
            placement: Placement::default(),
        }
        .into()
    }

    #[test]
    fn edits_need_an_open_container() {
        let project = Project::new(EngineConfig::default());
        let mut s = EditorSession::new(project, EditorConfig::default(), EventLog::new());
        assert!(matches!(
            s.apply(comment("x"), "add"),
            Err(EditorError::NoActiveContainer)
        ));
    }

    #[test]
    fn template_instantiation_is_undoable() {
        let mut s = session();
        let id = s
            .apply(
                GraphMutation::AddTemplate {
                    template: "Toggle".into(),
                    placement: Placement::default(),
                },
                "add toggle",
            )
            .unwrap()
            .unwrap();
        assert!(s.active_container().unwrap().canvas().behaviour(id).is_some());

        assert_eq!(s.undo().unwrap().as_deref(), Some("add toggle"));
        assert!(s.active_container().unwrap().canvas().is_empty());
        assert!(s.can_redo());
    }

    #[test]
    fn unknown_template_is_reported() {
        let mut s = session();
        let err = s
            .apply(
                GraphMutation::AddTemplate {
                    template: "Nope".into(),
                    placement: Placement::default(),
                },
                "add",
            )
            .unwrap_err();
        assert!(matches!(err, EditorError::Graph(GraphError::UnknownTemplate(_))));
        assert!(!s.can_undo());
    }

    #[test]
    fn events_reach_the_sink() {
        let mut s = session();
        let id = s.apply(comment("hello"), "add").unwrap().unwrap();
        assert!(s.sink().events.contains(&GraphEvent::ItemAdded {
            container: cid("main"),
            item: id,
        }));
    }

    #[test]
    fn cut_then_paste_restores_items() {
        let mut s = session();
        let id = s.apply(comment("moved"), "add").unwrap().unwrap();
        s.cut(&[id]).unwrap();
        assert!(s.active_container().unwrap().canvas().is_empty());

        let pasted = s.paste().unwrap();
        assert_eq!(pasted.len(), 1);
        assert_ne!(pasted[0], id);
        assert_eq!(s.undo().unwrap().as_deref(), Some("paste"));
        assert_eq!(s.undo().unwrap().as_deref(), Some("cut"));
        assert!(s.active_container().unwrap().canvas().item(id).is_some());
    }

    #[test]
    fn removing_the_open_container_closes_it() {
        let mut s = session();
        s.apply(comment("x"), "add").unwrap();
        s.remove_container(&cid("main")).unwrap();
        assert_eq!(s.active(), None);
        assert!(!s.can_undo());
    }
}
