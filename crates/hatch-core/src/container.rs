//! Containers: the persisted unit that owns one canvas.

use crate::canvas::Canvas;
use crate::config::EngineConfig;
use crate::error::GraphResult;
use crate::events::{GraphEvent, PropOwner};
use crate::id::{ContainerId, IdGenerator, Name};
use crate::lifecycle::LoadReport;
use crate::prop::{EditableSet, PropValue};
use crate::token::ContainerToken;
use std::collections::HashSet;

/// Answers whether an instance may point at a container.
pub trait ContainerDirectory {
    fn contains(&self, id: &ContainerId) -> bool;
}

/// Directory that accepts every container id. Used when a canvas is loaded
/// outside a project (clipboard previews, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyContainer;

impl ContainerDirectory for AnyContainer {
    fn contains(&self, _id: &ContainerId) -> bool {
        true
    }
}

impl ContainerDirectory for HashSet<ContainerId> {
    fn contains(&self, id: &ContainerId) -> bool {
        HashSet::contains(self, id)
    }
}

/// A named graph plus its own property set.
#[derive(Debug)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    canvas: Canvas,
    properties: EditableSet,
    saved: bool,
}

impl Container {
    pub fn new(id: ContainerId, name: impl Into<String>, ids: IdGenerator, config: EngineConfig) -> Self {
        Self {
            canvas: Canvas::new(id.clone(), ids, config),
            id,
            name: name.into(),
            properties: EditableSet::new(),
            saved: true,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Mutable access to the graph. Marks the container unsaved.
    pub fn canvas_mut(&mut self) -> &mut Canvas {
        self.saved = false;
        &mut self.canvas
    }

    pub fn properties(&self) -> &EditableSet {
        &self.properties
    }

    /// Mutable access for adding or removing properties.
    pub fn properties_mut(&mut self) -> &mut EditableSet {
        self.saved = false;
        &mut self.properties
    }

    /// Edit a container property, announcing it on the canvas outbox.
    pub fn set_property(&mut self, name: Name, value: PropValue) -> GraphResult<()> {
        self.properties.set_value(name, value)?;
        self.saved = false;
        for edit in self.properties.take_edits() {
            self.canvas.emit(GraphEvent::PropertyEdited {
                container: self.id.clone(),
                owner: PropOwner::Container,
                name: edit.name,
            });
        }
        Ok(())
    }

    /// True when nothing changed since the last `mark_saved`.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Serialize graph and properties together. With `slim_tokens` the
    /// container's own property set is written as bare values; canvas items
    /// always carry their full form.
    pub fn tokenize(&self) -> ContainerToken {
        let mut token = self.canvas.tokenize(None);
        token.properties = self.properties.tokenize(self.canvas.config().slim_tokens);
        token
    }

    /// Replace graph and properties from a token.
    pub fn detokenize(
        &mut self,
        token: &ContainerToken,
        directory: &dyn ContainerDirectory,
    ) -> GraphResult<LoadReport> {
        let properties = match token.properties.as_object() {
            Some(slim) => self.properties.with_slim_values(slim),
            None => EditableSet::detokenize(&token.properties)?,
        };
        let report = self.canvas.detokenize_with(token, true, directory)?;
        self.properties = properties;
        self.saved = true;
        Ok(report)
    }

    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        self.canvas.drain_events()
    }

    pub fn is_disposed(&self) -> bool {
        self.canvas.is_disposed()
    }

    pub fn dispose(&mut self) {
        self.canvas.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{PortalRef, PortalType};
    use crate::prop::{Prop, PropertyType};
    use pretty_assertions::assert_eq;

    fn container() -> Container {
        Container::new(
            ContainerId::new("scene"),
            "Scene",
            IdGenerator::new(),
            EngineConfig::default(),
        )
    }

    #[test]
    fn tokenize_carries_properties() {
        let mut c = container();
        c.properties_mut()
            .add(Prop::new("Speed", PropValue::Number(2.0), PropertyType::Number))
            .unwrap();
        c.canvas_mut()
            .add_comment("hello", Default::default())
            .unwrap();

        let token = c.tokenize();
        let mut restored = container();
        let report = restored.detokenize(&token, &AnyContainer).unwrap();

        assert!(report.is_lossless());
        assert_eq!(restored.properties(), c.properties());
        assert_eq!(restored.canvas().len(), 1);
        assert!(restored.is_saved());
    }

    #[test]
    fn slim_save_keeps_link_properties() {
        let config = EngineConfig {
            slim_tokens: true,
            ..EngineConfig::default()
        };
        let mut c = Container::new(ContainerId::new("scene"), "Scene", IdGenerator::new(), config.clone());
        let canvas = c.canvas_mut();
        let x = canvas
            .add_gate(PortalType::Input, Prop::empty("go", PropertyType::Bool), Default::default())
            .unwrap();
        let y = canvas
            .add_gate(PortalType::Output, Prop::empty("done", PropertyType::Bool), Default::default())
            .unwrap();
        let link = canvas
            .create_link(PortalRef::new(x, "go"), PortalRef::new(y, "done"))
            .unwrap();
        canvas
            .add_link_property(link, Prop::new("Weight", PropValue::Number(0.5), PropertyType::Number))
            .unwrap();

        let token = c.tokenize();
        let mut restored = Container::new(ContainerId::new("scene"), "Scene", IdGenerator::new(), config);
        let report = restored.detokenize(&token, &AnyContainer).unwrap();

        assert!(report.is_lossless());
        let props = &restored.canvas().link(link).unwrap().properties;
        assert_eq!(props, &c.canvas().link(link).unwrap().properties);
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn property_edit_is_announced() {
        let mut c = container();
        c.properties_mut()
            .add(Prop::empty("Loop", PropertyType::Bool))
            .unwrap();
        c.mark_saved();
        c.set_property(Name::intern("Loop"), PropValue::Bool(true))
            .unwrap();

        assert!(!c.is_saved());
        assert_eq!(
            c.drain_events(),
            vec![GraphEvent::PropertyEdited {
                container: ContainerId::new("scene"),
                owner: PropOwner::Container,
                name: Name::intern("Loop"),
            }]
        );
    }
}
