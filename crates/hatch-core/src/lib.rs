pub mod behaviour;
pub mod canvas;
pub mod config;
pub mod container;
pub mod error;
pub mod events;
pub mod geometry;
pub mod id;
pub mod lifecycle;
pub mod link;
pub mod portal;
pub mod project;
pub mod prop;
pub mod references;
pub mod token;

pub use behaviour::{Behaviour, BehaviourDefinition, BehaviourKind, PortalTemplate, TemplateRegistry};
pub use canvas::Canvas;
pub use config::EngineConfig;
pub use container::{AnyContainer, Container, ContainerDirectory};
pub use error::{GraphError, GraphResult};
pub use events::{EventLog, GraphEvent, NotificationSink, NullSink, PropOwner};
pub use geometry::{Dimensions, Placement};
pub use id::{AssetId, ContainerId, GroupId, IdGenerator, Name, ScriptId, ShallowId};
pub use lifecycle::{CanvasItem, DropReason, DroppedItem, LoadReport};
pub use link::Link;
pub use portal::{Portal, PortalRef, PortalType};
pub use project::{InstanceGrant, Project};
pub use prop::{EditableSet, Prop, PropValue, PropertyType};
pub use token::{ContainerToken, ItemToken, ItemType};
