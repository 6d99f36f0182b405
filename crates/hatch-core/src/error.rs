//! Error types for graph mutations and token handling.
//!
//! Every variant describes a refused operation. Nothing here is fatal:
//! the graph is left exactly as it was before the call.

use crate::id::{ContainerId, Name, ShallowId};
use thiserror::Error;

/// Errors raised by canvas, container, and project operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A behaviour template declares the same portal name twice,
    /// or a portal with that name already exists on the behaviour.
    #[error("duplicate portal name `{0}`")]
    DuplicatePortalName(Name),

    /// A property with that name already exists in the set.
    #[error("duplicate property name `{0}`")]
    DuplicateProperty(Name),

    /// No property with that name exists in the set.
    #[error("unknown property `{0}`")]
    UnknownProperty(Name),

    /// No canvas item with that id exists.
    #[error("unknown canvas item {0}")]
    UnknownItem(ShallowId),

    /// An item with this id is already on the canvas.
    #[error("canvas item {0} already exists")]
    DuplicateItem(ShallowId),

    /// The canvas was disposed; late callbacks must not touch it.
    #[error("canvas of `{0}` has been disposed")]
    Disposed(ContainerId),

    /// The item exists but is not a behaviour.
    #[error("canvas item {0} is not a behaviour")]
    NotABehaviour(ShallowId),

    /// The item exists but is not a link.
    #[error("canvas item {0} is not a link")]
    NotALink(ShallowId),

    /// The behaviour has no portal with that name.
    #[error("behaviour {behaviour} has no portal `{portal}`")]
    UnknownPortal { behaviour: ShallowId, portal: Name },

    /// The portal pairing is not allowed by `Portal::check_portal_link`.
    #[error("cannot link `{start}` to `{end}`: incompatible portal types")]
    IllegalLink { start: Name, end: Name },

    /// An identical link already connects these two portals.
    #[error("portals `{start}` and `{end}` are already linked")]
    DuplicateLink { start: Name, end: Name },

    /// Structural portals come from the node template and cannot be removed.
    #[error("portal `{0}` is structural and cannot be removed")]
    StructuralPortal(Name),

    /// Shortcuts mirror their original and cannot change portal shape.
    #[error("shortcut {0} cannot add or remove portals")]
    ShortcutShape(ShallowId),

    /// Comments carry text, not portals.
    #[error("canvas item {0} has no portals")]
    NoPortals(ShallowId),

    /// The behaviour kind cannot be aliased by a shortcut.
    #[error("behaviour {0} cannot be ghosted")]
    CannotGhost(ShallowId),

    /// Instancing `target` inside `parent` would close a dependency cycle.
    #[error("container `{target}` already depends on `{parent}`")]
    CyclicDependency {
        parent: ContainerId,
        target: ContainerId,
    },

    /// Instances need a grant from `Project::authorize_instance`.
    #[error("instance {0} was not authorized by the project")]
    UngrantedInstance(ShallowId),

    /// A whole-project check found instances forming a cycle through this container.
    #[error("container `{0}` is part of an instance cycle")]
    DependencyCycle(ContainerId),

    /// The container is not known to the project.
    #[error("unknown container `{0}`")]
    UnknownContainer(ContainerId),

    /// A container with this id already exists.
    #[error("container `{0}` already exists")]
    DuplicateContainer(ContainerId),

    /// No behaviour template with that name is registered.
    #[error("unknown behaviour template `{0}`")]
    UnknownTemplate(String),

    /// A token could not be parsed or serialized.
    #[error("invalid token: {0}")]
    Token(#[from] serde_json::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
