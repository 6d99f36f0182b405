//! Notifications produced by the graph engine.
//!
//! The engine only produces events. Each canvas queues them in an outbox;
//! whoever drives the canvas drains the outbox and hands the events to a
//! `NotificationSink` (the plugin bus, a UI, a test recorder).

use crate::id::{AssetId, ContainerId, GroupId, Name, ShallowId};

/// Where an edited property lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropOwner {
    /// A portal's property on a behaviour.
    Portal { behaviour: ShallowId, portal: Name },
    /// A link's property set.
    Link(ShallowId),
    /// The container's own property set.
    Container,
}

/// Something observable happened to a container's graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// The first portal referencing `asset` appeared in `container`.
    AssetAdded {
        container: ContainerId,
        asset: AssetId,
    },
    /// The last portal referencing `asset` left `container`.
    AssetRemoved {
        container: ContainerId,
        asset: AssetId,
    },
    GroupAdded {
        container: ContainerId,
        group: GroupId,
    },
    GroupRemoved {
        container: ContainerId,
        group: GroupId,
    },
    PropertyEdited {
        container: ContainerId,
        owner: PropOwner,
        name: Name,
    },
    BehaviourRenamed {
        container: ContainerId,
        behaviour: ShallowId,
        alias: String,
    },
    ItemAdded {
        container: ContainerId,
        item: ShallowId,
    },
    ItemRemoved {
        container: ContainerId,
        item: ShallowId,
    },
}

/// Consumer of graph events.
pub trait NotificationSink {
    fn notify(&mut self, event: &GraphEvent);
}

/// Sink that keeps every event, in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<GraphEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl NotificationSink for EventLog {
    fn notify(&mut self, event: &GraphEvent) {
        self.events.push(event.clone());
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&mut self, _event: &GraphEvent) {}
}
