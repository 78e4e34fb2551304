//! Mirror change notifications
//!
//! Design: one enum, typed payload per kind. No stringly-typed event names,
//! no dynamic listener registration - subscribers hold a broadcast receiver
//! and match on the variant.
//!
//! Events carry node ids, not node references: consumers re-resolve through
//! the registry, which is also the liveness rule every handler follows after
//! a suspension point.

use mirror::NodeId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notification emitted after a mirror mutation was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorEvent {
    /// The document generation changed; `document` is the new root, `None`
    /// after a teardown.
    DocumentUpdated { document: Option<NodeId> },
    AttrModified { node: NodeId, name: String },
    AttrRemoved { node: NodeId, name: String },
    CharacterDataModified { node: NodeId },
    NodeInserted { node: NodeId },
    /// Removal carries the former parent - the node itself is already
    /// unregistered when subscribers see this.
    NodeRemoved { node: NodeId, parent: NodeId },
    ChildNodeCountUpdated { node: NodeId },
    PseudoStateChanged { node: NodeId },
    InspectNodeRequested { node: NodeId },
    UndoRedoRequested,
    UndoRedoCompleted,
}

/// Simple event bus over a tokio broadcast channel
pub struct EventBus {
    tx: broadcast::Sender<MirrorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: MirrorEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
