//! Outbound request seam to the remote page/debugger
//!
//! `DomMirror` never talks to a transport directly; every outbound request
//! goes through this trait. Most methods carry a default body that reports
//! the request as unsupported, so an adapter implements only what its
//! transport actually speaks - the document fetch and the child-nodes fetch
//! are the two every adapter must provide.

use crate::highlight::HighlightConfig;
use crate::protocol::SearchId;
use async_trait::async_trait;
use mirror::{NodeId, NodePayload};
use thiserror::Error;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request surface of the remote DOM domain.
///
/// Responses resolve through the returned future; push events (including the
/// `setChildNodes` delivery triggered by `request_child_nodes`) arrive
/// separately through the dispatcher.
#[async_trait]
pub trait DomBackend: Send + Sync {
    /// Fetch the document root payload for the current generation.
    async fn get_document(&self) -> BackendResult<NodePayload>;

    /// Ask the remote end to deliver children of `node_id` down to `depth`
    /// (protocol default when `None`) via a `setChildNodes` push.
    async fn request_child_nodes(&self, node_id: NodeId, depth: Option<u32>) -> BackendResult<()>;

    /// Fetch the flat name/value attribute pairs of a node.
    async fn get_attributes(&self, node_id: NodeId) -> BackendResult<Vec<String>> {
        let _ = node_id;
        Err(BackendError::Unsupported("getAttributes"))
    }

    async fn get_outer_html(&self, node_id: NodeId) -> BackendResult<String> {
        let _ = node_id;
        Err(BackendError::Unsupported("getOuterHTML"))
    }

    async fn set_outer_html(&self, node_id: NodeId, html: &str) -> BackendResult<()> {
        let _ = (node_id, html);
        Err(BackendError::Unsupported("setOuterHTML"))
    }

    /// Rename a node; returns the id of the replacement node.
    async fn set_node_name(&self, node_id: NodeId, name: &str) -> BackendResult<NodeId> {
        let _ = (node_id, name);
        Err(BackendError::Unsupported("setNodeName"))
    }

    async fn set_node_value(&self, node_id: NodeId, value: &str) -> BackendResult<()> {
        let _ = (node_id, value);
        Err(BackendError::Unsupported("setNodeValue"))
    }

    /// Replace attribute text (possibly several attributes) parsed from
    /// `text`, in place of the attribute currently named `name`.
    async fn set_attributes_as_text(
        &self,
        node_id: NodeId,
        text: &str,
        name: &str,
    ) -> BackendResult<()> {
        let _ = (node_id, text, name);
        Err(BackendError::Unsupported("setAttributesAsText"))
    }

    async fn set_attribute_value(
        &self,
        node_id: NodeId,
        name: &str,
        value: &str,
    ) -> BackendResult<()> {
        let _ = (node_id, name, value);
        Err(BackendError::Unsupported("setAttributeValue"))
    }

    async fn remove_attribute(&self, node_id: NodeId, name: &str) -> BackendResult<()> {
        let _ = (node_id, name);
        Err(BackendError::Unsupported("removeAttribute"))
    }

    async fn remove_node(&self, node_id: NodeId) -> BackendResult<()> {
        let _ = node_id;
        Err(BackendError::Unsupported("removeNode"))
    }

    /// Move a node under `target_id`, before `anchor_id` (append when
    /// absent); returns the node's id in its new position.
    async fn move_to(
        &self,
        node_id: NodeId,
        target_id: NodeId,
        anchor_id: Option<NodeId>,
    ) -> BackendResult<NodeId> {
        let _ = (node_id, target_id, anchor_id);
        Err(BackendError::Unsupported("moveTo"))
    }

    /// Push the node behind a remote object reference into the mirror.
    async fn request_node(&self, object_id: &str) -> BackendResult<NodeId> {
        let _ = object_id;
        Err(BackendError::Unsupported("requestNode"))
    }

    /// Push the node at an `index,name` path into the mirror.
    async fn push_node_by_path(&self, path: &str) -> BackendResult<NodeId> {
        let _ = path;
        Err(BackendError::Unsupported("pushNodeByPathToFrontend"))
    }

    async fn query_selector(&self, node_id: NodeId, selectors: &str) -> BackendResult<NodeId> {
        let _ = (node_id, selectors);
        Err(BackendError::Unsupported("querySelector"))
    }

    async fn query_selector_all(
        &self,
        node_id: NodeId,
        selectors: &str,
    ) -> BackendResult<Vec<NodeId>> {
        let _ = (node_id, selectors);
        Err(BackendError::Unsupported("querySelectorAll"))
    }

    /// Start a search session; returns the session id and result count.
    async fn perform_search(&self, query: &str) -> BackendResult<(SearchId, u32)> {
        let _ = query;
        Err(BackendError::Unsupported("performSearch"))
    }

    async fn get_search_results(
        &self,
        search_id: &SearchId,
        from: u32,
        to: u32,
    ) -> BackendResult<Vec<NodeId>> {
        let _ = (search_id, from, to);
        Err(BackendError::Unsupported("getSearchResults"))
    }

    async fn discard_search_results(&self, search_id: &SearchId) -> BackendResult<()> {
        let _ = search_id;
        Err(BackendError::Unsupported("discardSearchResults"))
    }

    async fn highlight_node(
        &self,
        config: &HighlightConfig,
        node_id: Option<NodeId>,
        object_id: Option<&str>,
    ) -> BackendResult<()> {
        let _ = (config, node_id, object_id);
        Err(BackendError::Unsupported("highlightNode"))
    }

    async fn hide_highlight(&self) -> BackendResult<()> {
        Err(BackendError::Unsupported("hideHighlight"))
    }

    async fn set_inspect_mode_enabled(
        &self,
        enabled: bool,
        inspect_shadow_dom: bool,
        config: &HighlightConfig,
    ) -> BackendResult<()> {
        let _ = (enabled, inspect_shadow_dom, config);
        Err(BackendError::Unsupported("setInspectModeEnabled"))
    }

    /// Record an undoable-state checkpoint after a successful mutation.
    async fn mark_undoable_state(&self) -> BackendResult<()> {
        Err(BackendError::Unsupported("markUndoableState"))
    }

    async fn undo(&self) -> BackendResult<()> {
        Err(BackendError::Unsupported("undo"))
    }

    async fn redo(&self) -> BackendResult<()> {
        Err(BackendError::Unsupported("redo"))
    }
}
