//! Mirror synchronization agent
//!
//! `DomMirror` owns one document generation of the mirror tree and keeps it
//! consistent with the remote page:
//!
//! - inbound mutation events (routed here by the dispatcher) mutate the
//!   registry and emit typed notifications,
//! - outbound requests go through the `DomBackend` seam, and mutations that
//!   change persisted page state record an undoable-state checkpoint on
//!   success,
//! - the document fetch is single-flight: callers arriving while a fetch is
//!   in flight park on the same pending set and observe the same outcome.
//!
//! Handlers never hold a state lock across a backend await, and every
//! completion path re-resolves ids through the registry - ids may have died
//! in a generation reset while the request was in flight. Unknown ids are
//! expected under event/removal races and are silently ignored.

use crate::backend::{BackendError, DomBackend};
use crate::events::{EventBus, MirrorEvent};
use crate::highlight::{BackendHighlighter, HighlightConfig, HighlightMode, NodeHighlighter};
use crate::protocol::SearchId;
use dashmap::DashSet;
use mirror::{MirrorDocument, MirrorError, MirrorNode, NodeId, NodePayload, NodeRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};

#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("no document available")]
    NoDocument,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("malformed event parameters: {0}")]
    EventParams(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InspectorError>;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Capacity of the notification broadcast channel.
    pub event_capacity: usize,
    /// Depth passed to child-nodes fetches when the caller gives none
    /// (protocol default when `None`).
    pub children_depth: Option<u32>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            children_depth: None,
        }
    }
}

struct MirrorState {
    registry: NodeRegistry,
    document: Option<MirrorDocument>,
}

/// Client-side agent mirroring the remote page's DOM.
pub struct DomMirror {
    backend: Arc<dyn DomBackend>,
    default_highlighter: Arc<dyn NodeHighlighter>,
    highlighter: RwLock<Arc<dyn NodeHighlighter>>,
    events: EventBus,
    config: MirrorConfig,

    state: RwLock<MirrorState>,

    /// Callers parked on an in-flight document fetch. `Some` while a fetch
    /// is outstanding - that is the loading state.
    pending_document: Mutex<Option<Vec<oneshot::Sender<Option<MirrorDocument>>>>>,

    /// Nodes whose attributes were invalidated and await the batched
    /// re-fetch.
    attribute_load_ids: DashSet<NodeId>,
    attribute_flush_scheduled: AtomicBool,

    search: Mutex<Option<SearchId>>,

    /// Handle back to the owning `Arc`, for spawning the deferred flush.
    self_handle: Weak<Self>,
}

impl DomMirror {
    pub fn new(backend: Arc<dyn DomBackend>) -> Arc<Self> {
        Self::with_config(backend, MirrorConfig::default())
    }

    pub fn with_config(backend: Arc<dyn DomBackend>, config: MirrorConfig) -> Arc<Self> {
        let default_highlighter: Arc<dyn NodeHighlighter> =
            Arc::new(BackendHighlighter::new(backend.clone()));
        Arc::new_cyclic(|self_handle| Self {
            backend,
            highlighter: RwLock::new(default_highlighter.clone()),
            default_highlighter,
            events: EventBus::with_capacity(config.event_capacity),
            config,
            state: RwLock::new(MirrorState {
                registry: NodeRegistry::new(),
                document: None,
            }),
            pending_document: Mutex::new(None),
            attribute_load_ids: DashSet::new(),
            attribute_flush_scheduled: AtomicBool::new(false),
            search: Mutex::new(None),
            self_handle: self_handle.clone(),
        })
    }

    /// Subscribe to mirror change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.events.subscribe()
    }

    /// Current document, if one is loaded. Never triggers a fetch.
    pub async fn existing_document(&self) -> Option<MirrorDocument> {
        self.state.read().await.document
    }

    /// Run a closure against the registry under the read lock.
    pub async fn with_registry<R>(&self, f: impl FnOnce(&NodeRegistry) -> R) -> R {
        let state = self.state.read().await;
        f(&state.registry)
    }

    /// Run a closure against a node; `None` when the id is not registered.
    pub async fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&MirrorNode) -> R) -> Option<R> {
        let state = self.state.read().await;
        state.registry.lookup(id).map(f)
    }

    /// Swap the highlighter seam; `None` restores the backend default.
    pub async fn set_highlighter(&self, highlighter: Option<Arc<dyn NodeHighlighter>>) {
        *self.highlighter.write().await =
            highlighter.unwrap_or_else(|| self.default_highlighter.clone());
    }

    // ---- Document lifecycle -------------------------------------------------

    /// Fetch the document, coalescing concurrent callers onto a single
    /// outbound request. Resolves with `None` when the fetch fails; every
    /// caller parked during the fetch observes the same outcome.
    pub async fn request_document(&self) -> Option<MirrorDocument> {
        if let Some(document) = self.state.read().await.document {
            return Some(document);
        }

        let waiter = {
            let mut pending = self.pending_document.lock().await;
            // Re-check under the pending lock: a completing fetch may have
            // installed the document while we waited for the lock.
            if let Some(document) = self.state.read().await.document {
                return Some(document);
            }
            match pending.as_mut() {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    *pending = Some(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(None);
        }

        let document = match self.backend.get_document().await {
            Ok(payload) => self.set_document(Some(&payload)).await,
            Err(err) => {
                tracing::warn!("document fetch failed: {err}");
                self.state.read().await.document
            }
        };

        let waiters = self.pending_document.lock().await.take().unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(document);
        }
        document
    }

    /// Tear down the current generation; the next `request_document`
    /// triggers a fresh fetch.
    pub async fn document_updated(&self) {
        self.set_document(None).await;
    }

    async fn set_document(&self, payload: Option<&NodePayload>) -> Option<MirrorDocument> {
        let document = {
            let mut state = self.state.write().await;
            state.registry.clear();
            state.document = None;
            if let Some(payload) = payload {
                match state.registry.instantiate_document(payload) {
                    Ok(document) => state.document = Some(document),
                    Err(err) => tracing::warn!("malformed document payload: {err}"),
                }
            }
            state.document
        };
        self.events.publish(MirrorEvent::DocumentUpdated {
            document: document.map(|d| d.root()),
        });
        document
    }

    // ---- Inbound mutation events --------------------------------------------

    pub async fn attribute_modified(&self, node_id: NodeId, name: &str, value: &str) {
        {
            let mut state = self.state.write().await;
            let Some(node) = state.registry.lookup_mut(node_id) else {
                tracing::trace!(node_id, "attribute modified for unknown node");
                return;
            };
            node.set_attribute(name, value);
        }
        self.events.publish(MirrorEvent::AttrModified {
            node: node_id,
            name: name.to_owned(),
        });
    }

    pub async fn attribute_removed(&self, node_id: NodeId, name: &str) {
        {
            let mut state = self.state.write().await;
            let Some(node) = state.registry.lookup_mut(node_id) else {
                tracing::trace!(node_id, "attribute removed for unknown node");
                return;
            };
            node.remove_attribute(name);
        }
        self.events.publish(MirrorEvent::AttrRemoved {
            node: node_id,
            name: name.to_owned(),
        });
    }

    /// Mark nodes whose attributes went stale and schedule the batched
    /// re-fetch at most once; repeated invalidations before the flush runs
    /// coalesce into the same batch.
    pub fn inline_style_invalidated(&self, node_ids: &[NodeId]) {
        for &id in node_ids {
            self.attribute_load_ids.insert(id);
        }
        if self.attribute_flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(agent) = self.self_handle.upgrade() else {
            self.attribute_flush_scheduled.store(false, Ordering::SeqCst);
            return;
        };
        tokio::spawn(async move {
            agent.flush_attribute_loads().await;
        });
    }

    /// Re-fetch attributes for every pending invalidated node. Runs
    /// automatically after `inline_style_invalidated`; public so embedders
    /// and tests can flush deterministically (a second flush over an empty
    /// set is a no-op).
    pub async fn flush_attribute_loads(&self) {
        self.attribute_flush_scheduled.store(false, Ordering::SeqCst);
        let pending: Vec<NodeId> = self.attribute_load_ids.iter().map(|id| *id).collect();
        self.attribute_load_ids.clear();
        if pending.is_empty() {
            return;
        }

        let fetches = pending
            .iter()
            .map(|&id| async move { (id, self.backend.get_attributes(id).await) });
        for (id, result) in futures_util::future::join_all(fetches).await {
            let attrs = match result {
                Ok(attrs) => attrs,
                Err(err) => {
                    // The fetch raced a removal or failed remotely; both are
                    // fine for an asynchronous refresh.
                    tracing::debug!(node_id = id, "attribute re-fetch failed: {err}");
                    continue;
                }
            };
            let changed = {
                let mut state = self.state.write().await;
                match state.registry.lookup_mut(id) {
                    Some(node) => node.set_attributes_payload(&attrs),
                    // Node vanished before the batched fetch resolved.
                    None => continue,
                }
            };
            if changed {
                self.events.publish(MirrorEvent::AttrModified {
                    node: id,
                    name: "style".to_owned(),
                });
            }
        }
    }

    pub async fn character_data_modified(&self, node_id: NodeId, value: &str) {
        {
            let mut state = self.state.write().await;
            let Some(node) = state.registry.lookup_mut(node_id) else {
                tracing::trace!(node_id, "character data modified for unknown node");
                return;
            };
            node.set_node_value(value);
        }
        self.events
            .publish(MirrorEvent::CharacterDataModified { node: node_id });
    }

    /// Children delivery. A falsy parent id with a non-empty payload list is
    /// the out-of-band detached-root path.
    pub async fn set_child_nodes(&self, parent_id: NodeId, payloads: Vec<NodePayload>) {
        let mut state = self.state.write().await;
        if parent_id == 0 {
            if let Some(first) = payloads.first() {
                if let Err(err) = state.registry.instantiate_detached(first) {
                    tracing::warn!("malformed detached root payload: {err}");
                }
            }
            return;
        }
        if !state.registry.contains(parent_id) {
            tracing::trace!(parent_id, "children delivered for unknown parent");
            return;
        }
        if let Err(err) = state.registry.set_children_payload(parent_id, &payloads) {
            tracing::warn!(parent_id, "malformed children payload: {err}");
        }
    }

    pub async fn child_node_count_updated(&self, node_id: NodeId, count: u32) {
        {
            let mut state = self.state.write().await;
            let Some(node) = state.registry.lookup_mut(node_id) else {
                tracing::trace!(node_id, "child count update for unknown node");
                return;
            };
            node.set_child_node_count(count);
        }
        self.events
            .publish(MirrorEvent::ChildNodeCountUpdated { node: node_id });
    }

    pub async fn child_node_inserted(&self, parent_id: NodeId, prev_id: NodeId, payload: NodePayload) {
        let inserted = {
            let mut state = self.state.write().await;
            if !state.registry.contains(parent_id) {
                tracing::trace!(parent_id, "insertion under unknown parent");
                return;
            }
            let prev = (prev_id != 0).then_some(prev_id);
            match state.registry.insert_child(parent_id, prev, &payload) {
                Ok(node) => node,
                Err(err) => {
                    tracing::warn!(parent_id, "malformed insertion payload: {err}");
                    return;
                }
            }
        };
        self.events.publish(MirrorEvent::NodeInserted { node: inserted });
    }

    pub async fn child_node_removed(&self, parent_id: NodeId, node_id: NodeId) {
        {
            let mut state = self.state.write().await;
            if !state.registry.contains(parent_id) || !state.registry.contains(node_id) {
                tracing::trace!(parent_id, node_id, "removal for unknown nodes");
                return;
            }
            if let Err(err) = state.registry.remove_child(parent_id, node_id) {
                tracing::warn!(parent_id, node_id, "removal failed: {err}");
                return;
            }
            state.registry.unbind(node_id);
        }
        self.events.publish(MirrorEvent::NodeRemoved {
            node: node_id,
            parent: parent_id,
        });
    }

    pub async fn shadow_root_pushed(&self, host_id: NodeId, payload: NodePayload) {
        let root = {
            let mut state = self.state.write().await;
            if !state.registry.contains(host_id) {
                tracing::trace!(host_id, "shadow root pushed for unknown host");
                return;
            }
            match state.registry.push_shadow_root(host_id, &payload) {
                Ok(root) => root,
                Err(err) => {
                    tracing::warn!(host_id, "malformed shadow root payload: {err}");
                    return;
                }
            }
        };
        self.events.publish(MirrorEvent::NodeInserted { node: root });
    }

    pub async fn shadow_root_popped(&self, host_id: NodeId, root_id: NodeId) {
        {
            let mut state = self.state.write().await;
            if !state.registry.contains(host_id) || !state.registry.contains(root_id) {
                tracing::trace!(host_id, root_id, "shadow root popped for unknown nodes");
                return;
            }
            if let Err(err) = state.registry.remove_child(host_id, root_id) {
                tracing::warn!(host_id, root_id, "shadow root removal failed: {err}");
                return;
            }
            state.registry.unbind(root_id);
        }
        self.events.publish(MirrorEvent::NodeRemoved {
            node: root_id,
            parent: host_id,
        });
    }

    pub async fn pseudo_element_added(&self, parent_id: NodeId, payload: NodePayload) {
        let node = {
            let mut state = self.state.write().await;
            if !state.registry.contains(parent_id) {
                tracing::trace!(parent_id, "pseudo element added for unknown parent");
                return;
            }
            match state.registry.add_pseudo_element(parent_id, &payload) {
                Ok(node) => node,
                Err(err) => {
                    tracing::warn!(parent_id, "malformed pseudo element payload: {err}");
                    return;
                }
            }
        };
        self.events.publish(MirrorEvent::NodeInserted { node });
    }

    pub async fn pseudo_element_removed(&self, parent_id: NodeId, pseudo_id: NodeId) {
        {
            let mut state = self.state.write().await;
            if !state.registry.contains(parent_id) || !state.registry.contains(pseudo_id) {
                tracing::trace!(parent_id, pseudo_id, "pseudo element removal for unknown nodes");
                return;
            }
            if let Err(err) = state.registry.remove_child(parent_id, pseudo_id) {
                tracing::warn!(parent_id, pseudo_id, "pseudo element removal failed: {err}");
                return;
            }
            state.registry.unbind(pseudo_id);
        }
        self.events.publish(MirrorEvent::NodeRemoved {
            node: pseudo_id,
            parent: parent_id,
        });
    }

    pub async fn pseudo_state_changed(&self, node_id: NodeId) {
        if !self.state.read().await.registry.contains(node_id) {
            tracing::trace!(node_id, "pseudo state change for unknown node");
            return;
        }
        self.events
            .publish(MirrorEvent::PseudoStateChanged { node: node_id });
    }

    /// Host-side request to reveal a node; only known nodes are announced.
    pub async fn inspect_element(&self, node_id: NodeId) {
        if !self.state.read().await.registry.contains(node_id) {
            return;
        }
        self.events
            .publish(MirrorEvent::InspectNodeRequested { node: node_id });
    }

    /// Remote-side request to reveal a node.
    pub async fn inspect_node_requested(&self, node_id: NodeId) {
        self.events
            .publish(MirrorEvent::InspectNodeRequested { node: node_id });
    }

    // ---- Lazy loading -------------------------------------------------------

    /// Ensure `node_id`'s children are loaded (to `depth` when given) and
    /// return them. Resolves immediately without suspension when the
    /// children are already loaded and no explicit depth was requested;
    /// otherwise suspends on the collaborator fetch and re-resolves the node
    /// afterwards - failing when the generation reset meanwhile.
    pub async fn request_children(
        &self,
        node_id: NodeId,
        depth: Option<u32>,
    ) -> Result<Vec<NodeId>> {
        {
            let state = self.state.read().await;
            let node = state.registry.get(node_id).map_err(InspectorError::from)?;
            if depth.is_none() {
                if let Some(children) = node.children() {
                    return Ok(children.to_vec());
                }
            }
        }

        let depth = depth.or(self.config.children_depth);
        self.backend.request_child_nodes(node_id, depth).await?;

        let state = self.state.read().await;
        let node = state.registry.get(node_id).map_err(InspectorError::from)?;
        Ok(node.children().map(<[NodeId]>::to_vec).unwrap_or_default())
    }

    // ---- Outbound mutations (undoable) --------------------------------------

    /// Checkpoint the page's undo stack. Failures are diagnostic only.
    pub async fn mark_undoable_state(&self) {
        if let Err(err) = self.backend.mark_undoable_state().await {
            tracing::debug!("undo checkpoint failed: {err}");
        }
    }

    pub async fn set_node_name(&self, node_id: NodeId, name: &str) -> Result<NodeId> {
        let new_id = self.backend.set_node_name(node_id, name).await?;
        self.mark_undoable_state().await;
        Ok(new_id)
    }

    pub async fn set_node_value(&self, node_id: NodeId, value: &str) -> Result<()> {
        self.backend.set_node_value(node_id, value).await?;
        self.mark_undoable_state().await;
        Ok(())
    }

    /// Replace attribute text parsed remotely in place of attribute `name`.
    pub async fn set_attribute_text(&self, node_id: NodeId, text: &str, name: &str) -> Result<()> {
        self.backend.set_attributes_as_text(node_id, text, name).await?;
        self.mark_undoable_state().await;
        Ok(())
    }

    pub async fn set_attribute_value(&self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        self.backend.set_attribute_value(node_id, name, value).await?;
        self.mark_undoable_state().await;
        Ok(())
    }

    /// Remove an attribute remotely; on success the local mirror drops it
    /// too rather than waiting for the confirming event.
    pub async fn remove_attribute(&self, node_id: NodeId, name: &str) -> Result<()> {
        self.backend.remove_attribute(node_id, name).await?;
        {
            let mut state = self.state.write().await;
            if let Some(node) = state.registry.lookup_mut(node_id) {
                node.remove_attribute(name);
            }
        }
        self.mark_undoable_state().await;
        Ok(())
    }

    pub async fn get_outer_html(&self, node_id: NodeId) -> Result<String> {
        Ok(self.backend.get_outer_html(node_id).await?)
    }

    pub async fn set_outer_html(&self, node_id: NodeId, html: &str) -> Result<()> {
        self.backend.set_outer_html(node_id, html).await?;
        self.mark_undoable_state().await;
        Ok(())
    }

    pub async fn remove_node(&self, node_id: NodeId) -> Result<()> {
        self.backend.remove_node(node_id).await?;
        self.mark_undoable_state().await;
        Ok(())
    }

    pub async fn move_node(
        &self,
        node_id: NodeId,
        target_id: NodeId,
        anchor_id: Option<NodeId>,
    ) -> Result<NodeId> {
        let new_id = self.backend.move_to(node_id, target_id, anchor_id).await?;
        self.mark_undoable_state().await;
        Ok(new_id)
    }

    pub async fn undo(&self) -> Result<()> {
        self.events.publish(MirrorEvent::UndoRedoRequested);
        let result = self.backend.undo().await;
        self.events.publish(MirrorEvent::UndoRedoCompleted);
        Ok(result?)
    }

    pub async fn redo(&self) -> Result<()> {
        self.events.publish(MirrorEvent::UndoRedoRequested);
        let result = self.backend.redo().await;
        self.events.publish(MirrorEvent::UndoRedoCompleted);
        Ok(result?)
    }

    // ---- Document-gated node pushes -----------------------------------------

    /// Push the node behind a remote object reference into the mirror.
    /// Requires a document; reports an explicit no-document failure instead
    /// of letting the backend guess.
    pub async fn request_node(&self, object_id: &str) -> Result<NodeId> {
        if self.request_document().await.is_none() {
            return Err(InspectorError::NoDocument);
        }
        Ok(self.backend.request_node(object_id).await?)
    }

    pub async fn push_node_by_path(&self, path: &str) -> Result<NodeId> {
        if self.request_document().await.is_none() {
            return Err(InspectorError::NoDocument);
        }
        Ok(self.backend.push_node_by_path(path).await?)
    }

    pub async fn query_selector(&self, node_id: NodeId, selectors: &str) -> Result<NodeId> {
        Ok(self.backend.query_selector(node_id, selectors).await?)
    }

    pub async fn query_selector_all(&self, node_id: NodeId, selectors: &str) -> Result<Vec<NodeId>> {
        Ok(self.backend.query_selector_all(node_id, selectors).await?)
    }

    // ---- Search -------------------------------------------------------------

    /// Start a search session, discarding any previous one. Returns the
    /// result count.
    pub async fn perform_search(&self, query: &str) -> Result<u32> {
        self.cancel_search().await;
        let (search_id, count) = self.backend.perform_search(query).await?;
        *self.search.lock().await = Some(search_id);
        Ok(count)
    }

    /// Fetch one search result by index; `None` without an active session,
    /// on fetch failure, or when the result node is no longer registered.
    pub async fn search_result(&self, index: u32) -> Option<NodeId> {
        let search_id = self.search.lock().await.clone()?;
        match self.backend.get_search_results(&search_id, index, index + 1).await {
            Ok(ids) if ids.len() == 1 => {
                let state = self.state.read().await;
                state.registry.contains(ids[0]).then_some(ids[0])
            }
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("search result fetch failed: {err}");
                None
            }
        }
    }

    /// Discard the active search session, if any.
    pub async fn cancel_search(&self) {
        if let Some(search_id) = self.search.lock().await.take() {
            if let Err(err) = self.backend.discard_search_results(&search_id).await {
                tracing::debug!("discarding search results failed: {err}");
            }
        }
    }

    // ---- Highlighting -------------------------------------------------------

    /// Highlight a node or remote object on the page; clears the highlight
    /// when both targets are absent.
    pub async fn highlight(
        &self,
        node_id: Option<NodeId>,
        object_id: Option<&str>,
        mode: HighlightMode,
    ) -> Result<()> {
        let config = HighlightConfig::for_mode(mode);
        let highlighter = self.highlighter.read().await.clone();
        Ok(highlighter.highlight_node(node_id, &config, object_id).await?)
    }

    pub async fn highlight_node(&self, node_id: NodeId, mode: HighlightMode) -> Result<()> {
        self.highlight(Some(node_id), None, mode).await
    }

    pub async fn hide_highlight(&self) -> Result<()> {
        self.highlight(None, None, HighlightMode::All).await
    }

    /// Toggle element picking on the page. Requires a document.
    pub async fn set_inspect_mode_enabled(
        &self,
        enabled: bool,
        inspect_shadow_dom: bool,
    ) -> Result<()> {
        if self.request_document().await.is_none() {
            return Err(InspectorError::NoDocument);
        }
        let config = HighlightConfig::for_mode(HighlightMode::All);
        let highlighter = self.highlighter.read().await.clone();
        Ok(highlighter
            .set_inspect_mode(enabled, inspect_shadow_dom, &config)
            .await?)
    }
}
