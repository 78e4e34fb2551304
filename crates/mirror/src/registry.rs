//! Id-keyed storage and structural operations for the mirror tree
//!
//! Design:
//! - Single `AHashMap<NodeId, MirrorNode>` owns every node; ids resolve in
//!   O(1) from any protocol event.
//! - Structural mutations live here rather than on `MirrorNode` because they
//!   touch several nodes at once (parent and children, ancestor chains).
//! - Teardown is an iterative deregistration pass over the owned slots, no
//!   recursion and no cycle-breaking needed.
//! - Lifecycle is tied to the document generation: the synchronizer clears
//!   the whole registry on every document reset.

use crate::document::{DocumentInfo, MirrorDocument};
use crate::error::{MirrorError, Result};
use crate::node::MirrorNode;
use crate::types::{NodeId, NodeType, NodePayload};
use ahash::AHashMap;
use serde_json::Value;
use smallvec::{smallvec, SmallVec};
use url::Url;

/// Per-connection map from protocol node id to mirror node.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: AHashMap<NodeId, MirrorNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: AHashMap::with_capacity(1024), // typical page
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: AHashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, id: NodeId) -> Result<&MirrorNode> {
        self.nodes.get(&id).ok_or(MirrorError::NodeNotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut MirrorNode> {
        self.nodes.get_mut(&id).ok_or(MirrorError::NodeNotFound(id))
    }

    /// Lookup that treats an unknown id as an expected outcome, not an error.
    /// Protocol events racing against local removals hit this constantly.
    pub fn lookup(&self, id: NodeId) -> Option<&MirrorNode> {
        self.nodes.get(&id)
    }

    pub fn lookup_mut(&mut self, id: NodeId) -> Option<&mut MirrorNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MirrorNode> {
        self.nodes.values()
    }

    /// Drop every node. Called on document generation reset; the map
    /// allocation is reused.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Build a document and its entire payload subtree, registering every
    /// node. The document node is its own owner document.
    pub fn instantiate_document(&mut self, payload: &NodePayload) -> Result<MirrorDocument> {
        let info = DocumentInfo::from_payload(payload);
        let root = self.build_node(payload, Some(payload.node_id), false, Some(info))?;
        Ok(MirrorDocument::new(root))
    }

    /// Build a standalone subtree with no parent linkage - the out-of-band
    /// delivery path for lazily fetched nodes. `#document` payloads become
    /// full documents.
    pub fn instantiate_detached(&mut self, payload: &NodePayload) -> Result<NodeId> {
        if payload.node_name == "#document" {
            Ok(self.instantiate_document(payload)?.root())
        } else {
            self.build_node(payload, None, false, None)
        }
    }

    fn build_node(
        &mut self,
        payload: &NodePayload,
        owner_document: Option<NodeId>,
        in_shadow_tree: bool,
        doc_info: Option<DocumentInfo>,
    ) -> Result<NodeId> {
        let mut node = MirrorNode::from_payload(payload, owner_document, in_shadow_tree)?;
        if let Some(info) = doc_info {
            node.detail = Some(Box::new(crate::node::NodeDetail::Document(info)));
        }
        let id = node.id();
        debug_assert!(!self.nodes.contains_key(&id), "node id already registered: {id}");
        // Register before the subtree is built so the id resolves while
        // descendants are still being constructed.
        self.nodes.insert(id, node);

        if let Some(roots) = &payload.shadow_roots {
            for root in roots {
                let child = self.build_node(root, owner_document, true, None)?;
                self.get_mut(child)?.parent = Some(id);
                self.get_mut(id)?.shadow_roots.push(child);
            }
        }

        if let Some(template) = &payload.template_content {
            let child = self.build_node(template, owner_document, true, None)?;
            self.get_mut(child)?.parent = Some(id);
            self.get_mut(id)?.template_content = Some(child);
        }

        if let Some(children) = &payload.children {
            self.set_children_payload(id, children)?;
        }

        if let Some(pseudos) = &payload.pseudo_elements {
            for pseudo in pseudos {
                let child = self.build_node(pseudo, owner_document, in_shadow_tree, None)?;
                self.get_mut(child)?.parent = Some(id);
                match self.get(child)?.pseudo_type() {
                    Some(kind) => {
                        self.get_mut(id)?.pseudo_elements.insert(kind, child);
                    }
                    None => {
                        debug_assert!(false, "pseudo element payload without pseudo type");
                    }
                }
            }
        }

        if let Some(content) = &payload.content_document {
            let info = DocumentInfo::from_payload(content);
            let doc = self.build_node(content, Some(content.node_id), false, Some(info))?;
            let host = self.get_mut(id)?;
            host.content_document = Some(doc);
            // The content document is the host's sole child.
            host.children = Some(smallvec![doc]);
            self.renumber(id);
        }

        if self.get(id)?.node_type() == NodeType::Element {
            if let Some(doc_id) = owner_document {
                let claims_html = self.get(id)?.node_name() == "HTML";
                let claims_body = self.get(id)?.node_name() == "BODY";
                if let Some(info) = self.lookup_mut(doc_id).and_then(|d| d.document_mut()) {
                    if info.document_element.is_none() && claims_html {
                        info.document_element = Some(id);
                    }
                    if info.body.is_none() && claims_body {
                        info.body = Some(id);
                    }
                }
            }
        }

        Ok(id)
    }

    /// Replace `parent`'s loaded children from payloads. Content-document
    /// hosts keep their fixed single child.
    pub fn set_children_payload(&mut self, parent: NodeId, payloads: &[NodePayload]) -> Result<()> {
        let (owner, in_shadow, has_content_document) = {
            let node = self.get(parent)?;
            (
                node.owner_document(),
                node.is_in_shadow_tree(),
                node.content_document().is_some(),
            )
        };
        if has_content_document {
            return Ok(());
        }

        let mut ids: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(self.build_node(payload, owner, in_shadow, None)?);
        }
        self.get_mut(parent)?.children = Some(ids);
        self.renumber(parent);
        Ok(())
    }

    /// Construct a node from `payload` and splice it immediately after
    /// `prev` in `parent`'s children (head when `prev` is absent or not a
    /// current child). Registers the whole constructed subtree; renumbers.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        prev: Option<NodeId>,
        payload: &NodePayload,
    ) -> Result<NodeId> {
        let (owner, in_shadow) = {
            let node = self.get(parent)?;
            (node.owner_document(), node.is_in_shadow_tree())
        };
        let node = self.build_node(payload, owner, in_shadow, None)?;

        let parent_node = self.get_mut(parent)?;
        let children = parent_node.children.get_or_insert_with(SmallVec::new);
        let at = prev
            .and_then(|p| children.iter().position(|&c| c == p).map(|i| i + 1))
            .unwrap_or(0);
        children.insert(at, node);
        self.renumber(parent);
        Ok(node)
    }

    /// Detach `node` from whichever collection of `parent` currently owns it:
    /// the pseudo-element map, the shadow-root set, or the children sequence,
    /// checked in that priority order. Clears the parent link, pushes the
    /// detached subtree's aggregate user-property counts off the former
    /// ancestor chain, renumbers. Does NOT unregister - callers pair this
    /// with `unbind`.
    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        let pseudo = self.get(node)?.pseudo_type();

        let parent_node = self.get_mut(parent)?;
        if let Some(kind) = pseudo {
            parent_node.pseudo_elements.remove(&kind);
        } else if let Some(pos) = parent_node.shadow_roots.iter().position(|&n| n == node) {
            parent_node.shadow_roots.remove(pos);
        } else if let Some(children) = parent_node.children.as_mut() {
            if let Some(pos) = children.iter().position(|&n| n == node) {
                children.remove(pos);
            }
        }

        self.get_mut(node)?.parent = None;
        self.propagate_removal_counters(node, parent)?;
        if self.get(parent)?.children().is_some() {
            self.renumber(parent);
        }
        Ok(())
    }

    /// Attach a protocol-pushed shadow root to its host.
    pub fn push_shadow_root(&mut self, host: NodeId, payload: &NodePayload) -> Result<NodeId> {
        let owner = self.get(host)?.owner_document();
        let node = self.build_node(payload, owner, true, None)?;
        self.get_mut(node)?.parent = Some(host);
        self.get_mut(host)?.shadow_roots.push(node);
        Ok(node)
    }

    /// Attach a protocol-pushed pseudo element to its parent. The slot for
    /// that pseudo kind must be empty; an occupied slot is a protocol
    /// contract defect (flagged in debug builds, last writer wins otherwise).
    pub fn add_pseudo_element(&mut self, parent: NodeId, payload: &NodePayload) -> Result<NodeId> {
        let owner = self.get(parent)?.owner_document();
        let node = self.build_node(payload, owner, false, None)?;
        self.get_mut(node)?.parent = Some(parent);
        let kind = self.get(node)?.pseudo_type().ok_or_else(|| {
            MirrorError::Payload("pseudo element payload without pseudo type".to_owned())
        })?;
        let prior = self.get_mut(parent)?.pseudo_elements.insert(kind, node);
        debug_assert!(prior.is_none(), "pseudo element slot already occupied");
        Ok(node)
    }

    /// Recompute `index`/sibling links and the first/last markers for
    /// `parent`'s loaded children. Always a full O(n) pass: every sibling
    /// pointer must be exact after any single structural mutation.
    fn renumber(&mut self, parent: NodeId) {
        let Some(children) = self.lookup(parent).and_then(|n| n.children.clone()) else {
            return;
        };

        {
            let Some(node) = self.lookup_mut(parent) else { return };
            node.child_node_count = children.len() as u32;
            if children.is_empty() {
                node.first_child = None;
                node.last_child = None;
                return;
            }
            node.first_child = children.first().copied();
            node.last_child = children.last().copied();
        }

        let count = children.len();
        for (i, &child_id) in children.iter().enumerate() {
            if let Some(child) = self.lookup_mut(child_id) {
                child.index = Some(i as u32);
                child.next_sibling = if i + 1 < count { Some(children[i + 1]) } else { None };
                child.previous_sibling = if i > 0 { Some(children[i - 1]) } else { None };
                child.parent = Some(parent);
            }
        }
    }

    /// Remove `id` and every owned descendant (children, shadow roots,
    /// pseudo elements, template content) from the registry.
    pub fn unbind(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.remove(&current) else { continue };
            if let Some(children) = node.children {
                stack.extend(children);
            }
            stack.extend(node.shadow_roots);
            stack.extend(node.pseudo_elements.into_iter().map(|(_, pseudo)| pseudo));
            if let Some(template) = node.template_content {
                stack.push(template);
            }
        }
    }

    /// Attach opaque metadata to a node. A null value removes the property.
    /// The first set of a key on a node (not a value overwrite) pushes a +1
    /// aggregate delta up the ancestor chain.
    pub fn set_user_property(&mut self, id: NodeId, name: &str, value: Value) -> Result<()> {
        if value.is_null() {
            return self.remove_user_property(id, name);
        }

        let (parent, already_set) = {
            let node = self.get(id)?;
            (node.parent(), node.has_user_property(name))
        };
        if !already_set {
            if let Some(parent) = parent {
                self.adjust_descendant_counters(parent, name, 1);
            }
        }
        self.get_mut(id)?
            .user_properties
            .insert(name.to_owned(), value);
        Ok(())
    }

    pub fn remove_user_property(&mut self, id: NodeId, name: &str) -> Result<()> {
        let (parent, was_set) = {
            let node = self.get(id)?;
            (node.parent(), node.has_user_property(name))
        };
        if !was_set {
            return Ok(());
        }
        self.get_mut(id)?.user_properties.remove(name);
        if let Some(parent) = parent {
            self.adjust_descendant_counters(parent, name, -1);
        }
        Ok(())
    }

    /// One combined counter update per key for a whole detached subtree: the
    /// node's own direct keys plus its already-aggregated descendant counts,
    /// pushed off `former_parent`'s ancestor chain in a single pass per key.
    fn propagate_removal_counters(&mut self, removed: NodeId, former_parent: NodeId) -> Result<()> {
        let mut totals: AHashMap<String, i64> = AHashMap::new();
        {
            let node = self.get(removed)?;
            for name in node.user_properties.keys() {
                *totals.entry(name.clone()).or_insert(0) += 1;
            }
            for (name, count) in &node.descendant_user_property_counters {
                *totals.entry(name.clone()).or_insert(0) += i64::from(*count);
            }
        }
        for (name, total) in totals {
            self.adjust_descendant_counters(former_parent, &name, -total);
        }
        Ok(())
    }

    /// Walk the ancestor chain from `start` (inclusive) applying `delta` to
    /// each node's counter for `name`. Zero counts are removed, never stored.
    fn adjust_descendant_counters(&mut self, start: NodeId, name: &str, delta: i64) {
        let mut current = Some(start);
        while let Some(id) = current {
            let Some(node) = self.lookup_mut(id) else { break };
            let updated = i64::from(node.descendant_user_property_count(name)) + delta;
            if updated <= 0 {
                node.descendant_user_property_counters.remove(name);
            } else {
                node.descendant_user_property_counters
                    .insert(name.to_owned(), updated as u32);
            }
            current = node.parent();
        }
    }

    /// Resolve a relative URL against the nearest ancestor-or-self carrying
    /// a base URL. `None` on empty input or when no such ancestor exists.
    pub fn resolve_url(&self, id: NodeId, relative: &str) -> Option<String> {
        if relative.is_empty() {
            return None;
        }
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.lookup(node_id)?;
            if let Some(info) = node.document() {
                if !info.base_url.is_empty() {
                    return Url::parse(&info.base_url)
                        .ok()?
                        .join(relative)
                        .ok()
                        .map(String::from);
                }
            }
            current = node.parent();
        }
        None
    }

    /// Whether `ancestor` lies on `node`'s strict ancestor chain. O(depth).
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.lookup(node).and_then(MirrorNode::parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.lookup(id).and_then(MirrorNode::parent);
        }
        false
    }

    pub fn is_descendant(&self, descendant: NodeId, node: NodeId) -> bool {
        self.is_ancestor(node, descendant)
    }

    /// Flat `index,name` path from the root down to `id`, consumed by the
    /// push-node-by-path request.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = self.lookup(id);
        while let Some(node) = current {
            match node.index() {
                Some(index) if !node.node_name().is_empty() => {
                    parts.push(format!("{},{}", index, node.node_name()));
                }
                _ => break,
            }
            current = node.parent().and_then(|p| self.lookup(p));
        }
        parts.reverse();
        parts.join(",")
    }

    /// Whether `id` belongs to an XML document.
    pub fn is_xml_node(&self, id: NodeId) -> bool {
        self.lookup(id)
            .and_then(MirrorNode::owner_document)
            .and_then(|doc| self.lookup(doc))
            .and_then(MirrorNode::document)
            .is_some_and(DocumentInfo::is_xml)
    }

    /// Markup-cased name: verbatim in XML documents, lowercased otherwise.
    pub fn node_name_in_correct_case(&self, id: NodeId) -> Option<String> {
        let node = self.lookup(id)?;
        if self.is_xml_node(id) {
            Some(node.node_name().to_owned())
        } else {
            Some(node.node_name().to_ascii_lowercase())
        }
    }

    /// Depth-first walk over every owned slot reachable from `start`:
    /// loaded children (in order), then shadow roots, pseudo elements and
    /// template content. Iterative, no recursion.
    pub fn traverse_df<F>(&self, start: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&MirrorNode) -> Result<()>,
    {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            visit(node)?;

            if let Some(template) = node.template_content() {
                stack.push(template);
            }
            for &pseudo in node.pseudo_elements().values() {
                stack.push(pseudo);
            }
            for &shadow in node.shadow_roots().iter().rev() {
                stack.push(shadow);
            }
            // Children pushed last, reversed, so they pop first left-to-right.
            if let Some(children) = node.children() {
                for &child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_document() -> NodePayload {
        NodePayload::document(1, "http://example.com/index.html", "http://example.com/")
            .with_children(vec![NodePayload::element(2, "HTML").with_children(vec![
                NodePayload::element(3, "HEAD"),
                NodePayload::element(4, "BODY"),
            ])])
    }

    fn assert_sequence_links(registry: &NodeRegistry, parent: NodeId) {
        let children: Vec<NodeId> = registry.get(parent).unwrap().children().unwrap().to_vec();
        let parent_node = registry.get(parent).unwrap();
        assert_eq!(parent_node.first_child(), children.first().copied());
        assert_eq!(parent_node.last_child(), children.last().copied());
        assert_eq!(parent_node.child_node_count() as usize, children.len());

        for (i, &id) in children.iter().enumerate() {
            let child = registry.get(id).unwrap();
            assert_eq!(child.index(), Some(i as u32));
            assert_eq!(child.parent(), Some(parent));
            assert_eq!(child.previous_sibling(), if i > 0 { Some(children[i - 1]) } else { None });
            assert_eq!(
                child.next_sibling(),
                if i + 1 < children.len() { Some(children[i + 1]) } else { None }
            );
        }
    }

    #[test]
    fn test_instantiate_document_registers_subtree() {
        let mut registry = NodeRegistry::new();
        let doc = registry.instantiate_document(&simple_document()).unwrap();

        assert_eq!(doc.root(), 1);
        assert_eq!(registry.len(), 4);
        assert_sequence_links(&registry, 1);
        assert_sequence_links(&registry, 2);

        let info = registry.get(1).unwrap().document().unwrap();
        assert_eq!(info.document_element, Some(2));
        assert_eq!(info.body, Some(4));

        // Every child points back at the owning document.
        for id in [2, 3, 4] {
            assert_eq!(registry.get(id).unwrap().owner_document(), Some(1));
        }
        assert_eq!(registry.get(1).unwrap().owner_document(), Some(1));
    }

    #[test]
    fn test_insert_after_only_child() {
        let mut registry = NodeRegistry::new();
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![
                        NodePayload::element(2, "HTML").with_children(vec![NodePayload::element(3, "A")]),
                    ]),
            )
            .unwrap();

        let inserted = registry
            .insert_child(2, Some(3), &NodePayload::element(4, "B"))
            .unwrap();
        assert_eq!(inserted, 4);

        let b = registry.get(4).unwrap();
        assert_eq!(b.index(), Some(1));
        assert_eq!(b.previous_sibling(), Some(3));
        assert_eq!(b.next_sibling(), None);
        assert_eq!(registry.get(3).unwrap().next_sibling(), Some(4));
        assert_sequence_links(&registry, 2);
    }

    #[test]
    fn test_insert_at_head_when_prev_absent() {
        let mut registry = NodeRegistry::new();
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![
                        NodePayload::element(2, "HTML").with_children(vec![NodePayload::element(3, "A")]),
                    ]),
            )
            .unwrap();

        registry.insert_child(2, None, &NodePayload::element(4, "B")).unwrap();
        assert_eq!(registry.get(2).unwrap().children(), Some(&[4, 3][..]));
        assert_sequence_links(&registry, 2);

        // A prev id that is not a current child also lands at the head.
        registry.insert_child(2, Some(99), &NodePayload::element(5, "C")).unwrap();
        assert_eq!(registry.get(2).unwrap().children(), Some(&[5, 4, 3][..]));
        assert_sequence_links(&registry, 2);
    }

    #[test]
    fn test_renumber_after_arbitrary_mutations() {
        let mut registry = NodeRegistry::new();
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![NodePayload::element(2, "UL").with_children(vec![
                        NodePayload::element(3, "LI"),
                        NodePayload::element(4, "LI"),
                        NodePayload::element(5, "LI"),
                    ])]),
            )
            .unwrap();

        registry.remove_child(2, 4).unwrap();
        registry.unbind(4);
        assert_sequence_links(&registry, 2);
        assert_eq!(registry.get(2).unwrap().children(), Some(&[3, 5][..]));

        registry.insert_child(2, Some(3), &NodePayload::element(6, "LI")).unwrap();
        assert_sequence_links(&registry, 2);
        assert_eq!(registry.get(2).unwrap().children(), Some(&[3, 6, 5][..]));

        registry.remove_child(2, 3).unwrap();
        registry.unbind(3);
        registry.remove_child(2, 6).unwrap();
        registry.unbind(6);
        registry.remove_child(2, 5).unwrap();
        registry.unbind(5);

        let ul = registry.get(2).unwrap();
        assert_eq!(ul.children(), Some(&[][..]));
        assert_eq!(ul.first_child(), None);
        assert_eq!(ul.last_child(), None);
        assert_eq!(ul.child_node_count(), 0);
    }

    #[test]
    fn test_removal_priority_pseudo_then_shadow_then_children() {
        let mut registry = NodeRegistry::new();
        let host = NodePayload::element(2, "DIV")
            .with_children(vec![NodePayload::element(5, "SPAN")]);
        let host = NodePayload {
            shadow_roots: Some(vec![NodePayload {
                node_id: 3,
                node_type: NodeType::DocumentFragment as u8,
                node_name: "#document-fragment".to_owned(),
                shadow_root_type: Some("author".to_owned()),
                ..NodePayload::default()
            }]),
            pseudo_elements: Some(vec![NodePayload {
                pseudo_type: Some("before".to_owned()),
                ..NodePayload::element(4, "::before")
            }]),
            ..host
        };
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![host]),
            )
            .unwrap();

        assert!(registry.get(2).unwrap().has_pseudo_elements());
        registry.remove_child(2, 4).unwrap();
        assert!(!registry.get(2).unwrap().has_pseudo_elements());
        // Children untouched by the pseudo removal.
        assert_eq!(registry.get(2).unwrap().children(), Some(&[5][..]));

        assert!(registry.get(2).unwrap().has_shadow_roots());
        registry.remove_child(2, 3).unwrap();
        assert!(!registry.get(2).unwrap().has_shadow_roots());
        assert_eq!(registry.get(2).unwrap().children(), Some(&[5][..]));

        registry.remove_child(2, 5).unwrap();
        assert_eq!(registry.get(2).unwrap().children(), Some(&[][..]));
    }

    #[test]
    fn test_unbind_reaches_all_owned_slots() {
        let mut registry = NodeRegistry::new();
        let template = NodePayload {
            template_content: Some(Box::new(
                NodePayload::element(6, "CONTENT").with_children(vec![NodePayload::text(7, "x")]),
            )),
            ..NodePayload::element(5, "TEMPLATE")
        };
        let host = NodePayload {
            shadow_roots: Some(vec![NodePayload {
                node_id: 3,
                node_type: NodeType::DocumentFragment as u8,
                node_name: "#document-fragment".to_owned(),
                shadow_root_type: Some("user-agent".to_owned()),
                ..NodePayload::default()
            }]),
            pseudo_elements: Some(vec![NodePayload {
                pseudo_type: Some("after".to_owned()),
                ..NodePayload::element(4, "::after")
            }]),
            ..NodePayload::element(2, "DIV").with_children(vec![template])
        };
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![host]),
            )
            .unwrap();
        assert_eq!(registry.len(), 7);

        registry.remove_child(1, 2).unwrap();
        registry.unbind(2);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(1));
        for id in [2, 3, 4, 5, 6, 7] {
            assert!(!registry.contains(id), "node {id} still registered");
        }
    }

    #[test]
    fn test_content_document_is_sole_child() {
        let mut registry = NodeRegistry::new();
        let iframe = NodePayload {
            content_document: Some(Box::new(
                NodePayload::document(3, "http://example.com/frame.html", "http://example.com/sub/")
                    .with_children(vec![NodePayload::element(4, "HTML")]),
            )),
            ..NodePayload::element(2, "IFRAME")
        };
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![iframe]),
            )
            .unwrap();

        let host = registry.get(2).unwrap();
        assert_eq!(host.content_document(), Some(3));
        assert_eq!(host.children(), Some(&[3][..]));
        assert_eq!(registry.get(3).unwrap().parent(), Some(2));

        // Late children payloads never displace the content document.
        registry
            .set_children_payload(2, &[NodePayload::element(9, "P")])
            .unwrap();
        assert_eq!(registry.get(2).unwrap().children(), Some(&[3][..]));
        assert!(!registry.contains(9));

        // Inner document claims its own element slots, not the outer ones.
        assert_eq!(registry.get(3).unwrap().document().unwrap().document_element, Some(4));
        assert_eq!(registry.get(1).unwrap().document().unwrap().document_element, None);
        assert_eq!(registry.get(4).unwrap().owner_document(), Some(3));
    }

    #[test]
    fn test_detached_root_paths() {
        let mut registry = NodeRegistry::new();

        let standalone = registry
            .instantiate_detached(&NodePayload::element(10, "DIV").with_children(vec![
                NodePayload::text(11, "floating"),
            ]))
            .unwrap();
        assert_eq!(standalone, 10);
        assert!(registry.contains(11));
        assert_eq!(registry.get(10).unwrap().parent(), None);
        assert_eq!(registry.get(10).unwrap().owner_document(), None);

        let doc = registry
            .instantiate_detached(&NodePayload::document(20, "about:blank", "about:blank"))
            .unwrap();
        assert!(registry.get(doc).unwrap().document().is_some());
    }

    #[test]
    fn test_user_property_counts_three_levels() {
        let mut registry = NodeRegistry::new();
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![NodePayload::element(2, "HTML").with_children(vec![
                        NodePayload::element(3, "BODY")
                            .with_children(vec![NodePayload::element(4, "P")]),
                    ])]),
            )
            .unwrap();

        registry.set_user_property(4, "breakpoint", json!(true)).unwrap();
        for ancestor in [1, 2, 3] {
            assert_eq!(
                registry.get(ancestor).unwrap().descendant_user_property_count("breakpoint"),
                1,
                "ancestor {ancestor}"
            );
        }
        assert_eq!(registry.get(4).unwrap().descendant_user_property_count("breakpoint"), 0);

        // Value overwrite does not double-count.
        registry.set_user_property(4, "breakpoint", json!(false)).unwrap();
        assert_eq!(registry.get(1).unwrap().descendant_user_property_count("breakpoint"), 1);

        // Detach BODY (the leaf's parent): all three former ancestors drop to
        // zero and the counter entries vanish entirely.
        registry.remove_child(2, 3).unwrap();
        registry.unbind(3);
        for ancestor in [1, 2] {
            let node = registry.get(ancestor).unwrap();
            assert_eq!(node.descendant_user_property_count("breakpoint"), 0);
            assert!(node.descendant_user_property_counters.is_empty());
        }
    }

    #[test]
    fn test_user_property_subtree_removal_combines_counts() {
        let mut registry = NodeRegistry::new();
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![NodePayload::element(2, "HTML").with_children(vec![
                        NodePayload::element(3, "DIV").with_children(vec![
                            NodePayload::element(4, "SPAN"),
                            NodePayload::element(5, "SPAN"),
                        ]),
                        NodePayload::element(6, "DIV"),
                    ])]),
            )
            .unwrap();

        registry.set_user_property(3, "marked", json!(1)).unwrap();
        registry.set_user_property(4, "marked", json!(2)).unwrap();
        registry.set_user_property(5, "marked", json!(3)).unwrap();
        registry.set_user_property(6, "marked", json!(4)).unwrap();

        assert_eq!(registry.get(2).unwrap().descendant_user_property_count("marked"), 4);
        assert_eq!(registry.get(3).unwrap().descendant_user_property_count("marked"), 2);

        // Removing the DIV subtree takes its direct key and both descendant
        // counts off the chain in one combined delta.
        registry.remove_child(2, 3).unwrap();
        registry.unbind(3);
        assert_eq!(registry.get(2).unwrap().descendant_user_property_count("marked"), 1);
        assert_eq!(registry.get(1).unwrap().descendant_user_property_count("marked"), 1);
    }

    #[test]
    fn test_user_property_null_value_removes() {
        let mut registry = NodeRegistry::new();
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![NodePayload::element(2, "HTML")]),
            )
            .unwrap();

        registry.set_user_property(2, "note", json!("x")).unwrap();
        assert_eq!(registry.get(1).unwrap().descendant_user_property_count("note"), 1);

        registry.set_user_property(2, "note", Value::Null).unwrap();
        assert_eq!(registry.get(1).unwrap().descendant_user_property_count("note"), 0);
        assert!(registry.get(2).unwrap().get_user_property("note").is_none());

        // Removing an absent property leaves counters alone.
        registry.remove_user_property(2, "note").unwrap();
        assert_eq!(registry.get(1).unwrap().descendant_user_property_count("note"), 0);
    }

    #[test]
    fn test_resolve_url_nearest_base() {
        let mut registry = NodeRegistry::new();
        let iframe = NodePayload {
            content_document: Some(Box::new(
                NodePayload::document(3, "http://example.com/frame.html", "http://example.com/sub/")
                    .with_children(vec![NodePayload::element(4, "HTML")]),
            )),
            ..NodePayload::element(2, "IFRAME")
        };
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![iframe]),
            )
            .unwrap();

        assert_eq!(
            registry.resolve_url(4, "logo.png").as_deref(),
            Some("http://example.com/sub/logo.png")
        );
        assert_eq!(
            registry.resolve_url(2, "logo.png").as_deref(),
            Some("http://example.com/logo.png")
        );
        assert_eq!(
            registry.resolve_url(4, "http://other.org/x").as_deref(),
            Some("http://other.org/x")
        );
        assert_eq!(registry.resolve_url(4, ""), None);

        let detached = registry.instantiate_detached(&NodePayload::element(9, "DIV")).unwrap();
        assert_eq!(registry.resolve_url(detached, "logo.png"), None);
    }

    #[test]
    fn test_ancestry_queries() {
        let mut registry = NodeRegistry::new();
        registry.instantiate_document(&simple_document()).unwrap();

        assert!(registry.is_ancestor(1, 4));
        assert!(registry.is_ancestor(2, 4));
        assert!(!registry.is_ancestor(4, 2));
        assert!(!registry.is_ancestor(3, 4));
        assert!(registry.is_descendant(4, 2));
        // A node is not its own ancestor.
        assert!(!registry.is_ancestor(2, 2));
    }

    #[test]
    fn test_node_path() {
        let mut registry = NodeRegistry::new();
        registry.instantiate_document(&simple_document()).unwrap();
        assert_eq!(registry.node_path(4), "0,HTML,1,BODY");
    }

    #[test]
    fn test_xml_casing() {
        let mut registry = NodeRegistry::new();
        let mut payload = NodePayload::document(1, "http://example.com/feed.xml", "http://example.com/");
        payload.xml_version = Some("1.0".to_owned());
        let payload = payload.with_children(vec![NodePayload::element(2, "Feed")]);
        registry.instantiate_document(&payload).unwrap();

        assert!(registry.is_xml_node(2));
        assert_eq!(registry.node_name_in_correct_case(2).as_deref(), Some("Feed"));

        let mut registry = NodeRegistry::new();
        registry.instantiate_document(&simple_document()).unwrap();
        assert!(!registry.is_xml_node(2));
        assert_eq!(registry.node_name_in_correct_case(2).as_deref(), Some("html"));
    }

    #[test]
    fn test_traverse_df_order() {
        let mut registry = NodeRegistry::new();
        registry.instantiate_document(&simple_document()).unwrap();

        let mut visited = Vec::new();
        registry
            .traverse_df(1, |node| {
                visited.push(node.node_name().to_owned());
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, vec!["#document", "HTML", "HEAD", "BODY"]);
    }

    #[test]
    fn test_child_count_tracks_lazy_loading() {
        let mut registry = NodeRegistry::new();
        let mut parent = NodePayload::element(2, "DIV");
        parent.child_node_count = Some(12);
        registry
            .instantiate_document(
                &NodePayload::document(1, "http://example.com/", "http://example.com/")
                    .with_children(vec![parent]),
            )
            .unwrap();

        // Declared count survives construction; children stay unloaded.
        let div = registry.get(2).unwrap();
        assert_eq!(div.child_node_count(), 12);
        assert!(div.children().is_none());

        // Loading the real children snaps the count to the loaded length.
        registry
            .set_children_payload(2, &[NodePayload::element(3, "P")])
            .unwrap();
        let div = registry.get(2).unwrap();
        assert_eq!(div.child_node_count(), 1);
        assert_eq!(div.children(), Some(&[3][..]));
    }
}
