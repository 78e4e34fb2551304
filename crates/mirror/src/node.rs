//! Mirror tree node entity
//!
//! A `MirrorNode` is one node of the client-held replica of the remote
//! document. The registry map owns every node; all structural links here
//! (parent, siblings, children, shadow roots, pseudo elements, template
//! content) are plain ids resolved through the registry, so tearing down a
//! subtree is a single deregistration pass with no reference cycles.

use crate::document::DocumentInfo;
use crate::error::{MirrorError, Result};
use crate::types::{Attribute, NodeId, NodePayload, NodeType, PseudoElementKind, ShadowRootKind};
use ahash::AHashMap;
use serde_json::Value;
use smallvec::SmallVec;

/// Extra data carried only by particular node kinds.
#[derive(Debug, Clone)]
pub enum NodeDetail {
    /// Document metadata; present on document roots and iframe content
    /// documents.
    Document(DocumentInfo),
    /// Document type declaration fields.
    Doctype(DoctypeInfo),
    /// Standalone attribute node form.
    Attribute { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeInfo {
    pub public_id: String,
    pub system_id: String,
    pub internal_subset: String,
}

/// One node of the mirror tree.
///
/// Field groups mirror the remote payload shape: identity and kind first,
/// then the attribute store (ordered sequence + name-keyed lookup, always in
/// sync), user-attached metadata with ancestor-aggregated counters, owned
/// structural slots, and finally the derived sibling links which are only
/// ever written by the registry's renumber pass.
#[derive(Debug, Clone)]
pub struct MirrorNode {
    id: NodeId,
    node_type: NodeType,
    node_name: String,
    local_name: String,
    node_value: String,
    pseudo_type: Option<PseudoElementKind>,
    shadow_root_kind: Option<ShadowRootKind>,
    in_shadow_tree: bool,
    owner_document: Option<NodeId>,

    pub(crate) attributes: Vec<Attribute>,
    pub(crate) attributes_map: AHashMap<String, String>,

    pub(crate) user_properties: AHashMap<String, Value>,
    pub(crate) descendant_user_property_counters: AHashMap<String, u32>,

    /// Declared child count; may exceed the loaded children length when the
    /// subtree has not been fetched yet.
    pub(crate) child_node_count: u32,
    /// `None` = never loaded, distinct from loaded-but-empty.
    pub(crate) children: Option<SmallVec<[NodeId; 4]>>,
    pub(crate) shadow_roots: Vec<NodeId>,
    pub(crate) pseudo_elements: AHashMap<PseudoElementKind, NodeId>,
    pub(crate) template_content: Option<NodeId>,
    pub(crate) content_document: Option<NodeId>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) previous_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) index: Option<u32>,

    pub(crate) detail: Option<Box<NodeDetail>>,
}

impl MirrorNode {
    /// Build a node from a raw payload. Does not touch the payload's subtree
    /// fields - the registry walks those and wires up the ids.
    pub(crate) fn from_payload(
        payload: &NodePayload,
        owner_document: Option<NodeId>,
        in_shadow_tree: bool,
    ) -> Result<Self> {
        let node_type = NodeType::from_u8(payload.node_type)
            .ok_or(MirrorError::InvalidNodeType(payload.node_type))?;

        let mut node = Self {
            id: payload.node_id,
            node_type,
            node_name: payload.node_name.clone(),
            local_name: payload.local_name.clone(),
            node_value: payload.node_value.clone(),
            pseudo_type: payload
                .pseudo_type
                .as_deref()
                .and_then(PseudoElementKind::from_protocol),
            shadow_root_kind: payload
                .shadow_root_type
                .as_deref()
                .and_then(ShadowRootKind::from_protocol),
            in_shadow_tree,
            owner_document,
            attributes: Vec::new(),
            attributes_map: AHashMap::new(),
            user_properties: AHashMap::new(),
            descendant_user_property_counters: AHashMap::new(),
            child_node_count: payload.child_node_count.unwrap_or(0),
            children: None,
            shadow_roots: Vec::new(),
            pseudo_elements: AHashMap::new(),
            template_content: None,
            content_document: None,
            parent: None,
            previous_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            index: None,
            detail: None,
        };

        if let Some(attrs) = &payload.attributes {
            node.set_attributes_payload(attrs);
        }

        node.detail = match node_type {
            NodeType::DocumentType => Some(Box::new(NodeDetail::Doctype(DoctypeInfo {
                public_id: payload.public_id.clone().unwrap_or_default(),
                system_id: payload.system_id.clone().unwrap_or_default(),
                internal_subset: payload.internal_subset.clone().unwrap_or_default(),
            }))),
            NodeType::Attribute => Some(Box::new(NodeDetail::Attribute {
                name: payload.name.clone().unwrap_or_default(),
                value: payload.value.clone().unwrap_or_default(),
            })),
            _ => None,
        };

        Ok(node)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn node_value(&self) -> &str {
        &self.node_value
    }

    /// Character-data update pushed by the remote end.
    pub fn set_node_value(&mut self, value: &str) {
        self.node_value = value.to_owned();
    }

    pub fn pseudo_type(&self) -> Option<PseudoElementKind> {
        self.pseudo_type
    }

    pub fn shadow_root_kind(&self) -> Option<ShadowRootKind> {
        self.shadow_root_kind
    }

    pub fn is_in_shadow_tree(&self) -> bool {
        self.in_shadow_tree
    }

    pub fn owner_document(&self) -> Option<NodeId> {
        self.owner_document
    }

    /// Loaded children, or `None` when the subtree was never fetched.
    /// Never triggers a fetch.
    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    /// Declared child count from the remote end; when it exceeds
    /// `children().len()` the subtree is lazily loadable.
    pub fn child_node_count(&self) -> u32 {
        self.child_node_count
    }

    /// Update the declared count independently of the loaded children.
    pub fn set_child_node_count(&mut self, count: u32) {
        self.child_node_count = count;
    }

    pub fn shadow_roots(&self) -> &[NodeId] {
        &self.shadow_roots
    }

    pub fn has_shadow_roots(&self) -> bool {
        !self.shadow_roots.is_empty()
    }

    pub fn pseudo_elements(&self) -> &AHashMap<PseudoElementKind, NodeId> {
        &self.pseudo_elements
    }

    pub fn has_pseudo_elements(&self) -> bool {
        !self.pseudo_elements.is_empty()
    }

    pub fn template_content(&self) -> Option<NodeId> {
        self.template_content
    }

    pub fn content_document(&self) -> Option<NodeId> {
        self.content_document
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn previous_sibling(&self) -> Option<NodeId> {
        self.previous_sibling
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    /// 0-based position among the parent's loaded children.
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    pub fn is_text(&self) -> bool {
        self.node_type == NodeType::Text
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes_map.get(name).map(String::as_str)
    }

    pub fn detail(&self) -> Option<&NodeDetail> {
        self.detail.as_deref()
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        match self.detail.as_deref() {
            Some(NodeDetail::Document(info)) => Some(info),
            _ => None,
        }
    }

    pub(crate) fn document_mut(&mut self) -> Option<&mut DocumentInfo> {
        match self.detail.as_deref_mut() {
            Some(NodeDetail::Document(info)) => Some(info),
            _ => None,
        }
    }

    pub fn doctype(&self) -> Option<&DoctypeInfo> {
        match self.detail.as_deref() {
            Some(NodeDetail::Doctype(info)) => Some(info),
            _ => None,
        }
    }

    pub fn get_user_property(&self, name: &str) -> Option<&Value> {
        self.user_properties.get(name)
    }

    pub fn has_user_property(&self, name: &str) -> bool {
        self.user_properties.contains_key(name)
    }

    /// How many strict descendants carry `name` as a direct user property.
    /// Zero counts are never stored.
    pub fn descendant_user_property_count(&self, name: &str) -> u32 {
        self.descendant_user_property_counters
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Replace the attribute sequence and lookup from a flat name/value pair
    /// sequence. Returns whether the observable attribute set changed:
    /// unconditionally true when the pair count differs from the prior
    /// attribute count, otherwise true when any incoming name is missing from
    /// the prior lookup or maps to a different value. This short-circuit on
    /// count shape is a known approximation kept on purpose - listeners may
    /// depend on its exact behavior.
    pub fn set_attributes_payload(&mut self, flat_pairs: &[String]) -> bool {
        let mut changed = flat_pairs.len() != self.attributes.len() * 2;
        let old_map = std::mem::take(&mut self.attributes_map);

        self.attributes.clear();
        for pair in flat_pairs.chunks_exact(2) {
            let (name, value) = (&pair[0], &pair[1]);
            self.add_attribute(name.clone(), value.clone());

            if changed {
                continue;
            }

            if old_map.get(name).map(String::as_str) != Some(value.as_str()) {
                changed = true;
            }
        }
        changed
    }

    /// Incremental single-attribute update, keeping sequence and lookup in
    /// sync.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if let Some(existing) = self.attributes_map.get_mut(name) {
            *existing = value.to_owned();
            if let Some(attr) = self.attributes.iter_mut().find(|a| a.name == name) {
                attr.value = value.to_owned();
            }
        } else {
            self.add_attribute(name.to_owned(), value.to_owned());
        }
    }

    /// Incremental single-attribute removal; no-op when absent.
    pub fn remove_attribute(&mut self, name: &str) {
        if self.attributes_map.remove(name).is_some() {
            self.attributes.retain(|a| a.name != name);
        }
    }

    fn add_attribute(&mut self, name: String, value: String) {
        self.attributes_map.insert(name.clone(), value.clone());
        self.attributes.push(Attribute { name, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn div() -> MirrorNode {
        MirrorNode::from_payload(&NodePayload::element(1, "DIV"), None, false).unwrap()
    }

    fn pairs(flat: &[&str]) -> Vec<String> {
        flat.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_from_payload_basic() {
        let node = MirrorNode::from_payload(
            &NodePayload::element(5, "SPAN").with_attributes(&["id", "greeting"]),
            Some(1),
            false,
        )
        .unwrap();

        assert_eq!(node.id(), 5);
        assert_eq!(node.node_type(), NodeType::Element);
        assert_eq!(node.node_name(), "SPAN");
        assert_eq!(node.local_name(), "span");
        assert_eq!(node.owner_document(), Some(1));
        assert_eq!(node.get_attribute("id"), Some("greeting"));
        assert!(node.children().is_none());
    }

    #[test]
    fn test_from_payload_rejects_bad_node_type() {
        let payload = NodePayload {
            node_type: 42,
            ..NodePayload::element(1, "DIV")
        };
        assert!(matches!(
            MirrorNode::from_payload(&payload, None, false),
            Err(MirrorError::InvalidNodeType(42))
        ));
    }

    #[test]
    fn test_doctype_detail() {
        let payload = NodePayload {
            node_id: 2,
            node_type: NodeType::DocumentType as u8,
            node_name: "html".to_owned(),
            public_id: Some("-//W3C//DTD HTML 4.01//EN".to_owned()),
            system_id: Some("http://www.w3.org/TR/html4/strict.dtd".to_owned()),
            ..NodePayload::default()
        };
        let node = MirrorNode::from_payload(&payload, Some(1), false).unwrap();
        let doctype = node.doctype().unwrap();
        assert_eq!(doctype.public_id, "-//W3C//DTD HTML 4.01//EN");
        assert_eq!(doctype.internal_subset, "");
    }

    #[test]
    fn test_attributes_payload_replaces_and_syncs() {
        let mut node = div();
        node.set_attributes_payload(&pairs(&["id", "a", "class", "x"]));

        assert_eq!(node.attributes().len(), 2);
        assert_eq!(node.get_attribute("id"), Some("a"));
        assert_eq!(node.get_attribute("class"), Some("x"));

        node.set_attributes_payload(&pairs(&["id", "b"]));
        assert_eq!(node.attributes().len(), 1);
        assert_eq!(node.get_attribute("id"), Some("b"));
        assert_eq!(node.get_attribute("class"), None);
    }

    #[test]
    fn test_attributes_changed_on_count_difference() {
        let mut node = div();
        assert!(node.set_attributes_payload(&pairs(&["id", "a"])));
        assert!(node.set_attributes_payload(&pairs(&["id", "a", "class", "x"])));
        assert!(node.set_attributes_payload(&pairs(&[])));
    }

    #[test]
    fn test_attributes_changed_on_value_difference() {
        let mut node = div();
        node.set_attributes_payload(&pairs(&["id", "a", "class", "x"]));

        // Same count, same values: unchanged.
        assert!(!node.set_attributes_payload(&pairs(&["id", "a", "class", "x"])));
        // Same count, one value differs.
        assert!(node.set_attributes_payload(&pairs(&["id", "a", "class", "y"])));
        // Same count, renamed key.
        assert!(node.set_attributes_payload(&pairs(&["id", "a", "role", "y"])));
    }

    #[test]
    fn test_attributes_same_count_every_value_differs() {
        let mut node = div();
        node.set_attributes_payload(&pairs(&["a", "1", "b", "2"]));
        assert!(node.set_attributes_payload(&pairs(&["c", "3", "d", "4"])));
    }

    #[test]
    fn test_attributes_odd_pair_tail_ignored() {
        let mut node = div();
        node.set_attributes_payload(&pairs(&["id", "a", "dangling"]));
        assert_eq!(node.attributes().len(), 1);
        assert_eq!(node.get_attribute("id"), Some("a"));
    }

    #[test]
    fn test_set_and_remove_attribute() {
        let mut node = div();
        node.set_attribute("id", "a");
        node.set_attribute("class", "x");
        node.set_attribute("id", "b");

        assert_eq!(node.attributes().len(), 2);
        assert_eq!(node.attributes()[0].value, "b");
        assert_eq!(node.get_attribute("id"), Some("b"));

        node.remove_attribute("id");
        assert_eq!(node.attributes().len(), 1);
        assert_eq!(node.get_attribute("id"), None);

        // Removing an absent attribute is a no-op.
        node.remove_attribute("id");
        assert_eq!(node.attributes().len(), 1);
    }
}
