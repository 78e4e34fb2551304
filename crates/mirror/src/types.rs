//! Core type definitions for the mirror tree
//!
//! Key design points:
//! 1. Node identity is the protocol-assigned id (u32), unique per document
//!    generation. `0` is the protocol's "absent" sentinel.
//! 2. Structural links are plain ids, never pointers - the registry map is
//!    the single owner of every node.
//! 3. Raw payloads deserialize straight off the wire with serde.

use serde::{Deserialize, Serialize};

/// Node identifier assigned by the remote protocol.
///
/// Unique within one document generation; the remote end reuses ids freely
/// across generations, so ids must never be held across a document reset.
pub type NodeId = u32;

/// Node type matching the DOM specification numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CdataSection = 4,
    EntityReference = 5,
    Entity = 6,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
    Notation = 12,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            2 => Some(NodeType::Attribute),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            5 => Some(NodeType::EntityReference),
            6 => Some(NodeType::Entity),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            12 => Some(NodeType::Notation),
            _ => None,
        }
    }
}

/// Pseudo element kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoElementKind {
    Before,
    After,
}

impl PseudoElementKind {
    pub fn from_protocol(value: &str) -> Option<Self> {
        match value {
            "before" => Some(PseudoElementKind::Before),
            "after" => Some(PseudoElementKind::After),
            _ => None,
        }
    }

    pub fn as_protocol(&self) -> &'static str {
        match self {
            PseudoElementKind::Before => "before",
            PseudoElementKind::After => "after",
        }
    }
}

/// Shadow root kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowRootKind {
    UserAgent,
    Author,
}

impl ShadowRootKind {
    pub fn from_protocol(value: &str) -> Option<Self> {
        match value {
            "user-agent" => Some(ShadowRootKind::UserAgent),
            "author" => Some(ShadowRootKind::Author),
            _ => None,
        }
    }
}

/// A single attribute record. The ordered attribute sequence and the
/// name-keyed lookup on a node both describe this data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Raw node description received from the remote collaborator.
///
/// Field names match the wire protocol; everything beyond the identity
/// triple is optional because the remote end elides what does not apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePayload {
    pub node_id: NodeId,
    pub node_type: u8,
    pub node_name: String,
    pub local_name: String,
    pub node_value: String,
    pub child_node_count: Option<u32>,
    pub children: Option<Vec<NodePayload>>,
    /// Flat name/value pair sequence: [name0, value0, name1, value1, ...]
    pub attributes: Option<Vec<String>>,
    pub shadow_roots: Option<Vec<NodePayload>>,
    pub pseudo_elements: Option<Vec<NodePayload>>,
    pub template_content: Option<Box<NodePayload>>,
    pub content_document: Option<Box<NodePayload>>,
    #[serde(rename = "documentURL")]
    pub document_url: Option<String>,
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
    pub xml_version: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub internal_subset: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub pseudo_type: Option<String>,
    pub shadow_root_type: Option<String>,
}

impl NodePayload {
    /// Element payload with sensible defaults (handy for backends and tests)
    pub fn element(node_id: NodeId, node_name: &str) -> Self {
        Self {
            node_id,
            node_type: NodeType::Element as u8,
            node_name: node_name.to_owned(),
            local_name: node_name.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Text node payload
    pub fn text(node_id: NodeId, value: &str) -> Self {
        Self {
            node_id,
            node_type: NodeType::Text as u8,
            node_name: "#text".to_owned(),
            node_value: value.to_owned(),
            ..Self::default()
        }
    }

    /// Document payload. Base URL is required by the document contract.
    pub fn document(node_id: NodeId, document_url: &str, base_url: &str) -> Self {
        Self {
            node_id,
            node_type: NodeType::Document as u8,
            node_name: "#document".to_owned(),
            document_url: Some(document_url.to_owned()),
            base_url: Some(base_url.to_owned()),
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<NodePayload>) -> Self {
        self.child_node_count = Some(children.len() as u32);
        self.children = Some(children);
        self
    }

    pub fn with_attributes(mut self, flat_pairs: &[&str]) -> Self {
        self.attributes = Some(flat_pairs.iter().map(|s| (*s).to_owned()).collect());
        self
    }
}
