//! Mirror document metadata
//!
//! A document is an ordinary mirror node of document type whose detail slot
//! carries this metadata; `MirrorDocument` is the cheap handle the
//! synchronizer hands out for the current generation's root.

use crate::types::{NodeId, NodePayload};

/// Document-level metadata stored on a document root node (including iframe
/// content documents).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub document_url: String,
    /// Required, non-empty. Relative URL resolution anchors here.
    pub base_url: String,
    pub xml_version: Option<String>,
    /// First HTML element constructed under this document. Inner iframe
    /// documents claim their own slot, never the outer document's.
    pub document_element: Option<NodeId>,
    /// First BODY element constructed under this document.
    pub body: Option<NodeId>,
}

impl DocumentInfo {
    pub(crate) fn from_payload(payload: &NodePayload) -> Self {
        let base_url = payload.base_url.clone().unwrap_or_default();
        debug_assert!(!base_url.is_empty(), "document payload without a base URL");
        Self {
            document_url: payload.document_url.clone().unwrap_or_default(),
            base_url,
            xml_version: payload.xml_version.clone(),
            document_element: None,
            body: None,
        }
    }

    pub fn is_xml(&self) -> bool {
        self.xml_version.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Handle to a document generation's root node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorDocument {
    root: NodeId,
}

impl MirrorDocument {
    pub(crate) fn new(root: NodeId) -> Self {
        Self { root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }
}
