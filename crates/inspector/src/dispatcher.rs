//! Inbound event routing
//!
//! Adapts raw protocol envelopes to typed agent calls. The transport (out
//! of scope) feeds every decoded push event through `dispatch`; unknown
//! methods are ignored so unrelated domains can share the connection.

use crate::agent::{DomMirror, InspectorError, Result};
use crate::protocol::ProtocolEvent;
use mirror::{NodeId, NodePayload};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeModified {
    node_id: NodeId,
    name: String,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeRemoved {
    node_id: NodeId,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineStyleInvalidated {
    node_ids: Vec<NodeId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterDataModified {
    node_id: NodeId,
    character_data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetChildNodes {
    #[serde(default)]
    parent_id: NodeId,
    nodes: Vec<NodePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildNodeCountUpdated {
    node_id: NodeId,
    child_node_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildNodeInserted {
    parent_node_id: NodeId,
    #[serde(default)]
    previous_node_id: NodeId,
    node: NodePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildNodeRemoved {
    parent_node_id: NodeId,
    node_id: NodeId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShadowRootPushed {
    host_id: NodeId,
    root: NodePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShadowRootPopped {
    host_id: NodeId,
    root_id: NodeId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PseudoElementAdded {
    parent_id: NodeId,
    pseudo_element: NodePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PseudoElementRemoved {
    parent_id: NodeId,
    pseudo_element_id: NodeId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeIdParam {
    node_id: NodeId,
}

/// Routes raw DOM-domain push events to the agent.
pub struct DomDispatcher {
    agent: Arc<DomMirror>,
}

impl DomDispatcher {
    pub fn new(agent: Arc<DomMirror>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<DomMirror> {
        &self.agent
    }

    /// Route one decoded push event. Malformed parameters are an error;
    /// methods outside the DOM domain are ignored.
    pub async fn dispatch(&self, event: &ProtocolEvent) -> Result<()> {
        let params = event.params.clone().unwrap_or(Value::Null);
        match event.method.as_str() {
            "DOM.documentUpdated" => {
                self.agent.document_updated().await;
            }
            "DOM.attributeModified" => {
                let p: AttributeModified = parse(params)?;
                self.agent.attribute_modified(p.node_id, &p.name, &p.value).await;
            }
            "DOM.attributeRemoved" => {
                let p: AttributeRemoved = parse(params)?;
                self.agent.attribute_removed(p.node_id, &p.name).await;
            }
            "DOM.inlineStyleInvalidated" => {
                let p: InlineStyleInvalidated = parse(params)?;
                self.agent.inline_style_invalidated(&p.node_ids);
            }
            "DOM.characterDataModified" => {
                let p: CharacterDataModified = parse(params)?;
                self.agent.character_data_modified(p.node_id, &p.character_data).await;
            }
            "DOM.setChildNodes" => {
                let p: SetChildNodes = parse(params)?;
                self.agent.set_child_nodes(p.parent_id, p.nodes).await;
            }
            "DOM.childNodeCountUpdated" => {
                let p: ChildNodeCountUpdated = parse(params)?;
                self.agent.child_node_count_updated(p.node_id, p.child_node_count).await;
            }
            "DOM.childNodeInserted" => {
                let p: ChildNodeInserted = parse(params)?;
                self.agent
                    .child_node_inserted(p.parent_node_id, p.previous_node_id, p.node)
                    .await;
            }
            "DOM.childNodeRemoved" => {
                let p: ChildNodeRemoved = parse(params)?;
                self.agent.child_node_removed(p.parent_node_id, p.node_id).await;
            }
            "DOM.shadowRootPushed" => {
                let p: ShadowRootPushed = parse(params)?;
                self.agent.shadow_root_pushed(p.host_id, p.root).await;
            }
            "DOM.shadowRootPopped" => {
                let p: ShadowRootPopped = parse(params)?;
                self.agent.shadow_root_popped(p.host_id, p.root_id).await;
            }
            "DOM.pseudoElementAdded" => {
                let p: PseudoElementAdded = parse(params)?;
                self.agent.pseudo_element_added(p.parent_id, p.pseudo_element).await;
            }
            "DOM.pseudoElementRemoved" => {
                let p: PseudoElementRemoved = parse(params)?;
                self.agent.pseudo_element_removed(p.parent_id, p.pseudo_element_id).await;
            }
            "DOM.pseudoStateChanged" => {
                let p: NodeIdParam = parse(params)?;
                self.agent.pseudo_state_changed(p.node_id).await;
            }
            "DOM.inspectNodeRequested" => {
                let p: NodeIdParam = parse(params)?;
                self.agent.inspect_node_requested(p.node_id).await;
            }
            other => {
                tracing::trace!(method = other, "ignoring unhandled inspector event");
            }
        }
        Ok(())
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(InspectorError::from)
}
