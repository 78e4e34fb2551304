//! Mirror session example - syncing a scripted page through the dispatcher

use async_trait::async_trait;
use inspector::{BackendResult, DomBackend, DomDispatcher, DomMirror, ProtocolEvent};
use mirror::{NodeId, NodePayload, NodeRegistry};
use serde_json::json;
use std::sync::Arc;

/// Backend with a canned document - stands in for a real transport.
struct ScriptedBackend;

#[async_trait]
impl DomBackend for ScriptedBackend {
    async fn get_document(&self) -> BackendResult<NodePayload> {
        Ok(
            NodePayload::document(1, "http://example.com/index.html", "http://example.com/")
                .with_children(vec![NodePayload::element(2, "HTML").with_children(vec![
                    NodePayload::element(3, "HEAD"),
                    NodePayload::element(4, "BODY").with_children(vec![
                        NodePayload::element(5, "H1").with_children(vec![NodePayload::text(
                            6,
                            "Hello",
                        )]),
                    ]),
                ])]),
        )
    }

    async fn request_child_nodes(
        &self,
        _node_id: NodeId,
        _depth: Option<u32>,
    ) -> BackendResult<()> {
        Ok(())
    }
}

fn print_tree(registry: &NodeRegistry, id: NodeId, depth: usize) {
    let Some(node) = registry.lookup(id) else { return };
    println!("{}{} #{}", "  ".repeat(depth), node.node_name(), node.id());
    if let Some(children) = node.children() {
        for &child in children {
            print_tree(registry, child, depth + 1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let agent = DomMirror::new(Arc::new(ScriptedBackend));
    let mut events = agent.subscribe();

    let document = agent.request_document().await.expect("scripted fetch");
    println!("Document loaded, root #{}", document.root());

    let dispatcher = DomDispatcher::new(agent.clone());

    // A few push events, as the remote end would send them.
    dispatcher
        .dispatch(&ProtocolEvent::new(
            "DOM.childNodeInserted",
            json!({
                "parentNodeId": 4,
                "previousNodeId": 5,
                "node": {"nodeId": 7, "nodeType": 1, "nodeName": "P", "localName": "p", "nodeValue": ""}
            }),
        ))
        .await?;

    dispatcher
        .dispatch(&ProtocolEvent::new(
            "DOM.attributeModified",
            json!({"nodeId": 4, "name": "class", "value": "ready"}),
        ))
        .await?;

    dispatcher
        .dispatch(&ProtocolEvent::new(
            "DOM.characterDataModified",
            json!({"nodeId": 6, "characterData": "Hello, mirror"}),
        ))
        .await?;

    while let Ok(event) = events.try_recv() {
        println!("event: {event:?}");
    }

    println!("\nMirror tree:");
    agent
        .with_registry(|registry| print_tree(registry, document.root(), 0))
        .await;

    let body_class = agent
        .with_node(4, |node| node.get_attribute("class").map(str::to_owned))
        .await
        .flatten();
    println!("\nBODY class: {body_class:?}");

    Ok(())
}
