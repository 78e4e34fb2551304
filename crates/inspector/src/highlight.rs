//! Node highlighting seam
//!
//! Highlighting renders on the remote end; this module only builds the
//! request configuration and gives embedders a swappable seam, the default
//! forwarding straight to the backend.

use crate::backend::{BackendResult, DomBackend};
use async_trait::async_trait;
use mirror::NodeId;
use serde::Serialize;
use std::sync::Arc;

/// RGBA color in protocol form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

const CONTENT: Rgba = Rgba { r: 111, g: 168, b: 220, a: 0.66 };
const PADDING: Rgba = Rgba { r: 147, g: 196, b: 125, a: 0.55 };
const BORDER: Rgba = Rgba { r: 255, g: 229, b: 153, a: 0.66 };
const MARGIN: Rgba = Rgba { r: 246, g: 178, b: 107, a: 0.66 };
const EVENT_TARGET: Rgba = Rgba { r: 255, g: 196, b: 196, a: 0.66 };

/// Which box regions the highlight overlay paints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HighlightMode {
    #[default]
    All,
    Content,
    Padding,
    Border,
    Margin,
}

/// Overlay configuration sent with highlight requests.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightConfig {
    pub show_info: bool,
    pub show_rulers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_color: Option<Rgba>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_color: Option<Rgba>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color: Option<Rgba>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_color: Option<Rgba>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_target_color: Option<Rgba>,
}

impl HighlightConfig {
    pub fn for_mode(mode: HighlightMode) -> Self {
        let all = mode == HighlightMode::All;
        Self {
            show_info: all,
            show_rulers: false,
            content_color: (all || mode == HighlightMode::Content).then_some(CONTENT),
            padding_color: (all || mode == HighlightMode::Padding).then_some(PADDING),
            border_color: (all || mode == HighlightMode::Border).then_some(BORDER),
            margin_color: (all || mode == HighlightMode::Margin).then_some(MARGIN),
            event_target_color: all.then_some(EVENT_TARGET),
        }
    }
}

/// Seam for highlight and inspect-mode requests.
#[async_trait]
pub trait NodeHighlighter: Send + Sync {
    /// Highlight a node or a remote object; clears the highlight when both
    /// targets are absent.
    async fn highlight_node(
        &self,
        node_id: Option<NodeId>,
        config: &HighlightConfig,
        object_id: Option<&str>,
    ) -> BackendResult<()>;

    async fn set_inspect_mode(
        &self,
        enabled: bool,
        inspect_shadow_dom: bool,
        config: &HighlightConfig,
    ) -> BackendResult<()>;
}

/// Default highlighter - forwards to the backend.
pub struct BackendHighlighter {
    backend: Arc<dyn DomBackend>,
}

impl BackendHighlighter {
    pub fn new(backend: Arc<dyn DomBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl NodeHighlighter for BackendHighlighter {
    async fn highlight_node(
        &self,
        node_id: Option<NodeId>,
        config: &HighlightConfig,
        object_id: Option<&str>,
    ) -> BackendResult<()> {
        if object_id.is_some() || node_id.is_some() {
            // An object reference wins over a node id when both are given.
            let node_id = if object_id.is_some() { None } else { node_id };
            self.backend.highlight_node(config, node_id, object_id).await
        } else {
            self.backend.hide_highlight().await
        }
    }

    async fn set_inspect_mode(
        &self,
        enabled: bool,
        inspect_shadow_dom: bool,
        config: &HighlightConfig,
    ) -> BackendResult<()> {
        self.backend
            .set_inspect_mode_enabled(enabled, inspect_shadow_dom, config)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selects_colors() {
        let all = HighlightConfig::for_mode(HighlightMode::All);
        assert!(all.show_info);
        assert!(all.content_color.is_some());
        assert!(all.margin_color.is_some());
        assert!(all.event_target_color.is_some());

        let content = HighlightConfig::for_mode(HighlightMode::Content);
        assert!(!content.show_info);
        assert!(content.content_color.is_some());
        assert!(content.padding_color.is_none());
        assert!(content.event_target_color.is_none());
    }

    #[test]
    fn test_config_serializes_camel_case() {
        let json = serde_json::to_value(HighlightConfig::for_mode(HighlightMode::Border)).unwrap();
        assert_eq!(json["showInfo"], false);
        assert!(json.get("borderColor").is_some());
        assert!(json.get("contentColor").is_none());
    }
}
