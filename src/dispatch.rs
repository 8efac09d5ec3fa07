//! Bundle aggregation and dispatch.
//!
//! Builds the ordered multi-part message (info part, standalone part,
//! shared-session part) and hands it to the external messaging gateway.
//! Delivery is fire-and-forget at this layer: the gateway gets no retry
//! contract from the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ResourceBundle, StandaloneLine, UNLOCK_CODE};

/// One content item inside a message node, shaped for the gateway wire
/// format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeContent {
    Text { text: String },
    Image { file: String },
}

/// One node of the multi-part message: a sender identity plus its content
/// list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageNode {
    pub sender_id: String,
    pub sender_name: String,
    pub content: Vec<NodeContent>,
}

/// Short metadata shown on the collapsed message card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMeta {
    pub source: String,
    pub summary: String,
    pub prompt: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// External messaging-gateway collaborator. `dispatch` delivers one
/// multi-part bundle; `notify` sends a plain one-line notice.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn dispatch(
        &self,
        conversation_id: &str,
        nodes: Vec<MessageNode>,
        meta: DispatchMeta,
    ) -> Result<(), GatewayError>;

    async fn notify(&self, conversation_id: &str, text: &str) -> Result<(), GatewayError>;
}

/// Builds the dispatchable node list and summary out of a resolved bundle.
pub struct ResultAggregator {
    sender_name: String,
    info_part: String,
    info_image: Option<String>,
}

impl ResultAggregator {
    pub fn new(sender_name: String, info_part: String, info_image: Option<String>) -> Self {
        Self {
            sender_name,
            info_part,
            info_image,
        }
    }

    fn node(&self, sender_id: &str, content: Vec<NodeContent>) -> MessageNode {
        MessageNode {
            sender_id: sender_id.to_string(),
            sender_name: self.sender_name.clone(),
            content,
        }
    }

    /// Assemble the ordered parts: info, standalone, shared-session.
    pub fn build(&self, bundle: &ResourceBundle, sender_id: &str) -> (Vec<MessageNode>, DispatchMeta) {
        let mut nodes = Vec::with_capacity(3);

        if !self.info_part.is_empty() || self.info_image.is_some() {
            let mut content = Vec::new();
            if !self.info_part.is_empty() {
                content.push(NodeContent::Text {
                    text: self.info_part.clone(),
                });
            }
            if let Some(image) = &self.info_image {
                content.push(NodeContent::Image {
                    file: image.clone(),
                });
            }
            nodes.push(self.node(sender_id, content));
        }

        nodes.push(self.node(sender_id, vec![NodeContent::Text {
            text: render_standalone(bundle),
        }]));
        nodes.push(self.node(sender_id, vec![NodeContent::Text {
            text: render_coop(bundle),
        }]));

        let standalone_links = bundle
            .standalone
            .iter()
            .filter(|line| matches!(line, StandaloneLine::Link { .. }))
            .count();
        let coop_links = bundle
            .coop
            .iter()
            .filter(|item| item.resource_link.is_some())
            .count();
        let total = standalone_links + coop_links;
        let mut summary = if total == 1 {
            "Found 1 resource link".to_string()
        } else {
            format!("Found {total} resource links")
        };
        if standalone_links > 0 {
            summary.push_str(&format!(" (standalone: {standalone_links})"));
        }
        if coop_links > 0 {
            summary.push_str(&format!(" (co-op: {coop_links})"));
        }

        let title = if bundle.display_name.is_empty() {
            "game resources"
        } else {
            &bundle.display_name
        };
        let meta = DispatchMeta {
            source: title.to_string(),
            summary,
            prompt: format!("[{}]", truncate(title, 30)),
        };
        (nodes, meta)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn render_standalone(bundle: &ResourceBundle) -> String {
    let mut lines = vec![
        "[Standalone edition]".to_string(),
        format!("Game: {}", bundle.display_name),
    ];
    if bundle.standalone.is_empty() {
        lines.push("No standalone resources found".to_string());
    }
    for line in &bundle.standalone {
        match line {
            StandaloneLine::Password(p) => lines.push(format!("Archive password: [{p}]")),
            StandaloneLine::ExtractCode(c) => lines.push(format!("Pan extract code: {c}")),
            StandaloneLine::Link { label, url } => lines.push(format!("{label}: {url}")),
            StandaloneLine::Note(note) => lines.push(note.clone()),
        }
    }
    lines.join("\n")
}

fn render_coop(bundle: &ResourceBundle) -> String {
    let mut lines = vec![
        "[Co-op edition]".to_string(),
        format!("Game: {}", bundle.keyword),
    ];
    if bundle.coop.is_empty() {
        lines.push("No co-op resources found".to_string());
        lines.push(format!("Universal unlock code: [{UNLOCK_CODE}]"));
        lines.push(
            "Tip: the code unlocks any release from the shared-session tracker".to_string(),
        );
        return lines.join("\n");
    }

    for (index, item) in bundle.coop.iter().enumerate() {
        if bundle.coop.len() > 1 {
            lines.push(format!("-- release {} --", index + 1));
        }
        lines.push(format!("Unlock code: [{}]", item.unlock_code));
        lines.push(format!("Updated: {}", item.updated));
        match &item.resource_link {
            Some(url) => lines.push(format!("Torrent: {url}")),
            None => lines.push("Torrent: unavailable".to_string()),
        }
        if item.degraded {
            lines.push("(fallback source; detail page was unreachable)".to_string());
        }
    }
    lines.push("Tip: open the torrent with any BT client".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoopItem;

    fn bundle() -> ResourceBundle {
        ResourceBundle {
            display_name: "泰拉瑞亚".to_string(),
            keyword: "Terraria".to_string(),
            standalone: vec![
                StandaloneLine::Password("xyd2024".to_string()),
                StandaloneLine::Link {
                    label: "百度网盘".to_string(),
                    url: "https://pan.example/x".to_string(),
                },
            ],
            coop: vec![CoopItem {
                title: "Terraria по сети".to_string(),
                unlock_code: UNLOCK_CODE.to_string(),
                updated: "2021-05-17 17:21".to_string(),
                resource_link: Some("https://tracker.example/t.torrent".to_string()),
                degraded: false,
            }],
        }
    }

    #[test]
    fn builds_ordered_parts_with_info_first() {
        let aggregator = ResultAggregator::new(
            "Game Scout".to_string(),
            "sponsored by nobody".to_string(),
            Some("info.png".to_string()),
        );
        let (nodes, meta) = aggregator.build(&bundle(), "user-7");

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].content.len(), 2);
        assert!(matches!(&nodes[0].content[1], NodeContent::Image { file } if file == "info.png"));
        let NodeContent::Text { text } = &nodes[1].content[0] else {
            panic!("standalone part must be text");
        };
        assert!(text.contains("[Standalone edition]"));
        assert!(text.contains("Archive password: [xyd2024]"));
        assert_eq!(meta.summary, "Found 2 resource links (standalone: 1) (co-op: 1)");
        assert_eq!(meta.source, "泰拉瑞亚");
    }

    #[test]
    fn info_part_is_skipped_when_unconfigured() {
        let aggregator = ResultAggregator::new("Game Scout".to_string(), String::new(), None);
        let (nodes, _) = aggregator.build(&bundle(), "user-7");
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn degraded_items_carry_a_marker_line() {
        let mut b = bundle();
        b.coop[0].degraded = true;
        b.coop[0].updated = "upstream unreachable (timeout)".to_string();
        let aggregator = ResultAggregator::new("Game Scout".to_string(), String::new(), None);
        let (nodes, _) = aggregator.build(&b, "user-7");
        let NodeContent::Text { text } = &nodes[1].content[0] else {
            panic!("coop part must be text");
        };
        assert!(text.contains("fallback source"));
        assert!(text.contains("upstream unreachable"));
    }

    #[test]
    fn empty_coop_part_still_shows_unlock_code() {
        let mut b = bundle();
        b.coop.clear();
        let aggregator = ResultAggregator::new("Game Scout".to_string(), String::new(), None);
        let (nodes, meta) = aggregator.build(&b, "user-7");
        let NodeContent::Text { text } = &nodes[1].content[0] else {
            panic!("coop part must be text");
        };
        assert!(text.contains("No co-op resources found"));
        assert!(text.contains(UNLOCK_CODE));
        assert_eq!(meta.summary, "Found 1 resource link (standalone: 1)");
    }
}
