//! Request and response types for the completion service.
//!
//! The wire format follows the Anthropic `v1/messages` endpoint; all structs
//! derive `Serialize`/`Deserialize` for JSON conversion.

use serde::{Deserialize, Serialize};

/// Request body for the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g. "claude-sonnet-4-5-20250929").
    pub model: String,
    /// Maximum number of tokens in the generated response.
    pub max_tokens: u32,
    /// Conversation messages (user and assistant).
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// Single-turn user request, the only shape the pipeline sends.
    pub fn user(model: &str, max_tokens: u32, content: String) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            messages: vec![Message {
                role: "user".into(),
                content,
            }],
        }
    }

    /// The prompt text of the first user message, empty if none.
    pub fn prompt(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

/// Response returned by the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    /// Content blocks in the response (normally one text block).
    pub content: Vec<ContentBlock>,
    pub model: String,
    /// Why generation stopped ("end_turn", "max_tokens"); `None` while in
    /// progress.
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl CompletionResponse {
    /// Trimmed text of the first content block, empty if there is none.
    pub fn text(&self) -> String {
        self.content
            .first()
            .map(|b| b.text.trim().to_string())
            .unwrap_or_default()
    }
}

/// One content block of a response. `content_type` serializes as `"type"`,
/// matching the API format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Token accounting for one call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_request_shape() {
        let req = CompletionRequest::user("claude-sonnet-4-5-20250929", 1024, "hello".into());
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.prompt(), "hello");
    }

    #[test]
    fn response_text_takes_first_block() {
        let resp = CompletionResponse {
            id: "msg_1".into(),
            content: vec![
                ContentBlock {
                    content_type: "text".into(),
                    text: "  first  ".into(),
                },
                ContentBlock {
                    content_type: "text".into(),
                    text: "second".into(),
                },
            ],
            model: "m".into(),
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        };
        assert_eq!(resp.text(), "first");
    }

    #[test]
    fn response_deserializes_from_api_format() {
        let api_json = r#"{
            "id": "msg_123",
            "content": [{"type": "text", "text": "Response here"}],
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: CompletionResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.id, "msg_123");
        assert_eq!(resp.content[0].content_type, "text");
        assert_eq!(resp.text(), "Response here");
    }

    #[test]
    fn content_block_type_field_renames() {
        let block = ContentBlock {
            content_type: "text".into(),
            text: "x".into(),
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type""#));
        assert!(!json.contains("content_type"));
    }
}
