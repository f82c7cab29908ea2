//! Streaming-JSON events emitted by the agent engines.
//!
//! Every engine writes one JSON object per stdout line. The variants below
//! are the ones the driver acts on; decoding is lenient, so unknown event
//! types and extra fields never fail a stream.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Error(ErrorEvent),
    Text(TextEvent),
    StepFinish(StepFinishEvent),
    Result(ResultEvent),
    Assistant(AssistantEvent),
    Completion(CompletionEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEvent {
    pub error: Option<ErrorBody>,
    pub message: Option<String>,
}

impl ErrorEvent {
    /// Best available error text.
    pub fn message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|body| body.message.clone())
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Agent error".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
}

/// Opencode incremental text chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct TextEvent {
    pub part: Option<TextPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextPart {
    pub text: Option<String>,
}

/// Opencode step accounting; the last one wins.
#[derive(Debug, Clone, Deserialize)]
pub struct StepFinishEvent {
    pub part: Option<StepFinishPart>,
    pub tokens: Option<TokenCounts>,
    pub cost: Option<f64>,
}

impl StepFinishEvent {
    pub fn tokens(&self) -> Option<&TokenCounts> {
        self.part
            .as_ref()
            .and_then(|part| part.tokens.as_ref())
            .or(self.tokens.as_ref())
    }

    pub fn cost(&self) -> Option<f64> {
        self.part.as_ref().and_then(|part| part.cost).or(self.cost)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepFinishPart {
    pub tokens: Option<TokenCounts>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
}

/// Terminal result event (claude, cursor, qwen, droid).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultEvent {
    pub result: Option<String>,
    pub usage: Option<ResultUsage>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Cursor assistant message; fallback when the result event has no text.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantEvent {
    pub message: Option<AssistantMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<AssistantContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AssistantContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl AssistantContent {
    pub fn text(&self) -> String {
        match self {
            AssistantContent::Text(text) => text.clone(),
            AssistantContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| block.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    pub text: Option<String>,
}

/// Droid terminal event; fallback for response text and duration.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionEvent {
    #[serde(rename = "finalText")]
    pub final_text: Option<String>,
    #[serde(rename = "durationMs")]
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_result_event() {
        let event: AgentEvent = serde_json::from_str(
            r#"{"type":"result","result":"done","usage":{"input_tokens":3,"output_tokens":7},"duration_ms":120}"#,
        )
        .expect("decode");
        let AgentEvent::Result(result) = event else {
            panic!("expected result event");
        };
        assert_eq!(result.result.as_deref(), Some("done"));
        assert_eq!(result.usage.expect("usage").output_tokens, 7);
        assert_eq!(result.duration_ms, Some(120));
    }

    #[test]
    fn unknown_event_types_decode_as_other() {
        let event: AgentEvent =
            serde_json::from_str(r#"{"type":"tool_use","name":"bash"}"#).expect("decode");
        assert!(matches!(event, AgentEvent::Other));
    }

    #[test]
    fn error_event_prefers_nested_message() {
        let event: ErrorEvent = serde_json::from_str(
            r#"{"error":{"message":"rate limited"},"message":"outer"}"#,
        )
        .expect("decode");
        assert_eq!(event.message(), "rate limited");

        let bare: ErrorEvent = serde_json::from_str(r#"{}"#).expect("decode");
        assert_eq!(bare.message(), "Agent error");
    }

    #[test]
    fn assistant_content_handles_both_shapes() {
        let text = AssistantContent::Text("plain".to_string());
        assert_eq!(text.text(), "plain");

        let blocks: AssistantContent = serde_json::from_str(
            r#"[{"type":"text","text":"a"},{"type":"text","text":"b"}]"#,
        )
        .expect("decode");
        assert_eq!(blocks.text(), "ab");
    }
}
