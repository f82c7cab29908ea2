//! Decode raw agent stdout into a canonical reply.

use crate::core::engine::Engine;
use crate::core::events::AgentEvent;
use crate::core::usage::Usage;

/// Canonical parse of one agent invocation's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    pub response: String,
    pub usage: Usage,
    /// Agent-reported error; presence makes the invocation a failure
    /// regardless of exit code.
    pub error: Option<String>,
}

/// Parse engine stdout (and, for codex, the last-message file contents).
///
/// Undecodable lines are skipped: agents interleave human-readable noise with
/// their event stream and one bad line must not fail the invocation.
pub fn parse_agent_output(
    engine: Engine,
    stdout: &str,
    last_message: Option<&str>,
) -> AgentReply {
    let events: Vec<AgentEvent> = stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    for event in &events {
        if let AgentEvent::Error(error) = event {
            return AgentReply {
                error: Some(error.message()),
                ..AgentReply::default()
            };
        }
    }

    let mut reply = match engine {
        Engine::Opencode => parse_opencode(&events),
        Engine::Codex => parse_codex(last_message),
        _ => parse_result_stream(engine, &events),
    };
    reply.response = reply.response.trim().to_string();
    reply
}

fn parse_opencode(events: &[AgentEvent]) -> AgentReply {
    let mut reply = AgentReply::default();
    for event in events {
        match event {
            AgentEvent::Text(text) => {
                if let Some(part) = text.part.as_ref().and_then(|part| part.text.as_deref()) {
                    reply.response.push_str(part);
                }
            }
            AgentEvent::StepFinish(step) => {
                if let Some(tokens) = step.tokens() {
                    reply.usage.input_tokens = tokens.input;
                    reply.usage.output_tokens = tokens.output;
                }
                if let Some(cost) = step.cost() {
                    reply.usage.cost = Some(cost);
                }
            }
            _ => {}
        }
    }
    reply
}

fn parse_codex(last_message: Option<&str>) -> AgentReply {
    let body = last_message.unwrap_or_default();
    let body = match body.strip_prefix("Task completed successfully.") {
        Some(rest) => rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest),
        None => body,
    };
    AgentReply {
        response: body.to_string(),
        ..AgentReply::default()
    }
}

fn parse_result_stream(engine: Engine, events: &[AgentEvent]) -> AgentReply {
    let mut reply = AgentReply::default();

    if let Some(result) = events.iter().rev().find_map(|event| match event {
        AgentEvent::Result(result) => Some(result),
        _ => None,
    }) {
        reply.response = result.result.clone().unwrap_or_default();
        if let Some(usage) = &result.usage {
            reply.usage.input_tokens = usage.input_tokens;
            reply.usage.output_tokens = usage.output_tokens;
        }
        reply.usage.duration_ms = result.duration_ms;
    }

    // Cursor sometimes omits the text from its result event; recover it from
    // the assistant message stream.
    if engine == Engine::Cursor && reply.response.trim().is_empty() {
        reply.response = events
            .iter()
            .filter_map(|event| match event {
                AgentEvent::Assistant(assistant) => assistant
                    .message
                    .as_ref()
                    .and_then(|message| message.content.as_ref())
                    .map(|content| content.text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
    }

    if engine == Engine::Droid {
        if let Some(completion) = events.iter().rev().find_map(|event| match event {
            AgentEvent::Completion(completion) => Some(completion),
            _ => None,
        }) {
            if reply.response.trim().is_empty() {
                reply.response = completion.final_text.clone().unwrap_or_default();
            }
            if reply.usage.duration_ms.is_none() {
                reply.usage.duration_ms = completion.duration_ms;
            }
        }
    }

    reply
}
