//! Parses model turns of the form
//!
//! ````text
//! Thought: ...
//! Action:
//! ```json
//! {"action": "tool_name", "action_input": {...}}
//! ```
//! ````
//!
//! into either a tool call or a final answer.

use serde_json::Value;
use thiserror::Error;

// ---

/// Action name that ends the turn.
pub const FINAL_ANSWER: &str = "Final Answer";

/// The model's turn could not be understood.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Could not parse LLM output: {reason}")]
pub struct OutputParseError {
    pub reason: String,
    pub llm_output: String,
}

/// What the model decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action {
        tool: String,
        tool_input: Value,
        /// Full model text, replayed in the scratchpad.
        log: String,
    },
    Finish {
        output: String,
        log: String,
    },
}

/// Locate the JSON payload: a fenced block if present, else the outermost braces.
fn extract_json(text: &str) -> &str {
    // ---
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip a language tag such as `json`.
        let tag_len = after
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after.len());
        let body = &after[tag_len..];
        let end = body.find("```").unwrap_or(body.len());
        return body[..end].trim();
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if open < close => &text[open..=close],
        _ => text.trim(),
    }
}

pub fn parse(text: &str) -> Result<AgentStep, OutputParseError> {
    // ---
    let fail = |reason: String| OutputParseError {
        reason,
        llm_output: text.to_string(),
    };

    let payload = extract_json(text);
    let value: Value =
        serde_json::from_str(payload).map_err(|e| fail(format!("invalid JSON blob: {e}")))?;

    // Some models wrap the blob in a list; only the first action counts.
    let value = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| fail("empty action list".into()))?,
        other => other,
    };

    let Value::Object(mut blob) = value else {
        return Err(fail("expected a JSON object with an `action` key".into()));
    };

    let action = match blob.remove("action") {
        Some(Value::String(action)) => action.trim().to_string(),
        Some(other) => return Err(fail(format!("`action` must be a string, got `{other}`"))),
        None => return Err(fail("missing `action` key".into())),
    };
    let action_input = blob
        .remove("action_input")
        .unwrap_or_else(|| Value::Object(Default::default()));

    if action == FINAL_ANSWER {
        let output = match action_input {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Ok(AgentStep::Finish {
            output,
            log: text.to_string(),
        });
    }

    Ok(AgentStep::Action {
        tool: action,
        tool_input: action_input,
        log: text.to_string(),
    })
}
