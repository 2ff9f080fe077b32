//! JSON-blob chat agent.
//!
//! The executor alternates model turns and tool calls until the model emits a
//! `Final Answer` action or the iteration cap is hit:
//!
//! 1. render system prompt, history, input, and the scratchpad of this turn
//! 2. ask the model, stopping at `Observation:`
//! 3. parse the JSON blob; run the named tool; append its output as an
//!    observation
//!
//! Unparseable model output is fed back as an observation when
//! `handle_parsing_errors` is on. It is surfaced as
//! [`AgentError::OutputParsing`] when it is off, or when the last iteration
//! still failed to parse, so callers can retry the whole turn.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    ollama::{ChatMessage, ChatModel, ChatModelError},
    ConversationTurn, ToolError, ToolRegistry,
};

pub mod parser;
pub mod prompt;

pub use parser::{AgentStep, OutputParseError};

// ---

/// Output when the model never reached a final answer.
pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

#[derive(Debug, Error)]
pub enum AgentError {
    // ---
    #[error(transparent)]
    OutputParsing(#[from] OutputParseError),

    #[error("model call failed: {0}")]
    Model(#[from] ChatModelError),

    #[error("tool `{tool}` failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },
}

impl AgentError {
    /// Whether retrying the same input may succeed.
    pub fn is_output_parsing(&self) -> bool {
        matches!(self, AgentError::OutputParsing(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AgentOptions {
    // ---
    pub max_iterations: u32,
    pub handle_parsing_errors: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            handle_parsing_errors: true,
        }
    }
}

pub struct AgentExecutor {
    // ---
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    system_prompt: String,
    stop: Vec<String>,
    options: AgentOptions,
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("tools", &self.tools)
            .field("stop", &self.stop)
            .field("options", &self.options)
            .finish()
    }
}

impl AgentExecutor {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        system_prompt: String,
        options: AgentOptions,
    ) -> Self {
        // ---
        Self {
            model,
            tools,
            system_prompt,
            stop: prompt::STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
            options,
        }
    }

    /// Answer `input` given the prior conversation.
    #[instrument(level = "debug", skip(self, history), fields(history = history.len()))]
    pub async fn invoke(
        &self,
        input: &str,
        history: &[ConversationTurn],
    ) -> Result<String, AgentError> {
        // ---
        let mut scratchpad: Vec<ChatMessage> = Vec::new();
        let mut last_parse_error: Option<OutputParseError> = None;

        for iteration in 1..=self.options.max_iterations {
            let messages =
                prompt::build_messages(&self.system_prompt, history, input, &scratchpad);
            let text = self.model.complete(&messages, &self.stop).await?;
            debug!(iteration, output = %text, "model turn");

            match parser::parse(&text) {
                Ok(AgentStep::Finish { output, log }) => {
                    info!(iteration, "final answer");
                    debug!(%log, "final model turn");
                    return Ok(output);
                }
                Ok(AgentStep::Action {
                    tool,
                    tool_input,
                    log,
                }) => {
                    last_parse_error = None;
                    let observation = self.run_tool(&tool, tool_input).await?;
                    scratchpad.push(ChatMessage::assistant(log));
                    scratchpad.push(ChatMessage::user(format!("Observation: {observation}")));
                }
                Err(e) if self.options.handle_parsing_errors => {
                    warn!(
                        iteration,
                        reason = %e.reason,
                        output = %e.llm_output,
                        "unparseable model output"
                    );
                    scratchpad.push(ChatMessage::assistant(text));
                    scratchpad.push(ChatMessage::user(format!(
                        "Observation: {}",
                        prompt::INVALID_FORMAT_OBSERVATION
                    )));
                    last_parse_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(e) = last_parse_error {
            return Err(e.into());
        }
        warn!(max_iterations = self.options.max_iterations, "iteration limit reached");
        Ok(ITERATION_LIMIT_OUTPUT.to_string())
    }

    /// Run a tool and turn soft failures into observations.
    async fn run_tool(&self, name: &str, input: Value) -> Result<String, AgentError> {
        // ---
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model asked for an unknown tool");
            return Ok(format!(
                "{name} is not a valid tool, try one of [{}].",
                self.tools.names().join(", ")
            ));
        };

        info!(tool = name, input = %input, "calling tool");
        match tool.call(input).await {
            Ok(output) => {
                debug!(tool = name, %output, "tool output");
                Ok(output)
            }
            Err(ToolError::InvalidArguments(reason)) => {
                warn!(tool = name, %reason, "invalid tool arguments");
                Ok(format!(
                    "Invalid arguments for `{name}`: {reason}. Fix the action_input and try again."
                ))
            }
            Err(source) => Err(AgentError::Tool {
                tool: name.to_string(),
                source,
            }),
        }
    }
}
