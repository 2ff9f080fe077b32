//! System prompt and message layout for the JSON-blob chat agent.

use chrono::NaiveDate;

use super::parser::FINAL_ANSWER;
use crate::{ollama::ChatMessage, ConversationTurn, Role, ToolRegistry};

// ---

/// Generation halts at these; the model must not invent observations.
pub const STOP_SEQUENCES: [&str; 2] = ["<|eot_id|>", "Observation:"];

/// Observation sent back when the model's turn was not a valid JSON blob.
pub const INVALID_FORMAT_OBSERVATION: &str = "Invalid or incomplete response. \
     Reply with exactly one JSON blob containing `action` and `action_input`, \
     wrapped in a ```json code fence.";

const REMINDER: &str = "(reminder to respond in a JSON blob no matter what)";

/// One line per tool: `name: description, args: {...}`.
pub fn render_tools(tools: &ToolRegistry) -> String {
    // ---
    tools
        .iter()
        .map(|tool| {
            let schema = tool.parameters();
            let args = schema
                .get("properties")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            format!("{}: {}, args: {}", tool.name(), tool.description(), args)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Valid values of the `action` key, quoted and comma separated.
pub fn render_action_names(tools: &ToolRegistry) -> String {
    // ---
    std::iter::once(FINAL_ANSWER)
        .chain(tools.names())
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the system prompt for a session started on `today`.
pub fn system_prompt(tools: &ToolRegistry, today: NaiveDate, user_city: &str) -> String {
    // ---
    format!(
        r#"Answer the human as helpfully and accurately as you can. These tools are available:

{tools}

To use a tool, reply with a JSON blob holding an `action` key (the tool name) and an `action_input` key (the tool arguments, an object with one key per parameter).

Valid "action" values: {actions}

Put exactly ONE action in each blob, like this:

```json
{{
  "action": $TOOL_NAME,
  "action_input": $INPUT
}}
```

Use this format:

Question: the question to answer
Thought: what you know so far and what to do next
Action:
```json
$JSON_BLOB
```
Observation: the result of the action
... (Thought/Action/Observation can repeat)
Thought: I know the answer
Action:
```json
{{
  "action": "{final_answer}",
  "action_input": "answer for the human"
}}
```

Today's date is {today}.
The user lives in the city of {user_city}.
Always write a Thought before each Action.
Tools are optional, but every turn must end with the "{final_answer}" action.
Always reply with a single valid JSON blob in a ```json fence, then stop and wait for the Observation."#,
        tools = render_tools(tools),
        actions = render_action_names(tools),
        final_answer = FINAL_ANSWER,
    )
}

/// Full message list for one model call.
pub fn build_messages(
    system_prompt: &str,
    history: &[ConversationTurn],
    input: &str,
    scratchpad: &[ChatMessage],
) -> Vec<ChatMessage> {
    // ---
    let mut messages = Vec::with_capacity(history.len() + scratchpad.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(|turn| match turn.role {
        Role::Human => ChatMessage::user(turn.content.clone()),
        Role::Assistant => ChatMessage::assistant(turn.content.clone()),
    }));
    messages.push(ChatMessage::user(format!("{input}\n\n{REMINDER}")));
    messages.extend_from_slice(scratchpad);
    messages
}
