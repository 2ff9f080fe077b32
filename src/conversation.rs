//! Interactive session: the stdin loop and the chat history it owns.

use std::io::{BufRead, Write};

use anyhow::Context;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    agent::{AgentError, AgentExecutor},
    ConversationTurn,
};

// ---

/// Inputs that end the session, compared after trimming.
pub const EXIT_COMMANDS: [&str; 4] = ["!exit", "!quit", "/exit", "/quit"];

pub fn is_exit(line: &str) -> bool {
    EXIT_COMMANDS.contains(&line.trim())
}

#[derive(Debug)]
pub struct Session {
    // ---
    id: Uuid,
    executor: AgentExecutor,
    history: Vec<ConversationTurn>,
    parse_retries: u32,
}

impl Session {
    pub fn new(executor: AgentExecutor, parse_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            executor,
            history: Vec::new(),
            parse_retries,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Ask the agent, retrying the same input while its output cannot be parsed.
    ///
    /// Both turns are appended to the history only when an answer comes back.
    pub async fn ask(&mut self, input: &str) -> Result<String, AgentError> {
        // ---
        let mut attempt = 0;
        let output = loop {
            match self.executor.invoke(input, &self.history).await {
                Ok(output) => break output,
                Err(e) if e.is_output_parsing() && attempt < self.parse_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Output parser error, retrying...");
                }
                Err(e) => return Err(e),
            }
        };

        self.history.push(ConversationTurn::human(input));
        self.history.push(ConversationTurn::assistant(output.clone()));
        Ok(output)
    }

    /// `Role: content` lines, one per turn.
    pub fn transcript(&self) -> String {
        // ---
        self.history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read questions from `input` until an exit command or EOF.
///
/// Output-parsing failures that survive the retries end the session with an
/// error; any other agent failure is reported and the loop goes on.
pub async fn run<R: BufRead, W: Write>(
    session: &mut Session,
    mut input: R,
    mut output: W,
) -> anyhow::Result<()> {
    // ---
    let mut line = String::new();
    loop {
        write!(output, "Human: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line).context("reading user input")? == 0 {
            info!("end of input");
            writeln!(output)?;
            break;
        }
        if is_exit(&line) {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        match session.ask(question).await {
            Ok(answer) => writeln!(output, "AI: {answer}")?,
            Err(e) if e.is_output_parsing() => {
                error!(error = %e, "giving up after repeated output parser errors");
                return Err(e).context("agent output could not be parsed");
            }
            Err(e) => {
                error!(error = %e, "agent turn failed");
                writeln!(output, "AI: Sorry, something went wrong: {e}")?;
            }
        }
    }

    writeln!(output, "{:?}", session.history())?;
    writeln!(output, "{}", session.transcript())?;
    output.flush()?;
    Ok(())
}
