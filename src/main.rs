//! Application entry point for the `pulse-agent` air quality assistant.
//!
//! This binary wires the interactive session together:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing (to stderr)
//! - Building the Ollama chat model, pulse.eco connector and OpenCage geocoder
//! - Registering the agent tools and rendering the system prompt
//! - Running the `Human:` / `AI:` loop on stdin/stdout until exit or EOF
//!
//! # Environment Variables
//! - `OPENCAGE_API` (**required**) – OpenCage geocoding API key
//! - `OLLAMA_BASE_URL` (**required**) – Ollama server, e.g. `http://localhost:11434`
//! - `OLLAMA_MODEL` (**required**) – model name, e.g. `llama3.1`
//! - `USER_CITY` (optional) – city the user lives in (default: `Skopje`)
//! - `PULSE_AGENT_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `PULSE_AGENT_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See [`config`] for the remaining optional settings.
use std::{env, io, sync::Arc};

use chrono::Utc;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing::Instrument;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod agent;
mod config;
mod conversation;
mod geocoder;
mod models;
mod nearest;
mod ollama;
mod pulse_eco;
mod tools;

pub use config::Config;

// Re-exported so that tools/*.rs and agent/*.rs depend on the crate root
// rather than reaching into sibling modules.
pub use geocoder::Geocoder;
pub use models::{
    AveragePeriod, ConversationTurn, Coordinate, DataValue, DataValueType, OverallValues, Role,
    Sensor,
};
pub use pulse_eco::{AirQualityApi, AirQualityConnector, PulseEcoError};
pub use tools::{ToolError, ToolRegistry};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let model = ollama::OllamaClient::new(
        cfg.ollama_base_url.as_str(),
        cfg.ollama_model.as_str(),
        cfg.temperature,
    );
    tracing::info!(model = model.model(), "Using Ollama chat model");
    let connector = Arc::new(pulse_eco::PulseEcoConnector::new(
        cfg.pulse_eco_credentials.clone(),
    ));
    let geocoder = Arc::new(geocoder::OpenCageGeocoder::new(
        cfg.opencage_url.as_str(),
        cfg.opencage_api_key.as_str(),
    ));

    let registry = tools::default_registry(connector, geocoder);
    let system_prompt =
        agent::prompt::system_prompt(&registry, Utc::now().date_naive(), &cfg.user_city);
    tracing::debug!(tools = ?registry.names(), "registered tools");

    let executor = agent::AgentExecutor::new(
        Arc::new(model),
        registry,
        system_prompt,
        agent::AgentOptions {
            max_iterations: cfg.max_iterations,
            handle_parsing_errors: true,
        },
    );
    let mut session = conversation::Session::new(executor, cfg.parse_retries);

    let span = tracing::info_span!("session", id = %session.id());
    tracing::info!(city = %cfg.user_city, "Session started");

    let stdin = io::stdin();
    conversation::run(&mut session, stdin.lock(), io::stdout())
        .instrument(span)
        .await?;

    tracing::info!("Session ended");
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Output on stderr, keeping stdout for the conversation
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY on stderr
/// - Span event emission mode controlled by the `PULSE_AGENT_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `PULSE_AGENT_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("PULSE_AGENT_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to PULSE_AGENT_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PULSE_AGENT_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn,rustls=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
