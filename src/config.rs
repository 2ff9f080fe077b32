//! Configuration loader for the `pulse-agent` assistant.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;

use anyhow::{anyhow, bail, Result};

/// Parse an optional environment variable into any `FromStr` type with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// City the assistant assumes the user lives in.
pub const DEFAULT_USER_CITY: &str = "Skopje";

/// Default OpenCage forward geocoding endpoint.
pub const DEFAULT_OPENCAGE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// OpenCage geocoding API key.
    pub opencage_api_key: String,

    /// OpenCage geocoding endpoint.
    pub opencage_url: String,

    /// Base URL of the Ollama server (e.g. `http://localhost:11434`).
    pub ollama_base_url: String,

    /// Model identifier passed to Ollama.
    pub ollama_model: String,

    /// Sampling temperature for the chat model.
    pub temperature: f32,

    /// Home city of the user, injected into the system prompt.
    pub user_city: String,

    /// Maximum model round trips per agent invocation.
    pub max_iterations: u32,

    /// Extra attempts after an output-parsing failure.
    pub parse_retries: u32,

    /// Optional pulse.eco basic-auth credentials.
    pub pulse_eco_credentials: Option<(String, String)>,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `OPENCAGE_API` – OpenCage API key
/// - `OLLAMA_BASE_URL` – Ollama server base URL
/// - `OLLAMA_MODEL` – model identifier
///
/// Optional:
/// - `OPENCAGE_BASE_URL` – geocoding endpoint (default: public OpenCage API)
/// - `OLLAMA_TEMPERATURE` – sampling temperature (default: 0.8)
/// - `USER_CITY` – the user's city (default: Skopje)
/// - `AGENT_MAX_ITERATIONS` – model round trips per question (default: 15)
/// - `AGENT_PARSE_RETRIES` – retries on output parser failure (default: 3)
/// - `PULSE_ECO_USERNAME` / `PULSE_ECO_PASSWORD` – basic auth, both or neither
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let opencage_api_key = require_env!("OPENCAGE_API");
    let ollama_base_url = require_env!("OLLAMA_BASE_URL");
    let ollama_model = require_env!("OLLAMA_MODEL");

    let opencage_url =
        env::var("OPENCAGE_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENCAGE_URL.into());
    let user_city = env::var("USER_CITY").unwrap_or_else(|_| DEFAULT_USER_CITY.into());
    let temperature = parse_env!("OLLAMA_TEMPERATURE", f32, 0.8);
    let max_iterations = parse_env!("AGENT_MAX_ITERATIONS", u32, 15);
    let parse_retries = parse_env!("AGENT_PARSE_RETRIES", u32, 3);

    let pulse_eco_credentials = match (
        env::var("PULSE_ECO_USERNAME").ok(),
        env::var("PULSE_ECO_PASSWORD").ok(),
    ) {
        (Some(user), Some(password)) => Some((user, password)),
        (None, None) => None,
        _ => bail!("PULSE_ECO_USERNAME and PULSE_ECO_PASSWORD must be set together"),
    };

    if max_iterations == 0 {
        bail!("AGENT_MAX_ITERATIONS must be at least 1");
    }

    Ok(Config {
        opencage_api_key,
        opencage_url: opencage_url.trim_end_matches('/').to_string(),
        ollama_base_url: ollama_base_url.trim_end_matches('/').to_string(),
        ollama_model,
        temperature,
        user_city,
        max_iterations,
        parse_retries,
        pulse_eco_credentials,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the API key and pulse.eco password while showing all other
    /// configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  OPENCAGE_API         : {}", mask_secret(&self.opencage_api_key));
        tracing::info!("  OPENCAGE_BASE_URL    : {}", self.opencage_url);
        tracing::info!("  OLLAMA_BASE_URL      : {}", self.ollama_base_url);
        tracing::info!("  OLLAMA_MODEL         : {}", self.ollama_model);
        tracing::info!("  OLLAMA_TEMPERATURE   : {}", self.temperature);
        tracing::info!("  USER_CITY            : {}", self.user_city);
        tracing::info!("  AGENT_MAX_ITERATIONS : {}", self.max_iterations);
        tracing::info!("  AGENT_PARSE_RETRIES  : {}", self.parse_retries);
        match &self.pulse_eco_credentials {
            Some((user, _)) => tracing::info!("  PULSE_ECO_USERNAME   : {} (password ****)", user),
            None => tracing::info!("  PULSE_ECO_USERNAME   : <anonymous>"),
        }
    }
}

/// Keep the first four characters of a secret and hide the rest.
fn mask_secret(secret: &str) -> String {
    // ---
    let visible: String = secret.chars().take(4).collect();
    if visible.chars().count() == secret.chars().count() {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
