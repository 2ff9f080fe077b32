//! Tools the agent can call by name with JSON arguments.
//!
//! Each tool declares a name, a description the model reads to decide when to
//! use it, and a JSON-schema parameter object. Arguments are checked by plain
//! validation functions (see [`args`]) before any tool logic runs.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{AirQualityConnector, Geocoder};

pub mod air_quality;
pub mod args;
pub mod datetime;

pub use air_quality::{
    AverageCityAirQualityOnDate, AverageLocationAirQualityOnDate, CurrentCityAirQuality,
};
pub use datetime::{DatetimePlusDays, NowPlusHours};

// ---

#[derive(Debug, Error)]
pub enum ToolError {
    // ---
    /// The model sent arguments that do not match the schema; it may retry.
    #[error("Tool argument parsing error: {0}")]
    InvalidArguments(String),

    /// The tool could not complete; this ends the agent turn.
    #[error("Tool execution failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;

    async fn call(&self, args: Value) -> Result<String, ToolError>;
}

/// Ordered set of tools offered to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool`; a later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        // ---
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Box::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| &**t)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| &**t)
    }
}

/// The full toolbox: date arithmetic plus the pulse.eco lookups.
pub fn default_registry(
    connector: Arc<dyn AirQualityConnector>,
    geocoder: Arc<dyn Geocoder>,
) -> ToolRegistry {
    // ---
    let mut registry = ToolRegistry::new();
    registry
        .register(NowPlusHours)
        .register(DatetimePlusDays)
        .register(CurrentCityAirQuality::new(connector.clone()))
        .register(AverageCityAirQualityOnDate::new(connector.clone()))
        .register(AverageLocationAirQualityOnDate::new(connector, geocoder));
    registry
}
