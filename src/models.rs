//! Simple data models for the air quality assistant.
//!
//! Wire shapes follow the pulse.eco REST API (`sensorId`, `stamp`, string
//! encoded values) and are kept deliberately small: only the fields the
//! tools consume are modelled.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---

/// A fixed air quality measurement device.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    // ---
    pub sensor_id: String,
    #[serde(default)]
    pub description: String,
    /// `"lat,lng"` as published by pulse.eco.
    #[serde(default)]
    pub position: String,
}

/// A point on the WGS-84 ellipsoid, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    // ---
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Measurement types published by pulse.eco, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataValueType {
    Pm10,
    Pm25,
    Pm1,
    No2,
    O3,
    So2,
    Co,
    Temperature,
    Humidity,
    Pressure,
    Noise,
    NoiseDba,
    GasResistance,
}

impl DataValueType {
    /// Every supported type; day averages are requested in this order.
    pub const ALL: [DataValueType; 13] = [
        DataValueType::Pm10,
        DataValueType::Pm25,
        DataValueType::Pm1,
        DataValueType::No2,
        DataValueType::O3,
        DataValueType::So2,
        DataValueType::Co,
        DataValueType::Temperature,
        DataValueType::Humidity,
        DataValueType::Pressure,
        DataValueType::Noise,
        DataValueType::NoiseDba,
        DataValueType::GasResistance,
    ];

    /// Identifier used in pulse.eco query strings and payloads.
    pub fn as_query(self) -> &'static str {
        match self {
            DataValueType::Pm10 => "pm10",
            DataValueType::Pm25 => "pm25",
            DataValueType::Pm1 => "pm1",
            DataValueType::No2 => "no2",
            DataValueType::O3 => "o3",
            DataValueType::So2 => "so2",
            DataValueType::Co => "co",
            DataValueType::Temperature => "temperature",
            DataValueType::Humidity => "humidity",
            DataValueType::Pressure => "pressure",
            DataValueType::Noise => "noise",
            DataValueType::NoiseDba => "noise_dba",
            DataValueType::GasResistance => "gasResistance",
        }
    }

    /// Label shown to the user and the model.
    pub fn label(self) -> &'static str {
        match self {
            DataValueType::Pm10 => "PM10",
            DataValueType::Pm25 => "PM25",
            DataValueType::Pm1 => "PM1",
            DataValueType::No2 => "NO2",
            DataValueType::O3 => "O3",
            DataValueType::So2 => "SO2",
            DataValueType::Co => "CO",
            DataValueType::Temperature => "TEMPERATURE",
            DataValueType::Humidity => "HUMIDITY",
            DataValueType::Pressure => "PRESSURE",
            DataValueType::Noise => "NOISE",
            DataValueType::NoiseDba => "NOISE_DBA",
            DataValueType::GasResistance => "GAS_RESISTANCE",
        }
    }
}

impl fmt::Display for DataValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregation window for `avgData` requests; the tools only average by day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragePeriod {
    Day,
}

impl AveragePeriod {
    pub fn as_path(self) -> &'static str {
        match self {
            AveragePeriod::Day => "day",
        }
    }
}

/// A single raw or averaged reading returned by pulse.eco.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    // ---
    pub sensor_id: String,
    pub stamp: DateTime<FixedOffset>,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub position: String,
    #[serde(default, deserialize_with = "deserialize_reading")]
    pub value: Option<f64>,
}

/// Current overall values for a city (`/rest/overall`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallValues {
    // ---
    #[serde(default)]
    pub city_name: String,
    #[serde(default)]
    values: HashMap<String, Value>,
}

impl OverallValues {
    /// Known types in reporting order, with `None` where the city reports nothing.
    pub fn ordered(&self) -> Vec<(DataValueType, Option<f64>)> {
        // ---
        DataValueType::ALL
            .into_iter()
            .map(|t| (t, self.values.get(t.as_query()).and_then(reading_from_json)))
            .collect()
    }
}

#[cfg(test)]
impl OverallValues {
    pub fn from_pairs(city_name: &str, pairs: &[(&str, Value)]) -> Self {
        Self {
            city_name: city_name.to_string(),
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }
}

// pulse.eco encodes readings as strings ("27", "N/A"); numbers are accepted too.
fn reading_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn deserialize_reading<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(reading_from_json))
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Human => f.write_str("Human"),
            Role::Assistant => f.write_str("AI"),
        }
    }
}

/// One entry of the in-memory conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    // ---
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
