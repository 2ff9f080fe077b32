//! Client for the pulse.eco air quality REST API.
//!
//! Every city has its own host (`https://{city}.pulse.eco/rest/`). Tools do
//! not hold a client across invocations: they ask an [`AirQualityConnector`]
//! for a fresh [`AirQualityApi`] scoped to one city, issue their requests
//! sequentially, and drop it before returning.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::{AveragePeriod, DataValue, DataValueType, OverallValues, Sensor};

// ---

/// Sensor id pulse.eco uses for "all sensors in the city".
pub const CITY_WIDE_SENSOR_ID: &str = "-1";

/// Failures talking to pulse.eco.
///
/// Callers collapse most of these into a single user-facing sentence, but the
/// variants are kept apart for logging.
#[derive(Debug, Error)]
pub enum PulseEcoError {
    // ---
    #[error("pulse.eco request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("pulse.eco returned {status} for {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("`{0}` is not a pulse.eco city name")]
    InvalidCity(String),

    #[error("could not decode pulse.eco response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The subset of the pulse.eco API the tools consume.
#[async_trait]
pub trait AirQualityApi: Send + Sync {
    /// Current overall values for the city.
    async fn overall(&self) -> Result<OverallValues, PulseEcoError>;

    /// All sensors registered in the city.
    async fn sensors(&self) -> Result<Vec<Sensor>, PulseEcoError>;

    /// Averaged values of one type over `[from, to)`; zero or one row per period.
    async fn avg_data(
        &self,
        period: AveragePeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        value_type: DataValueType,
        sensor_id: &str,
    ) -> Result<Vec<DataValue>, PulseEcoError>;

    /// Raw readings of every type for one sensor over `[from, to)`.
    async fn data_raw(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        sensor_id: &str,
    ) -> Result<Vec<DataValue>, PulseEcoError>;
}

/// Creates a per-invocation [`AirQualityApi`] for a city.
pub trait AirQualityConnector: Send + Sync {
    fn connect(&self, city: &str) -> Box<dyn AirQualityApi>;
}

/// Connects to the public pulse.eco hosts.
#[derive(Debug, Clone, Default)]
pub struct PulseEcoConnector {
    // ---
    credentials: Option<(String, String)>,
}

impl PulseEcoConnector {
    pub fn new(credentials: Option<(String, String)>) -> Self {
        Self { credentials }
    }
}

impl AirQualityConnector for PulseEcoConnector {
    fn connect(&self, city: &str) -> Box<dyn AirQualityApi> {
        Box::new(PulseEcoClient::new(city, self.credentials.clone()))
    }
}

/// HTTP client bound to one city's pulse.eco host.
#[derive(Debug, Clone)]
pub struct PulseEcoClient {
    // ---
    client: Client,
    city: String,
    credentials: Option<(String, String)>,
}

/// Base REST URL for a city.
///
/// The city becomes the leftmost label of the host, so it must be a single
/// DNS label (`[a-z0-9-]`, no leading or trailing hyphen).
pub fn city_base_url(city: &str) -> Result<String, PulseEcoError> {
    // ---
    let label = city.trim().to_lowercase();
    let valid = !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !valid {
        return Err(PulseEcoError::InvalidCity(city.to_string()));
    }
    Ok(format!("https://{label}.pulse.eco/rest"))
}

fn format_stamp(stamp: DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Secs, false)
}

impl PulseEcoClient {
    /// Creates a client with its own connection pool for `city`.
    pub fn new(city: &str, credentials: Option<(String, String)>) -> Self {
        // ---
        Self {
            client: Client::new(),
            city: city.to_string(),
            credentials,
        }
    }

    /// GET `{base_url}/{endpoint}` with `query` and decode the JSON body.
    async fn get<R>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<R, PulseEcoError>
    where
        R: DeserializeOwned + std::fmt::Debug,
    {
        // ---
        let url = format!("{}/{}", city_base_url(&self.city)?, endpoint);
        debug!(%url, ?query, "pulse.eco request");

        let mut request = self.client.get(&url).query(query);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%status, "pulse.eco response");

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".into());
            error!(%status, %body, "pulse.eco request failed");
            return Err(PulseEcoError::Status { status, url, body });
        }

        let text = response.text().await?;
        match serde_json::from_str::<R>(&text) {
            Ok(parsed) => {
                trace!(?parsed, "deserialized pulse.eco response");
                Ok(parsed)
            }
            Err(source) => {
                error!(%source, raw = %text, "pulse.eco deserialization error");
                Err(PulseEcoError::Decode { url, source })
            }
        }
    }
}

#[async_trait]
impl AirQualityApi for PulseEcoClient {
    async fn overall(&self) -> Result<OverallValues, PulseEcoError> {
        self.get("overall", &[]).await
    }

    async fn sensors(&self) -> Result<Vec<Sensor>, PulseEcoError> {
        self.get("sensor", &[]).await
    }

    async fn avg_data(
        &self,
        period: AveragePeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        value_type: DataValueType,
        sensor_id: &str,
    ) -> Result<Vec<DataValue>, PulseEcoError> {
        // ---
        let endpoint = format!("avgData/{}", period.as_path());
        let query = [
            ("sensorId", sensor_id.to_string()),
            ("type", value_type.as_query().to_string()),
            ("from", format_stamp(from)),
            ("to", format_stamp(to)),
        ];
        self.get(&endpoint, &query).await
    }

    async fn data_raw(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        sensor_id: &str,
    ) -> Result<Vec<DataValue>, PulseEcoError> {
        // ---
        let query = [
            ("sensorId", sensor_id.to_string()),
            ("from", format_stamp(from)),
            ("to", format_stamp(to)),
        ];
        self.get("dataRaw", &query).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_city_base_url_is_lowercased() {
        // ---
        assert_eq!(city_base_url("Skopje").unwrap(), "https://skopje.pulse.eco/rest");
        assert_eq!(city_base_url(" Bitola ").unwrap(), "https://bitola.pulse.eco/rest");
        assert_eq!(
            city_base_url("novi-sad").unwrap(),
            "https://novi-sad.pulse.eco/rest"
        );
    }

    #[test]
    fn test_city_must_be_a_single_host_label() {
        // ---
        for city in [
            "attacker.example#",
            "attacker.example/x?",
            "user@evil",
            "skopje.evil",
            "not a city",
            "-skopje",
            "",
            "Скопје",
        ] {
            assert!(
                matches!(city_base_url(city), Err(PulseEcoError::InvalidCity(_))),
                "{city:?}"
            );
        }
    }

    #[test]
    fn test_stamp_format_has_offset() {
        // ---
        let stamp = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_stamp(stamp), "2024-03-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_foreign_host_is_rejected_before_any_request() {
        // ---
        let client = PulseEcoClient::new(
            "attacker.example#",
            Some(("user".to_string(), "secret".to_string())),
        );
        let err = client.sensors().await.unwrap_err();
        assert!(matches!(err, PulseEcoError::InvalidCity(_)));
    }
}

/// In-memory pulse.eco stand-in that records every call.
#[cfg(test)]
pub mod fake {
    // ---
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use chrono::TimeZone;

    use super::*;

    #[derive(Debug, Default)]
    struct State {
        overall: OverallValues,
        sensors: Vec<Sensor>,
        averages: HashMap<(String, DataValueType), f64>,
        raw: HashMap<String, usize>,
        fail: bool,
        fail_averages: bool,
        calls: Vec<String>,
    }

    /// Cloning shares state, so the connector and tests see the same calls.
    #[derive(Debug, Clone, Default)]
    pub struct FakeAirQuality {
        state: Arc<Mutex<State>>,
    }

    impl FakeAirQuality {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every request fails as if the city host did not exist.
        pub fn failing() -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().fail = true;
            fake
        }

        /// Only `avg_data` fails; sensors and raw data still answer.
        pub fn with_failing_averages(self) -> Self {
            self.state.lock().unwrap().fail_averages = true;
            self
        }

        pub fn with_overall(self, overall: OverallValues) -> Self {
            self.state.lock().unwrap().overall = overall;
            self
        }

        pub fn with_sensors(self, sensors: Vec<Sensor>) -> Self {
            self.state.lock().unwrap().sensors = sensors;
            self
        }

        pub fn with_average(self, sensor_id: &str, value_type: DataValueType, value: f64) -> Self {
            self.state
                .lock()
                .unwrap()
                .averages
                .insert((sensor_id.to_string(), value_type), value);
            self
        }

        pub fn with_raw_rows(self, sensor_id: &str, rows: usize) -> Self {
            self.state
                .lock()
                .unwrap()
                .raw
                .insert(sensor_id.to_string(), rows);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn record(&self, call: String) -> Result<(), PulseEcoError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            if state.fail {
                return Err(PulseEcoError::Status {
                    status: StatusCode::NOT_FOUND,
                    url: "https://nowhere.pulse.eco/rest".into(),
                    body: "not found".into(),
                });
            }
            Ok(())
        }
    }

    fn row(sensor_id: &str, value_type: &str, value: f64) -> DataValue {
        DataValue {
            sensor_id: sensor_id.to_string(),
            stamp: Utc
                .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
                .unwrap()
                .fixed_offset(),
            value_type: value_type.to_string(),
            position: String::new(),
            value: Some(value),
        }
    }

    #[async_trait]
    impl AirQualityApi for FakeAirQuality {
        async fn overall(&self) -> Result<OverallValues, PulseEcoError> {
            self.record("overall".into())?;
            Ok(self.state.lock().unwrap().overall.clone())
        }

        async fn sensors(&self) -> Result<Vec<Sensor>, PulseEcoError> {
            self.record("sensors".into())?;
            Ok(self.state.lock().unwrap().sensors.clone())
        }

        async fn avg_data(
            &self,
            period: AveragePeriod,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            value_type: DataValueType,
            sensor_id: &str,
        ) -> Result<Vec<DataValue>, PulseEcoError> {
            self.record(format!(
                "avg_data:{}:{}:{}",
                period.as_path(),
                sensor_id,
                value_type.as_query()
            ))?;
            let state = self.state.lock().unwrap();
            if state.fail_averages {
                return Err(PulseEcoError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    url: "https://skopje.pulse.eco/rest/avgData/day".into(),
                    body: "upstream unavailable".into(),
                });
            }
            Ok(state
                .averages
                .get(&(sensor_id.to_string(), value_type))
                .map(|v| vec![row(sensor_id, value_type.as_query(), *v)])
                .unwrap_or_default())
        }

        async fn data_raw(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            sensor_id: &str,
        ) -> Result<Vec<DataValue>, PulseEcoError> {
            self.record(format!("data_raw:{sensor_id}"))?;
            let rows = self.state.lock().unwrap().raw.get(sensor_id).copied().unwrap_or(0);
            Ok((0..rows).map(|_| row(sensor_id, "pm10", 1.0)).collect())
        }
    }

    impl AirQualityConnector for FakeAirQuality {
        fn connect(&self, _city: &str) -> Box<dyn AirQualityApi> {
            Box::new(self.clone())
        }
    }
}
