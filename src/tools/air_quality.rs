//! Air quality lookups against pulse.eco.
//!
//! Three tools share the day-average merge defined here:
//! - current overall values of a city,
//! - the day average of a whole city on a past date,
//! - the day average of the nearest sensor with data around a free-text
//!   location, within [`SENSOR_RADIUS_KM`].
//!
//! Expected failures (today's date, unknown city, no data) come back as
//! plain sentences for the model to relay; only broken upstream data or an
//! unreachable geocoder fail the tool.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::{args, Tool, ToolError};
use crate::{
    nearest::{rank_sensors, SENSOR_RADIUS_KM},
    pulse_eco::CITY_WIDE_SENSOR_ID,
    AirQualityApi, AirQualityConnector, AveragePeriod, DataValueType, Geocoder, PulseEcoError,
};

// ---

pub const TODAY_NOT_SUPPORTED: &str = "Using this tool for today's date is not supported! \
     You can only get daily average for a finished day.";

pub const NO_CITY_DATA: &str = "No data available for this city.";

pub fn invalid_city(city: &str) -> String {
    format!("Invalid city name `{city}`.")
}

/// Averaged value per type for one sensor and day, in type order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyAverageSummary {
    values: Vec<(DataValueType, f64)>,
}

impl DailyAverageSummary {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for DailyAverageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (value_type, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value_type}: {value}")?;
        }
        Ok(())
    }
}

/// `[date 00:00, date+1 00:00)` in UTC.
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    // ---
    let next_day = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    (
        date.and_time(chrono::NaiveTime::MIN).and_utc(),
        next_day.and_time(chrono::NaiveTime::MIN).and_utc(),
    )
}

/// Request the day average of every type, one request at a time.
///
/// A type with no rows is simply absent; the first error aborts the merge.
pub async fn daily_averages(
    api: &dyn AirQualityApi,
    date: NaiveDate,
    sensor_id: &str,
) -> Result<DailyAverageSummary, PulseEcoError> {
    // ---
    let (from, to) = day_window(date);
    let mut values = Vec::new();

    for value_type in DataValueType::ALL {
        let rows = api
            .avg_data(AveragePeriod::Day, from, to, value_type, sensor_id)
            .await?;
        match rows.first().and_then(|row| row.value) {
            Some(value) => values.push((value_type, value)),
            None => debug!(%value_type, sensor_id, "no day average"),
        }
    }

    Ok(DailyAverageSummary { values })
}

/// Geocoding query biased towards `city` unless the location already names it.
pub fn geocoding_query(location: &str, city: &str) -> String {
    // ---
    if location.to_lowercase().ends_with(&city.to_lowercase()) {
        location.to_string()
    } else {
        format!("{location}, {city}")
    }
}

/// Current overall values for `city`.
#[instrument(skip(connector))]
pub async fn current_city_air_quality(connector: &dyn AirQualityConnector, city: &str) -> String {
    // ---
    let api = connector.connect(city);
    let overall = match api.overall().await {
        Ok(overall) => overall,
        Err(e) => {
            warn!(error = %e, "overall lookup failed");
            return invalid_city(city);
        }
    };
    debug!(city_name = %overall.city_name, "overall values");

    let values = overall
        .ordered()
        .into_iter()
        .filter_map(|(value_type, value)| value.map(|v| format!("{value_type}: {v}")))
        .collect::<Vec<_>>();

    if values.is_empty() {
        return NO_CITY_DATA.to_string();
    }
    format!("Current air quality for `{city}`: {}", values.join(", "))
}

/// Day average for the whole of `city` on `date`.
#[instrument(skip(connector))]
pub async fn average_city_air_quality_on(
    connector: &dyn AirQualityConnector,
    city: &str,
    date: NaiveDate,
    today: NaiveDate,
) -> String {
    // ---
    if date == today {
        return TODAY_NOT_SUPPORTED.to_string();
    }

    let api = connector.connect(city);
    let summary = match daily_averages(api.as_ref(), date, CITY_WIDE_SENSOR_ID).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "day average lookup failed");
            return invalid_city(city);
        }
    };

    if summary.is_empty() {
        return NO_CITY_DATA.to_string();
    }
    format!("Air quality for `{city}` on `{date}`: {summary}")
}

fn upstream_failed(city: &str, error: &PulseEcoError) -> String {
    warn!(%error, "sensor lookup failed");
    invalid_city(city)
}

/// Day average of the nearest sensor with data around `location`.
///
/// Sensors are tried nearest first; the walk ends at the first sensor farther
/// than [`SENSOR_RADIUS_KM`], even if it would have data. Any pulse.eco
/// failure answers "Invalid city name"; geocoder and position errors fail
/// the tool.
#[instrument(skip(connector, geocoder))]
pub async fn average_location_air_quality_on(
    connector: &dyn AirQualityConnector,
    geocoder: &dyn Geocoder,
    city: &str,
    location: &str,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<String, ToolError> {
    // ---
    let query = geocoding_query(location, city);

    if date == today {
        return Ok(TODAY_NOT_SUPPORTED.to_string());
    }

    let matches = geocoder
        .geocode(&query)
        .await
        .map_err(|e| ToolError::Failed(e.to_string()))?;
    let Some(best) = matches.into_iter().next() else {
        return Ok(format!("Could not resolve location `{query}`."));
    };
    info!(formatted = %best.formatted, "location resolved");

    let api = connector.connect(city);
    let sensors = match api.sensors().await {
        Ok(sensors) => sensors,
        Err(e) => return Ok(upstream_failed(city, &e)),
    };
    let ranked =
        rank_sensors(best.coordinate, sensors).map_err(|e| ToolError::Failed(e.to_string()))?;

    let (from, to) = day_window(date);
    for candidate in ranked {
        if !candidate.within_radius() {
            debug!(distance_km = candidate.distance_km, "left search radius");
            break;
        }
        let sensor = &candidate.sensor;

        let raw = match api.data_raw(from, to, &sensor.sensor_id).await {
            Ok(raw) => raw,
            Err(e) => return Ok(upstream_failed(city, &e)),
        };
        if raw.is_empty() {
            debug!(sensor_id = %sensor.sensor_id, "no raw data, trying next sensor");
            continue;
        }

        let summary = match daily_averages(api.as_ref(), date, &sensor.sensor_id).await {
            Ok(summary) => summary,
            Err(e) => return Ok(upstream_failed(city, &e)),
        };
        if summary.is_empty() {
            debug!(sensor_id = %sensor.sensor_id, "no averages, trying next sensor");
            continue;
        }

        return Ok(format!(
            "Input location resolved to `{}`. \
             Closest sensor to that location is `{}` with distance `{:.3} km`. \
             The air quality for that sensor on `{date}`: {summary}",
            best.formatted, sensor.description, candidate.distance_km
        ));
    }

    Ok(format!(
        "Input location resolved to `{}`. \
         No sensor was found in a {} km radius of that location.",
        best.formatted, SENSOR_RADIUS_KM
    ))
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

fn city_property() -> Value {
    json!({"type": "string", "description": "City to get the air quality stats for"})
}

fn date_property() -> Value {
    json!({
        "type": "string",
        "format": "date",
        "description": "ISO date for when to get the air quality stats"
    })
}

pub struct CurrentCityAirQuality {
    connector: Arc<dyn AirQualityConnector>,
}

impl CurrentCityAirQuality {
    pub fn new(connector: Arc<dyn AirQualityConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Tool for CurrentCityAirQuality {
    fn name(&self) -> &'static str {
        "get_current_city_air_quality"
    }

    fn description(&self) -> &'static str {
        "Get the current real-time overall air quality stats of a specific input city."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "description": "City to get the air quality stats of."}
            },
            "required": ["city"]
        })
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args = args::object(args, &["city"])?;
        let city = args::string(&args, "city")?;
        Ok(current_city_air_quality(self.connector.as_ref(), &city).await)
    }
}

pub struct AverageCityAirQualityOnDate {
    connector: Arc<dyn AirQualityConnector>,
}

impl AverageCityAirQualityOnDate {
    pub fn new(connector: Arc<dyn AirQualityConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Tool for AverageCityAirQualityOnDate {
    fn name(&self) -> &'static str {
        "get_average_city_air_quality_on_date"
    }

    fn description(&self) -> &'static str {
        "Get the day average air quality stats of a specific input city on a date."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"city": city_property(), "date": date_property()},
            "required": ["city", "date"]
        })
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args = args::object(args, &["city", "date"])?;
        let city = args::string(&args, "city")?;
        let date = args::date(&args, "date")?;
        Ok(average_city_air_quality_on(self.connector.as_ref(), &city, date, today_utc()).await)
    }
}

pub struct AverageLocationAirQualityOnDate {
    connector: Arc<dyn AirQualityConnector>,
    geocoder: Arc<dyn Geocoder>,
}

impl AverageLocationAirQualityOnDate {
    pub fn new(connector: Arc<dyn AirQualityConnector>, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            connector,
            geocoder,
        }
    }
}

#[async_trait]
impl Tool for AverageLocationAirQualityOnDate {
    fn name(&self) -> &'static str {
        "get_average_location_air_quality_on_date"
    }

    fn description(&self) -> &'static str {
        "Get the day average air quality stats of a specific input location on a date."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": city_property(),
                "location": {
                    "type": "string",
                    "description": "Free form location query for exact location air quality"
                },
                "date": date_property()
            },
            "required": ["city", "location", "date"]
        })
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args = args::object(args, &["city", "location", "date"])?;
        let city = args::string(&args, "city")?;
        let location = args::string(&args, "location")?;
        let date = args::date(&args, "date")?;
        average_location_air_quality_on(
            self.connector.as_ref(),
            self.geocoder.as_ref(),
            &city,
            &location,
            date,
            today_utc(),
        )
        .await
    }
}
