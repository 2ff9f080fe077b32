//! Relative date and time arithmetic in UTC.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use super::{args, Tool, ToolError};

// ---

/// `now + hours`, or an argument error when the result is not representable.
pub fn shift_hours(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>, ToolError> {
    // ---
    Duration::try_hours(hours)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| ToolError::InvalidArguments(format!("{hours} hours is out of range")))
}

/// `now + days`, or an argument error when the result is not representable.
pub fn shift_days(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, ToolError> {
    // ---
    Duration::try_days(days)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| ToolError::InvalidArguments(format!("{days} days is out of range")))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NowPlusHours;

#[async_trait]
impl Tool for NowPlusHours {
    fn name(&self) -> &'static str {
        "now_plus_hours"
    }

    fn description(&self) -> &'static str {
        "Add a number of hours to now, supports negative hours."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hours": {"type": "integer", "description": "Hours to add, negative for the past"}
            },
            "required": ["hours"]
        })
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args = args::object(args, &["hours"])?;
        let hours = args::integer(&args, "hours")?;
        Ok(shift_hours(Utc::now(), hours)?.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DatetimePlusDays;

#[async_trait]
impl Tool for DatetimePlusDays {
    fn name(&self) -> &'static str {
        "datetime_plus_days"
    }

    fn description(&self) -> &'static str {
        "Add a number of days to now, supports negative days."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {"type": "integer", "description": "Days to add, negative for the past"}
            },
            "required": ["days"]
        })
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let args = args::object(args, &["days"])?;
        let days = args::integer(&args, "days")?;
        Ok(shift_days(Utc::now(), days)?.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_shift_hours_backwards() {
        // ---
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 2, 30, 0).unwrap();
        let shifted = shift_hours(now, -3).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2024, 2, 29, 23, 30, 0).unwrap());
    }

    #[test]
    fn test_shift_days_crosses_month() {
        // ---
        let now = Utc.with_ymd_and_hms(2024, 1, 30, 12, 0, 0).unwrap();
        assert_eq!(
            shift_days(now, 3).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 2, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_is_argument_error() {
        // ---
        let now = Utc::now();
        assert!(matches!(
            shift_days(now, i64::MAX),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            shift_hours(now, i64::MIN),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_now_plus_hours_tool_round_trips() {
        // ---
        let before = Utc::now();
        let out = NowPlusHours.call(json!({"hours": -3})).await.unwrap();
        let after = Utc::now();

        let parsed = DateTime::parse_from_rfc3339(&out).unwrap().with_timezone(&Utc);
        assert_eq!(parsed.to_rfc3339(), out);
        assert!(parsed >= before - Duration::hours(3));
        assert!(parsed <= after - Duration::hours(3));
    }

    #[tokio::test]
    async fn test_datetime_plus_days_accepts_string_argument() {
        // ---
        let before = Utc::now();
        let out = DatetimePlusDays.call(json!({"days": "-1"})).await.unwrap();
        let parsed = DateTime::parse_from_rfc3339(&out).unwrap().with_timezone(&Utc);
        assert!(parsed >= before - Duration::days(1));
        assert!(parsed < before);
    }

    #[tokio::test]
    async fn test_bad_argument_is_reported() {
        // ---
        let err = NowPlusHours.call(json!({"hours": "soon"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
