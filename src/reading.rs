//! ==============================================================================
//! reading.rs - sensor reading model
//! ==============================================================================
//!
//! purpose:
//!     one row of the IAQ table, plus the wire shapes around it:
//!     - Measurements: the eleven numeric columns
//!     - SensorReading: a stored row (id, location, recTime, measurements)
//!     - ReadingResponse: the JSON a client receives (tags included)
//!     - NewReadingPayload / NewReading: the POST body and its normalized form
//!
//! relationships:
//!     - used by: store.rs (rows in, rows out), handlers.rs (JSON in, JSON out)
//!     - uses: sanitize.rs (Measurements::sanitize), tags.rs (annotation)
//!
//! ==============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::query::parse_timestamp;

/// The eleven measurement columns. JSON names match the column names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// temperature in celsius
    pub temp: f64,
    /// relative humidity (0-100%)
    #[serde(rename = "rH")]
    pub rh: f64,
    /// VOC index
    #[serde(rename = "VOC")]
    pub voc: f64,
    /// NOx index
    #[serde(rename = "NOx")]
    pub nox: f64,
    pub pmass1: f64,
    pub pmass25: f64,
    pub pmass4: f64,
    pub pmass10: f64,
    /// formaldehyde
    #[serde(rename = "HCHO")]
    pub hcho: f64,
    /// CO2 in ppm
    #[serde(rename = "CO2")]
    pub co2: f64,
    /// indoor dew point in celsius
    #[serde(rename = "indoorTd")]
    pub indoor_td: f64,
}

impl Measurements {
    pub(crate) fn fields_mut(&mut self) -> [&mut f64; 11] {
        [
            &mut self.temp,
            &mut self.rh,
            &mut self.voc,
            &mut self.nox,
            &mut self.pmass1,
            &mut self.pmass25,
            &mut self.pmass4,
            &mut self.pmass10,
            &mut self.hcho,
            &mut self.co2,
            &mut self.indoor_td,
        ]
    }

    pub fn values(&self) -> [f64; 11] {
        [
            self.temp,
            self.rh,
            self.voc,
            self.nox,
            self.pmass1,
            self.pmass25,
            self.pmass4,
            self.pmass10,
            self.hcho,
            self.co2,
            self.indoor_td,
        ]
    }
}

/// A persisted reading as it comes back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub id: i64,
    pub location: i32,
    pub recorded_at: DateTime<Utc>,
    pub measurements: Measurements,
}

/// JSON shape of one reading on the read endpoints.
///
/// `recTime` and `timestamp` carry the same RFC3339 instant; dashboard
/// clients read either one.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingResponse {
    pub id: i64,
    pub location: String,
    #[serde(rename = "recTime")]
    pub rec_time: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub measurements: Measurements,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl From<SensorReading> for ReadingResponse {
    fn from(reading: SensorReading) -> Self {
        let stamp = reading
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            id: reading.id,
            location: reading.location.to_string(),
            rec_time: stamp.clone(),
            timestamp: stamp,
            measurements: reading.measurements,
            tags: Vec::new(),
        }
    }
}

// ==============================================================================
// write path
// ==============================================================================

/// `location` as sent by clients: usually a numeric string, sometimes a number.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LocationField {
    Number(i64),
    Text(String),
}

impl Default for LocationField {
    fn default() -> Self {
        LocationField::Number(0)
    }
}

impl LocationField {
    pub fn to_location(&self) -> i32 {
        match self {
            LocationField::Number(n) => i32::try_from(*n).unwrap_or(0),
            LocationField::Text(s) => parse_location(s),
        }
    }
}

/// Lossy location normalization: anything that is not an integer maps to `0`.
pub fn parse_location(raw: &str) -> i32 {
    raw.trim().parse::<i32>().unwrap_or(0)
}

/// POST body for a new reading.
///
/// Every measurement is optional and accepts a JSON number or a numeric
/// string. Missing measurements default to `0.0`, except `indoorTd`, which is
/// derived when it is absent but both `temp` and `rH` were sent.
#[derive(Debug, Default, Deserialize)]
pub struct NewReadingPayload {
    #[serde(default)]
    pub location: LocationField,
    #[serde(default, alias = "recTime")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp: Option<f64>,
    #[serde(default, rename = "rH", deserialize_with = "lenient_f64")]
    pub rh: Option<f64>,
    #[serde(default, rename = "VOC", deserialize_with = "lenient_f64")]
    pub voc: Option<f64>,
    #[serde(default, rename = "NOx", deserialize_with = "lenient_f64")]
    pub nox: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pmass1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pmass25: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pmass4: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pmass10: Option<f64>,
    #[serde(default, rename = "HCHO", deserialize_with = "lenient_f64")]
    pub hcho: Option<f64>,
    #[serde(default, rename = "CO2", deserialize_with = "lenient_f64")]
    pub co2: Option<f64>,
    #[serde(default, rename = "indoorTd", deserialize_with = "lenient_f64")]
    pub indoor_td: Option<f64>,
}

impl NewReadingPayload {
    /// Decode a POST body. Only a JSON object is a reading; serde would
    /// otherwise also accept a positional array for this struct.
    pub fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        let invalid = |detail: String| {
            debug!("Undecodable body: {}", detail);
            ApiError::Validation("Invalid request body".to_string())
        };

        match serde_json::from_slice::<Value>(body).map_err(|e| invalid(e.to_string()))? {
            object @ Value::Object(_) => {
                serde_json::from_value(object).map_err(|e| invalid(e.to_string()))
            }
            other => Err(invalid(format!("expected an object, got {}", json_kind(&other)))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(v)) => Ok(Some(v)),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got {:?}", s))),
    }
}

/// Approximate dew point from temperature and relative humidity.
pub fn approx_dew_point(temp: f64, rh: f64) -> f64 {
    temp - (100.0 - rh) / 5.0
}

/// A normalized reading ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub location: i32,
    pub recorded_at: DateTime<Utc>,
    pub measurements: Measurements,
}

impl NewReading {
    /// Normalize a POST body. Location parsing is lossy; an unparseable
    /// timestamp is rejected. Readings without a timestamp are stamped now.
    pub fn from_payload(payload: NewReadingPayload) -> Result<Self, ApiError> {
        let recorded_at = match payload.timestamp.as_deref().map(str::trim) {
            None | Some("") => Utc::now(),
            Some(raw) => parse_timestamp(raw).ok_or_else(|| {
                debug!("Unparseable timestamp {:?}", raw);
                ApiError::Validation("Invalid timestamp".to_string())
            })?,
        };

        // derive only from values the client actually sent
        let indoor_td = match (payload.indoor_td, payload.temp, payload.rh) {
            (Some(td), _, _) => td,
            (None, Some(temp), Some(rh)) => approx_dew_point(temp, rh),
            _ => 0.0,
        };
        let temp = payload.temp.unwrap_or(0.0);
        let rh = payload.rh.unwrap_or(0.0);

        let mut measurements = Measurements {
            temp,
            rh,
            voc: payload.voc.unwrap_or(0.0),
            nox: payload.nox.unwrap_or(0.0),
            pmass1: payload.pmass1.unwrap_or(0.0),
            pmass25: payload.pmass25.unwrap_or(0.0),
            pmass4: payload.pmass4.unwrap_or(0.0),
            pmass10: payload.pmass10.unwrap_or(0.0),
            hcho: payload.hcho.unwrap_or(0.0),
            co2: payload.co2.unwrap_or(0.0),
            indoor_td,
        };
        measurements.sanitize();

        Ok(Self {
            location: payload.location.to_location(),
            recorded_at,
            measurements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> NewReadingPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn location_parsing_is_lossy() {
        assert_eq!(parse_location("12"), 12);
        assert_eq!(parse_location(" 7 "), 7);
        assert_eq!(parse_location("-3"), -3);
        assert_eq!(parse_location("lab"), 0);
        assert_eq!(parse_location(""), 0);
        assert_eq!(parse_location("12.5"), 0);
    }

    #[test]
    fn location_accepts_number_or_string() {
        assert_eq!(payload(json!({"location": "4"})).location.to_location(), 4);
        assert_eq!(payload(json!({"location": 9})).location.to_location(), 9);
        assert_eq!(payload(json!({})).location.to_location(), 0);
        assert_eq!(
            payload(json!({"location": 9_000_000_000i64})).location.to_location(),
            0
        );
    }

    #[test]
    fn measurements_accept_numeric_strings() {
        let p = payload(json!({"temp": "22.5", "CO2": 800, "NOx": " 1 "}));
        assert_eq!(p.temp, Some(22.5));
        assert_eq!(p.co2, Some(800.0));
        assert_eq!(p.nox, Some(1.0));
        assert_eq!(p.voc, None);
    }

    #[test]
    fn non_numeric_measurement_is_rejected() {
        let result = serde_json::from_value::<NewReadingPayload>(json!({"temp": "warm"}));
        assert!(result.is_err());
    }

    #[test]
    fn from_payload_fills_defaults_and_derives_dew_point() {
        let reading =
            NewReading::from_payload(payload(json!({"location": "12", "temp": 22.0, "rH": 50.0})))
                .unwrap();
        assert_eq!(reading.location, 12);
        assert_eq!(reading.measurements.temp, 22.0);
        assert_eq!(reading.measurements.co2, 0.0);
        assert_eq!(reading.measurements.indoor_td, 12.0);
    }

    #[test]
    fn dew_point_needs_both_temp_and_humidity() {
        let temp_only =
            NewReading::from_payload(payload(json!({"location": "12", "temp": 22.5}))).unwrap();
        assert_eq!(temp_only.measurements.temp, 22.5);
        assert_eq!(temp_only.measurements.rh, 0.0);
        assert_eq!(temp_only.measurements.indoor_td, 0.0);

        let rh_only = NewReading::from_payload(payload(json!({"rH": 40.0}))).unwrap();
        assert_eq!(rh_only.measurements.indoor_td, 0.0);

        let empty = NewReading::from_payload(payload(json!({}))).unwrap();
        assert_eq!(empty.measurements.indoor_td, 0.0);
    }

    #[test]
    fn from_json_requires_an_object() {
        let bodies: [&[u8]; 6] = [
            b"[]",
            br#"["12", null, 30.0]"#,
            b"42",
            br#""text""#,
            b"null",
            b"not json",
        ];
        for body in bodies {
            assert!(
                matches!(
                    NewReadingPayload::from_json(body),
                    Err(ApiError::Validation(ref m)) if m == "Invalid request body"
                ),
                "accepted {:?}",
                String::from_utf8_lossy(body)
            );
        }
        let p = NewReadingPayload::from_json(br#"{"location": "3", "temp": 21}"#).unwrap();
        assert_eq!(p.location.to_location(), 3);
        assert_eq!(p.temp, Some(21.0));
    }

    #[test]
    fn explicit_dew_point_wins() {
        let reading = NewReading::from_payload(payload(
            json!({"temp": 22.0, "rH": 50.0, "indoorTd": 0}),
        ))
        .unwrap();
        assert_eq!(reading.measurements.indoor_td, 0.0);
    }

    #[test]
    fn from_payload_sanitizes_text_infinities() {
        let reading =
            NewReading::from_payload(payload(json!({"temp": "inf", "rH": "NaN"}))).unwrap();
        assert!(reading.measurements.is_sanitized());
        assert_eq!(reading.measurements.temp, 0.0);
        assert_eq!(reading.measurements.rh, 0.0);
    }

    #[test]
    fn from_payload_uses_supplied_timestamp() {
        let reading =
            NewReading::from_payload(payload(json!({"timestamp": "2024-03-01T10:00:00Z"})))
                .unwrap();
        assert_eq!(
            reading.recorded_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn from_payload_rejects_bad_timestamp() {
        let err = NewReading::from_payload(payload(json!({"recTime": "yesterday"}))).unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref m) if m == "Invalid timestamp"));
    }

    #[test]
    fn response_renders_location_and_rfc3339() {
        let reading = SensorReading {
            id: 3,
            location: 12,
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            measurements: Measurements {
                temp: 22.5,
                ..Measurements::default()
            },
        };
        let value = serde_json::to_value(ReadingResponse::from(reading)).unwrap();
        assert_eq!(value["location"], "12");
        assert_eq!(value["timestamp"], "2024-03-01T10:00:00Z");
        assert_eq!(value["recTime"], "2024-03-01T10:00:00Z");
        assert_eq!(value["temp"], 22.5);
        assert_eq!(value["rH"], 0.0);
        assert!(value.get("tags").is_none());
    }
}
