use crate::error::ParseError;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One sensor sample for a storage unit. Fields are only reachable through accessors so a
/// constructed reading is never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    unit_id: i32,
    unit_name: String,
    temperature: f64,
    humidity: Option<f64>,
    timestamp: String,
}

impl Reading {
    pub fn new(
        unit_id: i32,
        unit_name: impl Into<String>,
        temperature: f64,
        humidity: Option<f64>,
        timestamp: impl Into<String>,
    ) -> Result<Self, ParseError> {
        if !temperature.is_finite() {
            return Err(ParseError::invalid("temperature", "must be a finite number"));
        }
        if let Some(value) = humidity {
            if !value.is_finite() {
                return Err(ParseError::invalid("humidity", "must be a finite number"));
            }
        }
        let timestamp = timestamp.into();
        let trimmed = timestamp.trim();
        if NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT).is_err() {
            return Err(ParseError::invalid(
                "timestamp",
                format!("expected YYYY-MM-DD HH:MM:SS, got {trimmed:?}"),
            ));
        }
        Ok(Self {
            unit_id,
            unit_name: unit_name.into().trim().to_string(),
            temperature,
            humidity,
            timestamp: trimmed.to_string(),
        })
    }

    pub fn unit_id(&self) -> i32 {
        self.unit_id
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

#[derive(Debug, Deserialize)]
struct BorrowedReading<'a> {
    #[serde(default, borrow)]
    unit_id: Option<WireNumber<'a>>,
    #[serde(default, borrow)]
    unit_name: Option<&'a str>,
    #[serde(default, borrow)]
    temperature: Option<WireNumber<'a>>,
    #[serde(default, borrow)]
    humidity: Option<WireNumber<'a>>,
    #[serde(default, borrow)]
    timestamp: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNumber<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
}

impl<'a> WireNumber<'a> {
    fn as_f64(&self, field: &'static str) -> Result<f64, ParseError> {
        match self {
            WireNumber::Int(v) => Ok(*v as f64),
            WireNumber::Float(v) => Ok(*v),
            WireNumber::Text(raw) => Err(ParseError::invalid(
                field,
                format!("expected a number, got string {raw:?}"),
            )),
        }
    }

    fn as_unit_id(&self) -> Result<i32, ParseError> {
        let raw = match self {
            WireNumber::Int(v) => *v,
            WireNumber::Float(v) if v.fract() == 0.0 && v.is_finite() => *v as i64,
            WireNumber::Float(v) => {
                return Err(ParseError::invalid(
                    "unit_id",
                    format!("expected an integer, got {v}"),
                ))
            }
            WireNumber::Text(raw) => {
                return Err(ParseError::invalid(
                    "unit_id",
                    format!("expected an integer, got string {raw:?}"),
                ))
            }
        };
        i32::try_from(raw).map_err(|_| ParseError::invalid("unit_id", "out of range"))
    }
}

/// Current local wall-clock time in the reading timestamp format.
pub fn local_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Decodes a UTF-8 JSON reading as published on the transport or pushed over HTTP.
///
/// `unit_id` and `temperature` are required; a missing `timestamp` is stamped with the local
/// receive time. The buffer is parsed in place.
pub fn parse_reading(payload: &mut [u8]) -> Result<Reading, ParseError> {
    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::Json("empty payload".to_string()));
    }
    let wire: BorrowedReading =
        simd_json::serde::from_slice(payload).map_err(|err| ParseError::Json(err.to_string()))?;

    let unit_id = wire
        .unit_id
        .as_ref()
        .ok_or(ParseError::MissingField("unit_id"))?
        .as_unit_id()?;
    let temperature = wire
        .temperature
        .as_ref()
        .ok_or(ParseError::MissingField("temperature"))?
        .as_f64("temperature")?;
    let humidity = wire
        .humidity
        .as_ref()
        .map(|value| value.as_f64("humidity"))
        .transpose()?;
    let timestamp = wire
        .timestamp
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(local_timestamp);

    Reading::new(
        unit_id,
        wire.unit_name.unwrap_or_default(),
        temperature,
        humidity,
        timestamp,
    )
}
