use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::utils::{decimal0, decimal2, format_reading_time};

/// Application version reported in every telemetry record and state patch.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The four environmental metrics tracked by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Humidity,
    Brightness,
    Loudness,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Brightness => "brightness",
            Metric::Loudness => "loudness",
        }
    }
}

/// One raw sample from a sensor channel. Not retained: consumed by the
/// aggregator immediately after validation.
#[derive(Debug, Clone)]
pub struct SensorReading {
    pub metric: Metric,
    pub value: f64,
    pub taken_at: OffsetDateTime,
}

impl SensorReading {
    pub fn new(metric: Metric, value: f64) -> Self {
        SensorReading {
            metric,
            value,
            taken_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Reduced values of all metrics at one dispatch instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub brightness: f64,
    pub loudness: f64,
}

/// The wire record published to the hub once per dispatch cycle.
///
/// Every field is decimal-formatted text, not a JSON number, so that
/// loosely-typed downstream consumers keep working if precision or field
/// semantics change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub device: String,
    pub appversion: String,
    pub readingtime: String,
    pub temperature: String,
    pub humidity: String,
    pub brightness: String,
    pub loudness: String,
}

impl TelemetryRecord {
    pub fn new(device_id: &str, taken_at: OffsetDateTime, snapshot: &EnvSnapshot) -> Self {
        TelemetryRecord {
            device: device_id.to_string(),
            appversion: APP_VERSION.to_string(),
            readingtime: format_reading_time(&taken_at),
            temperature: decimal2(snapshot.temperature),
            humidity: decimal2(snapshot.humidity),
            brightness: decimal0(snapshot.brightness),
            loudness: decimal0(snapshot.loudness),
        }
    }
}

/// Sparse key/value patch published to the state-report sink when the
/// dispatch interval changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatePatch {
    #[serde(rename = "appVersion")]
    pub app_version: String,
    #[serde(rename = "dataIntervalInMS")]
    pub data_interval_in_ms: u64,
}

impl StatePatch {
    pub fn interval(ms: u64) -> Self {
        StatePatch {
            app_version: APP_VERSION.to_string(),
            data_interval_in_ms: ms,
        }
    }
}
