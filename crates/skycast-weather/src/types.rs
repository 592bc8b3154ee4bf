use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Measured quantities that reports are built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherParameter {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
}

impl WeatherParameter {
    pub const ALL: [WeatherParameter; 4] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::WindSpeed,
    ];

    /// Key used in measurement `fields` documents
    pub fn key(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::WindSpeed => "wind_speed",
        }
    }

    /// Label used in prompts
    pub fn label(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
            Self::WindSpeed => "Wind Speed",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Pressure => " hPa",
            Self::WindSpeed => " mph",
        }
    }
}

/// Hourly aggregate for one parameter. Any of the three may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
}

impl FieldStats {
    pub fn new(min: f64, max: f64, avg: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            avg: Some(avg),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One hour of station data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyMeasurement {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: MeasurementTags,
    /// Keyed by parameter name; unknown parameters are kept but not analysed
    #[serde(default)]
    pub fields: BTreeMap<String, FieldStats>,
}

impl HourlyMeasurement {
    pub fn field(&self, param: WeatherParameter) -> Option<&FieldStats> {
        self.fields.get(param.key())
    }

    pub fn location(&self) -> Option<&str> {
        self.tags.location.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Min/max/mean of every parameter over the analysed window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub temperature: ParameterSummary,
    pub humidity: ParameterSummary,
    pub pressure: ParameterSummary,
    pub wind_speed: ParameterSummary,
}

impl WeatherSummary {
    pub fn get(&self, param: WeatherParameter) -> &ParameterSummary {
        match param {
            WeatherParameter::Temperature => &self.temperature,
            WeatherParameter::Humidity => &self.humidity,
            WeatherParameter::Pressure => &self.pressure,
            WeatherParameter::WindSpeed => &self.wind_speed,
        }
    }

    pub fn get_mut(&mut self, param: WeatherParameter) -> &mut ParameterSummary {
        match param {
            WeatherParameter::Temperature => &mut self.temperature,
            WeatherParameter::Humidity => &mut self.humidity,
            WeatherParameter::Pressure => &mut self.pressure,
            WeatherParameter::WindSpeed => &mut self.wind_speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl TrendDirection {
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            Self::Rising
        } else if change < 0.0 {
            Self::Falling
        } else {
            Self::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub change: f64,
    pub rate_per_hour: f64,
    pub direction: TrendDirection,
}

/// Parameters with enough data for a trend. May be empty.
pub type TrendAnalysis = BTreeMap<WeatherParameter, Trend>;

/// Expected low and high for one parameter. The model may leave either out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub max: Option<f64>,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// A number as models tend to write it: plain, quoted, or null.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
}

/// Accept `1.5`, `"1.5"` and `null`. Anything unparseable becomes `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<LooseNumber>::deserialize(deserializer)?;
    Ok(raw.and_then(|n| match n {
        LooseNumber::Number(v) => Some(v),
        LooseNumber::Text(s) => s.trim().parse().ok(),
    }))
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.unwrap_or(0.0))
}

/// Expected ranges over one forecast horizon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<ValueRange>,
}

impl ForecastWindow {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.pressure.is_none()
            && self.wind_speed.is_none()
    }
}

impl std::fmt::Display for ForecastWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ranges = [
            (WeatherParameter::Temperature, self.temperature),
            (WeatherParameter::Humidity, self.humidity),
            (WeatherParameter::Pressure, self.pressure),
            (WeatherParameter::WindSpeed, self.wind_speed),
        ];

        let parts: Vec<String> = ranges
            .iter()
            .filter_map(|(param, range)| {
                range.map(|r| format!("{} {}..{}", param.key(), bound(r.min), bound(r.max)))
            })
            .collect();

        if parts.is_empty() {
            write!(f, "(empty)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

fn bound(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| format!("{:.1}", v))
}

/// Structured answer expected back from the report model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    #[serde(default)]
    pub prediction_12h: ForecastWindow,
    #[serde(default)]
    pub prediction_24h: ForecastWindow,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f64,
}

/// Stored weather report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// UTC date the report is for, `YYYY-MM-DD`
    pub date: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub prediction_12h: ForecastWindow,
    pub prediction_24h: ForecastWindow,
    pub reasoning: String,
    pub confidence: f64,
}

impl Prediction {
    /// Assemble a prediction from a model answer. Confidence is clamped to [0, 1].
    pub fn from_report(
        date: impl Into<String>,
        location: impl Into<String>,
        created_at: DateTime<Utc>,
        report: PredictionReport,
    ) -> Self {
        let confidence = if report.confidence.is_finite() {
            report.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            date: date.into(),
            location: location.into(),
            created_at,
            prediction_12h: report.prediction_12h,
            prediction_24h: report.prediction_24h,
            reasoning: report.reasoning,
            confidence,
        }
    }
}

/// Options for generating a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default)]
    pub date: Option<String>,
    /// Regenerate even if a recent prediction exists
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_hours_to_analyze")]
    pub hours_to_analyze: u32,
}

fn default_hours_to_analyze() -> u32 {
    12
}

impl Default for PredictionRequest {
    fn default() -> Self {
        Self {
            date: None,
            force: false,
            location: None,
            hours_to_analyze: default_hours_to_analyze(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
}

impl PredictionResponse {
    pub fn ok(message: impl Into<String>, prediction: Prediction) -> Self {
        Self {
            success: true,
            message: message.into(),
            prediction: Some(prediction),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            prediction: None,
        }
    }
}

/// Information about the prediction schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub next_prediction: DateTime<Utc>,
    pub schedule_frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_prediction: Option<DateTime<Utc>>,
}
