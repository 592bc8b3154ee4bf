use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skycast_weather::{HourlyMeasurement, Prediction};

/// Collections captured as JSON, for offline replays
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub hourly_measurements: Vec<HourlyMeasurement>,
    #[serde(default)]
    pub weather_predictions: Vec<Prediction>,
    #[serde(default)]
    pub daily_reports: Vec<serde_json::Value>,
    #[serde(default)]
    pub trends: Vec<serde_json::Value>,
}

/// In-process store with the same query semantics as the MongoDB store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Snapshot,
}

impl MemoryStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot file. Measurement timestamps may be rewritten by the
    /// caller to replay old data as if it were fresh.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

        tracing::info!(
            "Loaded snapshot with {} measurements and {} predictions",
            snapshot.hourly_measurements.len(),
            snapshot.weather_predictions.len()
        );
        Ok(Self::new(snapshot))
    }

    /// Shift every measurement so the newest one lands at `now`.
    pub fn rebase_measurements(&mut self, now: DateTime<Utc>) {
        let Some(newest) = self
            .snapshot
            .hourly_measurements
            .iter()
            .map(|m| m.timestamp)
            .max()
        else {
            return;
        };

        let offset = now - newest;
        for m in &mut self.snapshot.hourly_measurements {
            m.timestamp += offset;
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn hourly_measurements(
        &self,
        since: DateTime<Utc>,
        location: Option<&str>,
    ) -> Vec<HourlyMeasurement> {
        let mut found: Vec<HourlyMeasurement> = self
            .snapshot
            .hourly_measurements
            .iter()
            .filter(|m| m.timestamp >= since)
            .filter(|m| location.map_or(true, |loc| m.location() == Some(loc)))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.timestamp);
        found
    }

    pub fn recent_prediction(&self, since: Option<DateTime<Utc>>) -> Option<Prediction> {
        self.snapshot
            .weather_predictions
            .iter()
            .filter(|p| since.map_or(true, |s| p.created_at >= s))
            .max_by_key(|p| p.created_at)
            .cloned()
    }

    pub fn insert_prediction(&mut self, prediction: Prediction) -> String {
        self.snapshot.weather_predictions.push(prediction);
        uuid::Uuid::new_v4().to_string()
    }

    pub fn daily_report(&self, date: &str) -> Option<serde_json::Value> {
        self.snapshot
            .daily_reports
            .iter()
            .find(|r| r.get("date").and_then(|d| d.as_str()) == Some(date))
            .cloned()
    }

    pub fn latest_trend(&self, location: &str) -> Option<serde_json::Value> {
        self.snapshot
            .trends
            .iter()
            .filter(|t| t.get("location").and_then(|l| l.as_str()) == Some(location))
            .max_by_key(|t| {
                t.get("timestamp")
                    .and_then(|ts| ts.as_str())
                    .unwrap_or_default()
                    .to_string()
            })
            .cloned()
    }
}
