//! Weather store supporting multiple backends.
//!
//! `WeatherStore` wraps the MongoDB store used in production and an
//! in-memory store seeded from a JSON snapshot (offline replays, tests)
//! behind one async interface.

mod memory;
mod mongo;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use skycast_core::DatabaseError;
use skycast_weather::{HourlyMeasurement, Prediction};

pub use memory::{MemoryStore, Snapshot};
pub use mongo::MongoStore;

pub type StoreResult<T> = Result<T, DatabaseError>;

/// Collection names shared by both backends
pub const HOURLY_MEASUREMENTS: &str = "hourly_measurements";
pub const WEATHER_PREDICTIONS: &str = "weather_predictions";
pub const DAILY_REPORTS: &str = "daily_reports";
pub const TRENDS: &str = "trends";

#[derive(Clone)]
pub enum WeatherStore {
    Mongo(MongoStore),
    Memory(Arc<Mutex<MemoryStore>>),
}

impl WeatherStore {
    pub fn memory(store: MemoryStore) -> Self {
        Self::Memory(Arc::new(Mutex::new(store)))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Mongo(_) => "mongodb",
            Self::Memory(_) => "memory",
        }
    }

    /// Verify the backend is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        match self {
            Self::Mongo(store) => store.ping().await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// Measurements at or after `since`, oldest first.
    pub async fn hourly_measurements(
        &self,
        since: DateTime<Utc>,
        location: Option<&str>,
    ) -> StoreResult<Vec<HourlyMeasurement>> {
        match self {
            Self::Mongo(store) => store.hourly_measurements(since, location).await,
            Self::Memory(store) => Ok(store.lock().hourly_measurements(since, location)),
        }
    }

    /// Newest prediction created at or after `since`.
    pub async fn recent_prediction(&self, since: DateTime<Utc>) -> StoreResult<Option<Prediction>> {
        match self {
            Self::Mongo(store) => store.recent_prediction(Some(since)).await,
            Self::Memory(store) => Ok(store.lock().recent_prediction(Some(since))),
        }
    }

    /// Newest prediction overall.
    pub async fn latest_prediction(&self) -> StoreResult<Option<Prediction>> {
        match self {
            Self::Mongo(store) => store.recent_prediction(None).await,
            Self::Memory(store) => Ok(store.lock().recent_prediction(None)),
        }
    }

    /// Store a prediction and return its id.
    pub async fn insert_prediction(&self, prediction: &Prediction) -> StoreResult<String> {
        match self {
            Self::Mongo(store) => store.insert_prediction(prediction).await,
            Self::Memory(store) => Ok(store.lock().insert_prediction(prediction.clone())),
        }
    }

    /// Daily report document for a `YYYY-MM-DD` date.
    pub async fn daily_report(&self, date: &str) -> StoreResult<Option<serde_json::Value>> {
        match self {
            Self::Mongo(store) => store.daily_report(date).await,
            Self::Memory(store) => Ok(store.lock().daily_report(date)),
        }
    }

    /// Newest trend document for a location.
    pub async fn latest_trend(&self, location: &str) -> StoreResult<Option<serde_json::Value>> {
        match self {
            Self::Mongo(store) => store.latest_trend(location).await,
            Self::Memory(store) => Ok(store.lock().latest_trend(location)),
        }
    }
}
