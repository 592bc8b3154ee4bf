use std::collections::BTreeMap;
use std::time::Duration;

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use skycast_core::error::MongoErrorExt;
use skycast_core::DatabaseError;
use skycast_weather::{FieldStats, ForecastWindow, HourlyMeasurement, MeasurementTags, Prediction};

use super::{StoreResult, DAILY_REPORTS, HOURLY_MEASUREMENTS, TRENDS, WEATHER_PREDICTIONS};

const SERVER_SELECTION_TIMEOUT_SECS: u64 = 10;

/// Raw measurement document. Fields that are not stat sub-documents are skipped.
#[derive(Debug, Deserialize)]
struct MeasurementRecord {
    timestamp_ms: bson::DateTime,
    #[serde(default)]
    tags: Document,
    #[serde(default)]
    fields: Document,
}

impl From<MeasurementRecord> for HourlyMeasurement {
    fn from(record: MeasurementRecord) -> Self {
        let fields: BTreeMap<String, FieldStats> = record
            .fields
            .into_iter()
            .filter_map(|(name, value)| match value {
                Bson::Document(_) => bson::from_bson::<FieldStats>(value)
                    .ok()
                    .map(|stats| (name, stats)),
                _ => None,
            })
            .collect();

        HourlyMeasurement {
            timestamp: record.timestamp_ms.to_chrono(),
            tags: MeasurementTags {
                location: record.tags.get_str("location").ok().map(str::to_string),
            },
            fields,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PredictionRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    date: String,
    #[serde(default)]
    location: String,
    created_at: bson::DateTime,
    #[serde(default)]
    prediction_12h: ForecastWindow,
    #[serde(default)]
    prediction_24h: ForecastWindow,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f64,
}

impl From<&Prediction> for PredictionRecord {
    fn from(p: &Prediction) -> Self {
        Self {
            id: None,
            date: p.date.clone(),
            location: p.location.clone(),
            created_at: bson::DateTime::from_chrono(p.created_at),
            prediction_12h: p.prediction_12h.clone(),
            prediction_24h: p.prediction_24h.clone(),
            reasoning: p.reasoning.clone(),
            confidence: p.confidence,
        }
    }
}

impl From<PredictionRecord> for Prediction {
    fn from(r: PredictionRecord) -> Self {
        Prediction {
            date: r.date,
            location: r.location,
            created_at: r.created_at.to_chrono(),
            prediction_12h: r.prediction_12h,
            prediction_24h: r.prediction_24h,
            reasoning: r.reasoning,
            confidence: r.confidence,
        }
    }
}

/// MongoDB-backed weather store
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect and select `database`. Connection errors surface on first use
    /// or on `ping`.
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        options.app_name = Some("skycast".to_string());
        options.server_selection_timeout =
            Some(Duration::from_secs(SERVER_SELECTION_TIMEOUT_SECS));

        let client = Client::with_options(options).map_err(|e| e.into_database_error())?;

        tracing::debug!("MongoDB client created for database {}", database);
        Ok(Self {
            db: client.database(database),
        })
    }

    fn measurements(&self) -> Collection<MeasurementRecord> {
        self.db.collection(HOURLY_MEASUREMENTS)
    }

    fn predictions(&self) -> Collection<PredictionRecord> {
        self.db.collection(WEATHER_PREDICTIONS)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn ping(&self) -> StoreResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| e.into_database_error())?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn hourly_measurements(
        &self,
        since: DateTime<Utc>,
        location: Option<&str>,
    ) -> StoreResult<Vec<HourlyMeasurement>> {
        let mut filter = doc! { "timestamp_ms": { "$gte": bson::DateTime::from_chrono(since) } };
        if let Some(location) = location {
            filter.insert("tags.location", location);
        }

        let cursor = self
            .measurements()
            .find(filter)
            .sort(doc! { "timestamp_ms": 1 })
            .await
            .map_err(|e| e.into_database_error())?;

        let records: Vec<MeasurementRecord> = cursor
            .try_collect()
            .await
            .map_err(|e| e.into_database_error())?;

        Ok(records.into_iter().map(HourlyMeasurement::from).collect())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn recent_prediction(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Prediction>> {
        let filter = match since {
            Some(since) => doc! { "created_at": { "$gte": bson::DateTime::from_chrono(since) } },
            None => doc! {},
        };

        let record = self
            .predictions()
            .find_one(filter)
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|e| e.into_database_error())?;

        Ok(record.map(Prediction::from))
    }

    #[instrument(skip(self, prediction), fields(date = %prediction.date), level = "debug")]
    pub async fn insert_prediction(&self, prediction: &Prediction) -> StoreResult<String> {
        let result = self
            .predictions()
            .insert_one(PredictionRecord::from(prediction))
            .await
            .map_err(|e| e.into_database_error())?;

        let id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        Ok(id)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn daily_report(&self, date: &str) -> StoreResult<Option<serde_json::Value>> {
        let report = self
            .db
            .collection::<Document>(DAILY_REPORTS)
            .find_one(doc! { "date": date })
            .await
            .map_err(|e| e.into_database_error())?;

        Ok(report.map(to_json))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn latest_trend(&self, location: &str) -> StoreResult<Option<serde_json::Value>> {
        let trend = self
            .db
            .collection::<Document>(TRENDS)
            .find_one(doc! { "location": location })
            .sort(doc! { "timestamp": -1 })
            .await
            .map_err(|e| e.into_database_error())?;

        Ok(trend.map(to_json))
    }
}

fn to_json(document: Document) -> serde_json::Value {
    Bson::Document(document).into_relaxed_extjson()
}
