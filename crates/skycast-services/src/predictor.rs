//! Prediction pipeline: measurements in, stored prediction out.

use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

use skycast_core::AppError;
use skycast_weather::{
    analyze_weather_trends, build_prompt, prepare_weather_summary, Prediction, PredictionRequest,
    PromptData,
};

use crate::llm::LlmClient;
use crate::store::WeatherStore;

const UNKNOWN_LOCATION: &str = "unknown";
const DEFAULT_RECENT_WINDOW_HOURS: u32 = 12;

/// Generates weather predictions from stored measurements.
#[derive(Clone)]
pub struct Predictor {
    store: WeatherStore,
    llm: LlmClient,
    recent_window: Duration,
}

impl Predictor {
    pub fn new(store: WeatherStore, llm: LlmClient) -> Self {
        Self {
            store,
            llm,
            recent_window: Duration::hours(i64::from(DEFAULT_RECENT_WINDOW_HOURS)),
        }
    }

    /// How old a stored prediction may be and still be reused by a
    /// non-forced request.
    pub fn with_recent_window(mut self, hours: u32) -> Self {
        self.recent_window = Duration::hours(i64::from(hours));
        self
    }

    /// Measurements from the last `hours` before `now`, oldest first.
    pub async fn hourly_measurements(
        &self,
        hours: u32,
        location: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<skycast_weather::HourlyMeasurement>, AppError> {
        let since = look_back(now, Duration::hours(i64::from(hours)))?;
        tracing::debug!("Fetching hourly measurements since {}", since);
        Ok(self.store.hourly_measurements(since, location).await?)
    }

    pub async fn generate(&self, request: &PredictionRequest) -> Result<Prediction, AppError> {
        self.generate_at(request, Utc::now()).await
    }

    /// Run the pipeline as if the current time were `now`.
    #[instrument(skip(self, request), fields(force = request.force), level = "info")]
    pub async fn generate_at(
        &self,
        request: &PredictionRequest,
        now: DateTime<Utc>,
    ) -> Result<Prediction, AppError> {
        let date = request
            .date
            .clone()
            .unwrap_or_else(|| now.date_naive().format("%Y-%m-%d").to_string());

        if !request.force {
            let since = look_back(now, self.recent_window)?;
            if let Some(existing) = self.store.recent_prediction(since).await? {
                tracing::info!(
                    "Using existing prediction created at {}",
                    existing.created_at
                );
                return Ok(existing);
            }
        }

        let hours = request.hours_to_analyze;
        let measurements = self
            .hourly_measurements(hours, request.location.as_deref(), now)
            .await?;
        if measurements.is_empty() {
            return Err(AppError::NoMeasurements { hours });
        }
        tracing::info!("Analyzing {} hourly measurements", measurements.len());

        let location = measurements
            .first()
            .and_then(|m| m.location())
            .unwrap_or(UNKNOWN_LOCATION)
            .to_string();

        let summary = prepare_weather_summary(&measurements)
            .ok_or(AppError::NoMeasurements { hours })?;

        let trends = analyze_weather_trends(&measurements);
        if trends.is_empty() {
            tracing::warn!("Not enough data points to analyze trends");
        }

        let prompt = build_prompt(&PromptData {
            date: &date,
            location: &location,
            hours,
            summary: &summary,
            trends: &trends,
        });

        let report = self.llm.generate_report(&prompt).await?;
        let prediction = Prediction::from_report(date, location, now, report);

        let id = self.store.insert_prediction(&prediction).await?;
        tracing::info!(
            "Stored prediction {} for {} at {}",
            id,
            prediction.date,
            prediction.location
        );

        Ok(prediction)
    }
}

fn look_back(now: DateTime<Utc>, window: Duration) -> Result<DateTime<Utc>, AppError> {
    now.checked_sub_signed(window).ok_or_else(|| {
        AppError::InvalidRequest(format!(
            "Window of {} hours reaches before the earliest supported date",
            window.num_hours()
        ))
    })
}
