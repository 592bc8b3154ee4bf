//! The scheduled prediction task.
//!
//! A run has two phases. Provisioning resolves the environment, connects
//! the weather store and builds the LLM client; execution only starts once
//! all of that succeeded. Both phases and the final outcome are journaled.

use chrono::{DateTime, Timelike, Utc};

use skycast_core::{AppError, Config, ConfigError};
use skycast_services::{
    JournalClient, LlmClient, MongoStore, Predictor, RunOutcome, RunPhase, TriggerKind,
    WeatherStore,
};
use skycast_weather::{Prediction, PredictionRequest};

pub struct ScheduledTask {
    config: Config,
    journal: JournalClient,
    store: Option<WeatherStore>,
}

impl ScheduledTask {
    pub fn new(config: Config, journal: JournalClient) -> Self {
        Self {
            config,
            journal,
            store: None,
        }
    }

    /// Use `store` instead of connecting to MongoDB. The `mongo.*`
    /// settings are then not required.
    pub fn with_store(mut self, store: WeatherStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn journal(&self) -> &JournalClient {
        &self.journal
    }

    /// Provision and execute one run, journaling its outcome.
    ///
    /// Journal failures are logged and never stop the run itself.
    pub async fn run(&self, trigger: TriggerKind) -> Result<Prediction, AppError> {
        tracing::info!("Starting scheduled weather prediction task ({})", trigger);
        let run_id = match self.journal.start(trigger).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                tracing::warn!("Failed to journal start of {} run: {}", trigger, e);
                None
            }
        };

        let result = self.run_phases(run_id.as_deref()).await;

        let (outcome, message) = match &result {
            Ok(prediction) => {
                tracing::info!(
                    "Scheduled weather prediction task completed successfully using {} hours of data",
                    self.config.schedule.hours_to_analyze
                );
                (
                    RunOutcome::Succeeded,
                    format!("Prediction for {} at {}", prediction.date, prediction.location),
                )
            }
            Err(e) => {
                tracing::error!("Error running scheduled task: {}", e);
                tracing::error!("{}", e.user_message());
                (RunOutcome::Failed, e.to_string())
            }
        };

        if let Some(id) = &run_id {
            if let Err(e) = self.journal.finish(id, outcome, Some(message)).await {
                tracing::warn!("Failed to record outcome of run {}: {}", id, e);
            }
        }

        result
    }

    async fn run_phases(&self, run_id: Option<&str>) -> Result<Prediction, AppError> {
        let predictor = self.provision().await?;

        if let Some(id) = run_id {
            if let Err(e) = self.journal.set_phase(id, RunPhase::Execute).await {
                tracing::warn!("Failed to journal execute phase of run {}: {}", id, e);
            }
        }
        execute(&predictor, self.config.schedule.hours_to_analyze, Utc::now()).await
    }

    /// Resolve settings and bring up the store and LLM client.
    pub async fn provision(&self) -> Result<Predictor, AppError> {
        let validation = self.config.validate();
        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        let errors: Vec<_> = validation
            .errors
            .iter()
            .filter(|e| self.store.is_none() || !e.field.starts_with("mongo."))
            .collect();

        if !errors.is_empty() {
            let summary = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(if errors.iter().any(|e| e.missing) {
                ConfigError::MissingSetting(summary)
            } else {
                ConfigError::Invalid(summary)
            }
            .into());
        }

        let store = match &self.store {
            Some(store) => store.clone(),
            None => WeatherStore::Mongo(
                MongoStore::connect(&self.config.mongo.uri, &self.config.mongo.database).await?,
            ),
        };
        store.ping().await?;
        tracing::info!("Weather store ready ({})", store.backend_name());

        let llm = LlmClient::new(&self.config.llm)?;
        tracing::debug!("LLM client ready (model {})", llm.model());

        Ok(Predictor::new(store, llm).with_recent_window(self.config.schedule.recent_window_hours))
    }
}

/// Body of a firing: a forced prediction over the last `hours` before `now`.
pub async fn execute(
    predictor: &Predictor,
    hours: u32,
    now: DateTime<Utc>,
) -> Result<Prediction, AppError> {
    let hour = now.hour();
    let meridiem = if hour < 12 { "AM" } else { "PM" };
    tracing::info!("Running scheduled job at {}:00 {}", hour, meridiem);

    let measurements = predictor.hourly_measurements(hours, None, now).await?;
    if measurements.is_empty() {
        return Err(AppError::NoMeasurements { hours });
    }
    tracing::info!("Retrieved {} hours of weather data", measurements.len());

    let request = PredictionRequest {
        force: true,
        hours_to_analyze: hours,
        ..Default::default()
    };
    let prediction = predictor.generate_at(&request, now).await?;

    tracing::info!("Successfully generated prediction for {}", prediction.date);
    tracing::info!("12-hour prediction: {}", prediction.prediction_12h);
    tracing::info!("Confidence score: {}", prediction.confidence);

    Ok(prediction)
}
