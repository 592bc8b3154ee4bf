//! Command definitions and handlers.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use skycast_core::{env_status, Config, MAX_WINDOW_HOURS};
use skycast_scheduler::{run_daemon, ScheduledTask, TriggerSchedule};
use skycast_services::{
    JournalClient, MemoryStore, MongoStore, RunJournal, RunOutcome, TriggerKind, WeatherStore,
};
use skycast_weather::{PredictionRequest, PredictionResponse};

/// SkyCast: scheduled LLM weather reports from recent hourly measurements.
#[derive(Parser)]
#[command(name = "skycast", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Config file (defaults to <config dir>/skycast/config.toml)
    #[arg(long, global = true, env = "SKYCAST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the scheduled prediction task once, now (manual dispatch).
    Run {
        /// Replay measurements from a JSON snapshot instead of MongoDB.
        #[arg(long)]
        measurements_file: Option<PathBuf>,
    },

    /// Generate a prediction with custom options.
    Predict {
        /// Report date, YYYY-MM-DD (defaults to today, UTC).
        #[arg(long)]
        date: Option<String>,

        /// Only use measurements from this location.
        #[arg(long)]
        location: Option<String>,

        /// Hours of measurements to analyse.
        #[arg(
            long,
            default_value_t = 12,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_HOURS))
        )]
        hours: u32,

        /// Regenerate even if a recent prediction exists.
        #[arg(long)]
        force: bool,

        /// Replay measurements from a JSON snapshot instead of MongoDB.
        #[arg(long)]
        measurements_file: Option<PathBuf>,
    },

    /// Run the trigger until interrupted, firing on the configured schedule.
    Schedule {
        /// Replay measurements from a JSON snapshot instead of MongoDB.
        #[arg(long)]
        measurements_file: Option<PathBuf>,
    },

    /// Show the next fire times.
    Next {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },

    /// Show the schedule and the last successful run.
    Status,

    /// Show recent trigger runs.
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the stored daily report for a date.
    Report {
        /// YYYY-MM-DD (defaults to yesterday, UTC).
        #[arg(long)]
        date: Option<String>,
    },

    /// Print the newest stored trend document for a location.
    Trends {
        #[arg(long)]
        location: String,
    },

    /// Check configuration and environment without running anything.
    CheckConfig,
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { measurements_file } => {
            let task = build_task(config, measurements_file.as_deref())?;
            let prediction = task.run(TriggerKind::Manual).await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }

        Command::Predict {
            date,
            location,
            hours,
            force,
            measurements_file,
        } => {
            let task = build_task(config, measurements_file.as_deref())?;
            let predictor = task.provision().await?;
            let request = PredictionRequest {
                date,
                force,
                location,
                hours_to_analyze: hours,
            };

            match predictor.generate(&request).await {
                Ok(prediction) => {
                    let response =
                        PredictionResponse::ok("Prediction generated successfully", prediction);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Err(e) => {
                    let response =
                        PredictionResponse::failed(format!("Failed to generate prediction: {}", e));
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    return Err(e.into());
                }
            }
        }

        Command::Schedule { measurements_file } => {
            let schedule = TriggerSchedule::parse(&config.schedule.cron)?;
            let task = build_task(config, measurements_file.as_deref())?;
            run_daemon(task, schedule).await?;
        }

        Command::Next { count } => {
            let schedule = TriggerSchedule::parse(&config.schedule.cron)?;
            println!("{}", schedule.describe());
            for time in schedule.upcoming(Utc::now(), count) {
                println!("  {}", time.to_rfc3339());
            }
        }

        Command::Status => {
            let schedule = TriggerSchedule::parse(&config.schedule.cron)?;
            let journal = open_journal(&config)?;
            let last = journal
                .last_with_outcome(RunOutcome::Succeeded)
                .await?
                .and_then(|run| run.finished_at);

            let info = schedule
                .schedule_info(Utc::now(), last)
                .ok_or_else(|| anyhow!("Schedule {:?} never fires", schedule.expression()))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Command::History { limit } => {
            let journal = open_journal(&config)?;
            let runs = journal.recent(limit).await?;
            if runs.is_empty() {
                println!("No runs recorded in {}", config.journal.path.display());
            }
            for run in runs {
                println!(
                    "{}  {:<9}  {:<9}  {:<9}  {}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.trigger,
                    run.phase,
                    run.outcome,
                    run.message.unwrap_or_default()
                );
            }
        }

        Command::Report { date } => {
            let date = date.unwrap_or_else(|| {
                (Utc::now() - Duration::days(1))
                    .format("%Y-%m-%d")
                    .to_string()
            });
            let store = connect_store(&config).await?;
            let report = store
                .daily_report(&date)
                .await?
                .ok_or_else(|| anyhow!("No daily report found for {}", date))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Trends { location } => {
            let store = connect_store(&config).await?;
            let trend = store
                .latest_trend(&location)
                .await?
                .ok_or_else(|| anyhow!("No trend data found for location {}", location))?;
            println!("{}", serde_json::to_string_pretty(&trend)?);
        }

        Command::CheckConfig => check_config(&config)?,
    }

    Ok(())
}

fn build_task(config: Config, measurements_file: Option<&Path>) -> Result<ScheduledTask> {
    let journal = open_journal(&config)?;
    let task = ScheduledTask::new(config, journal);

    match measurements_file {
        Some(path) => {
            let mut store = MemoryStore::from_json_file(path)?;
            store.rebase_measurements(Utc::now());
            tracing::info!("Replaying measurements from {}", path.display());
            Ok(task.with_store(WeatherStore::memory(store)))
        }
        None => Ok(task),
    }
}

fn open_journal(config: &Config) -> Result<JournalClient> {
    let journal = RunJournal::open(&config.journal.path).with_context(|| {
        format!(
            "Failed to open run journal {}",
            config.journal.path.display()
        )
    })?;
    Ok(JournalClient::new(journal))
}

async fn connect_store(config: &Config) -> Result<WeatherStore> {
    if config.mongo.uri.trim().is_empty() {
        bail!("MONGO_URI is not set");
    }
    let store = MongoStore::connect(&config.mongo.uri, &config.mongo.database).await?;
    Ok(WeatherStore::Mongo(store))
}

fn check_config(config: &Config) -> Result<()> {
    println!("Environment:");
    for (name, present) in env_status(|name| std::env::var(name).ok()) {
        println!("  {:<12} {}", name, if present { "set" } else { "missing" });
    }

    let validation = config.validate();
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    for error in &validation.errors {
        println!("error: {}", error);
    }

    let schedule = TriggerSchedule::parse(&config.schedule.cron)?;
    println!("Schedule: {}", schedule.describe());
    println!("Journal: {}", config.journal.path.display());

    if !validation.is_valid() {
        bail!("Configuration invalid: {}", validation.error_summary());
    }

    println!("Configuration OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_predict_flags() {
        let cli = Cli::parse_from([
            "skycast",
            "predict",
            "--date",
            "2026-03-01",
            "--hours",
            "24",
            "--force",
        ]);

        match cli.command {
            Command::Predict {
                date, hours, force, ..
            } => {
                assert_eq!(date.as_deref(), Some("2026-03-01"));
                assert_eq!(hours, 24);
                assert!(force);
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_predict_hours_out_of_range() {
        for hours in ["0", "8761", "4294967295"] {
            let result = Cli::try_parse_from(["skycast", "predict", "--hours", hours]);
            assert!(result.is_err(), "--hours {hours} should be rejected");
        }
        assert!(Cli::try_parse_from(["skycast", "predict", "--hours", "8760"]).is_ok());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["skycast", "next", "--config", "/tmp/skycast.toml", "-n", "3"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/skycast.toml")));
        assert!(matches!(cli.command, Command::Next { count: 3 }));
    }

    #[test]
    fn test_build_task_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(&snapshot, r#"{"hourly_measurements": []}"#).unwrap();

        let mut config = Config::default();
        config.journal.path = dir.path().join("runs.db");

        assert!(build_task(config, Some(&snapshot)).is_ok());
    }
}
