//! Weather analytics for SkyCast
//!
//! Condenses hourly station measurements into summaries and trends, and
//! renders the prompt the report model is asked to answer.

pub mod prompt;
pub mod summary;
pub mod trends;
pub mod types;

pub use prompt::{build_prompt, PromptData, SYSTEM_PROMPT};
pub use summary::prepare_weather_summary;
pub use trends::analyze_weather_trends;
pub use types::*;
