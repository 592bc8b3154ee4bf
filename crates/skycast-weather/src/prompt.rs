//! Prompt rendering for the report model.

use std::fmt::Write;

use crate::types::{TrendAnalysis, WeatherParameter, WeatherSummary};

pub const SYSTEM_PROMPT: &str = "You are a fun weather reporting robot that analyzes observed \
weather data and provides structured data in the exact format requested. Focus on observed data \
patterns and trends rather than future predictions, but format as if they were predictions for \
system compatibility.";

const RESPONSE_FORMAT: &str = r#"

CRITICAL: You must return the response in this EXACT JSON format:
{
  "prediction_12h": {
    "temperature": {"min": <number>, "max": <number>},
    "humidity": {"min": <number>, "max": <number>},
    "pressure": {"min": <number>, "max": <number>},
    "wind_speed": {"min": <number>, "max": <number>}
  },
  "prediction_24h": {
    "temperature": {"min": <number>, "max": <number>},
    "humidity": {"min": <number>, "max": <number>},
    "pressure": {"min": <number>, "max": <number>},
    "wind_speed": {"min": <number>, "max": <number>}
  },
  "reasoning": "<string describing your analysis of the observed weather patterns and trends>",
  "confidence": <number between 0.0 and 1.0>
}

For prediction_12h and prediction_24h, use the observed data ranges but you may extrapolate slightly based on trends. Focus on what the data shows rather than making wild predictions. The reasoning should explain the observed patterns and trends in the data."#;

/// Everything the model sees about the analysed window
#[derive(Debug, Clone)]
pub struct PromptData<'a> {
    pub date: &'a str,
    pub location: &'a str,
    pub hours: u32,
    pub summary: &'a WeatherSummary,
    pub trends: &'a TrendAnalysis,
}

/// Render the user prompt.
pub fn build_prompt(data: &PromptData<'_>) -> String {
    let mut prompt = format!(
        "Based on the following weather data from {} on {}, please provide a weather analysis \
in the exact JSON format specified below.\n\n\
Provide a light hearted analysis of the weather data in the style of a robot weather reporter. \
The report should be informative and based on the data, but digestable for humans to read.\n\n\
Current weather summary:",
        data.location, data.date
    );

    for param in WeatherParameter::ALL {
        let s = data.summary.get(param);
        let unit = param.unit();
        let _ = write!(
            prompt,
            "\n{}: Min {:.2}{unit}, Max {:.2}{unit}, Avg {:.2}{unit}",
            param.label(),
            s.min,
            s.max,
            s.avg,
        );
    }

    if !data.trends.is_empty() {
        let _ = write!(prompt, "\n\nObserved trends (over last {} hours):", data.hours);
        for (param, trend) in data.trends {
            let _ = write!(
                prompt,
                "\n{}: {}, Change: {:.2}, Rate: {:.2}/hour",
                param.label(),
                trend.direction.as_str(),
                trend.change,
                trend.rate_per_hour,
            );
        }
    }

    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParameterSummary, Trend, TrendDirection};

    fn summary() -> WeatherSummary {
        WeatherSummary {
            temperature: ParameterSummary {
                min: 2.0,
                max: 9.5,
                avg: 5.125,
            },
            humidity: ParameterSummary {
                min: 60.0,
                max: 80.0,
                avg: 70.0,
            },
            pressure: ParameterSummary {
                min: 1010.0,
                max: 1014.0,
                avg: 1012.0,
            },
            wind_speed: ParameterSummary::default(),
        }
    }

    #[test]
    fn test_prompt_lists_every_parameter_with_units() {
        let s = summary();
        let trends = TrendAnalysis::new();
        let prompt = build_prompt(&PromptData {
            date: "2026-03-01",
            location: "Backyard",
            hours: 12,
            summary: &s,
            trends: &trends,
        });

        assert!(prompt.contains("from Backyard on 2026-03-01"));
        assert!(prompt.contains("Temperature: Min 2.00°C, Max 9.50°C"));
        assert!(prompt.contains("Humidity: Min 60.00%, Max 80.00%, Avg 70.00%"));
        assert!(prompt.contains("Pressure: Min 1010.00 hPa"));
        assert!(prompt.contains("Wind Speed: Min 0.00 mph"));
        assert!(!prompt.contains("Observed trends"));
        assert!(prompt.contains("\"prediction_24h\""));
    }

    #[test]
    fn test_prompt_includes_trends() {
        let s = summary();
        let mut trends = TrendAnalysis::new();
        trends.insert(
            WeatherParameter::Pressure,
            Trend {
                change: -4.0,
                rate_per_hour: -0.5,
                direction: TrendDirection::Falling,
            },
        );

        let prompt = build_prompt(&PromptData {
            date: "2026-03-01",
            location: "Backyard",
            hours: 8,
            summary: &s,
            trends: &trends,
        });

        assert!(prompt.contains("Observed trends (over last 8 hours):"));
        assert!(prompt.contains("Pressure: falling, Change: -4.00, Rate: -0.50/hour"));
    }

    #[test]
    fn test_trend_lines_use_summary_labels() {
        let s = summary();
        let mut trends = TrendAnalysis::new();
        trends.insert(
            WeatherParameter::WindSpeed,
            Trend {
                change: 3.0,
                rate_per_hour: 0.25,
                direction: TrendDirection::Rising,
            },
        );

        let prompt = build_prompt(&PromptData {
            date: "2026-03-01",
            location: "Backyard",
            hours: 12,
            summary: &s,
            trends: &trends,
        });

        assert!(prompt.contains("\nWind Speed: rising, Change: 3.00, Rate: 0.25/hour"));
        assert!(!prompt.contains("Wind_speed"));
    }
}
