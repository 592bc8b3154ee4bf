//! Direction and rate of change across the analysed window.

use crate::types::{HourlyMeasurement, Trend, TrendAnalysis, TrendDirection, WeatherParameter};

/// Compare the first and last hourly averages of each parameter.
///
/// `rate_per_hour` divides the change by the number of readings, not by the
/// elapsed hours. Parameters with fewer than two averages are omitted, and
/// fewer than two measurements yields an empty analysis.
pub fn analyze_weather_trends(measurements: &[HourlyMeasurement]) -> TrendAnalysis {
    let mut analysis = TrendAnalysis::new();

    if measurements.len() < 2 {
        tracing::warn!("Not enough measurements to analyze trends");
        return analysis;
    }

    for param in WeatherParameter::ALL {
        let values: Vec<f64> = measurements
            .iter()
            .filter_map(|m| m.field(param).and_then(|f| f.avg))
            .collect();

        if let (Some(first), Some(last), true) = (values.first(), values.last(), values.len() >= 2)
        {
            let change = last - first;
            analysis.insert(
                param,
                Trend {
                    change,
                    rate_per_hour: change / values.len() as f64,
                    direction: TrendDirection::from_change(change),
                },
            );
        }
    }

    analysis
}
