//! Window summary: extremes and mean per parameter.

use crate::types::{HourlyMeasurement, WeatherParameter, WeatherSummary};

/// Summarize a window of hourly measurements.
///
/// `min`/`max` are the extremes of the hourly `min`/`max` values and `avg`
/// is the mean of the hourly `avg` values. A parameter with no min (or max)
/// reading falls back to its average; one with no readings at all stays 0.
/// Returns `None` for an empty window.
pub fn prepare_weather_summary(measurements: &[HourlyMeasurement]) -> Option<WeatherSummary> {
    if measurements.is_empty() {
        tracing::warn!("No measurements provided for summary");
        return None;
    }

    let mut summary = WeatherSummary::default();

    for param in WeatherParameter::ALL {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut total = 0.0;
        let mut count = 0usize;

        for stats in measurements.iter().filter_map(|m| m.field(param)) {
            if let Some(v) = stats.min {
                min = Some(min.map_or(v, |cur| cur.min(v)));
            }
            if let Some(v) = stats.max {
                max = Some(max.map_or(v, |cur| cur.max(v)));
            }
            if let Some(v) = stats.avg {
                total += v;
                count += 1;
            }
        }

        let avg = if count > 0 { total / count as f64 } else { 0.0 };

        let entry = summary.get_mut(param);
        entry.avg = avg;
        entry.min = min.unwrap_or(avg);
        entry.max = max.unwrap_or(avg);
    }

    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldStats, MeasurementTags};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn hour(h: u32, fields: &[(&str, FieldStats)]) -> HourlyMeasurement {
        HourlyMeasurement {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap(),
            tags: MeasurementTags::default(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_empty_window_has_no_summary() {
        assert!(prepare_weather_summary(&[]).is_none());
    }

    #[test]
    fn test_extremes_and_mean() {
        let data = vec![
            hour(1, &[("temperature", FieldStats::new(4.0, 8.0, 6.0))]),
            hour(2, &[("temperature", FieldStats::new(2.0, 7.0, 5.0))]),
            hour(3, &[("temperature", FieldStats::new(3.0, 11.0, 7.0))]),
        ];

        let summary = prepare_weather_summary(&data).unwrap();
        assert_eq!(summary.temperature.min, 2.0);
        assert_eq!(summary.temperature.max, 11.0);
        assert_eq!(summary.temperature.avg, 6.0);
    }

    #[test]
    fn test_missing_extremes_fall_back_to_average() {
        let avg_only = FieldStats {
            avg: Some(1012.0),
            ..Default::default()
        };
        let data = vec![
            hour(1, &[("pressure", avg_only)]),
            hour(
                2,
                &[(
                    "pressure",
                    FieldStats {
                        avg: Some(1014.0),
                        ..Default::default()
                    },
                )],
            ),
        ];

        let summary = prepare_weather_summary(&data).unwrap();
        assert_eq!(summary.pressure.avg, 1013.0);
        assert_eq!(summary.pressure.min, 1013.0);
        assert_eq!(summary.pressure.max, 1013.0);
    }

    #[test]
    fn test_absent_parameter_is_zeroed() {
        let data = vec![hour(1, &[("humidity", FieldStats::new(60.0, 70.0, 65.0))])];

        let summary = prepare_weather_summary(&data).unwrap();
        assert_eq!(summary.humidity.avg, 65.0);
        assert_eq!(summary.wind_speed.min, 0.0);
        assert_eq!(summary.wind_speed.max, 0.0);
        assert_eq!(summary.wind_speed.avg, 0.0);
    }

    #[test]
    fn test_average_counts_only_hours_with_avg() {
        let data = vec![
            hour(1, &[("wind_speed", FieldStats::new(0.0, 10.0, 4.0))]),
            hour(
                2,
                &[(
                    "wind_speed",
                    FieldStats {
                        max: Some(20.0),
                        ..Default::default()
                    },
                )],
            ),
            hour(3, &[("wind_speed", FieldStats::new(1.0, 9.0, 8.0))]),
        ];

        let summary = prepare_weather_summary(&data).unwrap();
        assert_eq!(summary.wind_speed.avg, 6.0);
        assert_eq!(summary.wind_speed.max, 20.0);
        assert_eq!(summary.wind_speed.min, 0.0);
    }
}
