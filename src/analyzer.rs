use crate::error::{PipelineError, Result};
use crate::structs::{AnalyzedForecast, DayMetric};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

const DAY_HOURS_START: u32 = 9;
const DAY_HOURS_END: u32 = 19;
const COMFORTABLE_CONDITIONS: &[&str] = &["clear", "partly-cloudy", "cloudy", "overcast"];

/// Turns a raw forecast payload into per-day metrics.
///
/// Called from the single calculation thread only, so implementations
/// need not be fast but must be shareable with it.
pub trait Analyzer: Sync {
    /// # Errors
    /// Returns error if the payload cannot be decoded.
    fn analyze(&self, raw: &Value) -> Result<AnalyzedForecast>;
}

#[derive(Debug, Deserialize)]
struct ProviderForecast {
    #[serde(default)]
    forecasts: Vec<ProviderDay>,
}

#[derive(Debug, Deserialize)]
struct ProviderDay {
    date: NaiveDate,
    #[serde(default)]
    hours: Vec<ProviderHour>,
}

#[derive(Debug, Deserialize)]
struct ProviderHour {
    hour: HourOfDay,
    temp: f64,
    condition: String,
}

/// The provider sends hours as strings (`"13"`), but plain numbers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HourOfDay {
    Number(u32),
    Text(String),
}

impl HourOfDay {
    fn value(&self) -> Result<u32> {
        match self {
            HourOfDay::Number(hour) => Ok(*hour),
            HourOfDay::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| PipelineError::Data(format!("Invalid hour value: {:?}", text))),
        }
    }
}

/// Daytime-window analyzer for the provider's hourly forecasts.
///
/// For each day only the hours in `day_start..=day_end` are considered:
/// `temp_avg` is their mean temperature rounded to three decimals and
/// `relevant_cond_hours` counts those whose condition is comfortable.
/// A day with no hours in the window gets `null` for both.
#[derive(Debug, Clone)]
pub struct ForecastAnalyzer {
    pub day_start: u32,
    pub day_end: u32,
    pub conditions: Vec<String>,
}

impl Default for ForecastAnalyzer {
    fn default() -> Self {
        Self {
            day_start: DAY_HOURS_START,
            day_end: DAY_HOURS_END,
            conditions: COMFORTABLE_CONDITIONS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl ForecastAnalyzer {
    fn analyze_day(&self, day: &ProviderDay) -> Result<DayMetric> {
        let mut temps = Vec::new();
        let mut comfortable = 0u32;
        for hour in &day.hours {
            let value = hour.hour.value()?;
            if !(self.day_start..=self.day_end).contains(&value) {
                continue;
            }
            temps.push(hour.temp);
            if self.conditions.iter().any(|c| *c == hour.condition) {
                comfortable += 1;
            }
        }

        let hours_count = temps.len() as u32;
        let (temp_avg, relevant_cond_hours) = if temps.is_empty() {
            (None, None)
        } else {
            let mean = temps.iter().sum::<f64>() / temps.len() as f64;
            (Some(round3(mean)), Some(comfortable))
        };

        Ok(DayMetric {
            date: day.date,
            hours_start: (hours_count > 0).then_some(self.day_start),
            hours_end: (hours_count > 0).then_some(self.day_end),
            hours_count,
            temp_avg,
            relevant_cond_hours,
        })
    }
}

impl Analyzer for ForecastAnalyzer {
    fn analyze(&self, raw: &Value) -> Result<AnalyzedForecast> {
        let forecast = ProviderForecast::deserialize(raw)?;
        let days = forecast
            .forecasts
            .iter()
            .map(|day| self.analyze_day(day))
            .collect::<Result<Vec<_>>>()?;
        Ok(AnalyzedForecast { days })
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
