//! End-to-end runs of the forecast pipeline against an in-memory weather client

use chrono::NaiveDate;
use lib::{
    Cancellation, City, CitySet, ForecastAnalyzer, MetricKind, PipelineConfig, PipelineError,
    Result, WeatherClient, process_data, write_json,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

/// Serves canned payloads by URL; unknown URLs fail like a refused connection.
struct MemoryClient {
    payloads: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
}

impl MemoryClient {
    fn new() -> Self {
        Self {
            payloads: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    fn with(mut self, url: &str, payload: Value) -> Self {
        self.payloads.insert(url.to_string(), payload);
        self
    }

    fn delayed(mut self, url: &str, millis: u64) -> Self {
        self.delays
            .insert(url.to_string(), Duration::from_millis(millis));
        self
    }
}

impl WeatherClient for MemoryClient {
    fn get_forecast(&self, url: &str) -> Result<Value> {
        if let Some(delay) = self.delays.get(url) {
            thread::sleep(*delay);
        }
        self.payloads
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::Data(format!("connection refused: {}", url)))
    }
}

/// One provider day with every daytime hour at `temp` under `condition`.
fn day(date: &str, temp: f64, condition: &str) -> Value {
    let hours: Vec<Value> = (0..24)
        .map(|h| json!({"hour": h.to_string(), "temp": temp, "condition": condition}))
        .collect();
    json!({"date": date, "hours": hours})
}

fn forecast(days: Vec<Value>) -> Value {
    json!({"forecasts": days})
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn cities() -> CitySet {
    CitySet::new(vec![
        City::new("PARIS", "mem://paris"),
        City::new("ROMA", "mem://roma"),
        City::new("GIZA", "mem://giza"),
    ])
    .unwrap()
}

fn client() -> MemoryClient {
    MemoryClient::new()
        .with(
            "mem://paris",
            forecast(vec![
                day("2022-05-26", 20.0, "clear"),
                day("2022-05-27", 22.0, "rain"),
            ]),
        )
        .with(
            "mem://roma",
            forecast(vec![
                day("2022-05-27", 25.0, "cloudy"),
                day("2022-05-28", 25.0, "rain"),
            ]),
        )
}

fn config(work_dir: &std::path::Path, workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        work_dir: Some(work_dir.to_path_buf()),
        ..PipelineConfig::default()
    }
}

#[test]
fn failed_city_is_dropped_and_dates_are_merged() {
    let work_dir = tempdir().unwrap();
    let output = process_data(
        &cities(),
        &client(),
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 3),
        &Cancellation::default(),
    )
    .unwrap();

    let table = &output.table;
    assert_eq!(table.len(), 4);
    assert!(table.rows.iter().all(|row| row.city != "GIZA"));
    assert_eq!(
        table.dates,
        vec![date("2022-05-26"), date("2022-05-27"), date("2022-05-28")]
    );

    let paris_temp = table
        .rows_of(MetricKind::TempAvg)
        .find(|row| row.city == "PARIS")
        .unwrap();
    assert_eq!(paris_temp.cells, vec![Some(20.0), Some(22.0), None]);
    assert_eq!(paris_temp.avg, Some(21.0));

    let roma_hours = table
        .rows_of(MetricKind::RelevantCondHours)
        .find(|row| row.city == "ROMA")
        .unwrap();
    assert_eq!(roma_hours.cells, vec![None, Some(11.0), Some(0.0)]);
    assert_eq!(roma_hours.avg, Some(5.5));

    assert_eq!(output.ranking.cities, vec!["ROMA"]);
    assert_eq!(output.ranking.temp_avg, 25.0);
}

#[test]
fn intermediate_artifacts_are_removed() {
    let work_dir = tempdir().unwrap();
    process_data(
        &cities(),
        &client(),
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 2),
        &Cancellation::default(),
    )
    .unwrap();
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[test]
fn result_does_not_depend_on_completion_order() {
    let run = |client: MemoryClient| {
        let work_dir = tempdir().unwrap();
        let output = process_data(
            &cities(),
            &client,
            &ForecastAnalyzer::default(),
            &config(work_dir.path(), 3),
            &Cancellation::default(),
        )
        .unwrap();
        let mut rows = output.table.rows.clone();
        rows.sort_by(|a, b| a.city.cmp(&b.city).then(a.kind.as_str().cmp(b.kind.as_str())));
        (output.table.dates, rows, output.ranking)
    };

    let paris_first = run(client().delayed("mem://roma", 50));
    let roma_first = run(client().delayed("mem://paris", 50));
    assert_eq!(paris_first, roma_first);
}

#[test]
fn equal_cities_are_reported_together() {
    let client = MemoryClient::new()
        .with("mem://paris", forecast(vec![day("2022-05-26", 18.0, "clear")]))
        .with("mem://roma", forecast(vec![day("2022-05-26", 18.0, "overcast")]));
    let work_dir = tempdir().unwrap();
    let output = process_data(
        &cities(),
        &client,
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 2),
        &Cancellation::default(),
    )
    .unwrap();
    let mut tied = output.ranking.cities.clone();
    tied.sort();
    assert_eq!(tied, vec!["PARIS", "ROMA"]);
    assert!(output.ranking.is_tie());
}

#[test]
fn malformed_forecast_aborts_the_run() {
    let client = client().with("mem://giza", json!({"forecasts": [{"date": "yesterday"}]}));
    let work_dir = tempdir().unwrap();
    let err = process_data(
        &cities(),
        &client,
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 3),
        &Cancellation::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Analyze { city, .. } if city == "GIZA"));
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[test]
fn malformed_forecast_can_be_dropped() {
    let client = client().with("mem://giza", json!({"forecasts": [{"date": "yesterday"}]}));
    let work_dir = tempdir().unwrap();
    let mut config = config(work_dir.path(), 3);
    config.drop_failed_calculations = true;
    let output = process_data(
        &cities(),
        &client,
        &ForecastAnalyzer::default(),
        &config,
        &Cancellation::default(),
    )
    .unwrap();
    assert_eq!(output.table.len(), 4);
    assert!(!output.cities.contains(&"GIZA".to_string()));
}

#[test]
fn no_usable_city_is_an_error() {
    let work_dir = tempdir().unwrap();
    let err = process_data(
        &cities(),
        &MemoryClient::new(),
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 2),
        &Cancellation::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyTable));
}

#[test]
fn cancelled_run_stops() {
    let work_dir = tempdir().unwrap();
    let cancel = Cancellation::default();
    cancel.cancel();
    let result = process_data(
        &cities(),
        &client(),
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 2),
        &cancel,
    );
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[test]
fn single_bounded_channel_slot_still_completes() {
    let work_dir = tempdir().unwrap();
    let mut config = config(work_dir.path(), 4);
    config.channel_capacity = Some(1);
    let output = process_data(
        &cities(),
        &client(),
        &ForecastAnalyzer::default(),
        &config,
        &Cancellation::default(),
    )
    .unwrap();
    assert_eq!(output.cities.len(), 2);
}

#[test]
fn aggregated_document_lists_every_date_column() {
    let work_dir = tempdir().unwrap();
    let output = process_data(
        &cities(),
        &client(),
        &ForecastAnalyzer::default(),
        &config(work_dir.path(), 2),
        &Cancellation::default(),
    )
    .unwrap();

    let out_dir = tempdir().unwrap();
    let path = out_dir.path().join("aggregation.json");
    write_json(&output.table, &path).unwrap();
    let records: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(records.len(), 4);
    for record in &records {
        for column in ["City", "Condition", "2022-05-26", "2022-05-27", "2022-05-28", "Avg"] {
            assert!(record.contains_key(column), "missing {} in {:?}", column, record);
        }
    }
}
