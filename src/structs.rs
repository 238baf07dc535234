use crate::error::{PipelineError, Result};
use chrono::{Local, NaiveDate, SecondsFormat};
use log::{LevelFilter, Log, Metadata, Record as LogRecord};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Simple logger implementation
///
/// Lines are formatted as `<timestamp> [LEVEL]: message` and go either to
/// stdout or to an append-mode log file.
pub struct SimpleLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl SimpleLogger {
    pub fn stdout(level: LevelFilter) -> Self {
        Self { level, file: None }
    }

    /// Opens (or creates) `path` in append mode and logs there instead of stdout.
    ///
    /// # Errors
    /// Returns error if the log file cannot be opened.
    pub fn to_file(path: &Path, level: LevelFilter) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            level,
            file: Some(Mutex::new(file)),
        })
    }

    /// Installs this logger as the global `log` backend.
    ///
    /// # Errors
    /// Returns error if a global logger was already installed.
    pub fn install(self) -> Result<()> {
        let level = self.level;
        let logger: &'static SimpleLogger = Box::leak(Box::new(self));
        log::set_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn format(record: &LogRecord) -> String {
        format!(
            "{} [{}]: {}",
            Local::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            record.level(),
            record.args()
        )
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &LogRecord) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        match &self.file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(file, "{}", line);
                }
            }
            None => println!("{}", line),
        }
    }

    fn flush(&self) {
        if let Some(Ok(mut file)) = self.file.as_ref().map(|file| file.lock()) {
            let _ = file.flush();
        }
    }
}

const DEFAULT_CITIES: &[(&str, &str)] = &[
    ("MOSCOW", "https://code.s3.yandex.net/async-module/moscow-response.json"),
    ("PARIS", "https://code.s3.yandex.net/async-module/paris-response.json"),
    ("LONDON", "https://code.s3.yandex.net/async-module/london-response.json"),
    ("BERLIN", "https://code.s3.yandex.net/async-module/berlin-response.json"),
    ("BEIJING", "https://code.s3.yandex.net/async-module/beijing-response.json"),
    ("KAZAN", "https://code.s3.yandex.net/async-module/kazan-response.json"),
    ("SPETERSBURG", "https://code.s3.yandex.net/async-module/spetersburg-response.json"),
    ("VOLGOGRAD", "https://code.s3.yandex.net/async-module/volgograd-response.json"),
    ("NOVOSIBIRSK", "https://code.s3.yandex.net/async-module/novosibirsk-response.json"),
    ("KALININGRAD", "https://code.s3.yandex.net/async-module/kaliningrad-response.json"),
    ("ABUDHABI", "https://code.s3.yandex.net/async-module/abudhabi-response.json"),
    ("WARSZAWA", "https://code.s3.yandex.net/async-module/warszawa-response.json"),
    ("BUCHAREST", "https://code.s3.yandex.net/async-module/bucharest-response.json"),
    ("ROMA", "https://code.s3.yandex.net/async-module/roma-response.json"),
    ("CAIRO", "https://code.s3.yandex.net/async-module/cairo-response.json"),
    ("GIZA", "https://code.s3.yandex.net/async-module/giza-response.json"),
    ("MADRID", "https://code.s3.yandex.net/async-module/madrid-response.json"),
    ("TORONTO", "https://code.s3.yandex.net/async-module/toronto-response.json"),
];

/// A city to forecast and the URL its forecast is requested from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub url: String,
}

impl City {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Validated, duplicate-free list of cities
#[derive(Debug, Clone)]
pub struct CitySet(Vec<City>);

impl CitySet {
    /// Builds a city set, rejecting blank names and duplicates.
    ///
    /// # Errors
    /// Returns `PipelineError::DuplicateCity` if a name occurs twice and
    /// `PipelineError::Data` for a blank name or one containing a path
    /// separator or `..`, since names key the workspace files.
    pub fn new(cities: Vec<City>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(cities.len());
        for city in &cities {
            if city.name.trim().is_empty() {
                return Err(PipelineError::Data(format!(
                    "City with url {} has an empty name",
                    city.url
                )));
            }
            if city.name.contains(['/', '\\']) || city.name.contains("..") {
                return Err(PipelineError::Data(format!(
                    "City name {:?} cannot be used as a file key",
                    city.name
                )));
            }
            if !seen.insert(city.name.as_str()) {
                return Err(PipelineError::DuplicateCity(city.name.clone()));
            }
        }
        Ok(Self(cities))
    }

    /// Reads a JSON object mapping city name to forecast URL.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is not a JSON object of
    /// strings, or contains an invalid city.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let entries: BTreeMap<String, String> = serde_json::from_reader(file)?;
        Self::new(
            entries
                .into_iter()
                .map(|(name, url)| City::new(name, url))
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[City] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CitySet {
    fn default() -> Self {
        Self(
            DEFAULT_CITIES
                .iter()
                .map(|(name, url)| City::new(*name, *url))
                .collect(),
        )
    }
}

/// Derived weather metrics for one calendar date of one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayMetric {
    pub date: NaiveDate,
    pub hours_start: Option<u32>,
    pub hours_end: Option<u32>,
    #[serde(default)]
    pub hours_count: u32,
    pub temp_avg: Option<f64>,
    pub relevant_cond_hours: Option<u32>,
}

/// Analyzer output for one city
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedForecast {
    #[serde(default)]
    pub days: Vec<DayMetric>,
}

impl AnalyzedForecast {
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.iter().map(|day| day.date)
    }
}

/// The two metrics summarised per city
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    TempAvg,
    RelevantCondHours,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::TempAvg, MetricKind::RelevantCondHours];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::TempAvg => "temp_avg",
            MetricKind::RelevantCondHours => "relevant_cond_hours",
        }
    }

    pub fn value(&self, day: &DayMetric) -> Option<f64> {
        match self {
            MetricKind::TempAvg => day.temp_avg,
            MetricKind::RelevantCondHours => day.relevant_cond_hours.map(f64::from),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (city, metric) row: a cell per date column and the mean of the present cells
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRow {
    pub city: String,
    pub kind: MetricKind,
    pub cells: Vec<Option<f64>>,
    /// `None` when every cell is missing
    pub avg: Option<f64>,
}

/// Rectangular table of aggregation rows sharing the same date columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedTable {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<AggregationRow>,
}

impl AggregatedTable {
    pub fn rows_of(&self, kind: MetricKind) -> impl Iterator<Item = &AggregationRow> {
        self.rows.iter().filter(move |row| row.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Date columns rendered as `YYYY-MM-DD`
    pub fn date_columns(&self) -> Vec<String> {
        self.dates.iter().map(|date| date.to_string()).collect()
    }
}

/// Serialises as an array of `{City, Condition, <dates>..., Avg}` records,
/// keeping column order.
impl Serialize for AggregatedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let columns = self.date_columns();
        let records: Vec<RowRecord<'_>> = self
            .rows
            .iter()
            .map(|row| RowRecord {
                columns: &columns,
                row,
            })
            .collect();
        records.serialize(serializer)
    }
}

struct RowRecord<'a> {
    columns: &'a [String],
    row: &'a AggregationRow,
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 3))?;
        map.serialize_entry("City", &self.row.city)?;
        map.serialize_entry("Condition", self.row.kind.as_str())?;
        for (column, cell) in self.columns.iter().zip(&self.row.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.serialize_entry("Avg", &self.row.avg)?;
        map.end()
    }
}

/// The most favorable city, or the set of cities tied for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingResult {
    pub cities: Vec<String>,
    pub temp_avg: f64,
    pub relevant_cond_hours: Option<f64>,
}

impl RankingResult {
    pub fn is_tie(&self) -> bool {
        self.cities.len() > 1
    }
}

impl fmt::Display for RankingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self
            .relevant_cond_hours
            .map(|hours| format!("{:.2}", hours))
            .unwrap_or_else(|| "n/a".to_string());
        if self.is_tie() {
            write!(
                f,
                "{} are equally favorable for travel (avg temp {:.2}, comfortable hours {})",
                self.cities.join(", "),
                self.temp_avg,
                hours
            )
        } else {
            write!(
                f,
                "{} is the most favorable city for travel (avg temp {:.2}, comfortable hours {})",
                self.cities.join(", "),
                self.temp_avg,
                hours
            )
        }
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Size of the fetch/aggregate worker pool
    pub workers: usize,
    /// Capacity of the fetch to calculate channel; `None` sizes it to the city count
    pub channel_capacity: Option<usize>,
    pub fetch_timeout: Duration,
    /// Log and drop a city whose analysis fails instead of aborting the run
    pub drop_failed_calculations: bool,
    /// Parent directory for the temporary workspace; system temp dir if `None`
    pub work_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            channel_capacity: None,
            fetch_timeout: Duration::from_secs(10),
            drop_failed_calculations: false,
            work_dir: None,
        }
    }
}

/// Shared flag telling in-flight pipeline stages to stop
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
