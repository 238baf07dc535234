pub mod aggregate;
pub mod analyzer;
pub mod calculate;
pub mod client;
pub mod error;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod rank;
pub mod structs;
pub mod workspace;

// Re-export public API
pub use analyzer::{Analyzer, ForecastAnalyzer};
pub use client::{HttpWeatherClient, WeatherClient};
pub use error::{PipelineError, Result};
pub use load::{write_csv, write_json, write_parquet};
pub use pipeline::{PipelineOutput, process_data};
pub use rank::rank;
pub use structs::{
    AggregatedTable, AggregationRow, AnalyzedForecast, Cancellation, City, CitySet, DayMetric,
    MetricKind, PipelineConfig, RankingResult, SimpleLogger,
};
