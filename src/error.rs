use arrow_schema::ArrowError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("Data Error: {0}")]
    Data(String),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP Error: {0}")]
    Http(#[from] Box<ureq::Error>),
    #[error("Thread Pool Error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Logger Error: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error("Analyzer Error for {city}: {message}")]
    Analyze { city: String, message: String },
    #[error("Missing intermediate artifact for {city}: {}", .path.display())]
    MissingArtifact { city: String, path: PathBuf },
    #[error("Duplicate city in configuration: {0}")]
    DuplicateCity(String),
    #[error("Cannot rank an empty aggregation table")]
    EmptyTable,
    #[error("Pipeline cancelled")]
    Cancelled,
}

impl From<ureq::Error> for PipelineError {
    fn from(err: ureq::Error) -> Self {
        PipelineError::Http(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
