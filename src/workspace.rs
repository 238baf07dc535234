use crate::error::{PipelineError, Result};
use crate::structs::AnalyzedForecast;
use log::debug;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory holding the per-city intermediate artifacts of one run.
///
/// Every path is derived from a city name, so workers handling different
/// cities never touch the same file. The directory is removed by
/// [`Workspace::close`] or, on error paths, when the value is dropped.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates the workspace inside `parent`, or the system temp dir if `None`.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("forecast-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn raw_path(&self, city: &str) -> PathBuf {
        self.dir.path().join(format!("{}_response.json", city))
    }

    pub fn analyzed_path(&self, city: &str) -> PathBuf {
        self.dir.path().join(format!("{}_output.json", city))
    }

    pub fn write_raw(&self, city: &str, payload: &Value) -> Result<()> {
        write_pretty(&self.raw_path(city), payload)
    }

    pub fn read_raw(&self, city: &str) -> Result<Value> {
        let file = File::open(self.raw_path(city))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn write_analyzed(&self, city: &str, analyzed: &AnalyzedForecast) -> Result<()> {
        write_pretty(&self.analyzed_path(city), analyzed)
    }

    /// Loads the analyzed forecast of a city that passed calculation.
    ///
    /// # Errors
    /// Returns `PipelineError::MissingArtifact` if the file does not exist.
    pub fn read_analyzed(&self, city: &str) -> Result<AnalyzedForecast> {
        let path = self.analyzed_path(city);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::MissingArtifact {
                    city: city.to_string(),
                    path,
                });
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Deletes the workspace and everything in it.
    ///
    /// # Errors
    /// Returns error if the directory cannot be removed.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed workspace {}", path.display());
        Ok(())
    }
}

fn write_pretty<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
