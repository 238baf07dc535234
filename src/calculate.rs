use crate::analyzer::Analyzer;
use crate::error::{PipelineError, Result};
use crate::structs::Cancellation;
use crate::workspace::Workspace;
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::mpsc::Receiver;

/// Items flowing from the fetch stage to the calculator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    City(String),
    /// Sent once, after every fetch task has finished
    Done,
}

/// State accumulated by the calculator and handed back when it stops
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calculation {
    /// Cities that were both fetched and analyzed, in arrival order
    pub cities: Vec<String>,
    /// Sorted union of every date seen in those cities' forecasts
    pub dates: BTreeSet<NaiveDate>,
}

/// Single consumer of the fetch channel.
///
/// Owns the success list and date set exclusively; the driver gets them back
/// from [`Calculator::run`] after the end marker has been seen.
pub struct Calculator<'a, A: Analyzer + ?Sized> {
    analyzer: &'a A,
    workspace: &'a Workspace,
    cancel: &'a Cancellation,
    drop_failures: bool,
    state: Calculation,
}

impl<'a, A: Analyzer + ?Sized> Calculator<'a, A> {
    pub fn new(analyzer: &'a A, workspace: &'a Workspace, cancel: &'a Cancellation) -> Self {
        Self {
            analyzer,
            workspace,
            cancel,
            drop_failures: false,
            state: Calculation::default(),
        }
    }

    /// Log and skip cities whose analysis fails instead of aborting.
    ///
    /// Off by default: fetch failures drop a city, calculation failures end
    /// the run.
    pub fn drop_failures(mut self, drop_failures: bool) -> Self {
        self.drop_failures = drop_failures;
        self
    }

    /// Drains `rx` until [`Message::Done`].
    ///
    /// # Errors
    /// Returns the first calculation error (unless failures are dropped),
    /// `PipelineError::Cancelled` on cancellation, or `PipelineError::Data`
    /// if the channel closes before the end marker.
    pub fn run(mut self, rx: Receiver<Message>) -> Result<Calculation> {
        loop {
            let city = match rx.recv() {
                Ok(Message::City(city)) => city,
                Ok(Message::Done) if self.cancel.is_cancelled() => {
                    return Err(PipelineError::Cancelled);
                }
                Ok(Message::Done) => break,
                Err(_) => {
                    return Err(PipelineError::Data(
                        "Fetch channel closed before end marker".to_string(),
                    ));
                }
            };
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            match self.process(&city) {
                Ok(()) => {}
                Err(err) if self.drop_failures => {
                    error!("Dropping {} after failed calculation: {}", city, err);
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            "Calculation finished: {} cities, {} dates",
            self.state.cities.len(),
            self.state.dates.len()
        );
        Ok(self.state)
    }

    fn process(&mut self, city: &str) -> Result<()> {
        let raw = self.workspace.read_raw(city)?;
        let analyzed = self
            .analyzer
            .analyze(&raw)
            .map_err(|err| PipelineError::Analyze {
                city: city.to_string(),
                message: err.to_string(),
            })?;
        self.workspace.write_analyzed(city, &analyzed)?;
        info!("Forecast for {} analyzed", city);

        if self.state.cities.iter().any(|seen| seen == city) {
            warn!("{} was calculated twice, keeping the first entry", city);
        } else {
            self.state.cities.push(city.to_string());
        }
        self.state.dates.extend(analyzed.dates());
        Ok(())
    }
}
