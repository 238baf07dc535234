use crate::error::{PipelineError, Result};
use crate::structs::{
    AggregatedTable, AggregationRow, AnalyzedForecast, Cancellation, DayMetric, MetricKind,
};
use crate::workspace::Workspace;
use chrono::NaiveDate;
use log::{info, warn};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::HashMap;

/// Arithmetic mean of the present cells, `None` when there are none.
pub fn mean_present(cells: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = cells.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

/// Builds the `temp_avg` and `relevant_cond_hours` rows of one city.
///
/// Each row has one cell per entry of `dates`, in that order; dates the city
/// has no record for become empty cells. If a date is repeated the last
/// record for it wins.
pub fn build_rows(city: &str, analyzed: &AnalyzedForecast, dates: &[NaiveDate]) -> [AggregationRow; 2] {
    let mut by_date: HashMap<NaiveDate, &DayMetric> = HashMap::with_capacity(analyzed.days.len());
    for day in &analyzed.days {
        if by_date.insert(day.date, day).is_some() {
            warn!("{} has more than one record for {}, using the last one", city, day.date);
        }
    }
    MetricKind::ALL.map(|kind| {
        let cells: Vec<Option<f64>> = dates
            .iter()
            .map(|date| by_date.get(date).and_then(|day| kind.value(day)))
            .collect();
        let avg = mean_present(&cells);
        AggregationRow {
            city: city.to_string(),
            kind,
            cells,
            avg,
        }
    })
}

/// Loads one calculated city's artifact and turns it into its two rows.
///
/// # Errors
/// Returns `PipelineError::MissingArtifact` when the city has no analyzed
/// artifact, which means the success list and the workspace disagree.
pub fn aggregate_city(
    workspace: &Workspace,
    city: &str,
    dates: &[NaiveDate],
    cancel: &Cancellation,
) -> Result<[AggregationRow; 2]> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let analyzed = workspace.read_analyzed(city)?;
    let rows = build_rows(city, &analyzed, dates);
    info!("Forecast for {} aggregated", city);
    Ok(rows)
}

/// Aggregates every calculated city on `pool`, one task per city.
///
/// Rows come out in the order of `cities`, two per city.
pub fn aggregate_all(
    pool: &ThreadPool,
    workspace: &Workspace,
    cities: &[String],
    dates: Vec<NaiveDate>,
    cancel: &Cancellation,
) -> Result<AggregatedTable> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let per_city: Vec<[AggregationRow; 2]> = pool.install(|| {
        cities
            .par_iter()
            .map(|city| aggregate_city(workspace, city, &dates, cancel))
            .collect::<Result<Vec<_>>>()
    })?;

    let rows = per_city.into_iter().flatten().collect();
    Ok(AggregatedTable { dates, rows })
}
