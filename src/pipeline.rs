use crate::aggregate::aggregate_all;
use crate::analyzer::Analyzer;
use crate::calculate::{Calculation, Calculator, Message};
use crate::client::WeatherClient;
use crate::error::{PipelineError, Result};
use crate::fetch::fetch_all;
use crate::rank::rank;
use crate::structs::{AggregatedTable, Cancellation, CitySet, PipelineConfig, RankingResult};
use crate::workspace::Workspace;
use log::{debug, info};
use rayon::ThreadPoolBuilder;
use std::sync::mpsc::sync_channel;
use std::thread;

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Cities that were fetched and calculated, in calculation order
    pub cities: Vec<String>,
    pub table: AggregatedTable,
    pub ranking: RankingResult,
}

/// Runs fetch, calculation, aggregation and ranking for `cities`.
///
/// Fetching fans out over a pool of `config.workers` threads feeding a
/// single calculator thread through a FIFO channel. Once every fetch task
/// has finished the end marker is queued and the calculator is joined, then
/// aggregation fans out over the same pool. The temporary workspace is
/// removed before returning, on success and on error.
///
/// Fetch failures drop the city. Calculation failures abort the run unless
/// `config.drop_failed_calculations` is set.
///
/// # Errors
/// Returns error on calculation failure, a missing intermediate artifact,
/// cancellation, or when no city survives to be ranked.
pub fn process_data<C, A>(
    cities: &CitySet,
    client: &C,
    analyzer: &A,
    config: &PipelineConfig,
    cancel: &Cancellation,
) -> Result<PipelineOutput>
where
    C: WeatherClient + ?Sized,
    A: Analyzer + ?Sized,
{
    let workspace = Workspace::create(config.work_dir.as_deref())?;
    let output = run_stages(&workspace, cities, client, analyzer, config, cancel);
    let closed = workspace.close();
    let output = output?;
    closed?;
    Ok(output)
}

fn run_stages<C, A>(
    workspace: &Workspace,
    cities: &CitySet,
    client: &C,
    analyzer: &A,
    config: &PipelineConfig,
    cancel: &Cancellation,
) -> Result<PipelineOutput>
where
    C: WeatherClient + ?Sized,
    A: Analyzer + ?Sized,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .thread_name(|index| format!("forecast-worker-{}", index))
        .build()?;
    let capacity = config
        .channel_capacity
        .unwrap_or(cities.len())
        .max(1);
    debug!(
        "Starting pipeline | cities={} workers={} channel_capacity={}",
        cities.len(),
        config.workers,
        capacity
    );

    let calculation = thread::scope(|scope| -> Result<Calculation> {
        let (tx, rx) = sync_channel::<Message>(capacity);
        let calculator = Calculator::new(analyzer, workspace, cancel)
            .drop_failures(config.drop_failed_calculations);
        let handle = thread::Builder::new()
            .name("forecast-calculator".to_string())
            .spawn_scoped(scope, move || calculator.run(rx))?;

        let fetched = fetch_all(&pool, client, workspace, cities.as_slice(), tx.clone(), cancel);
        info!("Fetched {} of {} cities", fetched, cities.len());
        // The calculator may already have stopped on an error; its result says why.
        let _ = tx.send(Message::Done);
        drop(tx);

        handle
            .join()
            .map_err(|_| PipelineError::Data("Calculator thread panicked".to_string()))?
    })?;
    info!(
        "Calculated {} cities over {} dates",
        calculation.cities.len(),
        calculation.dates.len()
    );

    let dates = calculation.dates.into_iter().collect();
    let table = aggregate_all(&pool, workspace, &calculation.cities, dates, cancel)?;
    info!("Aggregated {} rows", table.len());

    let ranking = rank(&table)?;
    info!("Final result: {}", ranking);

    Ok(PipelineOutput {
        cities: calculation.cities,
        table,
        ranking,
    })
}
