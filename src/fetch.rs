use crate::calculate::Message;
use crate::client::{WeatherClient, is_empty_payload};
use crate::error::{PipelineError, Result};
use crate::structs::{Cancellation, City};
use crate::workspace::Workspace;
use log::{error, info, warn};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::mpsc::SyncSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    Dropped,
}

/// Fetches one city's forecast, stores it in the workspace and hands the
/// city to the calculation stage.
///
/// Failures never propagate: transport errors, empty payloads and a closed
/// calculation channel are logged and the city is dropped for the rest of
/// the run. There are no retries.
pub fn fetch_city<C: WeatherClient + ?Sized>(
    client: &C,
    workspace: &Workspace,
    city: &City,
    tx: &SyncSender<Message>,
    cancel: &Cancellation,
) -> FetchOutcome {
    if cancel.is_cancelled() {
        warn!("Run cancelled, skipping fetch for {}", city.name);
        return FetchOutcome::Dropped;
    }

    if let Err(err) = download(client, workspace, city) {
        error!(
            "Failed to fetch forecast for {} from {}: {}",
            city.name, city.url, err
        );
        return FetchOutcome::Dropped;
    }
    info!("Forecast for {} saved", city.name);

    if tx.send(Message::City(city.name.clone())).is_err() {
        warn!("Calculation stage has stopped, dropping {}", city.name);
        return FetchOutcome::Dropped;
    }
    FetchOutcome::Fetched
}

fn download<C: WeatherClient + ?Sized>(
    client: &C,
    workspace: &Workspace,
    city: &City,
) -> Result<()> {
    let payload = client.get_forecast(&city.url)?;
    if is_empty_payload(&payload) {
        return Err(PipelineError::Data("empty response".to_string()));
    }
    workspace.write_raw(&city.name, &payload)
}

/// Fetches every city on `pool`, one task per city, and returns how many
/// were handed to the calculation stage.
///
/// Returns once every task has finished; the caller sends the end marker.
pub fn fetch_all<C: WeatherClient + ?Sized>(
    pool: &ThreadPool,
    client: &C,
    workspace: &Workspace,
    cities: &[City],
    tx: SyncSender<Message>,
    cancel: &Cancellation,
) -> usize {
    pool.install(|| {
        cities
            .par_iter()
            .map_with(tx, |tx, city| {
                fetch_city(client, workspace, city, tx, cancel)
            })
            .filter(|outcome| *outcome == FetchOutcome::Fetched)
            .count()
    })
}
