use crate::error::{PipelineError, Result};
use crate::structs::{AggregatedTable, AggregationRow, MetricKind, RankingResult};
use log::debug;

/// Picks the city (or tied cities) with the warmest average temperature,
/// breaking ties by the most comfortable hours.
///
/// Averages are compared with exact `f64` equality, so two cities only tie
/// when their averages are bit-for-bit equal. Rows without an average never
/// win. If no city in the temperature tier has a comfort average, the whole
/// tier is returned as a tie. Results keep table order.
///
/// # Errors
/// Returns `PipelineError::EmptyTable` if the table has no temperature row
/// with a defined average.
pub fn rank(table: &AggregatedTable) -> Result<RankingResult> {
    let (max_temp, tier1) = best_of(table.rows_of(MetricKind::TempAvg))
        .ok_or(PipelineError::EmptyTable)?;
    debug!("Warmest average {} shared by {:?}", max_temp, tier1);

    let comfort_rows = table
        .rows_of(MetricKind::RelevantCondHours)
        .filter(|row| tier1.contains(&row.city));

    let result = if tier1.len() == 1 {
        let comfort = comfort_rows.filter_map(|row| row.avg).next();
        RankingResult {
            cities: tier1,
            temp_avg: max_temp,
            relevant_cond_hours: comfort,
        }
    } else {
        match best_of(comfort_rows) {
            Some((max_comfort, tier2)) => RankingResult {
                cities: tier2,
                temp_avg: max_temp,
                relevant_cond_hours: Some(max_comfort),
            },
            None => RankingResult {
                cities: tier1,
                temp_avg: max_temp,
                relevant_cond_hours: None,
            },
        }
    };

    debug!("Most favorable: {}", result.cities.join(", "));
    Ok(result)
}

/// Maximum defined average among `rows` and the cities that reach it.
fn best_of<'a>(rows: impl Iterator<Item = &'a AggregationRow>) -> Option<(f64, Vec<String>)> {
    let rows: Vec<(&str, f64)> = rows
        .filter_map(|row| row.avg.map(|avg| (row.city.as_str(), avg)))
        .collect();
    let max = rows.iter().map(|(_, avg)| *avg).reduce(f64::max)?;
    let mut cities: Vec<String> = Vec::new();
    for (city, avg) in rows {
        if avg == max && !cities.iter().any(|seen| seen == city) {
            cities.push(city.to_string());
        }
    }
    Some((max, cities))
}
