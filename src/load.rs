use crate::error::Result;
use crate::structs::AggregatedTable;
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use csv::Writer;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::io::{BufWriter, Write};
use std::{fs::File, path::Path, sync::Arc};

/// Column names shared by every output format: `City`, `Condition`, one
/// `YYYY-MM-DD` column per date, `Avg`.
pub fn header(table: &AggregatedTable) -> Vec<String> {
    let mut columns = Vec::with_capacity(table.dates.len() + 3);
    columns.push("City".to_string());
    columns.push("Condition".to_string());
    columns.extend(table.date_columns());
    columns.push("Avg".to_string());
    columns
}

fn format_cell(cell: Option<f64>) -> String {
    cell.map(|value| format!("{:.2}", value)).unwrap_or_default()
}

/// Writes the aggregation table to a CSV file.
///
/// Missing cells and undefined averages are written as empty fields.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(table: &AggregatedTable, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(header(table))?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.cells.len() + 3);
        record.push(row.city.clone());
        record.push(row.kind.to_string());
        record.extend(row.cells.iter().copied().map(format_cell));
        record.push(format_cell(row.avg));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the aggregation table as a pretty-formatted JSON array of records.
///
/// Missing cells and undefined averages are written as `null`.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(table: &AggregatedTable, output_path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut writer, table)?;
    writer.flush()?;
    Ok(())
}

/// Writes the aggregation table to a Parquet file using Arrow format.
///
/// Date and `Avg` columns are nullable `Float64`.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(table: &AggregatedTable, output_path: &Path) -> Result<()> {
    let mut fields = vec![
        Field::new("City", DataType::Utf8, false),
        Field::new("Condition", DataType::Utf8, false),
    ];
    for column in table.date_columns() {
        fields.push(Field::new(column, DataType::Float64, true));
    }
    fields.push(Field::new("Avg", DataType::Float64, true));
    let schema = Arc::new(Schema::new(fields));

    let cities = StringArray::from_iter_values(table.rows.iter().map(|r| r.city.as_str()));
    let conditions = StringArray::from_iter_values(table.rows.iter().map(|r| r.kind.as_str()));
    let mut columns: Vec<ArrayRef> = vec![Arc::new(cities), Arc::new(conditions)];
    for index in 0..table.dates.len() {
        let values: Float64Array = table
            .rows
            .iter()
            .map(|r| r.cells.get(index).copied().flatten())
            .collect();
        columns.push(Arc::new(values));
    }
    let averages: Float64Array = table.rows.iter().map(|r| r.avg).collect();
    columns.push(Arc::new(averages));

    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::{AggregationRow, MetricKind};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample() -> AggregatedTable {
        let dates = ["2022-05-26", "2022-05-27"]
            .iter()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap())
            .collect();
        AggregatedTable {
            dates,
            rows: vec![
                AggregationRow {
                    city: "MOSCOW".to_string(),
                    kind: MetricKind::TempAvg,
                    cells: vec![Some(12.5), None],
                    avg: Some(12.5),
                },
                AggregationRow {
                    city: "MOSCOW".to_string(),
                    kind: MetricKind::RelevantCondHours,
                    cells: vec![None, None],
                    avg: None,
                },
            ],
        }
    }

    #[test]
    fn csv_has_blank_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aggregation.csv");
        write_csv(&sample(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "City,Condition,2022-05-26,2022-05-27,Avg");
        assert_eq!(lines[1], "MOSCOW,temp_avg,12.50,,12.50");
        assert_eq!(lines[2], "MOSCOW,relevant_cond_hours,,,");
    }

    #[test]
    fn json_is_an_array_of_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aggregation.json");
        write_json(&sample(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["City"], "MOSCOW");
        assert_eq!(records[0]["2022-05-27"], serde_json::Value::Null);
        assert_eq!(records[1]["Condition"], "relevant_cond_hours");
        assert_eq!(records[1]["Avg"], serde_json::Value::Null);
    }

    #[test]
    fn parquet_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aggregation.parquet");
        write_parquet(&sample(), &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
