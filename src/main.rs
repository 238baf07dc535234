use clap::Parser;
use lib::{
    Cancellation, CitySet, ForecastAnalyzer, HttpWeatherClient, PipelineConfig, PipelineError,
    SimpleLogger, process_data, write_csv, write_json, write_parquet,
};
use log::{LevelFilter, debug};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file mapping city names to forecast URLs. If not specified, uses the built-in city list.
    #[arg(short, long)]
    cities_file: Option<PathBuf>,

    /// Output base name (will create dir containing aggregation .csv, .json, and .parquet files)
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Number of fetch/aggregate workers (defaults to available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Capacity of the fetch to calculation channel (defaults to the number of cities)
    #[arg(long)]
    channel_capacity: Option<usize>,

    /// Timeout for each forecast request, in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Drop cities whose forecast cannot be analyzed instead of aborting the run
    #[arg(long, default_value_t = false)]
    drop_failed_calculations: bool,

    /// Directory to create the temporary workspace in (defaults to the system temp dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Write log lines to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn main() -> Result<(), PipelineError> {
    let total_start = Instant::now();

    // Acquire CLI args and install logger
    let args = Args::parse();
    let level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    match &args.log_file {
        Some(path) => SimpleLogger::to_file(path, level)?.install()?,
        None => SimpleLogger::stdout(level).install()?,
    }

    let cities = match &args.cities_file {
        Some(path) => CitySet::from_json_file(path)?,
        None => CitySet::default(),
    };

    let mut config = PipelineConfig {
        channel_capacity: args.channel_capacity,
        fetch_timeout: Duration::from_secs(args.timeout_secs),
        drop_failed_calculations: args.drop_failed_calculations,
        work_dir: args.work_dir.clone(),
        ..PipelineConfig::default()
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    // UI
    println!("Forecaster! Rust City Weather Pipeline");
    debug!(
        "Cities: {} | Workers: {} | Timeout: {:?}",
        cities.len(),
        config.workers,
        config.fetch_timeout
    );
    if config.drop_failed_calculations {
        debug!("Failed calculations will be dropped");
    }

    let client = HttpWeatherClient::new(config.fetch_timeout);
    let analyzer = ForecastAnalyzer::default();

    println!("Starting forecast processing for {} cities...", cities.len());
    let processing_start = Instant::now();
    let output = process_data(
        &cities,
        &client,
        &analyzer,
        &config,
        &Cancellation::default(),
    )?;
    let processing_time = processing_start.elapsed();
    println!(
        "Forecast processing completed in {:.2?} | {} of {} cities usable",
        processing_time,
        output.cities.len(),
        cities.len()
    );

    // Create output directory
    let output_dir = PathBuf::from(format!("./output/{}", args.output));
    fs::create_dir_all(&output_dir)?;
    println!(
        "Created output directory: {} | Writing output files...",
        output_dir.display()
    );
    let io_start = Instant::now();

    let csv_path = output_dir.join("aggregation.csv");
    let json_path = output_dir.join("aggregation.json");
    let parquet_path = output_dir.join("aggregation.parquet");

    let csv_start = Instant::now();
    write_csv(&output.table, &csv_path)?;
    println!("CSV write took {:.2?}", csv_start.elapsed());

    let json_start = Instant::now();
    write_json(&output.table, &json_path)?;
    println!("JSON write took {:.2?}", json_start.elapsed());

    let parquet_start = Instant::now();
    write_parquet(&output.table, &parquet_path)?;
    println!("Parquet write took {:.2?}", parquet_start.elapsed());

    let io_time = io_start.elapsed();
    println!("All files took {:.2?}", io_time);
    println!("\nWrote files to directory: {}", output_dir.display());
    debug!("  - {}", csv_path.display());
    debug!("  - {}", json_path.display());
    debug!("  - {}", parquet_path.display());

    println!("\n{}", output.ranking);

    let total_time = total_start.elapsed();
    debug!(
        "Performance breakdown: Processing={:.1}%, IO={:.1}%",
        (processing_time.as_secs_f64() / total_time.as_secs_f64()) * 100.0,
        (io_time.as_secs_f64() / total_time.as_secs_f64()) * 100.0
    );

    println!("\nTotal runtime: {:.2?}", total_time);
    Ok(())
}
