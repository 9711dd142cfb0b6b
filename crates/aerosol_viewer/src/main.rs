mod browse;
mod config;
mod pipeline;
mod render;

use std::path::PathBuf;

use aerosol_forecast::{
    AdsArchive, Clock, ForecastCache, SelectionChange, SelectionState, SystemClock,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ViewerConfig;
use pipeline::Pipeline;
use render::Renderer;

/// View the CAMS aerosol extinction (1064 nm) forecast over 30°N–9°N, 30°E–50°E.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, unless overridden by `RUST_LOG`.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Pretend the current UTC time is this instant (RFC 3339), which picks the model run.
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the forecast for the current model run.
    Fetch,
    /// List the pressure levels and valid times in the forecast.
    Axes,
    /// Render a single (pressure level, valid time) slice to PNG.
    Render {
        /// Pressure level in hPa. The nearest available level is used.
        #[arg(long)]
        level: f64,

        /// Valid time as `MM/DD HH:MM` (UTC) or RFC 3339.
        #[arg(long, conflicts_with = "time_index")]
        time: Option<String>,

        /// Index into the list of valid times printed by `axes`.
        #[arg(long)]
        time_index: Option<usize>,

        /// Output file. Defaults to a file named after the slice in the output directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Choose levels and times interactively; every change re-renders.
    Browse,
}

/// The session clock: the real one, or a fixed instant from `--now`.
#[derive(Debug, Clone, Copy)]
enum SessionClock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock for SessionClock {
    fn now(&self) -> DateTime<Utc> {
        match *self {
            Self::System => SystemClock.now(),
            Self::Fixed(now) => now,
        }
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = ViewerConfig::load(args.config.as_deref())?;
    let clock = match args.now {
        Some(now) => SessionClock::Fixed(now),
        None => SessionClock::System,
    };
    info!(?clock, download_path = %config.download_path.display(), "Starting session");

    let archive = AdsArchive::new(config.credentials()?)?
        .with_poll_interval(config.poll_interval())
        .with_progress_bar(config.show_progress);
    let cache = ForecastCache::with_clock(archive, clock, config.download_path.clone())
        .with_policy(config.refresh);
    let renderer = Renderer::new(config.pixels_per_cell, config.output_dir.clone());
    let mut pipeline = Pipeline::new(cache, renderer);

    match args.command {
        Command::Fetch => {
            let fetched = pipeline.acquire().await?;
            println!(
                "Loaded forecast for {} {} ({} bytes) at {}",
                fetched.forecast_date(),
                fetched.forecast_hour(),
                fetched.bytes,
                fetched.path.display()
            );
        }
        Command::Axes => {
            let field = pipeline.materialize().await?;
            browse::print_axes(&SelectionState::new(&field)?);
        }
        Command::Render {
            level,
            time,
            time_index,
            out,
        } => {
            let field = pipeline.materialize().await?;
            let mut state = SelectionState::new(&field)?;
            state.apply(SelectionChange::Level(level))?;
            if let Some(index) = time_index {
                state.apply(SelectionChange::TimeIndex(index))?;
            }
            if let Some(time) = time {
                let valid_time = match state.valid_time_by_label(&time) {
                    Some(valid_time) => valid_time,
                    None => time.parse::<DateTime<Utc>>().map_err(|e| {
                        anyhow::anyhow!("'{time}' is neither MM/DD HH:MM nor RFC 3339: {e}")
                    })?,
                };
                state.apply(SelectionChange::ValidTime(valid_time))?;
            }
            pipeline.render(&field, &state.current(), out.as_deref()).await?;
        }
        Command::Browse => browse::browse(&mut pipeline).await?,
    }
    Ok(())
}
