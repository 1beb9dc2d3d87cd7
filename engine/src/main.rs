// Engine main entry point
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::config::PipelineSettings;
use engine::data::{CandleSource, CryptoCompareSource, CsvCandleSource};
use engine::export::write_workbook;
use engine::forecast::{Forecaster, TrainingGate};
use engine::indicators::FillMode;
use engine::pipeline::{Orchestrator, RefreshScheduler, TokioTimer, WatchPublisher};
use shared::Interval;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Candle feature pipeline and next-close forecaster", long_about = None)]
struct Cli {
    /// JSON settings file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Asset symbol, e.g. BTC
    #[arg(long, global = true)]
    symbol: Option<String>,

    /// Read `<SYMBOL>_<interval>.csv` files from this directory instead of CryptoCompare
    #[arg(long, global = true)]
    csv_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once for each interval
    Run {
        /// Comma-separated intervals (1m,5m,15m,30m,1h,4h,1d); defaults to the settings
        #[arg(long, value_delimiter = ',')]
        intervals: Vec<Interval>,

        /// Write one CSV sheet per successful interval into this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Refresh one interval periodically until Ctrl-C
    Watch {
        #[arg(long, default_value = "1h")]
        interval: Interval,

        /// Seconds between cycles; defaults to the settings
        #[arg(long)]
        period_secs: Option<u64>,
    },
    /// Train on the latest candles and forecast the next close
    Forecast {
        #[arg(long, default_value = "1h")]
        interval: Interval,

        #[arg(long)]
        epochs: Option<usize>,
    },
}

fn build_source(cli: &Cli, settings: &PipelineSettings) -> Result<Arc<dyn CandleSource>> {
    Ok(match &cli.csv_dir {
        Some(dir) => Arc::new(CsvCandleSource::new(dir.clone())),
        None => Arc::new(CryptoCompareSource::new(settings.source.clone(), settings.api_key.clone())?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = PipelineSettings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(symbol) = &cli.symbol {
        settings.symbol = symbol.to_uppercase();
    }
    info!(symbol = %settings.symbol, fill_mode = settings.fill_mode.as_str(), "Starting forecast engine");

    let source = build_source(&cli, &settings)?;
    match cli.command {
        Command::Run { intervals, export } => {
            let intervals: BTreeSet<Interval> = if intervals.is_empty() {
                settings.intervals.iter().copied().collect()
            } else {
                intervals.into_iter().collect()
            };
            let orchestrator = Orchestrator::new(source, settings.fill_mode, settings.candle_limit);
            let results = orchestrator.run(&settings.symbol, &intervals).await;

            for (interval, result) in &results {
                match (&result.error, result.current_price) {
                    (None, Some(price)) => {
                        println!("{} {:>4}  price {:>14.4}  rows {}", settings.symbol, interval, price, result.features.len())
                    }
                    (Some(error), _) => println!("{} {:>4}  failed: {}", settings.symbol, interval, error),
                    (None, None) => println!("{} {:>4}  no data", settings.symbol, interval),
                }
            }
            if let Some(dir) = export {
                let written = write_workbook(&dir, &settings.symbol, &results)?;
                info!("Wrote {} sheet(s) to {}", written.len(), dir.display());
            }
        }
        Command::Watch { interval, period_secs } => {
            let period = Duration::from_secs(period_secs.unwrap_or(settings.refresh_period_secs).max(1));
            let orchestrator = Arc::new(Orchestrator::new(source, settings.fill_mode, settings.candle_limit));
            let publisher = Arc::new(WatchPublisher::new(settings.overlay_fields.clone()));
            let scheduler = RefreshScheduler::new(
                orchestrator,
                publisher.clone(),
                Arc::new(TokioTimer),
                TrainingGate::new(),
                settings.max_backoff(),
            );

            let cancel = CancellationToken::new();
            let handle = scheduler.start_with_cancel(&settings.symbol, interval, period, cancel.clone())?;

            let symbol = settings.symbol.clone();
            let mut updates = publisher.updates();
            let printer = tokio::spawn(async move {
                while let Some(update) = updates.next().await {
                    match update {
                        Some(Ok(update)) => println!(
                            "{} {:>4}  price {:>14.4}  rows {}",
                            symbol,
                            update.interval,
                            update.current_price,
                            update.features.len()
                        ),
                        Some(Err(error)) => println!("{} {:>4}  failed: {}", symbol, interval, error),
                        None => {}
                    }
                }
            });

            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down refresh loop");
            cancel.cancel();
            let state = handle.join().await?;
            printer.abort();
            info!("Refresh loop finished after {} cycle(s) with status {:?}", state.cycle, state.status);
        }
        Command::Forecast { interval, epochs } => {
            let mut model = settings.model.clone();
            if let Some(epochs) = epochs {
                model.epochs = epochs;
            }
            // Windows are always built from the forward-filled series.
            let orchestrator = Orchestrator::new(source, FillMode::FillNa, settings.candle_limit);
            let result = orchestrator.run_interval(&settings.symbol, interval).await;
            if let Some(error) = result.error {
                anyhow::bail!("Pipeline failed for {} {}: {}", settings.symbol, interval, error);
            }

            let forecaster = Forecaster::new(model, TrainingGate::new());
            let report = forecaster.forecast_next(result.features).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
