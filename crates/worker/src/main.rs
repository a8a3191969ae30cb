use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use oppscan_core::config::{ScanOptions, Settings};
use oppscan_core::domain::contract::ListQuery;
use oppscan_core::ingest::{DataSource, HttpJsonDataSource, InMemoryDataSource};
use oppscan_core::pipeline::{ScanPhase, Screener, StartOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;

#[derive(Debug, Parser)]
#[command(name = "oppscan_worker")]
struct Cli {
    /// Serve market data from a JSON fixture instead of the HTTP provider.
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Last session of price history to fetch (YYYY-MM-DD). Defaults to the
    /// latest completed NSE session at the time of each request.
    #[arg(long, global = true)]
    as_of_date: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one full scan and print the ranked opportunities.
    Scan(ScanCmd),

    /// Score a single ticker from fresh data.
    Analyze {
        symbol: String,

        #[arg(long)]
        json: bool,
    },

    /// Rescan on a fixed interval until interrupted.
    Watch {
        #[arg(long, default_value_t = 900)]
        interval_secs: u64,

        #[arg(long)]
        max_tickers: Option<usize>,

        /// Rows printed after each scan.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Debug, Args)]
struct ScanCmd {
    #[arg(long)]
    max_tickers: Option<usize>,

    /// STRONG_BUY, BUY, HOLD, SELL, STRONG_SELL or all.
    #[arg(long)]
    signal: Option<String>,

    #[arg(long)]
    min_score: Option<f64>,

    /// Case-insensitive substring of the sector label.
    #[arg(long)]
    sector: Option<String>,

    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();

    match run(cli, &settings).await {
        Ok(()) => Ok(()),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "worker run failed");
            Err(err)
        }
    }
}

async fn run(cli: Cli, settings: &Settings) -> anyhow::Result<()> {
    let as_of_date = cli
        .as_of_date
        .as_deref()
        .map(|s| oppscan_core::time::market::resolve_as_of_date(Some(s), chrono::Utc::now()))
        .transpose()?;

    let opts = ScanOptions::from_env()?;
    let source = build_source(cli.fixture.as_deref(), as_of_date, settings)?;
    tracing::info!(
        as_of_date = ?as_of_date,
        provider = source.provider_name(),
        "worker starting"
    );

    let screener = Screener::new(source, opts);

    match cli.command {
        Command::Scan(cmd) => scan_once(&screener, cmd).await,
        Command::Analyze { symbol, json } => {
            let score = screener
                .analyze_one(&symbol)
                .await
                .with_context(|| format!("analyze {symbol} failed"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&score)?);
            } else {
                report::print_detail(&score);
            }
            Ok(())
        }
        Command::Watch {
            interval_secs,
            max_tickers,
            top,
        } => watch(&screener, Duration::from_secs(interval_secs.max(1)), max_tickers, top).await,
    }
}

fn build_source(
    fixture: Option<&std::path::Path>,
    as_of_date: Option<chrono::NaiveDate>,
    settings: &Settings,
) -> anyhow::Result<Arc<dyn DataSource>> {
    match fixture {
        Some(path) => {
            if let Some(date) = as_of_date {
                tracing::warn!(%date, "fixture data is served as recorded; --as-of-date ignored");
            }
            Ok(Arc::new(InMemoryDataSource::from_json_file(path)?))
        }
        None => {
            let mut source = HttpJsonDataSource::from_settings(settings)?;
            if let Some(date) = as_of_date {
                source = source.with_as_of_date(date);
            }
            Ok(Arc::new(source))
        }
    }
}

async fn scan_once(screener: &Arc<Screener>, cmd: ScanCmd) -> anyhow::Result<()> {
    // Validate the filter before spending a scan on it.
    let query = ListQuery {
        signal: cmd.signal,
        min_score: cmd.min_score,
        sector: cmd.sector,
        limit: cmd.limit,
    };
    query.clone().validate_and_into_filter()?;

    run_to_completion(screener, cmd.max_tickers).await?;

    let rows = screener.list_opportunities(query)?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        report::print_table(&rows);
        report::print_summary(&screener.status(), &screener.signal_distribution());
    }
    Ok(())
}

/// Starts a forced scan and waits for it; fails when the scan failed.
async fn run_to_completion(screener: &Arc<Screener>, max_tickers: Option<usize>) -> anyhow::Result<()> {
    match screener.start_scan(max_tickers, true)? {
        StartOutcome::Started { scan_id } => tracing::info!(%scan_id, "waiting for scan"),
        other => tracing::info!(outcome = ?other, "scan not started"),
    }

    let mut tick = tokio::time::interval(Duration::from_millis(250));
    loop {
        tick.tick().await;
        let status = screener.status();
        if status.in_progress {
            continue;
        }
        if status.state == ScanPhase::Failed {
            anyhow::bail!(
                "scan failed: {}",
                status.last_error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        return Ok(());
    }
}

async fn watch(
    screener: &Arc<Screener>,
    interval: Duration,
    max_tickers: Option<usize>,
    top: usize,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_to_completion(screener, max_tickers).await {
                    Ok(()) => {
                        report::print_table(&screener.top(top));
                        report::print_summary(&screener.status(), &screener.signal_distribution());
                    }
                    // Keep serving the previous ranking; the next tick retries.
                    Err(err) => {
                        sentry_anyhow::capture_anyhow(&err);
                        tracing::warn!(error = %format!("{err:#}"), "scan round failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; stopping watch");
                return Ok(());
            }
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
