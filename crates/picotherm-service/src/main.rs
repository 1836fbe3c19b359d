//! picotherm - rollups, backfill, range export, and the HTTP API.
//!
//! Run with: `cargo run -p picotherm-service -- serve`

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::Router;
use clap::{Args as ClapArgs, Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use picotherm_service::{AppState, Config, Scheduler, TriggerRequest, api, backfill};
use picotherm_store::{ExportFormat, export};
use picotherm_types::Granularity;

/// picotherm - tiered sensor history: rollups and range queries.
#[derive(Parser, Debug)]
#[command(name = "picotherm")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Hot store database path (overrides config).
    #[arg(long, global = true)]
    hot_path: Option<PathBuf>,

    /// Cold store root directory (overrides config).
    #[arg(long, global = true)]
    cold_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API and run the daily rollup schedule.
    Serve {
        /// Bind address (overrides config).
        #[arg(short, long)]
        bind: Option<String>,

        /// Do not run the rollup schedule (API only mode).
        #[arg(long)]
        no_schedule: bool,
    },

    /// Roll up one period for every device.
    Rollup {
        /// day, month, or year.
        #[arg(short, long)]
        granularity: Granularity,

        /// Any date in the period (YYYY-MM-DD); defaults to the last closed one.
        #[arg(short, long, value_parser = parse_date)]
        date: Option<Date>,
    },

    /// Roll up every period between two dates, oldest first.
    Backfill {
        /// day, month, or year.
        #[arg(short, long)]
        granularity: Granularity,

        /// First date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        from: Date,

        /// Last date (YYYY-MM-DD), inclusive.
        #[arg(long, value_parser = parse_date)]
        to: Date,
    },

    /// Export the measurements of one device in [start, end).
    Query(QueryArgs),

    /// List devices.
    Devices,
}

#[derive(ClapArgs, Debug)]
struct QueryArgs {
    /// Device id.
    #[arg(short, long, conflicts_with = "location", required_unless_present = "location")]
    device: Option<String>,

    /// Device location from the registry.
    #[arg(short, long)]
    location: Option<String>,

    /// Inclusive start (RFC 3339).
    #[arg(long, value_parser = parse_time)]
    start: OffsetDateTime,

    /// Exclusive end (RFC 3339).
    #[arg(long, value_parser = parse_time)]
    end: OffsetDateTime,

    /// json or csv.
    #[arg(short, long, default_value = "json")]
    format: ExportFormat,

    /// Write to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn parse_time(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("expected RFC 3339: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so query output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("picotherm=info".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(path) = args.hot_path {
        config.storage.hot_path = path;
    }
    if let Some(path) = args.cold_path {
        config.storage.cold_path = path;
    }

    match args.command {
        Command::Serve { bind, no_schedule } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            serve(config, no_schedule).await
        }
        Command::Rollup { granularity, date } => {
            config.validate()?;
            let state = AppState::open(config).await?;
            let devices = state.device_ids().await?;
            let summary = state
                .trigger()
                .run_request(
                    &devices,
                    TriggerRequest::new(granularity, date),
                    state.clock.today(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.failed() > 0 {
                bail!("{} of {} devices failed", summary.failed(), summary.devices.len());
            }
            Ok(())
        }
        Command::Backfill {
            granularity,
            from,
            to,
        } => {
            config.validate()?;
            let state = AppState::open(config).await?;
            let devices = state.device_ids().await?;
            let summaries = backfill(&state.trigger(), &devices, granularity, from, to).await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            let failed: usize = summaries.iter().map(|s| s.failed()).sum();
            if failed > 0 {
                bail!("{} device rollups failed", failed);
            }
            Ok(())
        }
        Command::Query(query) => {
            config.validate()?;
            run_query(config, query).await
        }
        Command::Devices => {
            let state = AppState::open(config).await?;
            for device in state.devices().await? {
                match device.location {
                    Some(location) => println!("{}\t{}", device.id, location),
                    None => println!("{}", device.id),
                }
            }
            Ok(())
        }
    }
}

async fn run_query(config: Config, query: QueryArgs) -> anyhow::Result<()> {
    let state = AppState::open(config).await?;
    let device = match (query.device, query.location) {
        (Some(device), _) => device,
        (None, Some(location)) => state
            .registry
            .by_location(&location)
            .map(|d| d.id.clone())
            .with_context(|| format!("no device at location '{}'", location))?,
        (None, None) => bail!("either --device or --location is required"),
    };

    let series = state
        .query
        .get_range_between(&device, query.start, query.end)
        .await?;
    info!("{} points for {}", series.len(), device);

    match query.output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            export::write_series(&series, query.format, file)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            export::write_series(&series, query.format, &mut lock)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

async fn serve(config: Config, no_schedule: bool) -> anyhow::Result<()> {
    let listener = config
        .server
        .listen()
        .await
        .with_context(|| format!("cannot bind {}", config.server.bind))?;
    let schedule = config.rollup.schedule && !no_schedule;
    let state = AppState::open(config).await?;

    if schedule {
        Scheduler::new(Arc::clone(&state)).start();
    } else {
        info!("Rollup schedule disabled");
    }

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    info!("Starting server on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
