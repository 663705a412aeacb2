//! honeyscope: honeypot event console
//!
//! Polls a honeypot backend for captured interactions and lets an operator
//! explore them from the terminal: discovered fields, filtered events,
//! attacker map and protocol breakdown.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use honeyscope::config::AppConfig;
use honeyscope::console::render::{
    render_distribution, render_event_detail, render_events, render_fields, render_markers,
    render_summary, svg_map, svg_pie,
};
use honeyscope::console::Console;
use honeyscope::export::EventExporter;
use honeyscope::filter::{ConstraintArg, Constraints};
use honeyscope::geo::Surface;
use honeyscope::sync::{Backend, HttpBackend, Synchronizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Builder;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "honeyscope")]
#[command(about = "Operator console for honeypot event exploration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Override logging level (e.g., error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    /// Override the backend base URL
    #[arg(long, global = true, value_name = "URL")]
    backend: Option<String>,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// Constrain a field path to values containing a pattern (repeatable)
    #[arg(long = "filter", short = 'f', value_name = "PATH=PATTERN")]
    filters: Vec<ConstraintArg>,
}

impl FilterArgs {
    fn constraints(&self) -> Constraints {
        self.filters.iter().cloned().collect()
    }
}

#[derive(Args, Clone, Default)]
struct SurfaceArgs {
    /// Map surface width
    #[arg(long)]
    width: Option<f64>,
    /// Map surface height
    #[arg(long)]
    height: Option<f64>,
}

impl SurfaceArgs {
    fn surface(&self, cfg: &AppConfig) -> Surface {
        Surface::new(
            self.width.unwrap_or(cfg.view.surface_width),
            self.height.unwrap_or(cfg.view.surface_height),
        )
    }
}

#[derive(Args, Clone, Default)]
struct WatchArgs {
    #[command(flatten)]
    filters: FilterArgs,
    #[command(flatten)]
    surface: SurfaceArgs,
    /// Maximum events printed per update
    #[arg(long)]
    limit: Option<usize>,
    /// Append the filtered events of every update to the NDJSON export
    #[arg(long)]
    export: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the backend and print a summary after every update (default)
    Watch(WatchArgs),
    /// List discovered field paths with the protocols that emit them
    Fields,
    /// List events passing the filters
    Events {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        limit: Option<usize>,
        /// Print full events as pretty JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate located events into map markers
    Map {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        surface: SurfaceArgs,
        /// Also write the map as SVG
        #[arg(long, value_name = "FILE")]
        svg: Option<PathBuf>,
    },
    /// Protocol breakdown of all captured attacks
    Distribution {
        /// Also write a pie chart as SVG
        #[arg(long, value_name = "FILE")]
        svg: Option<PathBuf>,
        /// Pie chart size in pixels
        #[arg(long, default_value_t = 240.0)]
        size: f64,
    },
    /// Print the raw log text of one decoy service
    RawLogs {
        #[arg(long)]
        protocol: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load Configuration
    let mut cfg = match AppConfig::new() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            eprintln!("Hint: check honeyscope.toml and HONEYSCOPE__* environment overrides.");
            return Err(anyhow::anyhow!("Failed to load configuration: {}", err));
        }
    };
    if let Some(level) = cli.log_level {
        if !level.trim().is_empty() {
            cfg.logging.level = level;
        }
    }
    if let Some(url) = cli.backend {
        cfg.backend.base_url = url;
    }

    // 2. Initialize Logging (guard must outlive the runtime)
    let _app_guard = init_logging(&cfg);

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Watch(WatchArgs::default()));

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(command, cfg))
}

/// Initialize operational logging: daily file plus optional stderr console.
/// Returns the WorkerGuard that MUST be kept alive for the program duration.
fn init_logging(cfg: &AppConfig) -> WorkerGuard {
    if let Err(err) = std::fs::create_dir_all(&cfg.logging.directory)
        .with_context(|| format!("Failed to create log directory {:?}", cfg.logging.directory))
    {
        eprintln!("{}", err);
    }

    let app_file = rolling::daily(&cfg.logging.directory, &cfg.logging.filename);
    let (app_writer, app_guard) = tracing_appender::non_blocking(app_file);

    let app_layer = fmt::layer()
        .with_writer(app_writer)
        .compact()
        .with_ansi(false)
        .with_target(true)
        .with_filter(EnvFilter::new(&cfg.logging.level));

    // Console output goes to stderr so command output stays clean on stdout.
    let console_layer = if cfg.logging.console_output {
        Some(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(EnvFilter::new(&cfg.logging.level)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(app_layer)
        .with(console_layer)
        .init();

    app_guard
}

/// Open the NDJSON export writer.
fn init_export(cfg: &AppConfig) -> Result<(EventExporter, WorkerGuard)> {
    std::fs::create_dir_all(&cfg.export.directory).with_context(|| {
        format!(
            "Failed to create export directory {:?}",
            cfg.export.directory
        )
    })?;
    let file = rolling::daily(&cfg.export.directory, &cfg.export.filename);
    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok((EventExporter::new(writer), guard))
}

async fn run(command: Commands, cfg: AppConfig) -> Result<()> {
    match command {
        Commands::Watch(args) => run_watch(&cfg, args).await,
        Commands::Fields => {
            let console = fetch_console(&cfg, Surface::default(), Constraints::new()).await?;
            print!("{}", render_fields(console.schema()));
            Ok(())
        }
        Commands::Events {
            filters,
            limit,
            json,
        } => {
            let console = fetch_console(&cfg, Surface::default(), filters.constraints()).await?;
            let limit = limit.unwrap_or(cfg.view.event_limit);
            if json {
                for event in console.visible_events().take(limit) {
                    println!("{}", render_event_detail(event));
                }
            } else {
                print!(
                    "{}",
                    render_events(console.visible_events(), console.visible_count(), limit)
                );
            }
            Ok(())
        }
        Commands::Map {
            filters,
            surface,
            svg,
        } => {
            let console =
                fetch_console(&cfg, surface.surface(&cfg), filters.constraints()).await?;
            print!("{}", render_markers(console.markers(), console.surface()));
            if let Some(path) = svg {
                write_file(&path, &svg_map(console.markers(), console.surface()))?;
            }
            Ok(())
        }
        Commands::Distribution { svg, size } => {
            let console = fetch_console(&cfg, Surface::default(), Constraints::new()).await?;
            print!("{}", render_distribution(console.distribution()));
            if let Some(path) = svg {
                write_file(&path, &svg_pie(console.distribution(), size))?;
            }
            Ok(())
        }
        Commands::RawLogs { protocol } => {
            let backend = HttpBackend::new(&cfg.backend)?;
            let text = backend
                .fetch_raw_logs(&protocol)
                .await
                .with_context(|| format!("Failed to fetch raw logs for {}", protocol))?;
            print!("{}", text);
            Ok(())
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    info!(path = ?path, "Wrote SVG");
    Ok(())
}

/// Fetch one dataset and build a console over it.
async fn fetch_console(
    cfg: &AppConfig,
    surface: Surface,
    constraints: Constraints,
) -> Result<Console> {
    let backend = Arc::new(HttpBackend::new(&cfg.backend)?);
    let synchronizer = Synchronizer::new(backend, &cfg.sync);
    let dataset = synchronizer
        .fetch_dataset()
        .await
        .with_context(|| format!("Failed to fetch data from {}", cfg.backend.base_url))?;

    let mut console = Console::new(surface);
    console.set_constraints(constraints);
    console.replace_dataset(dataset, Utc::now());
    Ok(console)
}

async fn run_watch(cfg: &AppConfig, args: WatchArgs) -> Result<()> {
    let export = if args.export || cfg.export.enabled {
        Some(init_export(cfg)?)
    } else {
        None
    };
    let limit = args.limit.unwrap_or(cfg.view.event_limit);

    let backend = Arc::new(HttpBackend::new(&cfg.backend)?);
    info!(
        target: "honeyscope",
        version = env!("CARGO_PKG_VERSION"),
        backend = %backend.base_url(),
        interval_secs = cfg.sync.interval().as_secs(),
        export = export.is_some(),
        "Console started"
    );

    let synchronizer = Synchronizer::new(backend, &cfg.sync);
    let (handle, mut updates, sync_task) = synchronizer.spawn(cfg.sync.channel_capacity);

    let mut console = Console::new(args.surface.surface(cfg));
    console.set_constraints(args.filters.constraints());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("Received Ctrl+C signal"),
                    Err(err) => error!("Failed to listen for Ctrl+C: {}", err),
                }
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    warn!("Synchronizer stopped unexpectedly");
                    break;
                };
                let synced_at = update.fetched_at;
                if !console.apply_update(update, &handle) {
                    continue;
                }
                print!("{}", render_summary(&console, limit));
                if let Some((exporter, _)) = &export {
                    let written = exporter.write_events(console.visible_events(), synced_at);
                    info!(target: "export", written, "Exported filtered events");
                }
            }
        }
    }

    handle.cancel();
    match sync_task.await {
        Ok(()) => info!("Synchronizer finished"),
        Err(e) => error!("Failed to join synchronizer task: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}
