//! Capture Inspection Harness
//!
//! Runs the exploration pipeline over captured backend payloads on disk
//! (a `/logs` dump and optionally a `/stats` dump) and prints a report:
//! discovered schema, filter results, markers and protocol breakdown.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use honeyscope::console::render::{render_distribution, render_events, render_markers};
use honeyscope::console::Console;
use honeyscope::filter::{ConstraintArg, Constraints};
use honeyscope::geo::Surface;
use honeyscope::models::Dataset;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "inspect_capture")]
#[command(about = "Run the event pipeline over captured JSON payloads", long_about = None)]
struct Cli {
    /// JSON dump of GET /api/logs
    events: PathBuf,
    /// JSON dump of GET /api/stats
    stats: Option<PathBuf>,
    /// Constrain a field path to values containing a pattern (repeatable)
    #[arg(long = "filter", short = 'f', value_name = "PATH=PATTERN")]
    filters: Vec<ConstraintArg>,
    #[arg(long, default_value_t = 800.0)]
    width: f64,
    #[arg(long, default_value_t = 400.0)]
    height: f64,
    /// Events listed in the filter phase
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    println!("╔═══════════════════════════════════════════════════╗");
    println!("║     honeyscope Capture Inspection                 ║");
    println!("╚═══════════════════════════════════════════════════╝");
    println!();

    let logs = read_json(&cli.events)?;
    let stats = match &cli.stats {
        Some(path) => read_json(path)?,
        None => Value::Null,
    };
    if !logs.is_array() {
        println!("⚠️  {:?} is not a JSON array; treating as empty", cli.events);
    }
    let dataset = Dataset::from_payloads(logs, stats).context("Malformed statistics payload")?;

    let start = Instant::now();
    let mut console = Console::new(Surface::new(cli.width, cli.height));
    console.replace_dataset(dataset, Utc::now());
    let constraints: Constraints = cli.filters.iter().cloned().collect();
    console.set_constraints(constraints);
    let elapsed = start.elapsed();

    // Phase 1: Schema
    println!("═══════════════════════════════════════════════════");
    println!("Phase 1: Schema Discovery");
    println!("═══════════════════════════════════════════════════");
    report_schema(&console);
    println!();

    // Phase 2: Filters
    println!("═══════════════════════════════════════════════════");
    println!("Phase 2: Filter Evaluation");
    println!("═══════════════════════════════════════════════════");
    report_filters(&console, cli.limit);
    println!();

    // Phase 3: Map
    println!("═══════════════════════════════════════════════════");
    println!("Phase 3: Geospatial Aggregation");
    println!("═══════════════════════════════════════════════════");
    let located = console
        .visible_events()
        .filter(|e| e.ip().is_some() && e.coordinates().is_some())
        .count();
    println!(
        "Located events: {} of {} visible",
        located,
        console.visible_count()
    );
    print!("{}", render_markers(console.markers(), console.surface()));
    println!();

    // Phase 4: Distribution
    println!("═══════════════════════════════════════════════════");
    println!("Phase 4: Protocol Distribution");
    println!("═══════════════════════════════════════════════════");
    print!("{}", render_distribution(console.distribution()));
    println!();

    println!("Pipeline completed in {:.2?}", elapsed);
    Ok(())
}

fn report_schema(console: &Console) {
    let schema = console.schema();
    println!(
        "Scanned {} events, discovered {} field paths",
        console.events().len(),
        schema.len()
    );
    println!();

    let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
    for categories in schema.provenance.values() {
        for category in categories {
            *by_category.entry(category.as_str()).or_default() += 1;
        }
    }
    if !by_category.is_empty() {
        println!("Fields emitted per category:");
        let mut rows: Vec<_> = by_category.into_iter().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        for (category, count) in rows {
            println!("  {:15} {:>5} fields", category, count);
        }
        println!();
    }

    // Fields only one category emits are the ones worth filtering on first.
    let exclusive: Vec<&String> = schema
        .fields
        .iter()
        .filter(|f| schema.categories(f).map(|c| c.len() == 1).unwrap_or(false))
        .collect();
    println!("Category-specific fields: {}", exclusive.len());
    for field in exclusive.iter().take(15) {
        println!("  {:40} [{}]", field, schema.provenance_label(field));
    }
    if exclusive.len() > 15 {
        println!("  ... and {} more", exclusive.len() - 15);
    }
}

fn report_filters(console: &Console, limit: usize) {
    if console.constraints().is_empty() {
        println!("No filters given; all {} events pass", console.visible_count());
        return;
    }
    for (field, pattern) in console.constraints().iter() {
        let known = if console.schema().contains(field) {
            "✓"
        } else {
            "✗ unknown field"
        };
        println!("  {} ~ {:?}  {}", field, pattern, known);
    }
    println!();
    println!(
        "Passing: {} of {} events",
        console.visible_count(),
        console.events().len()
    );
    print!(
        "{}",
        render_events(console.visible_events(), console.visible_count(), limit)
    );
}
