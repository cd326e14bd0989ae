use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use weather_consensus::{
    build_dataset, ingest_upstream, load_sources, report, DateRange, FetchSettings, Pipeline,
    ReadingStore, SqliteReadingStore, UpstreamReading, HOME_ASSISTANT_SOURCE, VERSION,
};

#[derive(Parser)]
#[command(author, version, about = "Compare daily high/low temperatures across weather providers")]
struct Cli {
    /// SQLite database holding the readings
    #[arg(long, env = "WEATHER_DB", default_value = "weather.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every configured source and store today's readings
    Capture {
        /// CSV with header `source,url`
        #[arg(long, env = "WEATHER_SOURCES", default_value = "weather_sources.csv")]
        sources: PathBuf,

        /// Date to file the readings under (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout: u64,
    },

    /// Store the home-automation dashboard's high/low
    Record {
        #[arg(long, allow_negative_numbers = true, value_parser = parse_temperature)]
        high: Option<f64>,

        #[arg(long, allow_negative_numbers = true, value_parser = parse_temperature)]
        low: Option<f64>,

        /// Day the values belong to (default: yesterday)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Consolidate stored readings into aggregates and error bands
    Report {
        /// First day (default: earliest stored)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (default: latest stored)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Source the error bands are measured against
        #[arg(long, env = "WEATHER_REFERENCE", default_value = HOME_ASSISTANT_SOURCE)]
        reference: String,

        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,

        /// JSON: output file (default: stdout). CSV: output directory (default: report)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List stored readings (latest per day and source)
    Show {
        /// Only this source
        #[arg(long)]
        source: Option<String>,

        /// Also list recent capture failures for the source
        #[arg(long, requires = "source")]
        failures: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Csv,
    Json,
}

/// Temperatures must be finite; absence is expressed by omitting the flag
fn parse_temperature(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("not a number: {}", e))?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(format!("{} is not a finite temperature", value))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_consensus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!(version = VERSION, db = %cli.db.display(), "weather-consensus starting");

    let mut store = SqliteReadingStore::open(&cli.db)?;

    match cli.command {
        Commands::Capture {
            sources,
            date,
            timeout,
        } => run_capture(&mut store, sources, date, timeout),
        Commands::Record { high, low, date } => run_record(&mut store, high, low, date),
        Commands::Report {
            from,
            to,
            reference,
            format,
            out,
        } => run_report(&store, from, to, &reference, format, out),
        Commands::Show { source, failures } => run_show(&store, source, failures),
    }
}

fn run_capture(
    store: &mut SqliteReadingStore,
    sources: PathBuf,
    date: Option<NaiveDate>,
    timeout: u64,
) -> Result<()> {
    println!("🌡️  Capture - sources → extractors → store");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let catalog = load_sources(&sources)?;
    for skipped in &catalog.skipped {
        println!(
            "⚠️  Line {}: skipped '{}' ({})",
            skipped.line, skipped.source, skipped.reason
        );
    }
    if catalog.is_empty() {
        bail!("No usable sources in {}", sources.display());
    }

    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let pipeline = Pipeline::new(
        catalog.descriptors,
        FetchSettings::with_timeout(Duration::from_secs(timeout)),
    );

    println!("\n📡 Fetching {} sources for {}...", pipeline.descriptors().len(), date);
    let run = pipeline.capture(store, date)?;

    let logged = store
        .insert_run_events(&run.events())
        .context("Failed to write run log")?;
    info!(run_id = %run.run_id, events = logged, "run log written");

    for reading in run.stored() {
        println!("✓ {}", reading.display_line());
    }
    for failure in run.failures() {
        println!(
            "❌ {}: {}",
            failure.source,
            failure.message.as_deref().unwrap_or(failure.status.as_str())
        );
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", run.summary());

    if run.stored().is_empty() {
        bail!("No source could be captured");
    }
    Ok(())
}

fn run_record(
    store: &mut SqliteReadingStore,
    high: Option<f64>,
    low: Option<f64>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let upstream = match date {
        Some(date) => UpstreamReading { date, high, low },
        None => UpstreamReading::for_yesterday(Local::now().date_naive(), high, low)
            .context("No day before today to file the reading under")?,
    };

    let reading = ingest_upstream(store, &upstream).context("Failed to store reading")?;
    println!("✓ {}", reading.display_line());
    Ok(())
}

fn run_report(
    store: &SqliteReadingStore,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    reference: &str,
    format: ReportFormat,
    out: Option<PathBuf>,
) -> Result<()> {
    let covering = DateRange::covering(&store.materialize()?);
    let start = from
        .or(covering.map(|r| r.start()))
        .context("No readings stored; pass --from")?;
    let end = to
        .or(covering.map(|r| r.end()))
        .context("No readings stored; pass --to")?;
    let range = DateRange::new(start, end)?;

    let dataset = build_dataset(store, &range, reference)?;

    match (format, out) {
        (ReportFormat::Json, None) => report::write_json(&dataset, io::stdout().lock())?,
        (ReportFormat::Json, Some(path)) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            report::write_json(&dataset, file)?;
            println!("✓ Wrote {}", path.display());
        }
        (ReportFormat::Csv, out) => {
            let dir = out.unwrap_or_else(|| PathBuf::from("report"));
            for path in report::write_csv_bundle(&dataset, &dir)? {
                println!("✓ Wrote {}", path.display());
            }
            println!(
                "📊 {} → {}: {} readings from {} sources, {} complete days",
                range.start(),
                range.end(),
                dataset.readings.len(),
                dataset.sources.len(),
                dataset.complete_dates.len()
            );
        }
    }

    Ok(())
}

fn run_show(store: &SqliteReadingStore, source: Option<String>, failures: bool) -> Result<()> {
    let readings = store.materialize()?;
    let shown: Vec<_> = readings
        .iter()
        .filter(|r| source.as_deref().map_or(true, |s| r.source == s))
        .collect();

    println!("📋 {} readings ({} raw appends)", shown.len(), store.count_raw()?);
    for reading in shown {
        println!("  {}", reading.display_line());
    }

    if let (true, Some(source)) = (failures, source.as_deref()) {
        let events = store.recent_failures(source, 10)?;
        println!("\n❌ {} recent failures for {}", events.len(), source);
        for event in events {
            println!(
                "  {} {} {}: {}",
                event.timestamp.format("%Y-%m-%d %H:%M"),
                event.date,
                event.status,
                event.message.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}
