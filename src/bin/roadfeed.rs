//! Roadfeed CLI
//!
//! Usage:
//!   roadfeed run [--config path] [--db path] [--source NAME]... [--raise-on-error] [--verbose]
//!   roadfeed sources [--config path]
//!   roadfeed active <TYPE> [--db path]

use chrono::Utc;
use clap::{Parser, Subcommand};
use roadfeed::{
    ActiveReportQuery, AdapterRegistry, HttpFetcher, OpenStore, Pipeline, PipelineConfig,
    PipelineContext, RunSummary, SqliteReportStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "roadfeed",
    version,
    about = "Open-data road incident ingestion"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log pipeline decisions (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every enabled source and commit new reports
    Run {
        /// Pipeline configuration (YAML); the built-in source list by default
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
        /// Only process the named source (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Skip a whole source on its first invalid record
        #[arg(long)]
        raise_on_error: bool,
    },
    /// List configured sources
    Sources {
        /// Pipeline configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List active reports of one type
    Active {
        /// Report type, e.g. interrupt
        report_type: String,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
        /// Pipeline configuration (YAML), for the downvote threshold
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Get the default database path (~/.local/share/roadfeed/reports.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let roadfeed_dir = data_dir.join("roadfeed");
    std::fs::create_dir_all(&roadfeed_dir).ok();
    roadfeed_dir.join("reports.db")
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig, String> {
    match path {
        Some(path) => PipelineConfig::load(&path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => PipelineConfig::builtin().map_err(|e| format!("Built-in config is invalid: {}", e)),
    }
}

fn open_store(db: Option<PathBuf>, config: &PipelineConfig) -> Result<SqliteReportStore, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    SqliteReportStore::open(&db_path)
        .map(|store| store.with_downvotes_threshold(config.downvote_threshold))
        .map_err(|e| format!("Failed to open database: {}", e))
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{:<22}  {:>8}  {:>9}  {:>8}  {:>6}  {}",
        "SOURCE", "ACCEPTED", "DUPLICATE", "INACTIVE", "ERRORS", "STATUS"
    );
    println!("{}", "-".repeat(72));
    for source in &summary.sources {
        let status = match &source.failure {
            Some((kind, message)) => format!("{}: {}", kind, message),
            None => "ok".to_string(),
        };
        println!(
            "{:<22}  {:>8}  {:>9}  {:>8}  {:>6}  {}",
            source.source,
            source.accepted(),
            source.rejected_duplicate(),
            source.rejected_temporal(),
            source.errors(),
            status
        );
    }
    println!("{}", "-".repeat(72));
    println!(
        "{:<22}  {:>8}  {:>9}  {:>8}  {:>6}",
        "total",
        summary.accepted(),
        summary.rejected_duplicate(),
        summary.rejected_temporal(),
        summary.errors()
    );
}

fn cmd_run(
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    sources: Vec<String>,
    raise_on_error: bool,
) -> i32 {
    let mut config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if !sources.is_empty() {
        if let Err(e) = config.restrict_to(&sources) {
            eprintln!("Error: {}", e);
            return 1;
        }
    }
    config.raise_on_error |= raise_on_error;

    let store = match open_store(db, &config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let fetcher = match HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs)) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let context = PipelineContext::with_store(fetcher, store);
    let pipeline = match Pipeline::new(config, AdapterRegistry::builtin(), context) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };
    let summary = rt.block_on(pipeline.run());
    print_summary(&summary);
    0
}

fn cmd_sources(config: Option<PathBuf>) -> i32 {
    let config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if config.sources.is_empty() {
        println!("No sources configured.");
        return 0;
    }
    println!(
        "{:<22}  {:<18}  {:<8}  {:<10}  {}",
        "NAME", "ADAPTER", "KIND", "TYPE", "ENABLED"
    );
    println!("{}", "-".repeat(72));
    for source in &config.sources {
        println!(
            "{:<22}  {:<18}  {:<8}  {:<10}  {}",
            source.name,
            source.adapter,
            source.kind.as_str(),
            source.report_type,
            if source.enabled { "yes" } else { "no" }
        );
    }
    0
}

fn cmd_active(report_type: &str, db: Option<PathBuf>, config: Option<PathBuf>) -> i32 {
    let config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let store = match open_store(db, &config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let reports = match store.query_active(report_type, Utc::now()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if reports.is_empty() {
        println!("No active '{}' reports.", report_type);
        return 0;
    }
    println!("{:>10}  {:>11}  {:>9}  {}", "LAT", "LNG", "DOWNVOTES", "EXPIRES");
    println!("{}", "-".repeat(60));
    for report in reports {
        let expires = report
            .expiration_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:>10.6}  {:>11.6}  {:>9}  {}",
            report.lat, report.lng, report.downvotes, expires
        );
    }
    0
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Run {
            config,
            db,
            sources,
            raise_on_error,
        } => cmd_run(config, db, sources, raise_on_error),
        Commands::Sources { config } => cmd_sources(config),
        Commands::Active {
            report_type,
            db,
            config,
        } => cmd_active(&report_type, db, config),
    };
    std::process::exit(code);
}
