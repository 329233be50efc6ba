//! raglite — SQLite-powered local RAG.
//!
//! Exit status 0 on success, 1 on any surfaced error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use raglite_core::config::{RagliteConfig, DATA_DIR_ENV};
use raglite_core::traits::{Cancellable, CancellationToken};
use raglite_core::types::RunStatus;
use raglite_engine::{loader, RunConfig};
use raglite_orchestrator::{
    gc_orphan_runs, ExportFormat, Merger, Orchestrator, SearchOptions,
};
use raglite_storage::queries::run_meta;
use raglite_storage::{Database, DbKind};

#[derive(Parser)]
#[command(name = "raglite", version, about = "Local RAG over SQLite")]
struct Cli {
    /// Data directory (default ~/.raglite).
    #[arg(short = 'd', long = "data", env = DATA_DIR_ENV, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the data directory, databases and builtin workflows.
    Init,
    /// Import files or directories into the corpus.
    Ingest { paths: Vec<PathBuf> },
    /// Process pending files and merge the results.
    Process,
    /// Search the corpus.
    Search {
        query: Vec<String>,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        #[arg(long)]
        min_score: Option<f64>,
        /// Override blend weights as structure,lexical,contextual.
        #[arg(long)]
        weights: Option<String>,
    },
    /// Show corpus, queue and worker status.
    Status,
    /// Run a single workflow by id.
    Run { workflow_id: String },
    /// Inspect a run database file.
    Inspect { run_db: PathBuf },
    /// Garbage collect merged run-dbs and orphans (default 7d).
    Gc { max_age: Option<String> },
    /// Export chunks as json or csv to stdout.
    Export { format: String },
    /// List available workflows.
    Workflows,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

type CliError = Box<dyn std::error::Error>;

struct App {
    config: RagliteConfig,
    orchestrator: Orchestrator,
    merger: Merger,
    workflows: Arc<Database>,
    cancel: CancellationToken,
}

fn open_app(data: Option<PathBuf>) -> Result<App, CliError> {
    let config = RagliteConfig::load(data)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let corpus = Arc::new(Database::open_corpus(&config.data_dir)?);
    let workflows = Arc::new(Database::open_workflows(&config.data_dir)?);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    let _ = ctrlc::set_handler(move || handler_token.cancel());

    let merger = Merger::new(corpus.clone(), &config.data_dir, &config.merger)?
        .with_cancellation(cancel.clone());

    let orchestrator = Orchestrator::new(
        config.clone(),
        corpus,
        workflows.clone(),
        Arc::new(raglite_extract::Registry::with_builtins()),
    )?
    .with_cancellation(cancel.clone());

    Ok(App {
        config,
        orchestrator,
        merger,
        workflows,
        cancel,
    })
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Init => cmd_init(cli.data),
        Command::Ingest { paths } => {
            let app = open_app(cli.data)?;
            cmd_ingest(&app, &paths)
        }
        Command::Process => {
            let app = open_app(cli.data)?;
            cmd_process(&app)
        }
        Command::Search {
            query,
            top_k,
            min_score,
            weights,
        } => {
            let app = open_app(cli.data)?;
            cmd_search(&app, &query.join(" "), top_k, min_score, weights.as_deref())
        }
        Command::Status => {
            let app = open_app(cli.data)?;
            cmd_status(&app)
        }
        Command::Run { workflow_id } => {
            let app = open_app(cli.data)?;
            cmd_run(&app, &workflow_id)
        }
        Command::Inspect { run_db } => cmd_inspect(&run_db),
        Command::Gc { max_age } => {
            let app = open_app(cli.data)?;
            cmd_gc(&app, max_age.as_deref())
        }
        Command::Export { format } => {
            let app = open_app(cli.data)?;
            cmd_export(&app, &format)
        }
        Command::Workflows => {
            let app = open_app(cli.data)?;
            cmd_workflows(&app)
        }
    }
}

fn cmd_init(data: Option<PathBuf>) -> Result<(), CliError> {
    let config = RagliteConfig::load(data)?;
    println!("Initializing raglite in {}", config.data_dir.display());

    for dir in [
        config.data_dir.clone(),
        config.runs_dir(),
        config.queue_dir("pending"),
        config.queue_dir("processing"),
        config.queue_dir("done"),
        config.queue_dir("failed"),
        config.storage_dir(),
    ] {
        std::fs::create_dir_all(&dir)?;
    }

    let _corpus = Database::open_corpus(&config.data_dir)?;
    let workflows = Database::open_workflows(&config.data_dir)?;
    workflows.with_conn(|conn| {
        loader::load_builtins(conn)
            .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))
    })?;

    println!("  corpus db:    {}", config.corpus_db_path().display());
    println!("  workflows db: {}", config.workflows_db_path().display());
    println!("Initialization complete.");
    Ok(())
}

fn cmd_ingest(app: &App, paths: &[PathBuf]) -> Result<(), CliError> {
    if paths.is_empty() {
        return Err("usage: raglite ingest <path> [path...]".into());
    }
    let mut total = 0usize;
    for path in paths {
        match app.orchestrator.ingest(path) {
            Ok(ids) => {
                total += ids.len();
                if ids.len() == 1 {
                    println!("Ingested {} (id: {}…)", path.display(), &ids[0][..12]);
                } else {
                    println!("Ingested {} files from {}", ids.len(), path.display());
                }
            }
            Err(e) => eprintln!("Warning: {}: {e}", path.display()),
        }
    }
    println!("Total: {total} files ingested");
    Ok(())
}

fn cmd_process(app: &App) -> Result<(), CliError> {
    println!("Processing pending files...");
    let summary = app.orchestrator.process_pending(&app.merger)?;
    println!(
        "Runs: {} dispatched, {} completed, {} failed, {} files without a workflow",
        summary.dispatched, summary.completed, summary.failed, summary.skipped_unknown_mime
    );

    // Drain the merge queue inline; the long-lived loop is for daemons.
    let mut merged = 0usize;
    while app.merger.status().pending > 0 && !app.cancel.is_cancelled() {
        merged += app.merger.process_batch()?;
    }
    println!("Merged {merged} run(s) into the corpus.");
    Ok(())
}

fn cmd_search(
    app: &App,
    query: &str,
    top_k: Option<usize>,
    min_score: Option<f64>,
    weights: Option<&str>,
) -> Result<(), CliError> {
    if query.trim().is_empty() {
        return Err("usage: raglite search <query>".into());
    }
    let mut options = SearchOptions {
        top_k,
        min_score,
        ..SearchOptions::default()
    };
    if let Some(spec) = weights {
        let parts: Vec<&str> = spec.split(',').collect();
        if parts.len() != 3 {
            return Err("--weights expects structure,lexical,contextual".into());
        }
        options.structure_weight = Some(parts[0].parse()?);
        options.lexical_weight = Some(parts[1].parse()?);
        options.contextual_weight = Some(parts[2].parse()?);
    }

    println!("Searching for: {query}\n");
    let response = app.orchestrator.search(query, &options);
    if response.results.is_empty() {
        println!(
            "No results. {}",
            response.message.unwrap_or_default()
        );
        return Ok(());
    }
    for (i, hit) in response.results.iter().enumerate() {
        println!("{}. [{:.3}] {}…", i + 1, hit.score, &hit.chunk_id[..12]);
        let snippet = hit.snippet.replace('\n', " ");
        println!("   {snippet}");
        println!("   layers: {}\n", hit.layer_scores);
    }
    Ok(())
}

fn cmd_status(app: &App) -> Result<(), CliError> {
    let status = app.orchestrator.status(app.merger.status())?;
    println!("raglite status");
    println!("==============");
    println!("Data directory: {}\n", app.config.data_dir.display());
    println!("Corpus:");
    println!("  pending files:    {}", status.pending_files);
    println!("  vectorized files: {}", status.vectorized_files);
    println!("  failed files:     {}", status.failed_files);
    println!("  chunks:           {}", status.total_chunks);
    println!("  vectors:          {}", status.total_vectors);
    println!("  relations:        {}", status.total_relations);
    println!(
        "  db size:          {:.2} MB",
        status.corpus_size_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("\nMerge queue:");
    println!("  pending: {}", status.queue_pending);
    println!("  done:    {}", status.queue_done);
    println!("  failed:  {}", status.queue_failed);
    println!("\nMapped workflows:");
    for workflow in &status.workflows {
        println!("  - {workflow}");
    }
    Ok(())
}

fn cmd_run(app: &App, workflow_id: &str) -> Result<(), CliError> {
    println!("Running workflow: {workflow_id}");
    let handle = app
        .orchestrator
        .run_workflow(workflow_id, RunConfig::default())?;
    println!("Run:      {}", handle.run.run_id);
    println!("Status:   {}", handle.run.status.as_str());
    println!("Database: {}", handle.db_path.display());
    if handle.run.status == RunStatus::Completed {
        app.orchestrator.queue_run(&app.merger, &handle.db_path)?;
        println!("Queued for merge.");
    }
    Ok(())
}

fn cmd_inspect(run_db_path: &Path) -> Result<(), CliError> {
    let run_db = Database::open(run_db_path, DbKind::Run)?;
    let run = run_db
        .with_conn(run_meta::get)?
        .ok_or("run db has no _run_meta row")?;

    println!("Run details");
    println!("===========");
    println!("ID:       {}", run.run_id);
    println!("Workflow: {} v{}", run.workflow_id, run.workflow_version);
    println!("Status:   {}", run.status.as_str());
    println!("Worker:   {}", run.worker_id);
    println!("Started:  {}", run.started_at.to_rfc3339());
    if let Some(finished) = run.finished_at {
        println!("Finished: {}", finished.to_rfc3339());
    }

    let log = run_db.with_conn(run_meta::step_log)?;
    println!("\nSteps:");
    println!(
        "{:<4} {:<24} {:>8} {:>8} {:>9} {:>7}",
        "#", "name", "in", "out", "time(ms)", "delta"
    );
    for exec in &log {
        println!(
            "{:<4} {:<24} {:>8} {:>8} {:>9} {:>7.2}{}{}",
            exec.step_order,
            exec.step_name,
            exec.rows_in,
            exec.rows_out,
            exec.duration_ms,
            exec.delta_score,
            exec.notes
                .as_deref()
                .map(|n| format!("  [{n}]"))
                .unwrap_or_default(),
            exec.error
                .as_deref()
                .map(|e| format!("  ERROR: {e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

fn cmd_gc(app: &App, max_age: Option<&str>) -> Result<(), CliError> {
    let max_age = match max_age {
        Some(raw) => parse_duration(raw).ok_or_else(|| format!("invalid duration {raw:?}"))?,
        None => Duration::from_secs(app.config.merger.gc_max_age_hours * 3600),
    };
    println!("Garbage collecting entries older than {max_age:?}...");
    let done = app.merger.gc(max_age)?;
    let orphans = gc_orphan_runs(&app.orchestrator.runs_dir(), max_age)?;
    println!("Removed {done} merged run(s), {orphans} orphan run(s).");

    println!("Vacuuming corpus database...");
    app.orchestrator.corpus().vacuum()?;
    println!("GC complete.");
    Ok(())
}

fn cmd_export(app: &App, format: &str) -> Result<(), CliError> {
    let format = ExportFormat::parse(format)
        .ok_or_else(|| format!("unknown format {format:?} (supported: json, csv)"))?;
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    app.orchestrator.export(format, &mut lock)?;
    Ok(())
}

fn cmd_workflows(app: &App) -> Result<(), CliError> {
    let summaries = app
        .workflows
        .with_conn(|conn| {
            loader::list(conn).map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))
        })?;
    if summaries.is_empty() {
        println!("No workflows found. Run `raglite init` first.");
        return Ok(());
    }
    println!("Available workflows");
    println!("===================");
    for w in summaries {
        println!("\n{} (v{}) [{}]", w.id, w.version, w.status.as_str());
        println!("  {}", w.name);
        if !w.description.is_empty() {
            println!("  {}", w.description);
        }
        if !w.tags.is_empty() {
            println!("  tags: {}", w.tags.join(", "));
        }
    }
    Ok(())
}

/// Accepts `90s`, `30m`, `24h`, `7d` or plain seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (value, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let value: u64 = value.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::parse_duration;
    use std::time::Duration;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration("x"), None);
        assert_eq!(parse_duration("7w"), None);
    }
}
