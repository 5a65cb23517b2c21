use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use termcolor::ColorChoice;
use tracing_subscriber::EnvFilter;

use mcbench::corpus::{CorpusScanner, CorpusSource, DataRoot};
use mcbench::output;
use mcbench::query::ExtensionRegistry;
use mcbench::store::{Querier, QuerierError, QueryStore};
use mcbench::utils::AppConfig;

#[derive(Parser)]
#[command(name = "mcbench")]
#[command(about = "Structural XPath queries over a corpus of MATLAB syntax trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Benchmark corpus root (overrides the config file)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Query store file (overrides the config file)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Scan worker threads, 0 for one per CPU
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorWhen::Auto)]
    color: ColorWhen,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Count matches of a query per benchmark
    Search {
        xpath: String,

        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the lines a query matches in one benchmark
    Benchmark {
        name: String,

        #[arg(short, long)]
        query: Option<String>,
    },
    /// List benchmarks in the corpus
    List,
    /// List saved queries
    Queries {
        /// Include unsaved queries
        #[arg(short, long)]
        all: bool,
    },
    /// Name a query that has already been run
    Save { xpath: String, name: String },
    /// Unsave a query
    Delete { xpath: String },
    /// Recompute cached results for every stored query
    Refresh,
    /// Remove unsaved queries and their cached results
    Purge,
    /// Store the example queries with their results
    Seed,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorWhen {
    Auto,
    Always,
    Never,
}

impl From<ColorWhen> for ColorChoice {
    fn from(when: ColorWhen) -> Self {
        match when {
            ColorWhen::Auto if std::io::stdout().is_terminal() => ColorChoice::Auto,
            ColorWhen::Auto | ColorWhen::Never => ColorChoice::Never,
            ColorWhen::Always => ColorChoice::Always,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mcbench={default_level}")));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let color = ColorChoice::from(cli.color);
    match run(cli, color) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let mut stderr = output::stderr(color);
            let query_error = e
                .downcast_ref::<QuerierError>()
                .and_then(QuerierError::query_error);
            let _ = match query_error {
                Some(query_error) => output::print_query_error(&mut stderr, query_error),
                None => writeln!(stderr, "error: {e:#}"),
            };
            ExitCode::FAILURE
        }
    }
}

fn open_querier(cli: &Cli) -> Result<Querier<DataRoot>> {
    let mut config = AppConfig::load()?;
    if let Some(root) = &cli.data_root {
        config.data_root = Some(root.clone());
    }
    if let Some(store) = &cli.store {
        config.store_path = Some(store.clone());
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    let data_root = config.resolved_data_root()?;
    let store_path = config.resolved_store_path()?;
    tracing::debug!(
        data_root = %data_root.display(),
        store = %store_path.display(),
        workers = config.workers,
        "opening corpus"
    );

    let scanner = CorpusScanner::new(DataRoot::new(data_root), config.effective_workers())
        .context("Failed to start scan workers")?
        .with_progress(std::io::stderr().is_terminal());
    let store = QueryStore::open(store_path)?;
    Ok(Querier::with_cache_size(
        ExtensionRegistry::with_builtins(),
        scanner,
        store,
        config.compiled_cache_size,
    ))
}

fn run(cli: Cli, color: ColorChoice) -> Result<()> {
    let mut querier = open_querier(&cli)?;
    let mut stdout = output::stdout(color);

    match cli.command {
        Commands::Search { xpath, json } => {
            let results = querier.get_matches(&xpath)?;
            if json {
                serde_json::to_writer_pretty(&mut stdout, &results)?;
                writeln!(stdout)?;
            } else {
                output::print_ranked(&mut stdout, &results)?;
            }
        }
        Commands::Benchmark { name, query } => {
            let lines = querier.matching_lines(&name, query.as_deref())?;
            let source = querier.scanner().source();
            let mut sources = BTreeMap::new();
            if let Some(benchmark) = source.benchmark(&name)? {
                for file in source.files(&benchmark)? {
                    if lines.contains_key(&file.name) {
                        let text = source.read_source(&file)?;
                        sources.insert(file.name, text);
                    }
                }
            }
            output::print_matching_lines(&mut stdout, &lines, &sources)?;
        }
        Commands::List => {
            let benchmarks = querier.scanner().source().benchmarks()?;
            output::print_benchmarks(&mut stdout, &benchmarks)?;
        }
        Commands::Queries { all } => {
            if all {
                output::print_queries(&mut stdout, querier.store().all())?;
            } else {
                output::print_queries(&mut stdout, querier.store().saved())?;
            }
        }
        Commands::Save { xpath, name } => {
            querier.save_query(&xpath, &name)?;
            writeln!(stdout, "Saved: {name}")?;
        }
        Commands::Delete { xpath } => {
            let name = querier.delete_query(&xpath)?;
            writeln!(stdout, "Unsaved: {}", if name.is_empty() { &xpath } else { &name })?;
        }
        Commands::Refresh => {
            let refreshed = querier.refresh_query_results()?;
            writeln!(stdout, "Refreshed {refreshed} queries")?;
        }
        Commands::Purge => {
            let purged = querier.purge_unsaved_queries()?;
            writeln!(stdout, "Purged {purged} unsaved queries")?;
        }
        Commands::Seed => {
            let seeded = querier.load_initial_queries()?;
            writeln!(stdout, "Seeded {seeded} example queries")?;
        }
    }

    Ok(())
}
