//! sift — fast, offline semantic file search.
//!
//! ```bash
//! sift index ~/notes          # incremental ingest
//! sift search "error handling in the parser"
//! sift watch ~/notes          # ingest, then follow changes
//! sift stats
//! sift rebuild ~/notes        # wipe and re-ingest
//! sift clear --force
//! ```
//!
//! Exit codes: 0 on success, 130 on interrupt, 1 otherwise.

mod output;
mod settings;
mod watch;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use settings::Settings;
use sift_core::{BgeEmbedder, CancelToken, Index};

const INTERRUPT_EXIT: u8 = 130;

/// Hard deadline after a second interrupt request: inference is a blocking
/// native call the process cannot preempt.
const INTERRUPT_GRACE: Duration = Duration::from_secs(1);

/// Local semantic search for developers.
///
/// Indexes supported text files into an on-disk vector index and answers
/// natural-language queries, entirely offline.
#[derive(Parser)]
#[command(name = "sift", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory containing model.safetensors, config.json, tokenizer.json
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Index directory (default .sift/ in the working directory)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Skip indexing files larger than this (in KB)
    #[arg(long, global = true)]
    max_file_kb: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Index all supported files in one or more directories
    Index {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Non-interactive semantic search
    Search {
        /// Query words (joined by spaces)
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Index directories, then watch them for changes
    Watch {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Show index statistics
    Stats,
    /// Remove the index directory
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Wipe and rebuild the index from scratch (ignores the skip-cache)
    Rebuild {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load();
    let model_dir = settings.model_dir(cli.model_dir);
    let index_dir = settings.index_dir(cli.index_dir);
    let max_file_kb = settings.max_file_kb(cli.max_file_kb);

    match cli.command {
        Command::Index { dirs } => {
            let token = install_interrupt_handler()?;
            let index = open_index(&model_dir, &index_dir, max_file_kb)?;
            let interrupted = ingest(&index, &dirs, &token, false)?;
            index.close()?;
            Ok(exit_code(interrupted))
        }
        Command::Search { query, limit, json } => {
            let query = query.join(" ");
            let index = open_index(&model_dir, &index_dir, max_file_kb)?;
            let results = index.search(&query, limit)?;
            if json {
                println!("{}", output::format_json(&results)?);
            } else {
                println!("{}", output::format_human(&results));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { dirs } => {
            let token = install_interrupt_handler()?;
            let index = open_index(&model_dir, &index_dir, max_file_kb)?;
            let interrupted = ingest(&index, &dirs, &token, false)?;
            if !interrupted {
                let stats = index.stats()?;
                eprintln!(
                    "Done. {} chunks indexed. Watching for changes… (Ctrl+C to stop)",
                    stats.num_chunks
                );
                watch::run(&index, &dirs, &token)?;
            }
            index.close()?;
            Ok(ExitCode::from(INTERRUPT_EXIT))
        }
        Command::Stats => {
            let index = open_index(&model_dir, &index_dir, max_file_kb)?;
            let stats = index.stats()?;
            println!("chunks:    {}", stats.num_chunks);
            println!("files:     {}", stats.num_files);
            println!("size:      {} KB", stats.index_size_kb);
            if let Some(updated) = stats.last_updated {
                if let Ok(age) = updated.elapsed() {
                    println!("updated:   {}s ago", age.as_secs());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear { force } => clear_index(&index_dir, force),
        Command::Rebuild { dirs } => {
            let token = install_interrupt_handler()?;
            let index = open_index(&model_dir, &index_dir, max_file_kb)?;
            let interrupted = ingest(&index, &dirs, &token, true)?;
            index.close()?;
            Ok(exit_code(interrupted))
        }
    }
}

/// Loads the model and opens the index, narrating on stderr — model loading
/// can take seconds on first run and should not look like a hang.
fn open_index(model_dir: &PathBuf, index_dir: &PathBuf, max_file_kb: u64) -> Result<Index> {
    eprint!("Loading model… ");
    io::stderr().flush().ok();
    let embedder = match BgeEmbedder::from_dir(model_dir) {
        Ok(e) => e,
        Err(e) => {
            eprintln!();
            return Err(e).context("load embedding model");
        }
    };
    let index = Index::open(index_dir, Arc::new(embedder), max_file_kb)?;
    eprintln!("ready.");
    Ok(index)
}

/// Ingests `dirs`, with a progress bar per directory. Returns `true` when
/// the run was interrupted (partial work is already flushed by the index).
fn ingest(index: &Index, dirs: &[PathBuf], token: &CancelToken, rebuild: bool) -> Result<bool> {
    for (i, dir) in dirs.iter().enumerate() {
        eprintln!("Scanning {}…", dir.display());

        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("  [{pos}/{len}] {bar:30} {msg}") {
            bar.set_style(style);
        }
        let progress: sift_core::index::ProgressFn<'_> =
            &|done, total, path, skipped| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                bar.set_message(if skipped { format!("· {name}") } else { name });
            };

        // A multi-directory rebuild wipes once, then accumulates.
        let outcome = if rebuild && i == 0 {
            index.rebuild_from_dir(token, dir, Some(progress))
        } else {
            index.index_dir(token, dir, Some(progress))
        };
        bar.finish_and_clear();

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                eprintln!("\nInterrupted — partial index saved.");
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        }
    }

    index.flush()?;
    let stats = index.stats()?;
    eprintln!(
        "Done. {} chunks from {} files indexed.",
        stats.num_chunks, stats.num_files
    );
    Ok(false)
}

fn clear_index(index_dir: &PathBuf, force: bool) -> Result<ExitCode> {
    if !index_dir.exists() {
        println!("No index found — nothing to clear.");
        return Ok(ExitCode::SUCCESS);
    }
    if !force {
        print!(
            "Remove {}? This cannot be undone. [y/N] ",
            index_dir.display()
        );
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y") {
            println!("Aborted.");
            return Ok(ExitCode::SUCCESS);
        }
    }
    std::fs::remove_dir_all(index_dir)
        .with_context(|| format!("clear {}", index_dir.display()))?;
    println!("Index cleared.");
    Ok(ExitCode::SUCCESS)
}

/// First signal cancels the token and arms a hard-deadline exit; a second
/// signal exits immediately.
fn install_interrupt_handler() -> Result<CancelToken> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(i32::from(INTERRUPT_EXIT));
        }
        handler_token.cancel();
        eprintln!("\n[sift] stopping — waiting up to 1s for the current batch…");
        std::thread::spawn(|| {
            std::thread::sleep(INTERRUPT_GRACE);
            eprintln!("[sift] exiting.");
            std::process::exit(i32::from(INTERRUPT_EXIT));
        });
    })
    .context("install signal handler")?;
    Ok(token)
}

fn exit_code(interrupted: bool) -> ExitCode {
    if interrupted {
        ExitCode::from(INTERRUPT_EXIT)
    } else {
        ExitCode::SUCCESS
    }
}
