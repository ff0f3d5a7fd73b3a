//! # Opti Dir - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della configurazione (default → file → environment → CLI)
//! - Verifica dei tool esterni prima di toccare qualsiasi file
//! - Gestione di Ctrl-C e stampa del report finale
//!
//! ## Esempio di utilizzo:
//! ```bash
//! opti-dir ~/Pictures --mode quality --threads 8 --verbose
//! opti-dir scan.jpg --single
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opti_dir::{
    config::log_env_overrides, json_output::JsonMessage, tool_resolver::ToolPathResolver, Config,
    MediaOptimizer, OptiError, OptimizationMode, OptimizationStats, OptimizedImage,
};

#[derive(Parser)]
#[command(name = "opti-dir")]
#[command(about = "Losslessly optimize the images of a directory with external tools")]
struct Args {
    /// Directory (or file with --single) to optimize
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Number of images optimized concurrently (default: available cores - 2)
    #[arg(short, long, allow_negative_numbers = true)]
    threads: Option<i64>,

    /// Optimization recipe
    #[arg(short, long, value_enum)]
    mode: Option<OptimizationMode>,

    /// Optimize only the given file
    #[arg(short, long)]
    single: bool,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving superseded intermediate files
    #[arg(long)]
    holding_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    let overrides = config.apply_env_overrides()?;
    apply_args(&mut config, &args);
    config.validate()?;

    if args.verbose {
        log_env_overrides(&overrides);
    }

    let json_output = config.json_output;
    let optimizer = MediaOptimizer::new(config)?;
    if args.verbose {
        optimizer.registry().describe();
    }
    optimizer.registry().verify_tools(&ToolPathResolver::new())?;

    let files = collect_targets(&optimizer, &args.target, args.single)?;
    if files.is_empty() {
        info!("nothing to optimize");
        return Ok(());
    }
    info!("Found {} files to optimize", files.len());

    let (stop_sender, stop) = broadcast::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop_sender.send(()).is_err() {
                break;
            }
        }
    });

    match optimizer.optimize_files(files, stop).await {
        Ok(results) => {
            report(&results, None, json_output);
            Ok(())
        }
        Err(OptiError::Interrupted { completed, cancelled }) => {
            report(&completed, Some(cancelled), json_output);
            Err(anyhow::anyhow!("Interrupted, {} files were not optimized", cancelled))
        }
        Err(e) => Err(e.into()),
    }
}

/// CLI flags take precedence over the file and the environment
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(threads) = args.threads {
        if threads < 1 {
            info!("threads must be at least 1, using 1 instead of {}", threads);
        }
        config.workers = threads.max(1) as usize;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(ref holding_dir) = args.holding_dir {
        config.holding_dir = holding_dir.clone();
    }
    if args.no_progress {
        config.show_progress = false;
    }
    if args.json {
        config.json_output = true;
    }
}

fn collect_targets(optimizer: &MediaOptimizer, target: &Path, single: bool) -> Result<Vec<PathBuf>> {
    if single {
        if !target.is_file() {
            return Err(anyhow::anyhow!("Not a regular file: {}", target.display()));
        }
        return Ok(vec![target.to_path_buf()]);
    }

    let dir = if target.is_dir() {
        target.to_path_buf()
    } else {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        info!("'{}' is not a directory, optimizing '{}'", target.display(), parent.display());
        parent
    };

    if !dir.is_dir() {
        return Err(anyhow::anyhow!("Directory does not exist: {}", dir.display()));
    }

    Ok(optimizer.discover(&dir)?)
}

fn report(results: &[OptimizedImage], cancelled: Option<usize>, json_output: bool) {
    if json_output {
        match cancelled {
            Some(cancelled) => JsonMessage::interrupted(results, cancelled).emit(),
            None => JsonMessage::complete(results).emit(),
        }
        return;
    }

    let stats = OptimizationStats::from_images(results);
    if stats.files_failed > 0 {
        warn!("{} of {} files failed", stats.files_failed, stats.files_processed);
    }
    info!("{}", stats.format_summary());
}
