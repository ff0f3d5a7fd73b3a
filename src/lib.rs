//! # Opti Dir Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Architettura dei moduli:
//! - `config`: configurazione, override da environment e validazione
//! - `error`: tipi di errore della pipeline
//! - `utils`: helper per argomenti e comandi esterni
//! - `file_manager`: discovery, timestamp e holding directory
//! - `tool_resolver`: ricerca dei binari esterni nel `PATH`
//! - `steps`: capability `Optimizer` e step concreti (fixer e tool esterni)
//! - `registry`: mappa tipo di file → catene di step per fase
//! - `optimizer`: pipeline per file e orchestratore concorrente
//! - `progress`: progress bar e statistiche aggregate
//! - `json_output`: report finale in JSON
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use opti_dir::{Config, MediaOptimizer};
//! use std::path::Path;
//!
//! # async fn run() -> opti_dir::error::Result<()> {
//! let (_stop_sender, stop) = tokio::sync::broadcast::channel(1);
//! let optimizer = MediaOptimizer::new(Config::default())?;
//! let results = optimizer.optimize_directory(Path::new("."), stop).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod registry;
pub mod steps;
pub mod tool_resolver;
pub mod utils;

pub use config::Config;
pub use error::OptiError;
pub use optimizer::MediaOptimizer;
pub use progress::{OptimizationStats, OptimizedImage, PipelineStatus};
pub use registry::{OptimizationMode, OptimizerRegistry};
