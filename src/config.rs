//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di ottimizzazione
//! - Applica gli override da variabili d'ambiente (`OXI_OPT_LEVEL`, `JXL_DISTANCE`, `THREADS_PER_IMAGE`)
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `workers`: Numero di pipeline concorrenti (default: core disponibili - 2, minimo 1)
//! - `mode`: Ricetta del registry (`safe`, `quality`, `jxl`)
//! - `oxipng_level`: Livello di ottimizzazione oxipng (0-6, default: 2)
//! - `jxl_distance`: Distanza cjxl (0.0-25.0, default: 1)
//! - `jxl_effort`: Effort cjxl (1-10, default: 7)
//! - `threads_per_image`: Thread concessi ai tool esterni per immagine (default: 1)
//! - `holding_dir`: Directory dove vengono spostati i file intermedi superati
//!
//! ## Ordine di precedenza:
//! default → file JSON → variabili d'ambiente → flag CLI
//!
//! ## Esempio:
//! ```rust
//! use opti_dir::Config;
//!
//! let mut config = Config::default();
//! config.workers = 8;
//! config.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::registry::OptimizationMode;

pub const OXI_OPT_LEVEL: &str = "OXI_OPT_LEVEL";
pub const JXL_DISTANCE: &str = "JXL_DISTANCE";
pub const THREADS_PER_IMAGE: &str = "THREADS_PER_IMAGE";

/// Configuration for a directory optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of files optimized concurrently
    pub workers: usize,
    /// Registry recipe
    pub mode: OptimizationMode,
    /// oxipng `--opt` level (0-6)
    pub oxipng_level: u8,
    /// cjxl butteraugli distance (0.0 = lossless)
    pub jxl_distance: f32,
    /// cjxl effort (1-10)
    pub jxl_effort: u8,
    /// Threads handed to each external tool invocation
    pub threads_per_image: usize,
    /// Set when `threads_per_image` was chosen by the operator, disables adaptation
    #[serde(skip)]
    pub threads_per_image_explicit: bool,
    /// Where superseded intermediate files are moved to
    pub holding_dir: PathBuf,
    /// Draw the progress bar while waiting for workers
    pub show_progress: bool,
    /// Print the final report as JSON
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            mode: OptimizationMode::Safe,
            oxipng_level: 2,
            jxl_distance: 1.0,
            jxl_effort: 7,
            threads_per_image: 1,
            threads_per_image_explicit: false,
            holding_dir: PathBuf::from("deleted-images"),
            show_progress: true,
            json_output: false,
        }
    }
}

/// Available cores minus a reserved margin of two, never below one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

/// One environment key and where its effective value came from
#[derive(Debug, Clone, PartialEq)]
pub struct EnvOverride {
    pub name: &'static str,
    pub value: String,
    pub from_environment: bool,
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.oxipng_level > 6 {
            return Err(anyhow::anyhow!("oxipng optimization level must be between 0 and 6"));
        }

        if !(0.0..=25.0).contains(&self.jxl_distance) {
            return Err(anyhow::anyhow!("JXL distance must be between 0.0 and 25.0"));
        }

        if self.jxl_effort == 0 || self.jxl_effort > 10 {
            return Err(anyhow::anyhow!("JXL effort must be between 1 and 10"));
        }

        if self.threads_per_image == 0 {
            return Err(anyhow::anyhow!("Threads per image must be greater than 0"));
        }

        if self.holding_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Holding directory must not be empty"));
        }

        Ok(())
    }

    /// Apply `OXI_OPT_LEVEL`, `JXL_DISTANCE` and `THREADS_PER_IMAGE` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<Vec<EnvOverride>> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup; returns the effective value of every key.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<Vec<EnvOverride>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut report = Vec::with_capacity(3);

        let level = lookup(OXI_OPT_LEVEL);
        if let Some(ref raw) = level {
            self.oxipng_level = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} is not a valid level: '{}'", OXI_OPT_LEVEL, raw))?;
        }
        report.push(EnvOverride {
            name: OXI_OPT_LEVEL,
            value: self.oxipng_level.to_string(),
            from_environment: level.is_some(),
        });

        let distance = lookup(JXL_DISTANCE);
        if let Some(ref raw) = distance {
            self.jxl_distance = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} is not a valid distance: '{}'", JXL_DISTANCE, raw))?;
        }
        report.push(EnvOverride {
            name: JXL_DISTANCE,
            value: self.jxl_distance.to_string(),
            from_environment: distance.is_some(),
        });

        let threads = lookup(THREADS_PER_IMAGE);
        if let Some(ref raw) = threads {
            self.threads_per_image = raw.trim().parse().map_err(|_| {
                anyhow::anyhow!("{} is not a valid thread count: '{}'", THREADS_PER_IMAGE, raw)
            })?;
            self.threads_per_image_explicit = true;
        }
        report.push(EnvOverride {
            name: THREADS_PER_IMAGE,
            value: self.threads_per_image.to_string(),
            from_environment: threads.is_some(),
        });

        Ok(report)
    }

    /// Load configuration from file, falling back to defaults when it does not exist
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Verbose listing of the environment keys, aligned on the longest name.
pub fn log_env_overrides(overrides: &[EnvOverride]) {
    let width = overrides.iter().map(|o| o.name.len()).max().unwrap_or(0);

    debug!("Environment Variables:");
    for item in overrides {
        let source = if item.from_environment {
            "from environment"
        } else {
            "using default"
        };
        debug!("\t{:<width$}: {} ({})", item.name, item.value, source, width = width);
    }
}
