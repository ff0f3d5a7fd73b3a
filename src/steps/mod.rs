//! # Optimization Steps Module
//!
//! Questo modulo definisce la capability `Optimizer` e gli step concreti.
//!
//! ## Responsabilità:
//! - `Optimizer`: trasformazione di un file, dato un path produce uno `StepOutcome`
//! - `StepOutcome`: path risultante, eventuale path superato, esito e diagnostica
//! - `ToolSettings`: parametri dei tool esterni letti al momento dell'invocazione
//! - Esecuzione dei processi esterni con stdout/stderr catturati
//!
//! ## Step disponibili:
//! - `fixer::ImageFixer`: corregge l'estensione in base ai magic number
//! - `tools::Oxipng` / `tools::JpegOptim`: ricompressione lossless in place
//! - `tools::Jpeg2Png` / `tools::DWebp`: conversione verso PNG (supersede l'input)
//! - `tools::Cjxl`: encoding JPEG XL (supersede l'input)
//!
//! ## Supersession:
//! Uno step che crea un nuovo file riporta l'input come `superseded_path`.
//! Il file non viene mai cancellato subito, la pipeline lo sposta nella
//! holding directory solo quando tutte le fasi sono riuscite.

pub mod fixer;
pub mod tools;

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{OptiError, Result};
use crate::utils::display_command;

pub use fixer::ImageFixer;
pub use tools::{Cjxl, DWebp, Jpeg2Png, JpegOptim, Oxipng};

/// Parameters handed to every step invocation.
///
/// Built once per batch before any worker starts. Tuning values are
/// read-only afterwards; `targets` is shared by every pipeline of the batch.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub oxipng_level: u8,
    pub jxl_distance: f32,
    pub jxl_effort: u8,
    pub threads_per_image: usize,
    pub targets: TargetClaims,
}

impl From<&Config> for ToolSettings {
    fn from(config: &Config) -> Self {
        Self {
            oxipng_level: config.oxipng_level,
            jxl_distance: config.jxl_distance,
            jxl_effort: config.jxl_effort,
            threads_per_image: config.threads_per_image,
            targets: TargetClaims::default(),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Result of running one step on one file
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Path valid after the step
    pub resulting_path: PathBuf,
    /// Intermediate made obsolete by this step, relocated once the pipeline succeeds
    pub superseded_path: Option<PathBuf>,
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Captured tool output, attached to failure reports
    pub diagnostic: String,
}

impl StepOutcome {
    /// Successful step that left the file at `path` and created nothing new
    pub fn in_place(path: impl Into<PathBuf>) -> Self {
        Self {
            resulting_path: path.into(),
            superseded_path: None,
            success: true,
            exit_code: Some(0),
            diagnostic: String::new(),
        }
    }

    /// Successful step that produced `resulting` and obsoleted `superseded`
    pub fn converted(resulting: impl Into<PathBuf>, superseded: impl Into<PathBuf>) -> Self {
        Self {
            resulting_path: resulting.into(),
            superseded_path: Some(superseded.into()),
            success: true,
            exit_code: Some(0),
            diagnostic: String::new(),
        }
    }

    /// Failed step
    pub fn failed(path: impl Into<PathBuf>, exit_code: Option<i32>, diagnostic: impl Into<String>) -> Self {
        Self {
            resulting_path: path.into(),
            superseded_path: None,
            success: false,
            exit_code,
            diagnostic: diagnostic.into(),
        }
    }

    /// Turn a failed outcome into the error reported by the pipeline
    pub fn into_error(self, step: &'static str, image: &Path) -> OptiError {
        OptiError::StepFailed {
            step,
            image: image.to_path_buf(),
            code: self.exit_code,
            diagnostic: self.diagnostic,
        }
    }
}

/// A named transformation unit applied to a single file.
///
/// Implementations are stateless across invocations. `optimize` returns
/// `Err` only for problems outside the tool itself (I/O, collisions);
/// a tool that runs and fails is reported through `StepOutcome::success`.
pub trait Optimizer: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &'static str;

    /// External binary this step needs, checked before the batch starts
    fn required_tool(&self) -> Option<&'static str> {
        None
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>>;
}

/// Output paths reserved by the steps of a batch.
///
/// A step claims the path it is about to create before writing it. The
/// claim is taken under a lock, so two pipelines converting `a.jpg` and
/// `a.webp` concurrently cannot both produce `a.png`. Claims are kept until
/// the batch ends.
#[derive(Debug, Clone, Default)]
pub struct TargetClaims(Arc<Mutex<HashSet<PathBuf>>>);

impl TargetClaims {
    /// Reserve `target` for the step processing `image`.
    ///
    /// Fails with `Collision` when another step already holds the claim or
    /// when a different file already exists at `target`.
    pub async fn claim(&self, image: &Path, target: &Path) -> Result<()> {
        if image == target {
            return Ok(());
        }

        let collision = || OptiError::Collision {
            image: image.to_path_buf(),
            target: target.to_path_buf(),
        };

        if !self.0.lock().await.insert(target.to_path_buf()) {
            return Err(collision());
        }

        match tokio::fs::try_exists(target).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                self.release(target).await;
                Err(collision())
            }
            Err(e) => {
                self.release(target).await;
                Err(e.into())
            }
        }
    }

    async fn release(&self, target: &Path) {
        self.0.lock().await.remove(target);
    }

    pub async fn is_claimed(&self, target: &Path) -> bool {
        self.0.lock().await.contains(target)
    }
}

/// Runs an external tool to completion with captured output.
///
/// A tool that cannot be launched is reported as a failed outcome with no
/// exit code. On failure the diagnostic is stderr, or stdout when stderr is
/// empty.
pub async fn run_tool(
    program: &str,
    args: Vec<OsString>,
    resulting: PathBuf,
    superseded: Option<PathBuf>,
) -> Result<StepOutcome> {
    debug!("Running: {}", display_command(program, &args));

    let start_time = Instant::now();
    let output = match Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            return Ok(StepOutcome::failed(
                resulting,
                None,
                format!("could not launch {}: {}", program, e),
            ));
        }
    };
    let elapsed = start_time.elapsed();

    if output.status.success() {
        debug!("{} completed successfully in {:?}", program, elapsed);
        return Ok(StepOutcome {
            resulting_path: resulting,
            superseded_path: superseded,
            success: true,
            exit_code: output.status.code(),
            diagnostic: String::new(),
        });
    }

    debug!("{} failed after {:?}", program, elapsed);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let diagnostic = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr.trim().to_string()
    };

    Ok(StepOutcome::failed(resulting, output.status.code(), diagnostic))
}
