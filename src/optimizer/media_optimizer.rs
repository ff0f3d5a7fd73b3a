//! # Media Optimizer Main Orchestrator
//!
//! Orchestratore del batch: discovery, pool di worker limitato, polling del
//! progresso e gestione dell'interruzione.
//!
//! ## Concorrenza:
//! - Ogni file è un task tokio che attende un permesso del semaforo
//!   (`workers` permessi), quindi al massimo `workers` pipeline attive
//! - Con meno file che worker i thread per immagine diventano
//!   `floor(workers / files)`, a meno che `THREADS_PER_IMAGE` sia esplicito
//!
//! ## Interruzione:
//! Alla prima richiesta di stop il semaforo viene chiuso: i file in coda
//! vengono cancellati, quelli già in elaborazione terminano. Una seconda
//! richiesta abortisce anche questi ultimi.

use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    error::{OptiError, Result},
    file_manager::{FileManager, HoldingArea},
    optimizer::{progress_tracker::ProgressTracker, task_optimizer::TaskOptimizer},
    progress::{OptimizedImage, PipelineStatus, ProgressManager},
    registry::OptimizerRegistry,
    steps::ToolSettings,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Threads per image when the batch is smaller than the pool.
/// `None` keeps the configured value.
pub fn adaptive_threads_per_image(workers: usize, files: usize) -> Option<usize> {
    if files == 0 || files >= workers {
        return None;
    }
    let threads = (workers / files).max(1);
    (threads > 1).then_some(threads)
}

/// Orchestratore principale
pub struct MediaOptimizer {
    config: Config,
    registry: Arc<OptimizerRegistry>,
    poll_interval: Duration,
}

impl MediaOptimizer {
    /// Optimizer using the recipe of the configured mode
    pub fn new(config: Config) -> Result<Self> {
        let registry = OptimizerRegistry::for_mode(config.mode);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: OptimizerRegistry) -> Result<Self> {
        config
            .validate()
            .map_err(|e| OptiError::Config(e.to_string()))?;

        Ok(Self {
            config,
            registry: Arc::new(registry),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &OptimizerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Candidate files directly inside `dir`
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let files = FileManager::find_images(dir, |path| self.registry.accepts(path))?;
        debug!("Found {} candidate files in {}", files.len(), dir.display());
        Ok(files)
    }

    /// Discover and optimize every candidate file in `dir`
    pub async fn optimize_directory(
        &self,
        dir: &Path,
        stop: broadcast::Receiver<()>,
    ) -> Result<Vec<OptimizedImage>> {
        let files = self.discover(dir)?;
        self.optimize_files(files, stop).await
    }

    /// Run the pipeline over `files` on the bounded pool.
    ///
    /// Results come back in input order. On interruption the error carries
    /// the files that completed and the number that were cancelled.
    pub async fn optimize_files(
        &self,
        files: Vec<PathBuf>,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<Vec<OptimizedImage>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.config.workers;
        let mut settings = ToolSettings::from(&self.config);
        if !self.config.threads_per_image_explicit {
            if let Some(threads) = adaptive_threads_per_image(workers, files.len()) {
                settings.threads_per_image = threads;
                info!("override: using {} threads per image", threads);
            }
        }

        let task = TaskOptimizer::new(
            self.registry.clone(),
            settings,
            HoldingArea::new(&self.config.holding_dir),
        );
        let semaphore = Arc::new(Semaphore::new(workers));

        let handles: Vec<JoinHandle<Option<OptimizedImage>>> = files
            .iter()
            .cloned()
            .map(|file| {
                let task = task.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    Some(task.process_single_file(file).await)
                })
            })
            .collect();

        let total = handles.len() as u64;
        let progress = if self.config.show_progress && !self.config.json_output {
            ProgressManager::new(total)
        } else {
            ProgressManager::hidden(total)
        };

        let interrupted = ProgressTracker::new(progress, self.poll_interval)
            .watch(&handles, &mut stop)
            .await;

        let results = if interrupted {
            warn!("Interrupt received, cancelling queued files (interrupt again to abort running ones)");
            semaphore.close();

            let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
            let joined = join_all(handles);
            tokio::pin!(joined);

            tokio::select! {
                results = &mut joined => results,
                _ = stop_requested(&mut stop) => {
                    warn!("Second interrupt received, aborting running files");
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    joined.await
                }
            }
        } else {
            join_all(handles).await
        };

        let mut completed = Vec::with_capacity(results.len());
        let mut cancelled = 0;
        for (file, result) in files.into_iter().zip(results) {
            match result {
                Ok(Some(image)) => completed.push(image),
                Ok(None) => cancelled += 1,
                Err(e) if e.is_cancelled() => cancelled += 1,
                Err(e) => {
                    error!("Worker for '{}' panicked: {}", file.display(), e);
                    completed.push(OptimizedImage {
                        final_path: file,
                        original_size: 0,
                        final_size: 0,
                        status: PipelineStatus::Failed,
                    });
                }
            }
        }

        if interrupted {
            Err(OptiError::Interrupted { completed, cancelled })
        } else {
            Ok(completed)
        }
    }
}

/// Resolves on the next stop request; never resolves once every sender is gone
async fn stop_requested(stop: &mut broadcast::Receiver<()>) {
    if let Err(broadcast::error::RecvError::Closed) = stop.recv().await {
        std::future::pending::<()>().await;
    }
}
