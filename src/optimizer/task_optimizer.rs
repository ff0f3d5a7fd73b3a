//! # Task Optimizer Module
//!
//! Worker per l'esecuzione della pipeline su un singolo file.
//!
//! ## Pipeline:
//! 1. Legge dimensione e mtime dell'originale
//! 2. Per ogni fase (pre, pro, post) risolve la catena sul path corrente
//!    all'inizio della fase ed esegue gli step in ordine
//! 3. Al primo step fallito logga l'errore e si ferma: nessun cleanup
//! 4. Se tutto riesce ripristina i timestamp sul file finale e sposta i
//!    file superati nella holding directory
//!
//! Il risultato viene sempre restituito, anche in caso di fallimento.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, warn};

use crate::{
    error::Result,
    file_manager::{FileManager, HoldingArea},
    progress::{OptimizedImage, PipelineStatus},
    registry::{OptimizerRegistry, Phase},
    steps::ToolSettings,
};

/// Runs the three-phase pipeline for one file at a time
#[derive(Clone)]
pub struct TaskOptimizer {
    registry: Arc<OptimizerRegistry>,
    settings: Arc<ToolSettings>,
    holding: Arc<HoldingArea>,
}

impl TaskOptimizer {
    pub fn new(registry: Arc<OptimizerRegistry>, settings: ToolSettings, holding: HoldingArea) -> Self {
        Self {
            registry,
            settings: Arc::new(settings),
            holding: Arc::new(holding),
        }
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Processa un singolo file
    pub async fn process_single_file(&self, file_path: PathBuf) -> OptimizedImage {
        let (original_size, mtime) = match FileManager::get_file_info(&file_path).await {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to read '{}': {}", file_path.display(), e);
                return OptimizedImage {
                    final_path: file_path,
                    original_size: 0,
                    final_size: 0,
                    status: PipelineStatus::Failed,
                };
            }
        };

        let mut current = file_path;
        let mut superseded = Vec::new();

        let status = match self.run_phases(&mut current, &mut superseded).await {
            Ok(()) => {
                self.finalize(&current, mtime, superseded).await;
                PipelineStatus::Succeeded
            }
            Err(e) => {
                error!("{}", e);
                PipelineStatus::Failed
            }
        };

        let final_size = match FileManager::get_file_info(&current).await {
            Ok((size, _)) => size,
            Err(e) => {
                warn!("Failed to read final size of '{}': {}", current.display(), e);
                0
            }
        };

        OptimizedImage {
            final_path: current,
            original_size,
            final_size,
            status,
        }
    }

    /// Run every phase, keeping `current` at the last good path
    async fn run_phases(&self, current: &mut PathBuf, superseded: &mut Vec<PathBuf>) -> Result<()> {
        for phase in Phase::ALL {
            let chain = self.registry.resolve_chain(phase, current);
            if !chain.is_empty() {
                debug!("{} '{}': {} steps", phase, current.display(), chain.len());
            }

            for step in chain {
                let outcome = step.optimize(current, &self.settings).await?;
                if !outcome.success {
                    return Err(outcome.into_error(step.name(), current));
                }

                if let Some(path) = outcome.superseded_path {
                    superseded.push(path);
                }
                *current = outcome.resulting_path;
            }
        }
        Ok(())
    }

    /// Restore timestamps and move superseded intermediates away.
    /// Problems here do not change the file's status.
    async fn finalize(&self, current: &Path, mtime: SystemTime, mut superseded: Vec<PathBuf>) {
        if let Err(e) = FileManager::restore_timestamps(current, mtime).await {
            warn!("Failed to restore timestamps on '{}': {}", current.display(), e);
        }

        superseded.sort();
        superseded.dedup();

        for path in superseded.iter().filter(|p| p.as_path() != current) {
            match tokio::fs::try_exists(path).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Failed to check '{}': {}", path.display(), e);
                    continue;
                }
            }
            if let Err(e) = self.holding.relocate(path).await {
                warn!("Failed to move '{}' to the holding area: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{ImageFixer, Optimizer, StepOutcome};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    /// Writes a smaller sibling with the given extension and supersedes the input
    struct Shrink(&'static str);

    impl Optimizer for Shrink {
        fn name(&self) -> &'static str {
            "Shrink"
        }

        fn optimize<'a>(
            &'a self,
            image: &'a Path,
            _settings: &'a ToolSettings,
        ) -> BoxFuture<'a, Result<StepOutcome>> {
            async move {
                let target = image.with_extension(self.0);
                let data = tokio::fs::read(image).await?;
                tokio::fs::write(&target, &data[..data.len() / 2]).await?;
                Ok(StepOutcome::converted(target, image))
            }
            .boxed()
        }
    }

    struct Fail;

    impl Optimizer for Fail {
        fn name(&self) -> &'static str {
            "Fail"
        }

        fn optimize<'a>(
            &'a self,
            image: &'a Path,
            _settings: &'a ToolSettings,
        ) -> BoxFuture<'a, Result<StepOutcome>> {
            async move { Ok(StepOutcome::failed(image, Some(2), "broken stream")) }.boxed()
        }
    }

    /// Records the paths it was given
    struct Record(Arc<Mutex<Vec<PathBuf>>>);

    impl Optimizer for Record {
        fn name(&self) -> &'static str {
            "Record"
        }

        fn optimize<'a>(
            &'a self,
            image: &'a Path,
            _settings: &'a ToolSettings,
        ) -> BoxFuture<'a, Result<StepOutcome>> {
            self.0.lock().unwrap().push(image.to_path_buf());
            async move { Ok(StepOutcome::in_place(image)) }.boxed()
        }
    }

    /// Counts ERROR events seen by the current thread's subscriber
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn task(registry: OptimizerRegistry, dir: &Path) -> TaskOptimizer {
        TaskOptimizer::new(
            Arc::new(registry),
            ToolSettings::default(),
            HoldingArea::new(dir.join("deleted-images")),
        )
    }

    async fn set_old_mtime(path: &Path) -> SystemTime {
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        FileManager::restore_timestamps(path, mtime).await.unwrap();
        mtime
    }

    #[tokio::test]
    async fn test_successful_conversion_relocates_superseded_file() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("photo.png");
        std::fs::write(&image, vec![7u8; 1000]).unwrap();
        let mtime = set_old_mtime(&image).await;

        let mut registry = OptimizerRegistry::new();
        registry.register_processor("png", Shrink("bmp"));

        let result = task(registry, temp_dir.path()).process_single_file(image.clone()).await;

        let converted = temp_dir.path().join("photo.bmp");
        assert_eq!(result.status, PipelineStatus::Succeeded);
        assert_eq!(result.final_path, converted);
        assert_eq!(result.original_size, 1000);
        assert_eq!(result.final_size, 500);
        assert!(!image.exists());
        assert!(temp_dir.path().join("deleted-images").join("photo.png").exists());
        assert_eq!(std::fs::metadata(&converted).unwrap().modified().unwrap(), mtime);
    }

    #[tokio::test]
    async fn test_failure_keeps_intermediates_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("photo.png");
        std::fs::write(&image, vec![1u8; 400]).unwrap();

        let mut registry = OptimizerRegistry::new();
        registry.register_processor("png", Shrink("bmp"));
        registry.register_postprocessor(None, Fail);

        let result = task(registry, temp_dir.path()).process_single_file(image.clone()).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.final_path, temp_dir.path().join("photo.bmp"));
        assert_eq!(result.final_size, 200);
        assert!(image.exists());
        assert!(!temp_dir.path().join("deleted-images").exists());
    }

    #[tokio::test]
    async fn test_failed_step_is_logged_once() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("photo.png");
        std::fs::write(&image, vec![3u8; 100]).unwrap();

        let mut registry = OptimizerRegistry::new();
        registry.register_processor("png", Shrink("bmp"));
        registry.register_postprocessor(None, Fail);
        registry.register_postprocessor(None, Fail);

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let result = task(registry, temp_dir.path()).process_single_file(image).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_pipeline_logs_no_errors() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("photo.png");
        std::fs::write(&image, vec![3u8; 100]).unwrap();

        let mut registry = OptimizerRegistry::new();
        registry.register_processor("png", Shrink("bmp"));

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let result = task(registry, temp_dir.path()).process_single_file(image).await;

        assert_eq!(result.status, PipelineStatus::Succeeded);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_follows_corrected_extension() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("mislabelled.jpg");
        std::fs::write(&image, PNG_BYTES).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = OptimizerRegistry::new();
        registry.register_preprocessor(None, ImageFixer);
        registry.register_processor("png", Record(seen.clone()));
        registry.register_processor("jpg", Fail);

        let result = task(registry, temp_dir.path()).process_single_file(image).await;

        let renamed = temp_dir.path().join("mislabelled.png");
        assert_eq!(result.status, PipelineStatus::Succeeded);
        assert_eq!(result.final_path, renamed);
        assert_eq!(*seen.lock().unwrap(), vec![renamed]);
    }

    #[tokio::test]
    async fn test_unregistered_file_passes_through() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("data.tiff");
        std::fs::write(&image, b"not an image").unwrap();

        let registry = OptimizerRegistry::new();
        let result = task(registry, temp_dir.path()).process_single_file(image.clone()).await;

        assert_eq!(result.status, PipelineStatus::Succeeded);
        assert_eq!(result.final_path, image);
        assert_eq!(result.size_delta(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_reported_as_failed() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("gone.png");

        let result = task(OptimizerRegistry::new(), temp_dir.path())
            .process_single_file(image.clone())
            .await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.final_path, image);
        assert_eq!((result.original_size, result.final_size), (0, 0));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("twice.jpg");
        std::fs::write(&image, PNG_BYTES).unwrap();

        let mut registry = OptimizerRegistry::new();
        registry.register_preprocessor(None, ImageFixer);
        let task = task(registry, temp_dir.path());

        let first = task.process_single_file(image).await;
        let second = task.process_single_file(first.final_path.clone()).await;

        assert_eq!(first.final_path, second.final_path);
        assert_eq!(second.size_delta(), 0);
        assert!(!temp_dir.path().join("deleted-images").exists());
    }
}
