//! # Optimizer Module
//!
//! Separa le responsabilità in sottomoduli:
//! - `media_optimizer`: orchestratore del batch (pool, interruzione)
//! - `task_optimizer`: pipeline a tre fasi per un singolo file
//! - `progress_tracker`: polling dei task e progress bar

pub mod media_optimizer;
pub mod progress_tracker;
pub mod task_optimizer;

pub use media_optimizer::{adaptive_threads_per_image, MediaOptimizer};
pub use progress_tracker::ProgressTracker;
pub use task_optimizer::TaskOptimizer;
