//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce la progress bar e le statistiche aggregate del batch.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` aggiornata dal polling loop
//! - `OptimizedImage`: risultato per file (path finale, dimensioni, esito)
//! - `OptimizationStats`: totali, delta con segno e percentuale di variazione
//!
//! ## Report finale:
//! ```text
//! 488.28 KiB -> 468.75 KiB (-19.53 KiB | -4.00%)
//! ```
//! Se la dimensione totale cresce il delta è prefissato con `+` e la
//! percentuale è `delta / originale`; altrimenti con `-` e la percentuale è
//! `100 - finale / originale * 100`.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::file_manager::FileManager;

/// Manages the batch progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("Progress [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that draws nothing
    pub fn hidden(total_files: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_files);
        Self { bar }
    }

    /// Move the bar to an absolute number of completed files
    pub fn set_completed(&self, completed: u64) {
        self.bar.set_position(completed);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop drawing, leaving the bar where it is
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

/// Outcome of a file's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Succeeded,
    Failed,
}

/// Per-file result, reported whether the pipeline succeeded or not
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedImage {
    /// Path valid after the pipeline; the last good path when a step failed
    pub final_path: PathBuf,
    pub original_size: u64,
    pub final_size: u64,
    pub status: PipelineStatus,
}

impl OptimizedImage {
    pub fn size_delta(&self) -> i64 {
        self.final_size as i64 - self.original_size as i64
    }

    pub fn succeeded(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }
}

/// Aggregate totals over a batch
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct OptimizationStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub total_original_size: u64,
    pub total_final_size: u64,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_images(images: &[OptimizedImage]) -> Self {
        let mut stats = Self::new();
        for image in images {
            stats.add(image);
        }
        stats
    }

    pub fn add(&mut self, image: &OptimizedImage) {
        self.files_processed += 1;
        if !image.succeeded() {
            self.files_failed += 1;
        }
        self.total_original_size += image.original_size;
        self.total_final_size += image.final_size;
    }

    pub fn size_delta(&self) -> i64 {
        self.total_final_size as i64 - self.total_original_size as i64
    }

    /// Percentage magnitude of the change, always non-negative
    pub fn delta_percent(&self) -> f64 {
        if self.total_original_size == 0 {
            return 0.0;
        }

        let original = self.total_original_size as f64;
        if self.size_delta() > 0 {
            self.size_delta() as f64 / original * 100.0
        } else {
            100.0 - self.total_final_size as f64 / original * 100.0
        }
    }

    pub fn format_summary(&self) -> String {
        let sign = if self.size_delta() > 0 { "+" } else { "-" };

        format!(
            "{} -> {} ({}{} | {}{:.2}%)",
            FileManager::format_size(self.total_original_size as i64),
            FileManager::format_size(self.total_final_size as i64),
            sign,
            FileManager::format_size(self.size_delta().abs()),
            sign,
            self.delta_percent()
        )
    }
}
