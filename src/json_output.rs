//! # JSON Output Module
//!
//! Output strutturato in JSON del report finale, per chi invoca il tool da script.
//!
//! ## Tipi di messaggi:
//! - `complete`: batch terminato, con il risultato di ogni file
//! - `interrupted`: batch interrotto, con i soli file completati

use serde::Serialize;

use crate::progress::{OptimizationStats, OptimizedImage};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage<'a> {
    #[serde(rename = "complete")]
    Complete {
        stats: OptimizationStats,
        summary: String,
        files: &'a [OptimizedImage],
    },

    #[serde(rename = "interrupted")]
    Interrupted {
        stats: OptimizationStats,
        summary: String,
        cancelled: usize,
        files: &'a [OptimizedImage],
    },
}

impl<'a> JsonMessage<'a> {
    pub fn complete(files: &'a [OptimizedImage]) -> Self {
        let stats = OptimizationStats::from_images(files);
        Self::Complete {
            summary: stats.format_summary(),
            stats,
            files,
        }
    }

    pub fn interrupted(files: &'a [OptimizedImage], cancelled: usize) -> Self {
        let stats = OptimizationStats::from_images(files);
        Self::Interrupted {
            summary: stats.format_summary(),
            stats,
            cancelled,
            files,
        }
    }

    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::PipelineStatus;
    use std::path::PathBuf;

    #[test]
    fn test_complete_message_shape() {
        let files = vec![OptimizedImage {
            final_path: PathBuf::from("dir/a.png"),
            original_size: 200,
            final_size: 150,
            status: PipelineStatus::Succeeded,
        }];

        let value = serde_json::to_value(JsonMessage::complete(&files)).unwrap();

        assert_eq!(value["type"], "complete");
        assert_eq!(value["stats"]["total_original_size"], 200);
        assert_eq!(value["files"][0]["final_path"], "dir/a.png");
        assert_eq!(value["files"][0]["status"], "succeeded");
    }

    #[test]
    fn test_interrupted_message_reports_cancelled() {
        let value = serde_json::to_value(JsonMessage::interrupted(&[], 3)).unwrap();

        assert_eq!(value["type"], "interrupted");
        assert_eq!(value["cancelled"], 3);
        assert_eq!(value["stats"]["files_processed"], 0);
    }
}
