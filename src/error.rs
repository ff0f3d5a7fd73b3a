//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore della pipeline di ottimizzazione.
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, rename falliti)
//! - `StepFailed`: Un tool esterno è uscito con codice diverso da zero
//! - `ToolUnavailable`: Binari richiesti mancanti, il run viene interrotto prima di toccare file
//! - `Collision`: Un rename/conversione sovrascriverebbe un altro file
//! - `Interrupted`: Interruzione richiesta dall'operatore, porta con sé i risultati completati
//! - `Config`: Parametri di configurazione non validi
//!
//! ## Politica di propagazione:
//! - Gli errori di un singolo file vengono loggati e assorbiti dalla pipeline
//! - Solo `Interrupted` e `ToolUnavailable` interrompono l'intero batch

use std::path::PathBuf;

use crate::progress::OptimizedImage;

/// Custom error types for image optimization
#[derive(thiserror::Error, Debug)]
pub enum OptiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Step {step} on '{}' has failed with {}: {diagnostic}", .image.display(), format_code(.code))]
    StepFailed {
        step: &'static str,
        image: PathBuf,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("Required tools are missing:\n{}", .0.join("\n"))]
    ToolUnavailable(Vec<String>),

    #[error("Refusing to overwrite '{}' while processing '{}'", .target.display(), .image.display())]
    Collision { image: PathBuf, target: PathBuf },

    #[error("Interrupted: {} files completed, {cancelled} cancelled", .completed.len())]
    Interrupted {
        completed: Vec<OptimizedImage>,
        cancelled: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, OptiError>;
