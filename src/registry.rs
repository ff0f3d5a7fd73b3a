//! # Optimizer Registry Module
//!
//! Questo modulo mappa ogni tipo di file alle catene di step da eseguire.
//!
//! ## Responsabilità:
//! - Registrazione di preprocessor, processor e postprocessor per tag di tipo
//! - Tier wildcard (`None`) applicato a ogni file prima degli step specifici
//! - Tabella alias (es. `jpg` → `jpeg`) risolta con un solo salto
//! - Ricette fisse per le modalità `safe`, `quality` e `jxl`
//! - Verifica che tutti i binari richiesti siano installati prima di iniziare
//!
//! ## Risoluzione:
//! Il tag viene dall'estensione (minuscola, senza punto), passa per la tabella
//! alias e la catena è `wildcard + specifici` per la fase richiesta.
//! Un tag non registrato produce una catena vuota, non un errore.
//!
//! ## Esempio:
//! ```rust
//! use std::path::Path;
//! use opti_dir::registry::{OptimizationMode, OptimizerRegistry, Phase};
//!
//! let registry = OptimizerRegistry::for_mode(OptimizationMode::Safe);
//! let chain = registry.resolve_chain(Phase::Process, Path::new("photo.jpg"));
//! assert_eq!(chain[0].name(), "JpegOptim");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{OptiError, Result};
use crate::steps::{Cjxl, DWebp, ImageFixer, Jpeg2Png, JpegOptim, Optimizer, Oxipng};
use crate::tool_resolver::ToolPathResolver;

pub type SharedOptimizer = Arc<dyn Optimizer>;

/// The three ordered stages of a file's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Preprocess,
    Process,
    Postprocess,
}

impl Phase {
    /// Execution order
    pub const ALL: [Phase; 3] = [Phase::Preprocess, Phase::Process, Phase::Postprocess];

    fn index(self) -> usize {
        match self {
            Phase::Preprocess => 0,
            Phase::Process => 1,
            Phase::Postprocess => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Preprocess => "preprocess",
            Phase::Process => "process",
            Phase::Postprocess => "postprocess",
        };
        f.write_str(label)
    }
}

/// Registry recipe selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    /// Fixer plus lossless PNG/JPEG recompression, no format conversion
    Safe,
    /// Converts JPEG and WEBP to optimized PNG
    Quality,
    /// Quality mode plus a final JPEG XL encode of every file
    Jxl,
}

#[derive(Default)]
struct PhaseTable {
    any: Vec<SharedOptimizer>,
    by_tag: HashMap<String, Vec<SharedOptimizer>>,
}

impl PhaseTable {
    fn register(&mut self, file_type: Option<&str>, step: SharedOptimizer) {
        match file_type {
            None => self.any.push(step),
            Some(tag) => self.by_tag.entry(normalize_tag(tag)).or_default().push(step),
        }
    }

    fn chain(&self, tag: Option<&str>) -> Vec<SharedOptimizer> {
        let mut chain = self.any.clone();
        if let Some(steps) = tag.and_then(|t| self.by_tag.get(t)) {
            chain.extend(steps.iter().cloned());
        }
        chain
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim_start_matches('.').to_lowercase()
}

/// Maps file type tags to ordered step lists for each phase
#[derive(Default)]
pub struct OptimizerRegistry {
    phases: [PhaseTable; 3],
    aliases: HashMap<String, String>,
}

impl OptimizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for one of the fixed recipes
    pub fn for_mode(mode: OptimizationMode) -> Self {
        let mut registry = Self::new();

        registry.register_preprocessor(None, ImageFixer);

        registry.register_processor("png", Oxipng);

        if mode == OptimizationMode::Safe {
            registry.register_processor("jpeg", JpegOptim);
        } else {
            registry.register_processor("jpeg", Jpeg2Png);
            registry.register_processor("jpeg", Oxipng);
        }
        registry.register_alias("jpeg", "jpg");

        if mode != OptimizationMode::Safe {
            registry.register_processor("webp", DWebp);
            registry.register_processor("webp", Oxipng);
        }

        if mode == OptimizationMode::Jxl {
            registry.register_postprocessor(None, Cjxl);
        }

        registry
    }

    /// `None` registers a wildcard step that runs for every file
    pub fn register_preprocessor(&mut self, file_type: Option<&str>, step: impl Optimizer + 'static) {
        self.phases[Phase::Preprocess.index()].register(file_type, Arc::new(step));
    }

    pub fn register_processor(&mut self, file_type: &str, step: impl Optimizer + 'static) {
        self.phases[Phase::Process.index()].register(Some(file_type), Arc::new(step));
    }

    /// `None` registers a wildcard step that runs for every file
    pub fn register_postprocessor(&mut self, file_type: Option<&str>, step: impl Optimizer + 'static) {
        self.phases[Phase::Postprocess.index()].register(file_type, Arc::new(step));
    }

    /// Make `alias` resolve to the chains registered under `base`
    pub fn register_alias(&mut self, base: &str, alias: &str) {
        self.aliases.insert(normalize_tag(alias), normalize_tag(base));
    }

    /// Canonical tag for a path: lowercased extension, resolved through one alias hop
    pub fn canonical_tag(&self, image: &Path) -> Option<String> {
        let extension = image.extension()?.to_string_lossy().to_lowercase();
        Some(self.aliases.get(&extension).cloned().unwrap_or(extension))
    }

    /// Wildcard steps followed by the steps registered for the file's tag
    pub fn resolve_chain(&self, phase: Phase, image: &Path) -> Vec<SharedOptimizer> {
        let tag = self.canonical_tag(image);
        self.phases[phase.index()].chain(tag.as_deref())
    }

    /// Every tag with at least one registration, aliases included
    pub fn registered_file_types(&self) -> BTreeSet<String> {
        self.phases
            .iter()
            .flat_map(|table| table.by_tag.keys().cloned())
            .chain(self.aliases.keys().cloned())
            .collect()
    }

    pub fn alias_target(&self, file_type: &str) -> Option<&str> {
        self.aliases.get(file_type).map(String::as_str)
    }

    /// Whether a path's extension is one the registry knows about
    pub fn accepts(&self, image: &Path) -> bool {
        image
            .extension()
            .map(|ext| {
                self.registered_file_types()
                    .contains(&ext.to_string_lossy().to_lowercase())
            })
            .unwrap_or(false)
    }

    /// Binaries needed by any registered step
    pub fn required_tools(&self) -> BTreeSet<&'static str> {
        self.phases
            .iter()
            .flat_map(|table| table.any.iter().chain(table.by_tag.values().flatten()))
            .filter_map(|step| step.required_tool())
            .collect()
    }

    /// Fail before touching any file when a required binary is missing
    pub fn verify_tools(&self, resolver: &ToolPathResolver) -> Result<()> {
        let missing: Vec<String> = self
            .required_tools()
            .into_iter()
            .filter_map(|tool| resolver.check_tool_with_instructions(tool).err())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OptiError::ToolUnavailable(missing))
        }
    }

    /// Verbose dump of aliases and per-tag chains
    pub fn describe(&self) {
        let file_types = self.registered_file_types();
        debug!(
            "registered file types: {}",
            file_types.iter().cloned().collect::<Vec<_>>().join(", ")
        );

        debug!("aliases:");
        for file_type in file_types.iter().filter(|t| self.alias_target(t).is_some()) {
            debug!("\t{} ==> {}", file_type, self.alias_target(file_type).unwrap_or_default());
        }

        for file_type in file_types.iter().filter(|t| self.alias_target(t).is_none()) {
            let sample = format!("a.{}", file_type);
            let names = |phase| {
                self.resolve_chain(phase, Path::new(&sample))
                    .iter()
                    .map(|step| step.name())
                    .collect::<Vec<_>>()
            };

            debug!("|> {}:", file_type);
            debug!("\tpre : {:?}", names(Phase::Preprocess));
            debug!("\tpro : {:?}", names(Phase::Process));
            debug!("\tpost: {:?}", names(Phase::Postprocess));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{StepOutcome, ToolSettings};
    use futures::future::BoxFuture;
    use futures::FutureExt;

    struct Named(&'static str);

    impl Optimizer for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn optimize<'a>(
            &'a self,
            image: &'a Path,
            _settings: &'a ToolSettings,
        ) -> BoxFuture<'a, Result<StepOutcome>> {
            async move { Ok(StepOutcome::in_place(image)) }.boxed()
        }
    }

    fn names(chain: &[SharedOptimizer]) -> Vec<&'static str> {
        chain.iter().map(|step| step.name()).collect()
    }

    #[test]
    fn test_wildcard_steps_come_first() {
        let mut registry = OptimizerRegistry::new();
        registry.register_preprocessor(Some("png"), Named("png-pre-1"));
        registry.register_preprocessor(None, Named("any-pre-1"));
        registry.register_preprocessor(Some("png"), Named("png-pre-2"));
        registry.register_preprocessor(None, Named("any-pre-2"));

        let chain = registry.resolve_chain(Phase::Preprocess, Path::new("x.png"));
        assert_eq!(names(&chain), vec!["any-pre-1", "any-pre-2", "png-pre-1", "png-pre-2"]);
    }

    #[test]
    fn test_alias_resolves_one_hop() {
        let mut registry = OptimizerRegistry::new();
        registry.register_processor("jpeg", Named("jpeg-step"));
        registry.register_alias("jpeg", "jpg");

        let via_alias = registry.resolve_chain(Phase::Process, Path::new("a.jpg"));
        let direct = registry.resolve_chain(Phase::Process, Path::new("a.jpeg"));
        assert_eq!(names(&via_alias), vec!["jpeg-step"]);
        assert_eq!(names(&direct), vec!["jpeg-step"]);
    }

    #[test]
    fn test_alias_is_not_transitive() {
        let mut registry = OptimizerRegistry::new();
        registry.register_processor("jpeg", Named("jpeg-step"));
        registry.register_alias("jpeg", "jpg");
        registry.register_alias("jpg", "jfif");

        let chain = registry.resolve_chain(Phase::Process, Path::new("a.jfif"));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let mut registry = OptimizerRegistry::new();
        registry.register_processor("PNG", Named("png-step"));

        let chain = registry.resolve_chain(Phase::Process, Path::new("SHOUT.Png"));
        assert_eq!(names(&chain), vec!["png-step"]);
    }

    #[test]
    fn test_unregistered_tag_yields_empty_chains() {
        let registry = OptimizerRegistry::for_mode(OptimizationMode::Quality);
        let image = Path::new("archive.tar");

        assert_eq!(names(&registry.resolve_chain(Phase::Preprocess, image)), vec!["ImageFixer"]);
        assert!(registry.resolve_chain(Phase::Process, image).is_empty());
        assert!(registry.resolve_chain(Phase::Postprocess, image).is_empty());
    }

    #[test]
    fn test_safe_mode_recipe() {
        let registry = OptimizerRegistry::for_mode(OptimizationMode::Safe);

        assert_eq!(
            registry.registered_file_types().into_iter().collect::<Vec<_>>(),
            vec!["jpeg", "jpg", "png"]
        );
        assert_eq!(names(&registry.resolve_chain(Phase::Process, Path::new("a.png"))), vec!["Oxipng"]);
        assert_eq!(names(&registry.resolve_chain(Phase::Process, Path::new("a.jpg"))), vec!["JpegOptim"]);
        assert!(registry.resolve_chain(Phase::Process, Path::new("a.webp")).is_empty());
        assert!(registry.resolve_chain(Phase::Postprocess, Path::new("a.png")).is_empty());
        assert_eq!(
            registry.required_tools().into_iter().collect::<Vec<_>>(),
            vec!["jpegoptim", "oxipng"]
        );
    }

    #[test]
    fn test_quality_mode_recipe() {
        let registry = OptimizerRegistry::for_mode(OptimizationMode::Quality);

        assert_eq!(
            names(&registry.resolve_chain(Phase::Process, Path::new("a.jpeg"))),
            vec!["Jpeg2Png", "Oxipng"]
        );
        assert_eq!(
            names(&registry.resolve_chain(Phase::Process, Path::new("a.webp"))),
            vec!["DWebp", "Oxipng"]
        );
        assert!(registry.resolve_chain(Phase::Postprocess, Path::new("a.png")).is_empty());
        assert!(registry.registered_file_types().contains("webp"));
    }

    #[test]
    fn test_jxl_mode_appends_wildcard_postprocessor() {
        let registry = OptimizerRegistry::for_mode(OptimizationMode::Jxl);

        for file in ["a.png", "a.jpg", "a.webp", "a.unknown"] {
            let chain = registry.resolve_chain(Phase::Postprocess, Path::new(file));
            assert_eq!(names(&chain), vec!["CJXL"]);
        }
        assert!(registry.required_tools().contains("cjxl"));
    }

    #[test]
    fn test_accepts_registered_extensions_only() {
        let registry = OptimizerRegistry::for_mode(OptimizationMode::Safe);
        assert!(registry.accepts(Path::new("a.JPG")));
        assert!(registry.accepts(Path::new("a.png")));
        assert!(!registry.accepts(Path::new("a.webp")));
        assert!(!registry.accepts(Path::new("README")));
    }

    #[test]
    fn test_verify_tools_reports_missing_binaries() {
        let registry = OptimizerRegistry::for_mode(OptimizationMode::Jxl);
        let resolver = ToolPathResolver::with_search_path(Vec::new());

        match registry.verify_tools(&resolver) {
            Err(OptiError::ToolUnavailable(missing)) => {
                assert_eq!(missing.len(), 4);
                assert!(missing.iter().any(|m| m.contains("cjxl")));
            }
            _ => panic!("expected missing tools"),
        }
    }
}
