//! # Tool Path Resolver
//!
//! Locates the external optimizers on the search path so that a missing
//! binary is reported before any file is touched.

use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Resolves tool names against a list of directories
pub struct ToolPathResolver {
    search_path: Vec<PathBuf>,
}

impl ToolPathResolver {
    /// Resolver over the directories listed in `PATH`
    pub fn new() -> Self {
        let search_path = env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self { search_path }
    }

    /// Resolver over an explicit list of directories
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        let file_name = format!("{}{}", tool_name, extension);

        let found = self
            .search_path
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file());

        match &found {
            Some(path) => debug!("Resolved tool: {} -> {:?}", tool_name, path),
            None => debug!("Tool not found: {}", tool_name),
        }
        found
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Installation hint shown when a tool is missing
    pub fn install_instructions(&self, tool_name: &str) -> String {
        match tool_name {
            "oxipng" => "cargo install oxipng  # or your distribution's oxipng package".to_string(),
            "jpegoptim" => "sudo apt-get install jpegoptim".to_string(),
            "jpeg2png" => "build from https://github.com/victorvde/jpeg2png".to_string(),
            "dwebp" => "sudo apt-get install webp".to_string(),
            "cjxl" => "sudo apt-get install libjxl-tools".to_string(),
            _ => format!("sudo apt-get install {}", tool_name),
        }
    }

    /// Check if a tool is available and provide installation instructions if not
    pub fn check_tool_with_instructions(&self, tool_name: &str) -> Result<PathBuf, String> {
        self.resolve_tool(tool_name).ok_or_else(|| {
            format!(
                "Tool '{}' not found in PATH (install with: {})",
                tool_name,
                self.install_instructions(tool_name)
            )
        })
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_tool_in_search_path() {
        let temp_dir = TempDir::new().unwrap();
        let name = if cfg!(windows) { "oxipng.exe" } else { "oxipng" };
        std::fs::write(temp_dir.path().join(name), b"#!/bin/sh\n").unwrap();

        let resolver = ToolPathResolver::with_search_path(vec![temp_dir.path().to_path_buf()]);

        assert_eq!(resolver.resolve_tool("oxipng"), Some(temp_dir.path().join(name)));
        assert!(!resolver.is_tool_available("cjxl"));
    }

    #[test]
    fn test_directories_are_not_tools() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("dwebp")).unwrap();

        let resolver = ToolPathResolver::with_search_path(vec![temp_dir.path().to_path_buf()]);
        assert!(!resolver.is_tool_available("dwebp"));
    }

    #[test]
    fn test_missing_tool_message_has_instructions() {
        let resolver = ToolPathResolver::with_search_path(Vec::new());
        let message = resolver.check_tool_with_instructions("jpegoptim").unwrap_err();
        assert!(message.contains("jpegoptim"));
        assert!(message.contains("apt-get install jpegoptim"));
    }
}
