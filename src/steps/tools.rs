//! Wrappers around the external optimizers.
//!
//! Each wrapper runs exactly one process. In-place tools report the input
//! path unchanged; converters write a sibling file with a substituted
//! extension and supersede their input.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{run_tool, Optimizer, StepOutcome, ToolSettings};
use crate::args;
use crate::error::Result;

/// Lossless PNG recompression, fixing recoverable errors and keeping metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct Oxipng;

impl Oxipng {
    pub fn command_args(&self, image: &Path, settings: &ToolSettings) -> Vec<OsString> {
        args![
            format!("--opt={}", settings.oxipng_level),
            "--preserve",
            "--filters",
            "0-9",
            "--fix",
            format!("--threads={}", settings.threads_per_image),
            image,
        ]
    }
}

impl Optimizer for Oxipng {
    fn name(&self) -> &'static str {
        "Oxipng"
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some("oxipng")
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        run_tool("oxipng", self.command_args(image, settings), image.to_path_buf(), None).boxed()
    }
}

/// Lossless JPEG recompression in place
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegOptim;

impl JpegOptim {
    pub fn command_args(&self, image: &Path) -> Vec<OsString> {
        args!["--preserve", image]
    }
}

impl Optimizer for JpegOptim {
    fn name(&self) -> &'static str {
        "JpegOptim"
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some("jpegoptim")
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        _settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        run_tool("jpegoptim", self.command_args(image), image.to_path_buf(), None).boxed()
    }
}

/// Decodes a lossy JPEG into a smoothed, lossless PNG
#[derive(Debug, Default, Clone, Copy)]
pub struct Jpeg2Png;

impl Jpeg2Png {
    pub fn target(&self, image: &Path) -> PathBuf {
        image.with_extension("png")
    }

    pub fn command_args(&self, image: &Path, target: &Path, settings: &ToolSettings) -> Vec<OsString> {
        args![
            "--threads",
            settings.threads_per_image.to_string(),
            image,
            "--output",
            target,
        ]
    }
}

impl Optimizer for Jpeg2Png {
    fn name(&self) -> &'static str {
        "Jpeg2Png"
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some("jpeg2png")
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        async move {
            let target = self.target(image);
            settings.targets.claim(image, &target).await?;
            let args = self.command_args(image, &target, settings);
            run_tool("jpeg2png", args, target, Some(image.to_path_buf())).await
        }
        .boxed()
    }
}

/// Decodes WEBP into PNG
#[derive(Debug, Default, Clone, Copy)]
pub struct DWebp;

impl DWebp {
    pub fn target(&self, image: &Path) -> PathBuf {
        image.with_extension("png")
    }

    pub fn command_args(&self, image: &Path, target: &Path) -> Vec<OsString> {
        args![image, "-o", target]
    }
}

impl Optimizer for DWebp {
    fn name(&self) -> &'static str {
        "DWebp"
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some("dwebp")
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        async move {
            let target = self.target(image);
            settings.targets.claim(image, &target).await?;
            let args = self.command_args(image, &target);
            run_tool("dwebp", args, target, Some(image.to_path_buf())).await
        }
        .boxed()
    }
}

/// Re-encodes anything that reaches the post-processing phase as JPEG XL
#[derive(Debug, Default, Clone, Copy)]
pub struct Cjxl;

impl Cjxl {
    pub fn target(&self, image: &Path) -> PathBuf {
        image.with_extension("jxl")
    }

    pub fn command_args(&self, image: &Path, target: &Path, settings: &ToolSettings) -> Vec<OsString> {
        args![
            "-d",
            settings.jxl_distance.to_string(),
            "-e",
            settings.jxl_effort.to_string(),
            image,
            target,
        ]
    }
}

impl Optimizer for Cjxl {
    fn name(&self) -> &'static str {
        "CJXL"
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some("cjxl")
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        async move {
            let target = self.target(image);
            settings.targets.claim(image, &target).await?;
            let args = self.command_args(image, &target, settings);
            run_tool("cjxl", args, target, Some(image.to_path_buf())).await
        }
        .boxed()
    }
}
