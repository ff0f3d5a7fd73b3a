//! Extension correction based on file signatures.

use futures::future::BoxFuture;
use futures::FutureExt;
use image::ImageFormat;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{Optimizer, StepOutcome, ToolSettings};
use crate::error::Result;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47];
const WEBP_START: &[u8] = &[0x52, 0x49, 0x46, 0x46];
const WEBP_END: &[u8] = &[0x57, 0x45, 0x42, 0x50];

/// Bytes needed to tell every supported signature apart.
/// Must cover the RIFF/WEBP pair, which ends at offset 12.
pub const HEADER_LENGTH: usize = 12;

/// Identify an image format from the first bytes of a file
pub fn detect_format(header: &[u8]) -> Option<ImageFormat> {
    if header.starts_with(JPEG) {
        Some(ImageFormat::Jpeg)
    } else if header.starts_with(PNG) {
        Some(ImageFormat::Png)
    } else if header.len() >= HEADER_LENGTH && &header[0..4] == WEBP_START && &header[8..12] == WEBP_END {
        Some(ImageFormat::WebP)
    } else {
        None
    }
}

/// Renames files whose extension does not match their content.
///
/// The rename does not leave a duplicate behind, so nothing is superseded.
/// A file whose extension already names the detected format (`.jpeg` for
/// JPEG data, `.PNG` for PNG data) is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFixer;

impl ImageFixer {
    async fn fix(&self, image: &Path, settings: &ToolSettings) -> Result<StepOutcome> {
        let mut header = Vec::with_capacity(HEADER_LENGTH);
        tokio::fs::File::open(image)
            .await?
            .take(HEADER_LENGTH as u64)
            .read_to_end(&mut header)
            .await?;

        let Some(format) = detect_format(&header) else {
            return Ok(StepOutcome::in_place(image));
        };

        let current = image.extension().and_then(ImageFormat::from_extension);
        if current == Some(format) {
            return Ok(StepOutcome::in_place(image));
        }

        // Everything expects ".jpg" rather than ".jpeg"
        let extension = format.extensions_str()[0];
        let target = image.with_extension(extension);

        settings.targets.claim(image, &target).await?;
        debug!("Found bad file extension: '{}' -> '{}'", image.display(), target.display());
        tokio::fs::rename(image, &target).await?;

        Ok(StepOutcome::in_place(target))
    }
}

impl Optimizer for ImageFixer {
    fn name(&self) -> &'static str {
        "ImageFixer"
    }

    fn optimize<'a>(
        &'a self,
        image: &'a Path,
        settings: &'a ToolSettings,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        self.fix(image, settings).boxed()
    }
}
