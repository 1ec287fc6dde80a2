//! Presentation sinks.
//!
//! The pipeline pushes one `CompositeResult` per successful tick. What a sink
//! does with it (texture upload, file dump, hand-off to a UI thread) is up to
//! the sink; the pipeline expects nothing back.

use anyhow::{Context, Result};
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::frame::CompositeResult;
use crate::slot::LatestValueSlot;

pub trait PresentationSink: Send {
    fn present(&mut self, result: &CompositeResult);
}

/// Keeps the newest composite for a display surface to pick up.
///
/// Readers `peek` the shared slot; they never take the value away, so the last
/// composite stays visible across skipped or failed ticks.
pub struct LatestCompositeSink {
    slot: Arc<LatestValueSlot<CompositeResult>>,
    presented: u64,
}

impl LatestCompositeSink {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(LatestValueSlot::new()),
            presented: 0,
        }
    }

    /// Shared handle for the display side.
    pub fn handle(&self) -> Arc<LatestValueSlot<CompositeResult>> {
        self.slot.clone()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Default for LatestCompositeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for LatestCompositeSink {
    fn present(&mut self, result: &CompositeResult) {
        self.slot.publish(result.clone());
        self.presented += 1;
    }
}

/// Writes `mask.png`, `color.png` and `inpainted.png` into a directory.
///
/// Each presentation overwrites the previous files.
pub struct PngSink {
    dir: PathBuf,
    written: u64,
}

impl PngSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write(&mut self, result: &CompositeResult) -> Result<()> {
        let mask = self.dir.join("mask.png");
        result
            .mask_view
            .save_with_format(&mask, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", mask.display()))?;
        let color = self.dir.join("color.png");
        result
            .color_view
            .save_with_format(&color, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", color.display()))?;
        let inpainted = self.dir.join("inpainted.png");
        result
            .inpainted_view
            .save_with_format(&inpainted, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", inpainted.display()))?;
        self.written += 1;
        Ok(())
    }
}

impl PresentationSink for PngSink {
    fn present(&mut self, result: &CompositeResult) {
        if let Err(err) = self.write(result) {
            log::warn!("png sink: {:#}", err);
        }
    }
}
