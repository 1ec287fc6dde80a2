//! Segmentation mask source.
//!
//! `MaskFrameSource::poll` runs once per host frame. Each poll:
//! 1. Fetches the current stencil from the segmentation renderer (skip if none)
//! 2. Remaps it into the scratch render target (allocated lazily, reused)
//! 3. Reads the render target back into a CPU buffer
//! 4. Publishes that buffer into the mask slot
//!
//! The scratch target belongs to this source alone. The consumer only ever
//! sees the readback copy.

use anyhow::{anyhow, Result};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

use super::{SegmentationSource, StencilView};
use crate::frame::{MaskFrame, MaskLayout};
use crate::lifecycle::ShutdownSignal;
use crate::slot::LatestValueSlot;

/// Default classifier cut-off. Stencil texels at or above it count as person.
pub const DEFAULT_MASK_THRESHOLD: u8 = 128;

/// Maps raw classifier texels to canonical occupancy levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilRemap {
    pub threshold: u8,
    pub foreground: u8,
    pub background: u8,
}

impl StencilRemap {
    pub fn with_threshold(threshold: u8) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn apply(&self, texel: u8) -> u8 {
        if texel >= self.threshold {
            self.foreground
        } else {
            self.background
        }
    }
}

impl Default for StencilRemap {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MASK_THRESHOLD,
            foreground: 255,
            background: 0,
        }
    }
}

/// Scratch RGBA target the stencil is remapped into.
pub struct RenderTarget {
    image: RgbaImage,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Remap every stencil texel into the target.
    pub fn blit(&mut self, stencil: &StencilView<'_>, remap: &StencilRemap) -> Result<()> {
        if (stencil.width, stencil.height) != self.dimensions() {
            return Err(anyhow!(
                "stencil {}x{} does not match render target {:?}",
                stencil.width,
                stencil.height,
                self.dimensions()
            ));
        }
        for (pixel, texel) in self.image.pixels_mut().zip(stencil.texels) {
            let v = remap.apply(*texel);
            *pixel = Rgba([v, v, v, 255]);
        }
        Ok(())
    }

    /// Copy the target into `dst`, reusing its allocation.
    pub fn read_pixels(&self, dst: &mut Vec<u8>) {
        dst.clear();
        dst.extend_from_slice(self.image.as_raw());
    }
}

/// Statistics for the mask source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaskStats {
    pub masks_published: u64,
    pub stencil_unavailable: u64,
    pub readback_failures: u64,
    pub target_allocations: u64,
}

pub struct MaskFrameSource {
    slot: Arc<LatestValueSlot<MaskFrame>>,
    remap: StencilRemap,
    shutdown: ShutdownSignal,
    scratch: Option<RenderTarget>,
    recycled: Option<Vec<u8>>,
    next_sequence: u64,
    stats: MaskStats,
}

impl MaskFrameSource {
    pub fn new(
        slot: Arc<LatestValueSlot<MaskFrame>>,
        remap: StencilRemap,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            slot,
            remap,
            shutdown,
            scratch: None,
            recycled: None,
            next_sequence: 1,
            stats: MaskStats::default(),
        }
    }

    /// Per-host-frame poll. Returns true when a mask was published.
    pub fn poll<G: SegmentationSource + ?Sized>(&mut self, segmentation: &G) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let Some(stencil) = segmentation.current_stencil() else {
            self.stats.stencil_unavailable += 1;
            return false;
        };

        match self.render(&stencil) {
            Ok(mask) => {
                self.publish(mask);
                true
            }
            Err(err) => {
                self.stats.readback_failures += 1;
                log::warn!("MaskFrameSource: skipping stencil: {:#}", err);
                false
            }
        }
    }

    fn render(&mut self, stencil: &StencilView<'_>) -> Result<MaskFrame> {
        let texel_count = (stencil.width as usize)
            .checked_mul(stencil.height as usize)
            .ok_or_else(|| anyhow!("stencil dimensions overflow"))?;
        if texel_count == 0 || stencil.texels.len() != texel_count {
            return Err(anyhow!(
                "stencil {}x{} has {} texels",
                stencil.width,
                stencil.height,
                stencil.texels.len()
            ));
        }

        let remap = self.remap;
        let mut buffer = self.recycled.take().unwrap_or_default();
        let target = self.scratch_target(stencil.width, stencil.height);
        target.blit(stencil, &remap)?;
        target.read_pixels(&mut buffer);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        MaskFrame::new(
            stencil.width,
            stencil.height,
            MaskLayout::Rgba8,
            buffer,
            sequence,
        )
    }

    fn scratch_target(&mut self, width: u32, height: u32) -> &mut RenderTarget {
        let stale = self
            .scratch
            .as_ref()
            .is_some_and(|target| target.dimensions() != (width, height));
        if stale || self.scratch.is_none() {
            log::debug!("MaskFrameSource: allocating {}x{} render target", width, height);
            self.stats.target_allocations += 1;
        }
        if stale {
            self.scratch = None;
        }
        self.scratch
            .get_or_insert_with(|| RenderTarget::new(width, height))
    }

    fn publish(&mut self, mask: MaskFrame) {
        let displaced = self.slot.publish(mask);
        self.stats.masks_published += 1;
        if let Some(stale) = displaced.and_then(|arc| Arc::try_unwrap(arc).ok()) {
            self.recycled = Some(stale.into_data());
        }
    }

    pub fn slot(&self) -> &Arc<LatestValueSlot<MaskFrame>> {
        &self.slot
    }

    pub fn stats(&self) -> MaskStats {
        self.stats
    }
}
