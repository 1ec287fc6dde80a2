//! Compositing pipeline.
//!
//! One `tick` takes the newest color frame and the newest mask and produces a
//! `CompositeResult`:
//!
//! 1. Both slots must hold a value, otherwise the tick is skipped and nothing
//!    is consumed.
//! 2. Mask to single-channel intensity, then 5×5 dilation.
//! 3. Mask resized to the canonical resolution.
//! 4. Color resized to the canonical resolution and flipped vertically.
//! 5. Masked region inpainted from the surrounding background.
//! 6. The three views are handed to the `PresentationSink`.
//!
//! A failing step aborts the current tick only. The sink is not called, so
//! whatever it showed last stays on display.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::{ColorFrame, CompositeResult, MaskFrame, Resolution};
use crate::lifecycle::ShutdownSignal;
use crate::present::PresentationSink;
use crate::process::{
    dilate, flip_vertical, inpaint, mask_to_gray, resize_color, resize_mask,
    DILATION_KERNEL_SIZE, INPAINT_RADIUS,
};
use crate::slot::LatestValueSlot;

/// Which input was not ready on a skipped tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Missing {
    Color,
    Mask,
    Both,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Color => write!(f, "color"),
            Missing::Mask => write!(f, "mask"),
            Missing::Both => write!(f, "color+mask"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// An input slot was empty. Nothing was consumed or presented.
    Skipped { missing: Missing },
    /// A composite was presented.
    Composited { color_seq: u64, mask_seq: u64 },
    /// Inputs were consumed but a processing step failed.
    Failed,
    /// Shutdown was requested; the tick did nothing.
    Cancelled,
}

/// Tick counters, shared with whoever wants to watch the loop.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    composited: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    pub ticks: u64,
    pub composited: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            ticks: self.ticks.load(Ordering::SeqCst),
            composited: self.composited.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    fn record(&self, outcome: &TickOutcome) {
        let counter = match outcome {
            TickOutcome::Skipped { .. } => &self.skipped,
            TickOutcome::Composited { .. } => &self.composited,
            TickOutcome::Failed => &self.failed,
            TickOutcome::Cancelled => return,
        };
        self.ticks.fetch_add(1, Ordering::SeqCst);
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct CompositingPipeline<S> {
    color: Arc<LatestValueSlot<ColorFrame>>,
    mask: Arc<LatestValueSlot<MaskFrame>>,
    canonical: Resolution,
    sink: S,
    shutdown: ShutdownSignal,
    stats: Arc<PipelineStats>,
}

impl<S: PresentationSink> CompositingPipeline<S> {
    pub fn new(
        color: Arc<LatestValueSlot<ColorFrame>>,
        mask: Arc<LatestValueSlot<MaskFrame>>,
        canonical: Resolution,
        sink: S,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            color,
            mask,
            canonical,
            sink,
            shutdown,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Run one pipeline step. Never blocks and never panics on bad input.
    pub fn tick(&mut self) -> TickOutcome {
        if self.shutdown.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        let outcome = self.step();
        self.stats.record(&outcome);
        outcome
    }

    fn step(&mut self) -> TickOutcome {
        // This pipeline is the only consumer, so a ready slot stays ready
        // until it is consumed below.
        let missing = match (self.color.is_ready(), self.mask.is_ready()) {
            (true, true) => None,
            (false, true) => Some(Missing::Color),
            (true, false) => Some(Missing::Mask),
            (false, false) => Some(Missing::Both),
        };
        if let Some(missing) = missing {
            log::trace!("tick skipped: {} not ready", missing);
            return TickOutcome::Skipped { missing };
        }
        let (Some(color), Some(mask)) = (self.color.try_consume(), self.mask.try_consume()) else {
            return TickOutcome::Skipped {
                missing: Missing::Both,
            };
        };

        match composite(&color, &mask, self.canonical) {
            Ok(result) => {
                self.sink.present(&result);
                TickOutcome::Composited {
                    color_seq: color.sequence,
                    mask_seq: mask.sequence,
                }
            }
            Err(err) => {
                log::warn!(
                    "tick failed (color #{}, mask #{}): {:#}",
                    color.sequence,
                    mask.sequence,
                    err
                );
                TickOutcome::Failed
            }
        }
    }

    pub fn canonical(&self) -> Resolution {
        self.canonical
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Dilate, resample, flip and inpaint one color/mask pair.
pub fn composite(
    color: &ColorFrame,
    mask: &MaskFrame,
    canonical: Resolution,
) -> Result<CompositeResult> {
    let gray = mask_to_gray(mask).context("mask intensity")?;
    let dilated = dilate(&gray, DILATION_KERNEL_SIZE).context("mask dilation")?;
    let mask_view = resize_mask(&dilated, canonical).context("mask resize")?;

    let mut color_view = resize_color(color.image(), canonical).context("color resize")?;
    flip_vertical(&mut color_view);

    let inpainted_view =
        inpaint(&color_view, &mask_view, INPAINT_RADIUS).context("inpainting")?;

    Ok(CompositeResult {
        mask_view,
        color_view,
        inpainted_view,
        color_sequence: color.sequence,
        mask_sequence: mask.sequence,
    })
}
