//! Frame ingestion sources.
//!
//! Two producers feed the compositor, each at its own cadence:
//! - `ColorFrameSource`: pushed by the camera driver whenever it has a new image
//! - `MaskFrameSource`: polled once per host frame against the segmentation renderer
//!
//! Both publish into a `LatestValueSlot`. Neither blocks, neither queues.
//!
//! The camera driver and the segmentation renderer are external collaborators.
//! This module only defines the interface they are driven through, plus
//! synthetic implementations for the demo binary and tests.
//!
//! The ingestion layer MUST NOT:
//! - Hold on to driver-owned image memory after a callback returns
//! - Share its scratch buffers with the consumer (readbacks are copies)

pub mod color;
pub mod mask;
mod normalize;
pub mod synthetic;

use anyhow::Result;
use std::sync::Arc;

pub use color::{ColorFrameSource, ColorStats};
pub use mask::{MaskFrameSource, MaskStats, RenderTarget, StencilRemap};
pub use synthetic::{
    FigureRect, SyntheticCamera, SyntheticCameraConfig, SyntheticImage, SyntheticSegmentation,
    WalkingFigure,
};

/// Pixel layouts a camera driver may hand over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorLayout {
    Rgba8,
    Bgra8,
    Rgb24,
    /// Y plane followed by interleaved UV at half resolution.
    Nv12,
}

impl SensorLayout {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgba" | "rgba8" => Some(SensorLayout::Rgba8),
            "bgra" | "bgra8" => Some(SensorLayout::Bgra8),
            "rgb" | "rgb24" => Some(SensorLayout::Rgb24),
            "nv12" => Some(SensorLayout::Nv12),
            _ => None,
        }
    }
}

/// Driver-owned camera image.
///
/// The handle is only valid until it is dropped; dropping it releases the
/// image back to the driver.
pub trait SensorImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn layout(&self) -> SensorLayout;
    fn pixels(&self) -> &[u8];
}

/// Callback a camera driver invokes when a new frame is available.
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Platform camera driver.
pub trait CameraDriver: Send + Sync + 'static {
    type Image: SensorImage;

    /// Latest CPU image, or `None` when the driver has nothing ready.
    fn try_acquire_latest_image(&self) -> Option<Self::Image>;

    /// Register a frame listener. The driver calls it on its own thread.
    fn subscribe(&self, listener: FrameListener) -> Result<ListenerId>;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);
}

/// Single-channel classifier output of the segmentation renderer.
#[derive(Clone, Copy, Debug)]
pub struct StencilView<'a> {
    pub width: u32,
    pub height: u32,
    pub texels: &'a [u8],
}

/// Segmentation renderer, refreshed by the host at its own cadence.
pub trait SegmentationSource {
    /// Current stencil surface, or `None` before the first segmentation is ready.
    fn current_stencil(&self) -> Option<StencilView<'_>>;
}
