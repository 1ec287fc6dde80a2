//! Invisible Human
//!
//! Removes a tracked person from a live camera feed. A body-segmentation mask
//! marks the person, the mask is dilated to cover the segmentation halo, and
//! the covered region is inpainted from the surrounding background.
//!
//! # Architecture
//!
//! Three entry points run at independent cadences and never block each other:
//!
//! 1. **Camera callback**: `ColorFrameSource` converts each driver image and
//!    publishes it into the color slot.
//! 2. **Host frame poll**: `MaskFrameSource` remaps the current segmentation
//!    stencil and publishes a readback into the mask slot.
//! 3. **Periodic tick**: `CompositingPipeline` consumes both slots and pushes a
//!    `CompositeResult` to its `PresentationSink`.
//!
//! The slots (`LatestValueSlot`) are the only shared mutable state. They hold
//! one value each and overwrite on publish. `LifecycleController` owns the tick
//! thread and the camera subscription and tears both down on `stop`.
//!
//! # Module Structure
//!
//! - `slot`: lock-free latest-value handoff
//! - `frame`: ColorFrame, MaskFrame, CompositeResult, Resolution
//! - `ingest`: camera and segmentation sources, driver traits, synthetic drivers
//! - `process`: dilation, resampling, flip, inpainting
//! - `pipeline`: the per-tick compositing step
//! - `present`: presentation sinks
//! - `lifecycle`: start/stop state machine and the tick loop
//! - `config`: file + env configuration

pub mod config;
pub mod frame;
pub mod ingest;
pub mod lifecycle;
pub mod pipeline;
pub mod present;
pub mod process;
pub mod slot;

pub use config::EraserConfig;
pub use frame::{ColorFrame, CompositeResult, MaskFrame, MaskLayout, Resolution};
pub use ingest::{
    CameraDriver, ColorFrameSource, MaskFrameSource, SegmentationSource, SensorImage,
    SensorLayout, StencilRemap,
};
pub use lifecycle::{LifecycleController, LifecycleState, ShutdownSignal};
pub use pipeline::{
    composite, CompositingPipeline, Missing, PipelineSnapshot, PipelineStats, TickOutcome,
};
pub use present::{LatestCompositeSink, PngSink, PresentationSink};
pub use slot::LatestValueSlot;
