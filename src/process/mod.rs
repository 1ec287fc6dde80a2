//! CPU image operations used by the compositing pipeline.
//!
//! All operations work on 8-bit channels and never wrap. Resampling and
//! morphology only ever produce values already present in their input
//! neighbourhood (or weighted averages of them).

mod geometry;
mod inpaint;
mod morphology;

pub use geometry::{flip_vertical, resize_color, resize_mask};
pub use inpaint::inpaint;
pub use morphology::{dilate, mask_to_gray};

/// Side length of the all-ones dilation structuring element.
pub const DILATION_KERNEL_SIZE: u32 = 5;

/// Neighbourhood radius, in pixels, sampled when filling a masked pixel.
pub const INPAINT_RADIUS: u32 = 3;
