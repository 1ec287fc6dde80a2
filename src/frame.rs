//! Frame types flowing through the compositor.
//!
//! - `ColorFrame`: RGBA8 camera frame, immutable once published.
//! - `MaskFrame`: CPU readback of the segmentation stencil.
//! - `CompositeResult`: the three canonical-resolution views produced per tick.
//!
//! Frames carry a per-source sequence id. Ids increase monotonically, but the
//! pipeline only ever sees the newest one, so gaps are expected.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbaImage};
use std::fmt;
use std::str::FromStr;

/// Output size for every composite view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("resolution must look like WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid resolution width '{}'", w))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid resolution height '{}'", h))?;
        Ok(Self { width, height })
    }
}

// ----------------------------------------------------------------------------
// ColorFrame
// ----------------------------------------------------------------------------

/// Camera frame normalised to RGBA8.
#[derive(Clone, Debug)]
pub struct ColorFrame {
    image: RgbaImage,
    pub sequence: u64,
}

impl ColorFrame {
    /// Wrap a packed RGBA8 buffer. Fails when the buffer does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Result<Self> {
        let expected = rgba_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGBA frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGBA frame buffer too small for {}x{}", width, height))?;
        Ok(Self { image, sequence })
    }

    pub fn from_image(image: RgbaImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Give the pixel buffer back for reuse.
    pub fn into_data(self) -> Vec<u8> {
        self.image.into_raw()
    }
}

// ----------------------------------------------------------------------------
// MaskFrame
// ----------------------------------------------------------------------------

/// Pixel layout of a mask readback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskLayout {
    /// One occupancy byte per pixel.
    Gray8,
    /// Render-target readback, occupancy replicated into RGB.
    Rgba8,
}

impl MaskLayout {
    pub fn channels(self) -> usize {
        match self {
            MaskLayout::Gray8 => 1,
            MaskLayout::Rgba8 => 4,
        }
    }
}

/// CPU-side segmentation mask. Non-zero occupancy marks the person.
#[derive(Clone, Debug)]
pub struct MaskFrame {
    pub width: u32,
    pub height: u32,
    pub layout: MaskLayout,
    data: Vec<u8>,
    pub sequence: u64,
}

impl MaskFrame {
    pub fn new(
        width: u32,
        height: u32,
        layout: MaskLayout,
        data: Vec<u8>,
        sequence: u64,
    ) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(layout.channels()))
            .ok_or_else(|| anyhow!("mask dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "mask length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
            sequence,
        })
    }

    /// Single-channel mask from a gray image.
    pub fn from_gray(image: GrayImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            layout: MaskLayout::Gray8,
            data: image.into_raw(),
            sequence,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

// ----------------------------------------------------------------------------
// CompositeResult
// ----------------------------------------------------------------------------

/// Output of one successful pipeline tick. All three views share one resolution.
#[derive(Clone, Debug)]
pub struct CompositeResult {
    /// Dilated mask, resampled.
    pub mask_view: GrayImage,
    /// Color frame, resampled and flipped.
    pub color_view: RgbaImage,
    /// Color view with the masked region filled from the background.
    pub inpainted_view: RgbaImage,
    pub color_sequence: u64,
    pub mask_sequence: u64,
}

impl CompositeResult {
    pub fn resolution(&self) -> Resolution {
        let (width, height) = self.inpainted_view.dimensions();
        Resolution { width, height }
    }
}

pub(crate) fn rgba_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| anyhow!("RGBA frame dimensions overflow"))
}
