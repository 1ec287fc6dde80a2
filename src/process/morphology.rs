use anyhow::{anyhow, Result};
use image::GrayImage;

use crate::frame::{MaskFrame, MaskLayout};

/// Collapse a mask readback to one intensity channel (BT.601 luma).
pub fn mask_to_gray(mask: &MaskFrame) -> Result<GrayImage> {
    if mask.width == 0 || mask.height == 0 {
        return Err(anyhow!("mask has zero size ({}x{})", mask.width, mask.height));
    }
    let data = match mask.layout {
        MaskLayout::Gray8 => mask.data().to_vec(),
        MaskLayout::Rgba8 => mask
            .data()
            .chunks_exact(4)
            .map(|p| luma(p[0], p[1], p[2]))
            .collect(),
    };
    GrayImage::from_raw(mask.width, mask.height, data)
        .ok_or_else(|| anyhow!("mask buffer too small for {}x{}", mask.width, mask.height))
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    // Weights sum to 256, so equal channels map to themselves.
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8
}

/// Grayscale dilation with a `size`×`size` all-ones structuring element.
///
/// Each output pixel is the maximum of its neighbourhood. Pixels outside the
/// image are ignored. The square kernel is separable, so this runs as a
/// horizontal pass followed by a vertical one.
pub fn dilate(image: &GrayImage, size: u32) -> Result<GrayImage> {
    if size == 0 || size % 2 == 0 {
        return Err(anyhow!("dilation kernel size must be odd, got {}", size));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot dilate an empty image"));
    }
    let r = (size / 2) as usize;
    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();

    let mut horizontal = vec![0u8; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(w - 1);
            horizontal[y * w + x] = row[lo..=hi].iter().copied().max().unwrap_or(0);
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let lo = y.saturating_sub(r);
        let hi = (y + r).min(h - 1);
        for x in 0..w {
            out[y * w + x] = (lo..=hi).map(|yy| horizontal[yy * w + x]).max().unwrap_or(0);
        }
    }

    GrayImage::from_raw(width, height, out)
        .ok_or_else(|| anyhow!("dilated buffer size mismatch"))
}
