use anyhow::{anyhow, Result};

use super::SensorLayout;

/// Convert a sensor image to packed RGBA8, box-downsampled by `scale` and
/// mirrored vertically.
///
/// `dst` is cleared and refilled, so callers can hand in a recycled buffer.
/// Returns the output dimensions.
pub(crate) fn convert_to_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: SensorLayout,
    scale: u32,
    dst: &mut Vec<u8>,
) -> Result<(u32, u32)> {
    if scale == 0 {
        return Err(anyhow!("capture scale must be >= 1"));
    }
    validate_length(pixels, width, height, layout)?;

    let out_w = width / scale;
    let out_h = height / scale;
    if out_w == 0 || out_h == 0 {
        return Err(anyhow!(
            "sensor image {}x{} too small for capture scale {}",
            width,
            height,
            scale
        ));
    }

    let w = width as usize;
    let plane = w * height as usize;
    let s = scale as usize;
    let area = (s * s) as u32;
    let (ow, oh) = (out_w as usize, out_h as usize);

    dst.clear();
    dst.resize(ow * oh * 4, 0);

    for y in 0..oh {
        // Vertical mirror: output row y samples the block from the opposite end.
        let src_block_y = (oh - 1 - y) * s;
        for x in 0..ow {
            let mut acc = [0u32; 4];
            for dy in 0..s {
                for dx in 0..s {
                    let px = sample(pixels, w, plane, x * s + dx, src_block_y + dy, layout);
                    for c in 0..4 {
                        acc[c] += px[c] as u32;
                    }
                }
            }
            let offset = (y * ow + x) * 4;
            for c in 0..4 {
                dst[offset + c] = ((acc[c] + area / 2) / area) as u8;
            }
        }
    }

    Ok((out_w, out_h))
}

fn validate_length(pixels: &[u8], width: u32, height: u32, layout: SensorLayout) -> Result<()> {
    if layout == SensorLayout::Nv12 && (width % 2 != 0 || height % 2 != 0) {
        return Err(anyhow!("NV12 frame dimensions must be even, got {}x{}", width, height));
    }
    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("sensor frame dimensions overflow"))?;
    let expected = match layout {
        SensorLayout::Rgba8 | SensorLayout::Bgra8 => plane.checked_mul(4),
        SensorLayout::Rgb24 => plane.checked_mul(3),
        SensorLayout::Nv12 => plane.checked_add(plane / 2),
    }
    .ok_or_else(|| anyhow!("sensor frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            layout,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn sample(
    pixels: &[u8],
    w: usize,
    plane: usize,
    i: usize,
    j: usize,
    layout: SensorLayout,
) -> [u8; 4] {
    match layout {
        SensorLayout::Rgba8 => {
            let o = (j * w + i) * 4;
            [pixels[o], pixels[o + 1], pixels[o + 2], pixels[o + 3]]
        }
        SensorLayout::Bgra8 => {
            let o = (j * w + i) * 4;
            [pixels[o + 2], pixels[o + 1], pixels[o], pixels[o + 3]]
        }
        SensorLayout::Rgb24 => {
            let o = (j * w + i) * 3;
            [pixels[o], pixels[o + 1], pixels[o + 2], 255]
        }
        SensorLayout::Nv12 => nv12_sample(pixels, w, plane, i, j),
    }
}

fn nv12_sample(pixels: &[u8], w: usize, y_plane: usize, i: usize, j: usize) -> [u8; 4] {
    let y = pixels[j * w + i] as f32;
    let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
    let u = pixels[uv_index] as f32 - 128.0;
    let v = pixels[uv_index + 1] as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;

    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b), 255]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let mut out = Vec::new();
        let dims = convert_to_rgba(&nv12, 2, 2, SensorLayout::Nv12, 1, &mut out)?;
        assert_eq!(dims, (2, 2));
        assert_eq!(out, [128, 128, 128, 255].repeat(4));
        Ok(())
    }

    #[test]
    fn half_scale_averages_blocks() -> Result<()> {
        // 4x2 RGB: left block all 10, right block all 30.
        let mut pixels = Vec::new();
        for _row in 0..2 {
            for x in 0..4 {
                let v = if x < 2 { 10 } else { 30 };
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        let mut out = Vec::new();
        let dims = convert_to_rgba(&pixels, 4, 2, SensorLayout::Rgb24, 2, &mut out)?;
        assert_eq!(dims, (2, 1));
        assert_eq!(out, vec![10, 10, 10, 255, 30, 30, 30, 255]);
        Ok(())
    }

    #[test]
    fn output_is_mirrored_vertically() -> Result<()> {
        // 1x2 RGBA: top red, bottom blue.
        let pixels = vec![255, 0, 0, 255, 0, 0, 255, 255];
        let mut out = Vec::new();
        convert_to_rgba(&pixels, 1, 2, SensorLayout::Rgba8, 1, &mut out)?;
        assert_eq!(out, vec![0, 0, 255, 255, 255, 0, 0, 255]);
        Ok(())
    }

    #[test]
    fn bgra_channels_are_swapped() -> Result<()> {
        let pixels = vec![1, 2, 3, 4];
        let mut out = Vec::new();
        convert_to_rgba(&pixels, 1, 1, SensorLayout::Bgra8, 1, &mut out)?;
        assert_eq!(out, vec![3, 2, 1, 4]);
        Ok(())
    }

    #[test]
    fn rejects_length_mismatch_and_tiny_frames() {
        let mut out = Vec::new();
        assert!(convert_to_rgba(&[0u8; 8], 2, 2, SensorLayout::Rgb24, 1, &mut out).is_err());
        assert!(convert_to_rgba(&[0u8; 4], 1, 1, SensorLayout::Rgba8, 2, &mut out).is_err());
        assert!(convert_to_rgba(&[0u8; 4], 1, 1, SensorLayout::Rgba8, 0, &mut out).is_err());
    }

    #[test]
    fn recycled_buffer_is_resized() -> Result<()> {
        let mut out = vec![9u8; 1000];
        convert_to_rgba(&[5u8; 16], 2, 2, SensorLayout::Rgba8, 1, &mut out)?;
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|v| *v == 5));
        Ok(())
    }
}
