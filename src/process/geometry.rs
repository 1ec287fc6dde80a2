use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

use crate::frame::Resolution;

/// Resample a color image (bilinear).
pub fn resize_color(image: &RgbaImage, target: Resolution) -> Result<RgbaImage> {
    check(image.dimensions(), target)?;
    if image.dimensions() == (target.width, target.height) {
        return Ok(image.clone());
    }
    Ok(imageops::resize(
        image,
        target.width,
        target.height,
        FilterType::Triangle,
    ))
}

/// Resample a mask (nearest neighbour, so occupancy stays crisp).
pub fn resize_mask(image: &GrayImage, target: Resolution) -> Result<GrayImage> {
    check(image.dimensions(), target)?;
    let (sw, sh) = image.dimensions();
    if (sw, sh) == (target.width, target.height) {
        return Ok(image.clone());
    }
    // Pixel-centre mapping: dst x samples src floor((x + 0.5) * sw / tw).
    let src_x: Vec<u32> = (0..target.width)
        .map(|x| nearest(x, sw, target.width))
        .collect();
    Ok(GrayImage::from_fn(target.width, target.height, |x, y| {
        let sy = nearest(y, sh, target.height);
        *image.get_pixel(src_x[x as usize], sy)
    }))
}

fn nearest(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let scaled = (2 * dst as u64 + 1) * src_len as u64 / (2 * dst_len as u64);
    (scaled as u32).min(src_len - 1)
}

/// Flip rows top to bottom.
pub fn flip_vertical(image: &mut RgbaImage) {
    imageops::flip_vertical_in_place(image);
}

fn check(source: (u32, u32), target: Resolution) -> Result<()> {
    if source.0 == 0 || source.1 == 0 {
        return Err(anyhow!("cannot resize empty {}x{} image", source.0, source.1));
    }
    if target.is_empty() {
        return Err(anyhow!("cannot resize to empty resolution {}", target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn uniform_image_keeps_its_value_through_resize_and_flip() -> Result<()> {
        for value in [0u8, 1, 128, 254, 255] {
            let image = RgbaImage::from_pixel(37, 23, Rgba([value, value, value, value]));
            let mut resized = resize_color(&image, Resolution::new(64, 48))?;
            flip_vertical(&mut resized);
            assert_eq!(resized.dimensions(), (64, 48));
            let min = resized.as_raw().iter().copied().min().unwrap();
            let max = resized.as_raw().iter().copied().max().unwrap();
            assert_eq!((min, max), (value, value));
        }
        Ok(())
    }

    #[test]
    fn mask_resize_preserves_extremes() -> Result<()> {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 1, Luma([255]));
        mask.put_pixel(1, 2, Luma([255]));
        mask.put_pixel(2, 2, Luma([255]));
        let resized = resize_mask(&mask, Resolution::new(8, 8))?;
        assert!(resized.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(resized.get_pixel(4, 4).0[0], 255);
        assert_eq!(resized.get_pixel(0, 0).0[0], 0);
        Ok(())
    }

    #[test]
    fn same_size_resize_is_identity() -> Result<()> {
        let mut image = RgbaImage::new(3, 2);
        image.put_pixel(2, 1, Rgba([9, 8, 7, 6]));
        assert_eq!(resize_color(&image, Resolution::new(3, 2))?, image);
        Ok(())
    }

    #[test]
    fn flip_moves_top_row_to_bottom() {
        let mut image = RgbaImage::new(1, 3);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        flip_vertical(&mut image);
        assert_eq!(image.get_pixel(0, 2).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(resize_color(&RgbaImage::new(0, 4), Resolution::new(4, 4)).is_err());
        assert!(resize_mask(&GrayImage::new(4, 4), Resolution::new(0, 4)).is_err());
    }
}
