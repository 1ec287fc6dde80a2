//! Fast-marching inpainting.
//!
//! The masked region is filled from its boundary inward. A narrow band is
//! advanced in order of arrival distance `T` (an eikonal solution); each pixel
//! reached is set to a weighted average of already-known pixels within
//! `radius`, favouring pixels that are close, lie along the marching
//! direction, and sit on a similar distance level.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbaImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

const FAR: f32 = 1.0e6;
const MIN_DIRECTION_WEIGHT: f32 = 1.0e-6;

/// Fill every pixel where `mask` is non-zero from the surrounding image.
///
/// `image` and `mask` must share dimensions. Unmasked pixels are copied
/// through untouched, so an empty mask returns the input unchanged.
pub fn inpaint(image: &RgbaImage, mask: &GrayImage, radius: u32) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(anyhow!(
            "inpaint mask {:?} does not match image {:?}",
            mask.dimensions(),
            image.dimensions()
        ));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot inpaint an empty image"));
    }
    if radius == 0 {
        return Err(anyhow!("inpaint radius must be >= 1"));
    }

    let mut out = image.clone();
    if mask.pixels().all(|p| p.0[0] == 0) {
        return Ok(out);
    }

    let mut field = MarchField::new(mask);
    let mut heap = field.initial_band();
    let radius = radius as i64;

    while let Some(Narrow { index, .. }) = heap.pop() {
        if field.flags[index] == KNOWN {
            continue;
        }
        field.flags[index] = KNOWN;

        let (x, y) = field.coords(index);
        for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
            let Some(n) = field.index(nx, ny) else {
                continue;
            };
            if field.flags[n] != INSIDE {
                continue;
            }
            field.dist[n] = field.arrival_time(nx, ny);
            fill_pixel(&mut out, &field, nx, ny, radius);
            field.flags[n] = BAND;
            heap.push(Narrow {
                dist: field.dist[n],
                index: n,
            });
        }
    }

    Ok(out)
}

fn fill_pixel(out: &mut RgbaImage, field: &MarchField, x: i64, y: i64, radius: i64) {
    let Some(p) = field.index(x, y) else {
        return;
    };
    let (gx, gy) = field.gradient(x, y);
    let grad_len = (gx * gx + gy * gy).sqrt();

    let mut acc = [0f32; 4];
    let mut total = 0f32;
    for qy in (y - radius)..=(y + radius) {
        for qx in (x - radius)..=(x + radius) {
            let Some(q) = field.index(qx, qy) else {
                continue;
            };
            if q == p || field.flags[q] == INSIDE {
                continue;
            }
            let (rx, ry) = ((x - qx) as f32, (y - qy) as f32);
            let len2 = rx * rx + ry * ry;
            if len2 > (radius * radius) as f32 {
                continue;
            }
            let len = len2.sqrt();
            let direction = if grad_len > 0.0 {
                ((rx * gx + ry * gy) / (len * grad_len)).abs()
            } else {
                1.0
            }
            .max(MIN_DIRECTION_WEIGHT);
            let distance = 1.0 / len2;
            let level = 1.0 / (1.0 + (field.dist[q] - field.dist[p]).abs());
            let weight = direction * distance * level;

            let px = out.get_pixel(qx as u32, qy as u32).0;
            for c in 0..4 {
                acc[c] += weight * px[c] as f32;
            }
            total += weight;
        }
    }

    if total > 0.0 {
        let mut filled = [0u8; 4];
        for c in 0..4 {
            filled[c] = (acc[c] / total).round().clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x as u32, y as u32, image::Rgba(filled));
    }
}

/// Per-pixel marching state.
struct MarchField {
    width: i64,
    height: i64,
    flags: Vec<u8>,
    dist: Vec<f32>,
}

impl MarchField {
    fn new(mask: &GrayImage) -> Self {
        let (w, h) = mask.dimensions();
        let mut flags = Vec::with_capacity((w * h) as usize);
        let mut dist = Vec::with_capacity((w * h) as usize);
        for p in mask.pixels() {
            if p.0[0] != 0 {
                flags.push(INSIDE);
                dist.push(FAR);
            } else {
                flags.push(KNOWN);
                dist.push(0.0);
            }
        }
        Self {
            width: w as i64,
            height: h as i64,
            flags,
            dist,
        }
    }

    /// Known pixels touching the masked region seed the band at distance zero.
    fn initial_band(&mut self) -> BinaryHeap<Narrow> {
        let mut heap = BinaryHeap::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let Some(i) = self.index(x, y) else {
                    continue;
                };
                if self.flags[i] != KNOWN {
                    continue;
                }
                let touches_inside = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                    .into_iter()
                    .filter_map(|(nx, ny)| self.index(nx, ny))
                    .any(|n| self.flags[n] == INSIDE);
                if touches_inside {
                    self.flags[i] = BAND;
                    heap.push(Narrow { dist: 0.0, index: i });
                }
            }
        }
        heap
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            None
        } else {
            Some((y * self.width + x) as usize)
        }
    }

    fn coords(&self, index: usize) -> (i64, i64) {
        let i = index as i64;
        (i % self.width, i / self.width)
    }

    fn known_dist(&self, x: i64, y: i64) -> Option<f32> {
        self.index(x, y)
            .filter(|i| self.flags[*i] == KNOWN)
            .map(|i| self.dist[i])
    }

    /// Smallest eikonal solution over the four quadrants around `(x, y)`.
    fn arrival_time(&self, x: i64, y: i64) -> f32 {
        let pairs = [
            ((x - 1, y), (x, y - 1)),
            ((x + 1, y), (x, y - 1)),
            ((x - 1, y), (x, y + 1)),
            ((x + 1, y), (x, y + 1)),
        ];
        pairs
            .iter()
            .map(|(a, b)| solve(self.known_dist(a.0, a.1), self.known_dist(b.0, b.1)))
            .fold(FAR, f32::min)
    }

    /// Central-difference gradient of `T`, using only non-inside neighbours.
    fn gradient(&self, x: i64, y: i64) -> (f32, f32) {
        let Some(p) = self.index(x, y) else {
            return (0.0, 0.0);
        };
        let here = self.dist[p];
        let axis = |prev: Option<usize>, next: Option<usize>| {
            let usable = |i: Option<usize>| i.filter(|i| self.flags[*i] != INSIDE);
            match (usable(prev), usable(next)) {
                (Some(a), Some(b)) => (self.dist[b] - self.dist[a]) * 0.5,
                (None, Some(b)) => self.dist[b] - here,
                (Some(a), None) => here - self.dist[a],
                (None, None) => 0.0,
            }
        };
        let gx = axis(self.index(x - 1, y), self.index(x + 1, y));
        let gy = axis(self.index(x, y - 1), self.index(x, y + 1));
        (gx, gy)
    }
}

fn solve(a: Option<f32>, b: Option<f32>) -> f32 {
    match (a, b) {
        (Some(da), Some(db)) => {
            let r = (2.0 - (da - db) * (da - db)).max(0.0).sqrt();
            let s = (da + db - r) * 0.5;
            if s >= da && s >= db {
                s
            } else {
                let s = s + r;
                if s >= da && s >= db {
                    s
                } else {
                    1.0 + da.min(db)
                }
            }
        }
        (Some(d), None) | (None, Some(d)) => 1.0 + d,
        (None, None) => FAR,
    }
}

/// Band entry ordered so `BinaryHeap` pops the smallest distance first.
#[derive(Clone, Copy, Debug)]
struct Narrow {
    dist: f32,
    index: usize,
}

impl PartialEq for Narrow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Narrow {}

impl Ord for Narrow {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Narrow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::INPAINT_RADIUS;
    use image::{Luma, Rgba};

    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn empty_mask_returns_input_unchanged() -> Result<()> {
        let image = RgbaImage::from_fn(16, 8, |x, y| Rgba([x as u8 * 10, y as u8 * 20, 7, 255]));
        let mask = GrayImage::new(16, 8);
        assert_eq!(inpaint(&image, &mask, INPAINT_RADIUS)?, image);
        Ok(())
    }

    #[test]
    fn masked_square_is_filled_from_uniform_surroundings() -> Result<()> {
        let mut image = RgbaImage::from_pixel(32, 32, BLUE);
        let mut mask = GrayImage::new(32, 32);
        for y in 10..20 {
            for x in 12..22 {
                image.put_pixel(x, y, RED);
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let filled = inpaint(&image, &mask, INPAINT_RADIUS)?;
        assert!(filled.pixels().all(|p| *p == BLUE));
        Ok(())
    }

    #[test]
    fn fill_stays_within_neighbour_range() -> Result<()> {
        // Left half dark, right half bright, a masked stripe across the seam.
        let mut image = RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgba([40, 40, 40, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        });
        let mut mask = GrayImage::new(20, 10);
        for y in 0..10 {
            for x in 8..12 {
                image.put_pixel(x, y, RED);
                mask.put_pixel(x, y, Luma([1]));
            }
        }

        let filled = inpaint(&image, &mask, INPAINT_RADIUS)?;
        for y in 0..10 {
            for x in 8..12 {
                let p = filled.get_pixel(x, y).0;
                assert!(p[0] >= 40 && p[0] <= 200);
                assert_eq!(p[0], p[1]);
                assert_eq!(p[3], 255);
            }
        }
        assert!(filled.get_pixel(8, 5).0[0] < filled.get_pixel(11, 5).0[0]);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_mask() {
        let image = RgbaImage::new(4, 4);
        let mask = GrayImage::new(4, 5);
        assert!(inpaint(&image, &mask, INPAINT_RADIUS).is_err());
    }

    #[test]
    fn fully_masked_image_is_left_as_is() -> Result<()> {
        let image = RgbaImage::from_pixel(4, 4, RED);
        let mask = GrayImage::from_pixel(4, 4, Luma([255]));
        assert_eq!(inpaint(&image, &mask, INPAINT_RADIUS)?, image);
        Ok(())
    }
}
