//! Synthetic camera driver and segmentation renderer.
//!
//! Both render the same `WalkingFigure` (a rectangle pacing left and right
//! over a gradient backdrop), so the stencil lines up with the person in the
//! camera image. Used by the demo binary and tests in place of a device.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{
    CameraDriver, FrameListener, ListenerId, SegmentationSource, SensorImage, SensorLayout,
    StencilView,
};

const FIGURE_COLOR: [u8; 3] = [220, 60, 60];

/// Normalised rectangle, coordinates in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FigureRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl FigureRect {
    fn contains(&self, u: f32, v: f32) -> bool {
        u >= self.x0 && u < self.x1 && v >= self.y0 && v < self.y1
    }
}

/// Figure that walks across the scene and back once per period.
#[derive(Clone, Copy, Debug)]
pub struct WalkingFigure {
    epoch: Instant,
    period: Duration,
}

impl WalkingFigure {
    pub fn new(epoch: Instant, period: Duration) -> Self {
        Self { epoch, period }
    }

    pub fn rect_at(&self, elapsed: Duration) -> FigureRect {
        let period = self.period.as_secs_f32().max(f32::EPSILON);
        let phase = (elapsed.as_secs_f32() / period).fract();
        // Triangle wave 0 -> 1 -> 0.
        let t = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
        let x0 = 0.1 + 0.65 * t;
        FigureRect {
            x0,
            y0: 0.3,
            x1: x0 + 0.15,
            y1: 0.9,
        }
    }

    pub fn current_rect(&self) -> FigureRect {
        self.rect_at(self.epoch.elapsed())
    }
}

impl Default for WalkingFigure {
    fn default() -> Self {
        Self::new(Instant::now(), Duration::from_secs(4))
    }
}

// ----------------------------------------------------------------------------
// Camera
// ----------------------------------------------------------------------------

/// Configuration for the synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    pub layout: SensorLayout,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
            layout: SensorLayout::Nv12,
        }
    }
}

/// Image handle handed out by `SyntheticCamera`. Dropping it counts as a release.
pub struct SyntheticImage {
    width: u32,
    height: u32,
    layout: SensorLayout,
    data: Arc<Vec<u8>>,
    releases: Arc<AtomicU64>,
}

impl SensorImage for SyntheticImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn layout(&self) -> SensorLayout {
        self.layout
    }

    fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for SyntheticImage {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    figure: WalkingFigure,
    latest: Mutex<Option<Arc<Vec<u8>>>>,
    listeners: Mutex<Vec<(ListenerId, FrameListener)>>,
    next_listener: AtomicU64,
    frames_generated: AtomicU64,
    acquisitions: AtomicU64,
    releases: Arc<AtomicU64>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig, figure: WalkingFigure) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic camera dimensions must be non-zero"));
        }
        let odd = config.width % 2 != 0 || config.height % 2 != 0;
        if config.layout == SensorLayout::Nv12 && odd {
            return Err(anyhow!("NV12 synthetic camera needs even dimensions"));
        }
        Ok(Self {
            config,
            figure,
            latest: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            frames_generated: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
            releases: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Render a new frame at the figure's current position and notify listeners.
    pub fn pump(&self) -> Result<()> {
        self.pump_with(self.figure.current_rect())
    }

    /// Render a new frame with the figure at `rect` and notify listeners.
    pub fn pump_with(&self, rect: FigureRect) -> Result<()> {
        let pixels = Arc::new(self.render(rect));
        {
            let mut latest = self
                .latest
                .lock()
                .map_err(|_| anyhow!("synthetic camera frame lock poisoned"))?;
            *latest = Some(pixels);
        }
        self.frames_generated.fetch_add(1, Ordering::Relaxed);

        // Snapshot so listeners run without holding the registry lock.
        let listeners: Vec<FrameListener> = self
            .listeners
            .lock()
            .map_err(|_| anyhow!("synthetic camera listener lock poisoned"))?
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
        Ok(())
    }

    /// Drop the current frame so the next acquire finds nothing.
    pub fn clear(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn frames_generated(&self) -> u64 {
        self.frames_generated.load(Ordering::Relaxed)
    }

    /// Handles acquired minus handles released. Zero when nothing is leaked.
    pub fn outstanding_images(&self) -> u64 {
        self.acquisitions
            .load(Ordering::SeqCst)
            .saturating_sub(self.releases.load(Ordering::SeqCst))
    }

    fn render(&self, rect: FigureRect) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut rgb = vec![0u8; w * h * 3];
        for y in 0..h {
            let v = (y as f32 + 0.5) / h as f32;
            for x in 0..w {
                let u = (x as f32 + 0.5) / w as f32;
                let px = if rect.contains(u, v) {
                    FIGURE_COLOR
                } else {
                    [40, (u * 200.0) as u8, 120 + (v * 100.0) as u8]
                };
                let o = (y * w + x) * 3;
                rgb[o..o + 3].copy_from_slice(&px);
            }
        }
        encode_layout(&rgb, w, h, self.config.layout)
    }
}

impl CameraDriver for SyntheticCamera {
    type Image = SyntheticImage;

    fn try_acquire_latest_image(&self) -> Option<SyntheticImage> {
        let data = self.latest.lock().ok()?.clone()?;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Some(SyntheticImage {
            width: self.config.width,
            height: self.config.height,
            layout: self.config.layout,
            data,
            releases: self.releases.clone(),
        })
    }

    fn subscribe(&self, listener: FrameListener) -> Result<ListenerId> {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .map_err(|_| anyhow!("synthetic camera listener lock poisoned"))?
            .push((id, listener));
        log::info!("SyntheticCamera: listener {:?} subscribed", id);
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(existing, _)| *existing != id);
            log::info!("SyntheticCamera: listener {:?} unsubscribed", id);
        }
    }
}

fn encode_layout(rgb: &[u8], w: usize, h: usize, layout: SensorLayout) -> Vec<u8> {
    match layout {
        SensorLayout::Rgb24 => rgb.to_vec(),
        SensorLayout::Rgba8 => rgb
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        SensorLayout::Bgra8 => rgb
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0], 255])
            .collect(),
        SensorLayout::Nv12 => rgb_to_nv12(rgb, w, h),
    }
}

fn rgb_to_nv12(rgb: &[u8], w: usize, h: usize) -> Vec<u8> {
    let plane = w * h;
    let mut out = vec![0u8; plane + plane / 2];
    for (i, p) in rgb.chunks_exact(3).enumerate() {
        let (r, g, b) = (p[0] as f32, p[1] as f32, p[2] as f32);
        out[i] = to_u8(0.299 * r + 0.587 * g + 0.114 * b);
    }
    for j in (0..h).step_by(2) {
        for i in (0..w).step_by(2) {
            let o = (j * w + i) * 3;
            let (r, g, b) = (rgb[o] as f32, rgb[o + 1] as f32, rgb[o + 2] as f32);
            let uv = plane + (j / 2) * w + i;
            out[uv] = to_u8(-0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0);
            out[uv + 1] = to_u8(0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0);
        }
    }
    out
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Segmentation
// ----------------------------------------------------------------------------

/// Synthetic segmentation renderer producing a stencil of the walking figure.
pub struct SyntheticSegmentation {
    width: u32,
    height: u32,
    figure: WalkingFigure,
    texels: Option<Vec<u8>>,
}

impl SyntheticSegmentation {
    pub fn new(width: u32, height: u32, figure: WalkingFigure) -> Self {
        Self {
            width,
            height,
            figure,
            texels: None,
        }
    }

    /// Refresh the stencil at the figure's current position.
    pub fn refresh(&mut self) {
        self.refresh_with(self.figure.current_rect());
    }

    pub fn refresh_with(&mut self, rect: FigureRect) {
        let (w, h) = (self.width as usize, self.height as usize);
        let texels = self.texels.get_or_insert_with(Vec::new);
        texels.clear();
        texels.resize(w * h, 0);
        for y in 0..h {
            let v = (y as f32 + 0.5) / h as f32;
            for x in 0..w {
                let u = (x as f32 + 0.5) / w as f32;
                if rect.contains(u, v) {
                    texels[y * w + x] = 255;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.texels = None;
    }
}

impl SegmentationSource for SyntheticSegmentation {
    fn current_stencil(&self) -> Option<StencilView<'_>> {
        self.texels.as_deref().map(|texels| StencilView {
            width: self.width,
            height: self.height,
            texels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTER: FigureRect = FigureRect {
        x0: 0.25,
        y0: 0.25,
        x1: 0.75,
        y1: 0.75,
    };

    #[test]
    fn figure_walks_back_and_forth() {
        let figure = WalkingFigure::new(Instant::now(), Duration::from_secs(4));
        let start = figure.rect_at(Duration::ZERO);
        let middle = figure.rect_at(Duration::from_secs(2));
        let end = figure.rect_at(Duration::from_secs(4));
        assert!((start.x0 - 0.1).abs() < 1e-4);
        assert!((middle.x0 - 0.75).abs() < 1e-4);
        assert!((end.x0 - start.x0).abs() < 1e-4);
    }

    #[test]
    fn acquire_before_first_frame_yields_nothing() -> Result<()> {
        let camera =
            SyntheticCamera::new(SyntheticCameraConfig::default(), WalkingFigure::default())?;
        assert!(camera.try_acquire_latest_image().is_none());
        Ok(())
    }

    #[test]
    fn pump_notifies_listeners_until_unsubscribed() -> Result<()> {
        let camera = SyntheticCamera::new(
            SyntheticCameraConfig {
                width: 8,
                height: 8,
                layout: SensorLayout::Rgba8,
            },
            WalkingFigure::default(),
        )?;
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let id = camera.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))?;

        camera.pump_with(CENTER)?;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        camera.unsubscribe(id);
        camera.pump_with(CENTER)?;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(camera.listener_count(), 0);
        Ok(())
    }

    #[test]
    fn images_are_released_on_drop() -> Result<()> {
        let camera = SyntheticCamera::new(
            SyntheticCameraConfig {
                width: 4,
                height: 4,
                layout: SensorLayout::Nv12,
            },
            WalkingFigure::default(),
        )?;
        camera.pump_with(CENTER)?;
        let image = camera.try_acquire_latest_image().expect("frame ready");
        assert_eq!(image.pixels().len(), 24);
        assert_eq!(camera.outstanding_images(), 1);
        drop(image);
        assert_eq!(camera.outstanding_images(), 0);
        Ok(())
    }

    #[test]
    fn stencil_marks_figure_region() {
        let mut segmentation = SyntheticSegmentation::new(4, 4, WalkingFigure::default());
        assert!(segmentation.current_stencil().is_none());

        segmentation.refresh_with(CENTER);
        let stencil = segmentation.current_stencil().expect("stencil");
        let foreground = stencil.texels.iter().filter(|t| **t == 255).count();
        assert_eq!(foreground, 4);
        assert_eq!(stencil.texels[5], 255);
        assert_eq!(stencil.texels[0], 0);
    }

    #[test]
    fn rejects_odd_nv12_dimensions() {
        let config = SyntheticCameraConfig {
            width: 5,
            height: 4,
            layout: SensorLayout::Nv12,
        };
        assert!(SyntheticCamera::new(config, WalkingFigure::default()).is_err());
    }
}
