//! Camera frame source.
//!
//! `ColorFrameSource` is driven by the camera driver's frame callback. For
//! every available image it:
//! - Converts to RGBA8 at `1 / capture_scale` resolution, mirrored vertically
//! - Releases the driver image before publishing
//! - Publishes the result into the color slot, replacing any unread frame
//!
//! A missing image is the normal "nothing ready" case and is silently skipped.
//! Once the session's shutdown signal fires, callbacks become no-ops.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::normalize::convert_to_rgba;
use super::SensorImage;
use crate::frame::ColorFrame;
use crate::lifecycle::ShutdownSignal;
use crate::slot::LatestValueSlot;

/// Default capture scale: halve the driver resolution.
pub const DEFAULT_CAPTURE_SCALE: u32 = 2;

pub struct ColorFrameSource {
    slot: Arc<LatestValueSlot<ColorFrame>>,
    capture_scale: u32,
    shutdown: ShutdownSignal,
    next_sequence: AtomicU64,
    /// Pixel buffer reclaimed from a frame that was overwritten before it was read.
    /// Only the driver callback touches this.
    recycled: Mutex<Option<Vec<u8>>>,
    frames_published: AtomicU64,
    frames_unavailable: AtomicU64,
    conversion_failures: AtomicU64,
}

/// Statistics for the color source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorStats {
    pub frames_published: u64,
    pub frames_unavailable: u64,
    pub conversion_failures: u64,
}

impl ColorFrameSource {
    pub fn new(
        slot: Arc<LatestValueSlot<ColorFrame>>,
        capture_scale: u32,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            slot,
            capture_scale: capture_scale.max(1),
            shutdown,
            next_sequence: AtomicU64::new(1),
            recycled: Mutex::new(None),
            frames_published: AtomicU64::new(0),
            frames_unavailable: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
        }
    }

    /// Frame callback. `image` is whatever the driver could acquire right now.
    ///
    /// Returns true when a frame was published.
    pub fn on_frame_available<I: SensorImage>(&self, image: Option<I>) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let Some(image) = image else {
            self.frames_unavailable.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match self.convert(image) {
            Ok(frame) => {
                self.publish(frame);
                true
            }
            Err(err) => {
                self.conversion_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("ColorFrameSource: dropping camera frame: {:#}", err);
                false
            }
        }
    }

    /// Copy the driver image into an owned frame. The image is released on
    /// every path out of this function.
    fn convert<I: SensorImage>(&self, image: I) -> Result<ColorFrame> {
        let mut buffer = self.take_recycled();
        let (width, height) = convert_to_rgba(
            image.pixels(),
            image.width(),
            image.height(),
            image.layout(),
            self.capture_scale,
            &mut buffer,
        )?;
        drop(image);

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        ColorFrame::from_rgba(width, height, buffer, sequence)
    }

    fn publish(&self, frame: ColorFrame) {
        let displaced = self.slot.publish(frame);
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        if let Some(stale) = displaced.and_then(|arc| Arc::try_unwrap(arc).ok()) {
            if let Ok(mut recycled) = self.recycled.lock() {
                *recycled = Some(stale.into_data());
            }
        }
    }

    fn take_recycled(&self) -> Vec<u8> {
        self.recycled
            .lock()
            .ok()
            .and_then(|mut recycled| recycled.take())
            .unwrap_or_default()
    }

    pub fn slot(&self) -> &Arc<LatestValueSlot<ColorFrame>> {
        &self.slot
    }

    pub fn stats(&self) -> ColorStats {
        ColorStats {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_unavailable: self.frames_unavailable.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SensorLayout;
    use std::sync::atomic::AtomicUsize;

    struct TestImage {
        width: u32,
        height: u32,
        layout: SensorLayout,
        data: Vec<u8>,
        releases: Arc<AtomicUsize>,
    }

    impl SensorImage for TestImage {
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

    impl Drop for TestImage {
        fn drop(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn rgba_image(width: u32, height: u32, value: u8, releases: &Arc<AtomicUsize>) -> TestImage {
        TestImage {
            width,
            height,
            layout: SensorLayout::Rgba8,
            data: vec![value; (width * height * 4) as usize],
            releases: releases.clone(),
        }
    }

    fn source() -> ColorFrameSource {
        ColorFrameSource::new(
            Arc::new(LatestValueSlot::new()),
            DEFAULT_CAPTURE_SCALE,
            ShutdownSignal::new(),
        )
    }

    #[test]
    fn publishes_half_resolution_frame() {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = source();

        assert!(source.on_frame_available(Some(rgba_image(8, 6, 200, &releases))));
        let frame = source.slot().try_consume().expect("frame published");
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert!(frame.image().as_raw().iter().all(|v| *v == 200));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_image_is_a_noop() {
        let source = source();
        assert!(!source.on_frame_available::<TestImage>(None));
        assert!(!source.slot().is_ready());
        assert_eq!(source.stats().frames_unavailable, 1);
        assert_eq!(source.stats().frames_published, 0);
    }

    #[test]
    fn malformed_image_is_released_and_dropped() {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = source();
        let mut image = rgba_image(4, 4, 1, &releases);
        image.data.truncate(10);

        assert!(!source.on_frame_available(Some(image)));
        assert!(!source.slot().is_ready());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(source.stats().conversion_failures, 1);
    }

    #[test]
    fn sequence_ids_increase_and_latest_wins() {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = source();
        source.on_frame_available(Some(rgba_image(4, 4, 1, &releases)));
        source.on_frame_available(Some(rgba_image(4, 4, 2, &releases)));

        let frame = source.slot().try_consume().expect("latest frame");
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.image().as_raw()[0], 2);
        assert!(source.slot().try_consume().is_none());
        assert_eq!(source.slot().overwritten(), 1);
    }

    #[test]
    fn cancelled_source_ignores_frames() {
        let releases = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownSignal::new();
        let source = ColorFrameSource::new(Arc::new(LatestValueSlot::new()), 2, shutdown.clone());
        shutdown.cancel();

        assert!(!source.on_frame_available(Some(rgba_image(4, 4, 1, &releases))));
        assert_eq!(source.slot().published(), 0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
