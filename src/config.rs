use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::Resolution;
use crate::ingest::color::DEFAULT_CAPTURE_SCALE;
use crate::ingest::mask::DEFAULT_MASK_THRESHOLD;
use crate::ingest::SensorLayout;

const DEFAULT_TICK_PERIOD_MS: u64 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 960;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_OUTPUT_DIR: &str = "invisible_out";

#[derive(Debug, Deserialize, Default)]
struct EraserConfigFile {
    capture: Option<CaptureConfigFile>,
    canonical: Option<CanonicalConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    mask: Option<MaskConfigFile>,
    camera: Option<CameraConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    scale: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CanonicalConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    tick_period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MaskConfigFile {
    threshold: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    layout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EraserConfig {
    /// Driver resolution is divided by this before publishing color frames.
    pub capture_scale: u32,
    /// Size every composite is resampled to.
    pub canonical: Resolution,
    pub tick_period: Duration,
    pub mask_threshold: u8,
    pub camera: CameraSettings,
    pub output_dir: PathBuf,
}

/// Synthetic camera settings used by the demo binary.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub layout: SensorLayout,
}

impl EraserConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INVISIBLE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EraserConfigFile) -> Result<Self> {
        let canonical_default = Resolution::default();
        let canonical = Resolution::new(
            file.canonical
                .as_ref()
                .and_then(|c| c.width)
                .unwrap_or(canonical_default.width),
            file.canonical
                .as_ref()
                .and_then(|c| c.height)
                .unwrap_or(canonical_default.height),
        );
        let layout = match file.camera.as_ref().and_then(|c| c.layout.as_deref()) {
            Some(raw) => SensorLayout::parse(raw)
                .ok_or_else(|| anyhow!("unknown camera layout '{}'", raw))?,
            None => SensorLayout::Nv12,
        };
        let camera = CameraSettings {
            width: file
                .camera
                .as_ref()
                .and_then(|c| c.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|c| c.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
            fps: file
                .camera
                .as_ref()
                .and_then(|c| c.fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
            layout,
        };
        Ok(Self {
            capture_scale: file
                .capture
                .and_then(|c| c.scale)
                .unwrap_or(DEFAULT_CAPTURE_SCALE),
            canonical,
            tick_period: Duration::from_millis(
                file.pipeline
                    .and_then(|p| p.tick_period_ms)
                    .unwrap_or(DEFAULT_TICK_PERIOD_MS),
            ),
            mask_threshold: file
                .mask
                .and_then(|m| m.threshold)
                .unwrap_or(DEFAULT_MASK_THRESHOLD),
            camera,
            output_dir: file
                .output
                .and_then(|o| o.dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(scale) = std::env::var("INVISIBLE_CAPTURE_SCALE") {
            self.capture_scale = scale
                .trim()
                .parse()
                .map_err(|_| anyhow!("INVISIBLE_CAPTURE_SCALE must be a positive integer"))?;
        }
        if let Ok(resolution) = std::env::var("INVISIBLE_CANONICAL_RESOLUTION") {
            if !resolution.trim().is_empty() {
                self.canonical = resolution
                    .parse()
                    .map_err(|e| anyhow!("INVISIBLE_CANONICAL_RESOLUTION: {}", e))?;
            }
        }
        if let Ok(period) = std::env::var("INVISIBLE_TICK_PERIOD_MS") {
            let millis: u64 = period.trim().parse().map_err(|_| {
                anyhow!("INVISIBLE_TICK_PERIOD_MS must be an integer number of milliseconds")
            })?;
            self.tick_period = Duration::from_millis(millis);
        }
        if let Ok(threshold) = std::env::var("INVISIBLE_MASK_THRESHOLD") {
            self.mask_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("INVISIBLE_MASK_THRESHOLD must be in 0..=255"))?;
        }
        if let Ok(dir) = std::env::var("INVISIBLE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture_scale == 0 {
            return Err(anyhow!("capture scale must be at least 1"));
        }
        if self.canonical.is_empty() {
            return Err(anyhow!(
                "canonical resolution must be non-zero, got {}",
                self.canonical
            ));
        }
        if self.tick_period.is_zero() {
            return Err(anyhow!("tick period must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(anyhow!("camera width, height and fps must be non-zero"));
        }
        Ok(())
    }
}

impl Default for EraserConfig {
    fn default() -> Self {
        Self {
            capture_scale: DEFAULT_CAPTURE_SCALE,
            canonical: Resolution::default(),
            tick_period: Duration::from_millis(DEFAULT_TICK_PERIOD_MS),
            mask_threshold: DEFAULT_MASK_THRESHOLD,
            camera: CameraSettings {
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                fps: DEFAULT_CAMERA_FPS,
                layout: SensorLayout::Nv12,
            },
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

fn read_config_file(path: &Path) -> Result<EraserConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let cfg = EraserConfig::from_file(EraserConfigFile::default())?;
        assert_eq!(cfg.capture_scale, 2);
        assert_eq!(cfg.canonical, Resolution::new(640, 480));
        assert_eq!(cfg.tick_period, Duration::from_millis(10));
        assert_eq!(cfg.mask_threshold, 128);
        assert_eq!(cfg.camera.layout, SensorLayout::Nv12);
        cfg.validate()?;
        Ok(())
    }

    #[test]
    fn validation_rejects_zero_values() -> Result<()> {
        let mut cfg = EraserConfig::default();
        cfg.capture_scale = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EraserConfig::default();
        cfg.canonical = Resolution::new(640, 0);
        assert!(cfg.validate().is_err());

        let mut cfg = EraserConfig::default();
        cfg.tick_period = Duration::ZERO;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn unknown_camera_layout_is_an_error() -> Result<()> {
        let file: EraserConfigFile = serde_json::from_str(r#"{"camera": {"layout": "yuyv"}}"#)?;
        assert!(EraserConfig::from_file(file).is_err());
        Ok(())
    }
}
