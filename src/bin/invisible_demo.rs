//! invisible_demo - run the human-erasing compositor against synthetic sources
//!
//! A synthetic camera pushes frames from its own thread, the main thread plays
//! the host and polls the segmentation mask once per host frame, and the
//! lifecycle controller ticks the compositing pipeline. On timeout or Ctrl-C
//! the last composite is written out as PNGs.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use invisible_human::ingest::{
    SyntheticCamera, SyntheticCameraConfig, SyntheticSegmentation, WalkingFigure,
};
use invisible_human::{
    ColorFrameSource, CompositingPipeline, EraserConfig, LatestCompositeSink, LatestValueSlot,
    LifecycleController, MaskFrameSource, PngSink, Resolution, ShutdownSignal, StencilRemap,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// How long to run, in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Host frame rate driving the mask poll.
    #[arg(long, default_value_t = 30)]
    host_fps: u32,
    /// Segmentation stencil resolution (WxH).
    #[arg(long, default_value = "256x192")]
    stencil: String,
    /// Output directory for the final composite (overrides config).
    #[arg(long, env = "INVISIBLE_OUTPUT_DIR")]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.host_fps == 0 {
        return Err(anyhow!("host fps must be >= 1"));
    }
    let stencil: Resolution = args.stencil.parse()?;
    if stencil.is_empty() {
        return Err(anyhow!("stencil resolution must be non-zero"));
    }

    let cfg = EraserConfig::load()?;
    let out_dir = args.out.clone().unwrap_or_else(|| cfg.output_dir.clone());
    log::info!(
        "invisible_demo: camera {}x{} {:?} @ {} fps, capture scale {}, canonical {}, tick {:?}",
        cfg.camera.width,
        cfg.camera.height,
        cfg.camera.layout,
        cfg.camera.fps,
        cfg.capture_scale,
        cfg.canonical,
        cfg.tick_period
    );

    let figure = WalkingFigure::default();
    let camera = Arc::new(SyntheticCamera::new(
        SyntheticCameraConfig {
            width: cfg.camera.width,
            height: cfg.camera.height,
            layout: cfg.camera.layout,
        },
        figure,
    )?);
    let mut segmentation = SyntheticSegmentation::new(stencil.width, stencil.height, figure);

    let shutdown = ShutdownSignal::new();
    let color_slot = Arc::new(LatestValueSlot::new());
    let mask_slot = Arc::new(LatestValueSlot::new());
    let color_source = Arc::new(ColorFrameSource::new(
        color_slot.clone(),
        cfg.capture_scale,
        shutdown.clone(),
    ));
    let mut mask_source = MaskFrameSource::new(
        mask_slot.clone(),
        StencilRemap::with_threshold(cfg.mask_threshold),
        shutdown.clone(),
    );

    let sink = LatestCompositeSink::new();
    let display = sink.handle();
    let pipeline = CompositingPipeline::new(
        color_slot,
        mask_slot,
        cfg.canonical,
        sink,
        shutdown.clone(),
    );
    let mut controller = LifecycleController::new(
        camera.clone(),
        color_source.clone(),
        pipeline,
        cfg.tick_period,
        shutdown.clone(),
    );
    controller.start()?;

    let camera_thread = spawn_camera(camera.clone(), cfg.camera.fps, shutdown.clone())?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let host_period = Duration::from_secs_f64(1.0 / args.host_fps as f64);
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        match rx.recv_timeout(host_period) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        segmentation.refresh();
        mask_source.poll(&segmentation);
    }

    controller.stop()?;
    camera_thread
        .join()
        .map_err(|_| anyhow!("camera thread panicked"))?;

    let color = color_source.stats();
    let mask = mask_source.stats();
    let ticks = controller.stats().snapshot();
    log::info!(
        "frames captured={} unavailable={} conversion_failures={}",
        color.frames_published,
        color.frames_unavailable,
        color.conversion_failures
    );
    log::info!(
        "masks published={} stencil_unavailable={} target_allocations={}",
        mask.masks_published,
        mask.stencil_unavailable,
        mask.target_allocations
    );
    log::info!(
        "ticks={} composited={} skipped={} failed={}",
        ticks.ticks,
        ticks.composited,
        ticks.skipped,
        ticks.failed
    );
    if camera.outstanding_images() != 0 {
        log::warn!("{} camera images never released", camera.outstanding_images());
    }

    match display.peek() {
        Some(result) => {
            let mut png = PngSink::new(&out_dir)?;
            png.write(&result)
                .context("failed to write final composite")?;
            log::info!(
                "wrote composite (color #{}, mask #{}) to {}",
                result.color_sequence,
                result.mask_sequence,
                png.dir().display()
            );
        }
        None => log::warn!("no composite was produced"),
    }
    Ok(())
}

fn spawn_camera(
    camera: Arc<SyntheticCamera>,
    fps: u32,
    shutdown: ShutdownSignal,
) -> Result<thread::JoinHandle<()>> {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    thread::Builder::new()
        .name("synthetic-camera".to_string())
        .spawn(move || {
            while !shutdown.is_cancelled() {
                if let Err(err) = camera.pump() {
                    log::warn!("synthetic camera: {:#}", err);
                }
                thread::sleep(period);
            }
        })
        .context("failed to spawn camera thread")
}
