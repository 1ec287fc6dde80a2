//! Session lifecycle: `Idle → Running → Cancelling → Stopped`.
//!
//! `start` subscribes the color source to the camera driver and spawns the
//! tick thread. `stop` raises the shared `ShutdownSignal`, unsubscribes, wakes
//! the thread and joins it. Cancellation is checked between ticks only, so a
//! tick in flight always finishes. Once `stop` returns no tick runs again and
//! both sources ignore further input.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::ingest::{CameraDriver, ColorFrameSource, FrameListener, ListenerId};
use crate::pipeline::{CompositingPipeline, PipelineStats};
use crate::present::PresentationSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared by the controller, the tick loop and
/// both sources.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    Cancelling,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Running => "running",
            LifecycleState::Cancelling => "cancelling",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct LifecycleController<D: CameraDriver, S: PresentationSink + 'static> {
    driver: Arc<D>,
    color_source: Arc<ColorFrameSource>,
    period: Duration,
    shutdown: ShutdownSignal,
    stats: Arc<PipelineStats>,
    state: LifecycleState,
    /// Present while the tick thread is not running.
    pipeline: Option<CompositingPipeline<S>>,
    listener: Option<ListenerId>,
    worker: Option<JoinHandle<Option<CompositingPipeline<S>>>>,
}

impl<D: CameraDriver, S: PresentationSink + 'static> LifecycleController<D, S> {
    pub fn new(
        driver: Arc<D>,
        color_source: Arc<ColorFrameSource>,
        pipeline: CompositingPipeline<S>,
        period: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        let stats = pipeline.stats();
        Self {
            driver,
            color_source,
            period,
            shutdown,
            stats,
            state: LifecycleState::Idle,
            pipeline: Some(pipeline),
            listener: None,
            worker: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Live tick counters.
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// The pipeline, when the tick thread is not holding it (before `start`,
    /// after `stop`).
    pub fn pipeline(&self) -> Option<&CompositingPipeline<S>> {
        self.pipeline.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut CompositingPipeline<S>> {
        self.pipeline.as_mut()
    }

    /// Idle → Running. Any other state is left untouched.
    pub fn start(&mut self) -> Result<()> {
        self.start_on(thread::Builder::new().name("composite-tick".to_string()))
    }

    /// A failed spawn hands the pipeline back, so the controller stays Idle
    /// and `start` can be retried.
    fn start_on(&mut self, builder: thread::Builder) -> Result<()> {
        if self.state != LifecycleState::Idle {
            log::warn!("lifecycle: start ignored in state {}", self.state);
            return Ok(());
        }
        let Some(pipeline) = self.pipeline.take() else {
            return Err(anyhow!("lifecycle: pipeline missing"));
        };

        // Weak, so the driver's listener list does not keep the driver alive.
        let driver = Arc::downgrade(&self.driver);
        let source = self.color_source.clone();
        let listener: FrameListener = Arc::new(move || {
            if let Some(driver) = driver.upgrade() {
                source.on_frame_available(driver.try_acquire_latest_image());
            }
        });
        let id = match self.driver.subscribe(listener) {
            Ok(id) => id,
            Err(err) => {
                self.pipeline = Some(pipeline);
                return Err(err.context("lifecycle: camera subscription failed"));
            }
        };

        let period = self.period;
        let shutdown = self.shutdown.clone();
        let handoff = Arc::new(Mutex::new(Some(pipeline)));
        let taken = handoff.clone();
        let spawned = builder
            .spawn(move || {
                let pipeline = taken.lock().ok().and_then(|mut slot| slot.take())?;
                Some(run_ticks(pipeline, period, shutdown))
            })
            .context("lifecycle: failed to spawn tick thread");
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.driver.unsubscribe(id);
                self.pipeline = handoff.lock().ok().and_then(|mut slot| slot.take());
                return Err(err);
            }
        };

        self.listener = Some(id);
        self.worker = Some(worker);
        self.transition(LifecycleState::Running);
        Ok(())
    }

    /// Running → Cancelling → Stopped. Blocks until the tick thread has exited.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != LifecycleState::Running {
            log::warn!("lifecycle: stop ignored in state {}", self.state);
            return Ok(());
        }
        self.transition(LifecycleState::Cancelling);
        self.shutdown.cancel();
        if let Some(id) = self.listener.take() {
            self.driver.unsubscribe(id);
        }

        let joined = match self.worker.take() {
            Some(worker) => {
                worker.thread().unpark();
                worker
                    .join()
                    .map_err(|_| anyhow!("lifecycle: tick thread panicked"))
            }
            None => Err(anyhow!("lifecycle: tick thread missing")),
        };
        self.transition(LifecycleState::Stopped);
        let pipeline =
            joined?.ok_or_else(|| anyhow!("lifecycle: tick thread exited without pipeline"))?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn transition(&mut self, next: LifecycleState) {
        log::info!("lifecycle: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl<D: CameraDriver, S: PresentationSink + 'static> Drop for LifecycleController<D, S> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Running {
            if let Err(err) = self.stop() {
                log::error!("{:#}", err);
            }
        }
    }
}

fn run_ticks<S: PresentationSink>(
    mut pipeline: CompositingPipeline<S>,
    period: Duration,
    shutdown: ShutdownSignal,
) -> CompositingPipeline<S> {
    let stats = pipeline.stats();
    let mut last_health = Instant::now();
    log::info!(
        "composite loop running: period {:?}, canonical {}",
        period,
        pipeline.canonical()
    );
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        pipeline.tick();

        if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
            let s = stats.snapshot();
            log::info!(
                "composite health: ticks={} composited={} skipped={} failed={}",
                s.ticks,
                s.composited,
                s.skipped,
                s.failed
            );
            last_health = Instant::now();
        }

        // `stop` unparks us, so a long period does not delay shutdown.
        thread::park_timeout(period);
    }
    log::info!("composite loop exited");
    pipeline
}
