//! The tick loop.
//!
//! One thread owns the engine. Each tick waits for a frame (bounded by a
//! short timeout so the stop flag is seen promptly), runs it through the
//! engine, and reports the outcome. By default a tick takes the newest
//! frame available and drops older queued ones, so a source delivering
//! faster than the tick rate never builds a backlog. Commands from other
//! threads are queued on a channel and applied between ticks, so a reset
//! or export never lands in the middle of a tick.

use crate::core::engine::{EngineSettings, TelemetryEngine, TickOutcome};
use crate::core::export::write_export;
use crate::session::stats::SharedSessionStats;
use crate::source::types::DetectionFrame;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest a tick waits for a frame before re-checking the stop flag.
const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest sleep while pacing, so commands stay responsive at low rates.
const PACING_SLICE: Duration = Duration::from_millis(20);

/// Requests handled between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Apply new engine settings and tick interval
    Configure {
        settings: EngineSettings,
        tick_interval: Duration,
    },
    /// Clear samples and snapshots
    Reset,
    /// Write a CSV of the current state to the export directory
    Export,
    /// Leave the loop after the current tick
    Stop,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The running flag was cleared or a `Stop` command arrived
    Cancelled,
    /// The frame source closed its channel
    SourceFinished,
}

/// Result of a completed run. The engine is handed back for a final export.
pub struct RunReport {
    pub engine: TelemetryEngine,
    pub ticks: u64,
    pub exports: Vec<PathBuf>,
    pub reason: StopReason,
}

type Observer = Box<dyn FnMut(&TickOutcome, &TelemetryEngine)>;

pub struct Runner {
    engine: TelemetryEngine,
    frames: Receiver<DetectionFrame>,
    commands: Receiver<Command>,
    running: Arc<AtomicBool>,
    stats: SharedSessionStats,
    tick_interval: Duration,
    every_frame: bool,
    export_dir: PathBuf,
    observer: Option<Observer>,
    started: Instant,
    last_tick: Option<Instant>,
    last_t: u64,
    ticks: u64,
    exports: Vec<PathBuf>,
}

impl Runner {
    pub fn new(
        engine: TelemetryEngine,
        frames: Receiver<DetectionFrame>,
        commands: Receiver<Command>,
        running: Arc<AtomicBool>,
        stats: SharedSessionStats,
    ) -> Self {
        Self {
            engine,
            frames,
            commands,
            running,
            stats,
            tick_interval: Duration::ZERO,
            every_frame: false,
            export_dir: PathBuf::from("."),
            observer: None,
            started: Instant::now(),
            last_tick: None,
            last_t: 0,
            ticks: 0,
            exports: Vec::new(),
        }
    }

    /// Minimum time between two ticks.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Process every queued frame in order instead of only the newest.
    /// Suited to recordings and simulated capture, where frame time is not
    /// wall-clock time.
    pub fn with_every_frame(mut self, every_frame: bool) -> Self {
        self.every_frame = every_frame;
        self
    }

    pub fn with_export_dir(mut self, dir: PathBuf) -> Self {
        self.export_dir = dir;
        self
    }

    /// Called after every tick that consumed a frame.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&TickOutcome, &TelemetryEngine) + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Run until cancelled or the source closes.
    pub fn run(mut self) -> RunReport {
        tracing::info!(session = %self.stats.session_id(), "session started");
        let mut reason = StopReason::Cancelled;

        while self.running.load(Ordering::SeqCst) {
            if !self.drain_commands() {
                break;
            }

            if let Some(wait) = self.pacing_wait() {
                thread::sleep(wait.min(PACING_SLICE));
                continue;
            }

            match self.frames.recv_timeout(ACQUIRE_TIMEOUT) {
                Ok(frame) => {
                    let frame = if self.every_frame {
                        frame
                    } else {
                        self.newest(frame)
                    };
                    self.tick(frame);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("frame source finished");
                    reason = StopReason::SourceFinished;
                    break;
                }
            }
        }

        // Honour anything queued before the loop noticed the stop.
        self.drain_commands();

        tracing::info!(ticks = self.ticks, ?reason, "session stopped");
        RunReport {
            engine: self.engine,
            ticks: self.ticks,
            exports: self.exports,
            reason,
        }
    }

    fn pacing_wait(&self) -> Option<Duration> {
        let elapsed = self.last_tick?.elapsed();
        (elapsed < self.tick_interval).then(|| self.tick_interval - elapsed)
    }

    // Drop everything queued behind `first` except the last frame.
    fn newest(&mut self, first: DetectionFrame) -> DetectionFrame {
        let mut skipped = 0u64;
        let mut latest = first;
        for frame in self.frames.try_iter() {
            skipped += 1;
            latest = frame;
        }
        if skipped > 0 {
            self.stats.record_skipped(skipped);
            tracing::debug!(skipped, "dropped stale frames");
        }
        latest
    }

    fn tick(&mut self, frame: DetectionFrame) {
        self.last_tick = Some(Instant::now());
        self.ticks += 1;

        let now = self.timestamp_for(&frame);
        let outcome = self.engine.process_frame(now, &frame);

        self.stats.record_frame(outcome.sample.is_some());
        if outcome.sample.is_some() {
            self.stats.record_sample();
        }
        if let Some(snapshot) = outcome.snapshot {
            self.stats.record_snapshot();
            tracing::info!(
                t = snapshot.t,
                channel = %snapshot.channel,
                variance = %format!("{:.4}", snapshot.value),
                snapshots = self.engine.snapshot_count(),
                "window variance updated"
            );
        }

        if let Some(observer) = self.observer.as_mut() {
            observer(&outcome, &self.engine);
        }
    }

    // Frame timestamps win when present; either way time never goes back.
    fn timestamp_for(&mut self, frame: &DetectionFrame) -> u64 {
        let raw = frame.timestamp_ms.unwrap_or_else(|| {
            u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
        });
        let t = raw.max(self.last_t);
        self.last_t = t;
        t
    }

    /// Apply queued commands. Returns false once the loop should stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return self.running.load(Ordering::SeqCst);
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Configure {
                settings,
                tick_interval,
            } => {
                self.engine.apply_settings(settings);
                self.tick_interval = tick_interval;
            }
            Command::Reset => {
                self.engine.reset();
                self.stats.record_reset();
                tracing::info!("telemetry reset");
            }
            Command::Export => self.export(),
            Command::Stop => {
                self.running.store(false, Ordering::SeqCst);
                tracing::info!("stop requested");
            }
        }
    }

    fn export(&mut self) {
        let csv = self.engine.export_csv();
        match write_export(&self.export_dir, &csv) {
            Ok(path) => {
                self.stats.record_export();
                tracing::info!(
                    path = %path.display(),
                    rows = self.engine.samples().len(),
                    "exported telemetry"
                );
                self.exports.push(path);
            }
            Err(e) => tracing::warn!("Export failed: {e}"),
        }
    }
}
