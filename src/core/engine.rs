//! The aggregation engine: angle extraction, the sample log, the variance
//! series and export, driven one frame at a time.
//!
//! The engine is owned by a single thread. Nothing here locks; callers
//! keep ticks, resets and exports on the same thread.

use crate::core::angles::{compute_angles, AngleChannel, HeadAngles};
use crate::core::export::{align, write_csv, AlignmentPolicy, ExportRow};
use crate::core::samples::{AngleSample, SampleBuffer};
use crate::core::variance::{VarianceSampler, VarianceSnapshot};
use crate::source::types::DetectionFrame;
use std::time::Duration;

/// Smallest bar-chart scale, so an all-zero series still draws.
const MIN_CHART_SCALE: f64 = 0.0001;

/// Placeholder readout before the first snapshot.
pub const EMPTY_READOUT: &str = "–";

/// Settings the engine reads on every tick. All of them may change while
/// running without clearing any data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub retention_window: Duration,
    pub cadence_period: Duration,
    pub channel: AngleChannel,
    pub alignment: AlignmentPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retention_window: Duration::from_secs(3600),
            cadence_period: Duration::from_secs(30),
            channel: AngleChannel::default(),
            alignment: AlignmentPolicy::default(),
        }
    }
}

/// What a single frame produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickOutcome {
    /// Set when the frame held a pose, even if its angles are missing
    pub sample: Option<AngleSample>,
    /// Set when this tick crossed a cadence boundary
    pub snapshot: Option<VarianceSnapshot>,
}

/// Display state for the chart and the textual readout.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryView {
    pub channel: AngleChannel,
    pub latest: Option<f64>,
    /// Latest value with four decimals, or a dash before the first snapshot
    pub readout: String,
    pub series: Vec<f64>,
    /// `series` scaled into 0..=1 against its maximum
    pub bars: Vec<f64>,
}

pub struct TelemetryEngine {
    settings: EngineSettings,
    samples: SampleBuffer,
    sampler: VarianceSampler,
    latest_detection: Option<DetectionFrame>,
    latest_angles: HeadAngles,
}

impl TelemetryEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            samples: SampleBuffer::new(settings.retention_window),
            sampler: VarianceSampler::new(settings.cadence_period, settings.retention_window),
            settings,
            latest_detection: None,
            latest_angles: HeadAngles::missing(),
        }
    }

    /// Run one frame through the pipeline at time `now` (ms).
    ///
    /// A frame without any pose produces no sample and skips the cadence
    /// check. A pose with missing keypoints still produces a sample, with
    /// all angles missing.
    pub fn process_frame(&mut self, now: u64, frame: &DetectionFrame) -> TickOutcome {
        let head = frame.head_keypoints();
        self.latest_detection = Some(frame.clone());

        let Some(head) = head else {
            tracing::debug!(t = now, "no pose in frame");
            return TickOutcome::default();
        };

        let angles = compute_angles(
            head.nose.as_ref(),
            head.left_ear.as_ref(),
            head.right_ear.as_ref(),
        );
        self.latest_angles = angles;
        if angles.is_missing() {
            tracing::debug!(t = now, "head keypoints incomplete");
        }

        let sample = AngleSample::new(now, angles);
        self.samples.ingest(sample);

        let snapshot = self
            .sampler
            .maybe_sample(now, &self.samples, self.settings.channel);

        TickOutcome {
            sample: Some(sample),
            snapshot,
        }
    }

    /// Swap in new settings. Buffers are kept; the new retention applies at
    /// the next ingest and the new cadence at the next cadence check.
    pub fn apply_settings(&mut self, settings: EngineSettings) {
        if settings == self.settings {
            return;
        }
        self.samples.set_retention(settings.retention_window);
        self.sampler.set_cadence(settings.cadence_period);
        self.sampler.set_retention(settings.retention_window);
        tracing::info!(
            retention_secs = settings.retention_window.as_secs(),
            cadence_secs = settings.cadence_period.as_secs(),
            channel = %settings.channel,
            "settings updated"
        );
        self.settings = settings;
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Clear samples, snapshots and display state. Settings are kept.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.sampler.reset();
        self.latest_detection = None;
        self.latest_angles = HeadAngles::missing();
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &VarianceSnapshot> {
        self.sampler.series().iter()
    }

    pub fn snapshot_count(&self) -> usize {
        self.sampler.series().len()
    }

    /// Most recent frame, for the skeleton overlay.
    pub fn latest_detection(&self) -> Option<&DetectionFrame> {
        self.latest_detection.as_ref()
    }

    pub fn latest_angles(&self) -> HeadAngles {
        self.latest_angles
    }

    pub fn view(&self) -> TelemetryView {
        let series: Vec<f64> = self.sampler.series().iter().map(|s| s.value).collect();
        let latest = self.sampler.latest().map(|s| s.value);
        let scale = series.iter().copied().fold(MIN_CHART_SCALE, f64::max);

        TelemetryView {
            channel: self.settings.channel,
            latest,
            readout: latest.map_or_else(|| EMPTY_READOUT.to_string(), |v| format!("{v:.4}")),
            bars: series.iter().map(|v| v / scale).collect(),
            series,
        }
    }

    /// One row per retained sample, joined per the configured policy.
    pub fn export_rows(&self) -> Vec<ExportRow> {
        align(
            self.samples.current_window(),
            self.sampler.series(),
            self.settings.alignment,
        )
    }

    pub fn export_csv(&self) -> String {
        write_csv(&self.export_rows(), self.settings.channel)
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}
