//! Core telemetry pipeline.
//!
//! This module contains:
//! - Head angle extraction from nose and ear keypoints
//! - The time-bounded sample log
//! - Cadence-gated variance snapshots
//! - Export alignment and CSV rendering
//! - The engine tying them together

pub mod angles;
pub mod engine;
pub mod export;
pub mod samples;
pub mod variance;

// Re-export commonly used types
pub use angles::{compute_angles, AngleChannel, HeadAngles, Keypoint};
pub use engine::{EngineSettings, TelemetryEngine, TelemetryView, TickOutcome};
pub use export::{align, write_csv, AlignmentPolicy, ExportError, ExportRow};
pub use samples::{AngleSample, SampleBuffer};
pub use variance::{population_variance, VarianceSampler, VarianceSnapshot};
