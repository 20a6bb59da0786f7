//! Head Sway Telemetry - head orientation variance from live pose keypoints.
//!
//! This library turns a stream of pose-estimator frames into pitch, yaw and
//! roll angles, keeps a time-bounded log of them, and periodically records
//! the variance of one angle over the whole retained window.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Head Sway Telemetry                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│   Angles    │──▶│   Samples   │       │
//! │  │ (frames)    │   │ (pitch/yaw/ │   │ (retention  │       │
//! │  │             │   │  roll)      │   │  window)    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                              │              │
//! │                                              ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │   Export    │◀────────────────────│  Variance   │       │
//! │  │   (CSV)     │                     │ (cadence)   │       │
//! │  └─────────────┘                     └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use head_sway_telemetry::core::{EngineSettings, Keypoint, TelemetryEngine};
//! use head_sway_telemetry::source::DetectionFrame;
//!
//! let mut engine = TelemetryEngine::new(EngineSettings::default());
//!
//! let mut landmarks = vec![None; 9];
//! landmarks[0] = Some(Keypoint::new(0.0, 0.0, -1.0));
//! landmarks[7] = Some(Keypoint::new(-1.0, 0.0, 0.0));
//! landmarks[8] = Some(Keypoint::new(1.0, 0.0, 0.0));
//! let frame = DetectionFrame {
//!     timestamp_ms: Some(0),
//!     world_landmarks: Some(landmarks),
//!     landmarks: None,
//! };
//!
//! let outcome = engine.process_frame(0, &frame);
//! assert!(outcome.snapshot.is_some());
//! println!("{}", engine.export_csv());
//! ```

pub mod config;
pub mod core;
pub mod session;
pub mod source;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{
    compute_angles, AngleChannel, AngleSample, EngineSettings, HeadAngles, SampleBuffer,
    TelemetryEngine, TelemetryView, VarianceSampler, VarianceSnapshot,
};
pub use session::{Command, RunReport, Runner, SessionStats, SharedSessionStats, StopReason};
pub use source::{DetectionFrame, ReplayInput, ReplaySource, SourceError, SyntheticSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
