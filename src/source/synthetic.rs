//! Synthetic head sway for demos and soak runs.
//!
//! Produces world-space frames of a head swaying on slow sinusoids, with
//! optional periodic dropouts where no pose is reported.

use super::{spawn_feeder, SourceError, FRAME_CHANNEL_CAPACITY};
use crate::core::angles::Keypoint;
use crate::source::types::{DetectionFrame, LEFT_EAR_INDEX, NOSE_INDEX, RIGHT_EAR_INDEX};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Number of landmarks in a full pose.
const POSE_LANDMARKS: usize = 33;

/// Half the distance between the ears, in metres.
const HEAD_HALF_WIDTH: f64 = 0.075;

/// Distance of the nose in front of the ear line, in metres.
const NOSE_DEPTH: f64 = 0.09;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Frames per second of simulated capture time
    pub rate_hz: u32,
    /// Stop after this many frames; `None` runs until stopped
    pub frames: Option<u64>,
    /// Emit a frame without a pose every this many frames
    pub dropout_every: Option<u64>,
    /// Peak sway amplitude in degrees
    pub amplitude_deg: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30,
            frames: None,
            dropout_every: None,
            amplitude_deg: 8.0,
        }
    }
}

/// Build the `index`-th synthetic frame.
pub fn synthetic_frame(config: &SyntheticConfig, index: u64) -> DetectionFrame {
    let rate = f64::from(config.rate_hz.max(1));
    let timestamp_ms = (index as f64 * 1000.0 / rate).round() as u64;

    if config.dropout_every.is_some_and(|n| n > 0 && index % n == n - 1) {
        return DetectionFrame {
            timestamp_ms: Some(timestamp_ms),
            ..DetectionFrame::default()
        };
    }

    let secs = timestamp_ms as f64 / 1000.0;
    let amp = config.amplitude_deg.to_radians();
    let pitch = amp * (secs * 0.31).sin();
    let yaw = amp * (secs * 0.17 + 1.0).sin();
    let roll = 0.5 * amp * (secs * 0.23 + 2.0).sin();

    let mut landmarks = vec![None; POSE_LANDMARKS];
    landmarks[NOSE_INDEX] = Some(Keypoint::new(
        NOSE_DEPTH * yaw.sin(),
        NOSE_DEPTH * pitch.sin(),
        -NOSE_DEPTH * yaw.cos() * pitch.cos(),
    ));
    landmarks[LEFT_EAR_INDEX] = Some(Keypoint::new(
        -HEAD_HALF_WIDTH * roll.cos(),
        -HEAD_HALF_WIDTH * roll.sin(),
        0.0,
    ));
    landmarks[RIGHT_EAR_INDEX] = Some(Keypoint::new(
        HEAD_HALF_WIDTH * roll.cos(),
        HEAD_HALF_WIDTH * roll.sin(),
        0.0,
    ));

    DetectionFrame {
        timestamp_ms: Some(timestamp_ms),
        world_landmarks: Some(landmarks),
        landmarks: None,
    }
}

/// Feeds synthetic frames into a bounded channel.
pub struct SyntheticSource {
    config: SyntheticConfig,
    sender: Option<Sender<DetectionFrame>>,
    receiver: Receiver<DetectionFrame>,
    running: Arc<AtomicBool>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let (sender, receiver) = bounded(FRAME_CHANNEL_CAPACITY);
        Self {
            config,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        let sender = self.sender.take().ok_or(SourceError::AlreadyRunning)?;

        let config = self.config.clone();
        let limit = config.frames.unwrap_or(u64::MAX);
        let frames = (0..limit).map(move |i| synthetic_frame(&config, i));

        self.running.store(true, Ordering::SeqCst);
        if let Err(e) = spawn_feeder("synthetic-source", frames, sender, self.running.clone()) {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        tracing::info!(rate_hz = self.config.rate_hz, "synthetic source started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<DetectionFrame> {
        &self.receiver
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::angles::compute_angles;
    use std::time::Duration;

    #[test]
    fn test_frame_at_rest_faces_forward() {
        let config = SyntheticConfig::default();
        let frame = synthetic_frame(&config, 0);
        assert_eq!(frame.timestamp_ms, Some(0));

        let head = frame.head_keypoints().unwrap();
        let angles = compute_angles(
            head.nose.as_ref(),
            head.left_ear.as_ref(),
            head.right_ear.as_ref(),
        );
        assert!(angles.pitch.unwrap().abs() < 1e-6);
        assert!(angles.yaw.unwrap().abs() < config.amplitude_deg + 1.0);
        assert!(angles.roll.unwrap().abs() <= config.amplitude_deg);
    }

    #[test]
    fn test_dropouts() {
        let config = SyntheticConfig {
            dropout_every: Some(4),
            ..SyntheticConfig::default()
        };
        let poses: Vec<bool> = (0..8).map(|i| synthetic_frame(&config, i).has_pose()).collect();
        assert_eq!(poses, vec![true, true, true, false, true, true, true, false]);
    }

    #[test]
    fn test_timestamps_follow_rate() {
        let config = SyntheticConfig {
            rate_hz: 4,
            ..SyntheticConfig::default()
        };
        assert_eq!(synthetic_frame(&config, 3).timestamp_ms, Some(750));
    }

    #[test]
    fn test_bounded_run_disconnects() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            frames: Some(3),
            ..SyntheticConfig::default()
        });
        source.start().unwrap();
        let rx = source.receiver().clone();
        for _ in 0..3 {
            assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        }
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());
    }
}
