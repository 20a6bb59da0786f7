//! Time-bounded log of angle samples.
//!
//! Samples arrive in timestamp order and are evicted from the head once
//! they fall outside the retention window. Eviction only happens on
//! ingest; a read between two ingests may still see entries that aged out
//! in the meantime.

use crate::core::angles::{AngleChannel, HeadAngles};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// One processed frame worth of angles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleSample {
    /// Monotonic timestamp in milliseconds
    pub t: u64,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub roll: Option<f64>,
}

impl AngleSample {
    pub fn new(t: u64, angles: HeadAngles) -> Self {
        Self {
            t,
            pitch: angles.pitch,
            yaw: angles.yaw,
            roll: angles.roll,
        }
    }

    pub fn get(&self, channel: AngleChannel) -> Option<f64> {
        match channel {
            AngleChannel::Pitch => self.pitch,
            AngleChannel::Yaw => self.yaw,
            AngleChannel::Roll => self.roll,
        }
    }
}

/// Ordered sample log capped to a retention horizon.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    retention_ms: u64,
    samples: VecDeque<AngleSample>,
}

impl SampleBuffer {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention_ms: duration_ms(retention),
            samples: VecDeque::new(),
        }
    }

    /// Append a sample and evict everything older than `sample.t - retention`.
    ///
    /// Callers supply non-decreasing timestamps.
    pub fn ingest(&mut self, sample: AngleSample) {
        let now = sample.t;
        self.samples.push_back(sample);
        self.evict_before(now.saturating_sub(self.retention_ms));
    }

    fn evict_before(&mut self, cutoff: u64) {
        while self.samples.front().is_some_and(|s| s.t < cutoff) {
            self.samples.pop_front();
        }
    }

    /// The live window, oldest first.
    pub fn current_window(&self) -> &VecDeque<AngleSample> {
        &self.samples
    }

    /// Finite values of one channel, oldest first. Missing angles are skipped.
    pub fn select(&self, channel: AngleChannel) -> Vec<f64> {
        self.select_where(channel, |_| true)
    }

    /// Like [`select`](Self::select) with an extra filter on each sample.
    pub fn select_where<P>(&self, channel: AngleChannel, mut predicate: P) -> Vec<f64>
    where
        P: FnMut(&AngleSample) -> bool,
    {
        self.samples
            .iter()
            .filter(|s| predicate(s))
            .filter_map(|s| s.get(channel))
            .filter(|v| v.is_finite())
            .collect()
    }

    /// Change the horizon. Takes effect at the next ingest.
    pub fn set_retention(&mut self, retention: Duration) {
        self.retention_ms = duration_ms(retention);
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the newest sample.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.samples.back().map(|s| s.t)
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: u64, pitch: Option<f64>) -> AngleSample {
        AngleSample {
            t,
            pitch,
            yaw: Some(0.0),
            roll: None,
        }
    }

    #[test]
    fn test_eviction_keeps_only_window() {
        let mut buffer = SampleBuffer::new(Duration::from_millis(1000));
        for t in (0..=3000).step_by(250) {
            buffer.ingest(sample(t, Some(t as f64)));
        }

        let window = buffer.current_window();
        assert_eq!(window.front().unwrap().t, 2000);
        assert_eq!(window.back().unwrap().t, 3000);
        assert!(window.iter().all(|s| s.t >= 3000 - 1000));
        assert!(window.iter().zip(window.iter().skip(1)).all(|(a, b)| a.t <= b.t));
    }

    #[test]
    fn test_boundary_sample_is_kept() {
        let mut buffer = SampleBuffer::new(Duration::from_millis(100));
        buffer.ingest(sample(0, Some(1.0)));
        buffer.ingest(sample(100, Some(2.0)));
        assert_eq!(buffer.len(), 2);

        buffer.ingest(sample(101, Some(3.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_select_filters_missing_and_non_finite() {
        let mut buffer = SampleBuffer::new(Duration::from_secs(60));
        buffer.ingest(sample(0, Some(1.0)));
        buffer.ingest(sample(1, None));
        buffer.ingest(sample(2, Some(f64::NAN)));
        buffer.ingest(sample(3, Some(f64::INFINITY)));
        buffer.ingest(sample(4, Some(-2.0)));

        assert_eq!(buffer.select(AngleChannel::Pitch), vec![1.0, -2.0]);
        assert!(buffer.select(AngleChannel::Roll).is_empty());
        assert_eq!(buffer.select(AngleChannel::Yaw).len(), 5);
    }

    #[test]
    fn test_select_where() {
        let mut buffer = SampleBuffer::new(Duration::from_secs(60));
        for t in 0..5 {
            buffer.ingest(sample(t, Some(t as f64)));
        }
        let recent = buffer.select_where(AngleChannel::Pitch, |s| s.t >= 3);
        assert_eq!(recent, vec![3.0, 4.0]);
    }

    #[test]
    fn test_shrinking_retention_applies_on_next_ingest() {
        let mut buffer = SampleBuffer::new(Duration::from_secs(10));
        for t in 0..10 {
            buffer.ingest(sample(t * 1000, Some(0.0)));
        }
        assert_eq!(buffer.len(), 10);

        buffer.set_retention(Duration::from_secs(2));
        assert_eq!(buffer.len(), 10);

        buffer.ingest(sample(10_000, Some(0.0)));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_early_timestamps_do_not_underflow() {
        let mut buffer = SampleBuffer::new(Duration::from_secs(3600));
        buffer.ingest(sample(5, Some(0.0)));
        assert_eq!(buffer.len(), 1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_timestamp(), None);
    }
}
