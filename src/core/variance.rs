//! Periodic variance snapshots over the sample window.
//!
//! On a fixed cadence the sampler computes the population variance of one
//! angle channel across the whole retained window and appends it to a
//! bounded series. The series holds at most `ceil(retention / cadence)`
//! snapshots, so it covers roughly the same horizon as the sample log.

use crate::core::angles::AngleChannel;
use crate::core::samples::{duration_ms, SampleBuffer};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::time::Duration;

/// Population variance (divide by n). Zero for fewer than two values.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let v = values.iter().population_variance();
    // Rounding can leave a tiny negative for constant input
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// One cadence tick's result, stamped with the time it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarianceSnapshot {
    /// Timestamp (ms) of the sample that triggered this snapshot
    pub t: u64,
    /// Channel the variance was computed over
    pub channel: AngleChannel,
    /// Population variance in degrees squared
    pub value: f64,
}

/// Cadence-gated variance snapshotter.
#[derive(Debug, Clone)]
pub struct VarianceSampler {
    cadence_ms: u64,
    retention_ms: u64,
    last_sampled_at: Option<u64>,
    series: VecDeque<VarianceSnapshot>,
}

impl VarianceSampler {
    /// `cadence` is clamped to at least one millisecond.
    pub fn new(cadence: Duration, retention: Duration) -> Self {
        Self {
            cadence_ms: duration_ms(cadence).max(1),
            retention_ms: duration_ms(retention),
            last_sampled_at: None,
            series: VecDeque::new(),
        }
    }

    /// Take a snapshot if at least one cadence period has passed since the
    /// previous one. The first call after construction or reset always
    /// samples. Safe to poll every frame.
    pub fn maybe_sample(
        &mut self,
        now: u64,
        buffer: &SampleBuffer,
        channel: AngleChannel,
    ) -> Option<VarianceSnapshot> {
        if let Some(last) = self.last_sampled_at {
            if now.saturating_sub(last) < self.cadence_ms {
                return None;
            }
        }

        let values = buffer.select(channel);
        let snapshot = VarianceSnapshot {
            t: now,
            channel,
            value: population_variance(&values),
        };

        self.series.push_back(snapshot);
        self.last_sampled_at = Some(now);
        self.truncate();

        tracing::debug!(
            t = now,
            %channel,
            inputs = values.len(),
            variance = snapshot.value,
            "variance snapshot"
        );

        Some(snapshot)
    }

    fn truncate(&mut self) {
        let max = self.retention_count();
        while self.series.len() > max {
            self.series.pop_front();
        }
    }

    /// Maximum series length: `ceil(retention / cadence)`, at least one.
    pub fn retention_count(&self) -> usize {
        let count = (self.retention_ms.saturating_add(self.cadence_ms - 1) / self.cadence_ms).max(1);
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    /// Takes effect on the next cadence check.
    pub fn set_cadence(&mut self, cadence: Duration) {
        self.cadence_ms = duration_ms(cadence).max(1);
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    /// Takes effect on the next append.
    pub fn set_retention(&mut self, retention: Duration) {
        self.retention_ms = duration_ms(retention);
    }

    pub fn series(&self) -> &VecDeque<VarianceSnapshot> {
        &self.series
    }

    pub fn latest(&self) -> Option<&VarianceSnapshot> {
        self.series.back()
    }

    pub fn last_sampled_at(&self) -> Option<u64> {
        self.last_sampled_at
    }

    /// Drop the series and the cadence state together.
    pub fn reset(&mut self) {
        self.series.clear();
        self.last_sampled_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::samples::AngleSample;

    const EPS: f64 = 1e-9;

    fn buffer_with(values: &[f64]) -> SampleBuffer {
        let mut buffer = SampleBuffer::new(Duration::from_secs(3600));
        for (i, &v) in values.iter().enumerate() {
            buffer.ingest(AngleSample {
                t: i as u64,
                pitch: Some(v),
                yaw: None,
                roll: Some(-v),
            });
        }
        buffer
    }

    #[test]
    fn test_variance_degenerate_inputs() {
        assert_eq!(population_variance(&[]), 0.0);
        assert_eq!(population_variance(&[42.0]), 0.0);
        assert!(population_variance(&[7.5, 7.5, 7.5]).abs() < EPS);
    }

    #[test]
    fn test_variance_known_value() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_variance(&values) - 4.0).abs() < EPS);
    }

    #[test]
    fn test_variance_order_invariant() {
        let a = [1.0, -3.5, 10.0, 0.25];
        let b = [10.0, 0.25, 1.0, -3.5];
        assert!((population_variance(&a) - population_variance(&b)).abs() < EPS);
    }

    #[test]
    fn test_cadence_gate() {
        let buffer = buffer_with(&[1.0, 2.0, 3.0]);
        let mut sampler = VarianceSampler::new(Duration::from_secs(10), Duration::from_secs(3600));

        let produced: Vec<u64> = (0..25)
            .filter_map(|s| sampler.maybe_sample(s * 1000, &buffer, AngleChannel::Pitch))
            .map(|snap| snap.t)
            .collect();

        assert_eq!(produced, vec![0, 10_000, 20_000]);
        assert_eq!(sampler.series().len(), 3);
    }

    #[test]
    fn test_series_bounded_oldest_first() {
        let buffer = buffer_with(&[1.0, 2.0]);
        // ceil(25 / 10) = 3
        let mut sampler = VarianceSampler::new(Duration::from_secs(10), Duration::from_secs(25));
        assert_eq!(sampler.retention_count(), 3);

        for i in 0..6 {
            sampler.maybe_sample(i * 10_000, &buffer, AngleChannel::Pitch);
            assert!(sampler.series().len() <= 3);
        }

        let times: Vec<u64> = sampler.series().iter().map(|s| s.t).collect();
        assert_eq!(times, vec![30_000, 40_000, 50_000]);
    }

    #[test]
    fn test_empty_channel_yields_zero() {
        let buffer = buffer_with(&[1.0, 5.0]);
        let mut sampler = VarianceSampler::new(Duration::from_secs(1), Duration::from_secs(60));
        let snap = sampler.maybe_sample(0, &buffer, AngleChannel::Yaw).unwrap();
        assert_eq!(snap.value, 0.0);
        assert_eq!(snap.channel, AngleChannel::Yaw);
    }

    #[test]
    fn test_channel_selection() {
        let buffer = buffer_with(&[1.0, 3.0]);
        let mut sampler = VarianceSampler::new(Duration::from_secs(1), Duration::from_secs(60));
        let snap = sampler.maybe_sample(0, &buffer, AngleChannel::Roll).unwrap();
        assert!((snap.value - 1.0).abs() < EPS);
    }

    #[test]
    fn test_reset_clears_series_and_cadence() {
        let buffer = buffer_with(&[1.0, 3.0]);
        let mut sampler = VarianceSampler::new(Duration::from_secs(10), Duration::from_secs(60));
        sampler.maybe_sample(0, &buffer, AngleChannel::Pitch);
        assert!(sampler.maybe_sample(1000, &buffer, AngleChannel::Pitch).is_none());

        sampler.reset();
        assert!(sampler.series().is_empty());
        assert!(sampler.latest().is_none());
        assert!(sampler.last_sampled_at().is_none());

        // first check after reset samples immediately
        assert!(sampler.maybe_sample(2000, &buffer, AngleChannel::Pitch).is_some());
    }

    #[test]
    fn test_cadence_change_applies_to_next_check() {
        let buffer = buffer_with(&[1.0, 3.0]);
        let mut sampler = VarianceSampler::new(Duration::from_secs(30), Duration::from_secs(3600));
        sampler.maybe_sample(0, &buffer, AngleChannel::Pitch);
        assert!(sampler.maybe_sample(10_000, &buffer, AngleChannel::Pitch).is_none());

        sampler.set_cadence(Duration::from_secs(10));
        assert!(sampler.maybe_sample(10_000, &buffer, AngleChannel::Pitch).is_some());
        assert_eq!(sampler.retention_count(), 360);
    }
}
