//! CSV export of raw samples joined with variance snapshots.
//!
//! The sample log evicts by age and the snapshot series by count, so the
//! two rarely cover the same span. Snapshots carry the timestamp of the
//! sample that triggered them, which lets export pair each snapshot with
//! its sample directly.
//!
//! [`AlignmentPolicy::RightAligned`] keeps the older positional pairing:
//! the newest `M` samples are matched 1:1 with the `M` snapshots. That is
//! only an approximation once the cadence or retention changes mid-session.

use crate::core::angles::AngleChannel;
use crate::core::samples::AngleSample;
use crate::core::variance::VarianceSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of every exported file name.
pub const EXPORT_FILE_PREFIX: &str = "head_sway_pose_";

/// How snapshots are paired with samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Pair each snapshot with the sample nearest in time, if within
    /// `max_skew_ms`. Snapshots whose sample was evicted are dropped.
    Timestamp { max_skew_ms: u64 },
    /// Pair the newest samples with the snapshots by position.
    RightAligned,
}

impl Default for AlignmentPolicy {
    fn default() -> Self {
        AlignmentPolicy::Timestamp { max_skew_ms: 0 }
    }
}

impl std::str::FromStr for AlignmentPolicy {
    type Err = String;

    /// `timestamp`, `timestamp:<max skew ms>` or `right-aligned`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.split_once(':') {
            Some(("timestamp", skew)) => skew
                .trim()
                .parse()
                .map(|max_skew_ms| AlignmentPolicy::Timestamp { max_skew_ms })
                .map_err(|_| format!("invalid skew '{skew}' in alignment policy")),
            Some(_) => Err(format!("unknown alignment policy '{s}'")),
            None => match s.as_str() {
                "timestamp" => Ok(AlignmentPolicy::default()),
                "right-aligned" | "right_aligned" => Ok(AlignmentPolicy::RightAligned),
                other => Err(format!(
                    "unknown alignment policy '{other}' (expected timestamp or right-aligned)"
                )),
            },
        }
    }
}

/// One output line: a raw sample plus its snapshot value, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportRow {
    pub sample: AngleSample,
    pub variance: Option<f64>,
}

/// Join samples (oldest first) with snapshots (oldest first).
///
/// Always returns exactly one row per sample.
pub fn align<'a, S, V>(samples: S, snapshots: V, policy: AlignmentPolicy) -> Vec<ExportRow>
where
    S: IntoIterator<Item = &'a AngleSample>,
    V: IntoIterator<Item = &'a VarianceSnapshot>,
{
    let mut rows: Vec<ExportRow> = samples
        .into_iter()
        .map(|s| ExportRow {
            sample: *s,
            variance: None,
        })
        .collect();

    match policy {
        AlignmentPolicy::RightAligned => {
            let snapshots: Vec<&VarianceSnapshot> = snapshots.into_iter().collect();
            let n = rows.len();
            let m = snapshots.len();
            // with m > n only the newest n snapshots fit
            let skip = m.saturating_sub(n);
            let start = n.saturating_sub(m);
            for (row, snap) in rows[start..].iter_mut().zip(&snapshots[skip..]) {
                row.variance = Some(snap.value);
            }
        }
        AlignmentPolicy::Timestamp { max_skew_ms } => {
            for snap in snapshots {
                if let Some(idx) = nearest_index(&rows, snap.t) {
                    if rows[idx].sample.t.abs_diff(snap.t) <= max_skew_ms {
                        rows[idx].variance = Some(snap.value);
                    }
                }
            }
        }
    }

    rows
}

// Index of the row whose timestamp is closest to `t`. Ties go to the later row.
fn nearest_index(rows: &[ExportRow], t: u64) -> Option<usize> {
    if rows.is_empty() {
        return None;
    }
    let upper = rows.partition_point(|r| r.sample.t < t);
    if upper == 0 {
        return Some(0);
    }
    if upper == rows.len() {
        return Some(rows.len() - 1);
    }
    let before = t - rows[upper - 1].sample.t;
    let after = rows[upper].sample.t - t;
    if before < after {
        Some(upper - 1)
    } else {
        Some(upper)
    }
}

/// CSV header line for the given variance channel.
pub fn csv_header(channel: AngleChannel) -> String {
    format!("timestamp_ms,pitch_deg,yaw_deg,roll_deg,window_variance({channel})")
}

/// Render rows as CSV. Lines are `\n` separated with no trailing newline.
pub fn write_csv(rows: &[ExportRow], channel: AngleChannel) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(csv_header(channel));
    for row in rows {
        let s = &row.sample;
        lines.push(format!(
            "{},{},{},{},{}",
            s.t,
            fixed6(s.pitch),
            fixed6(s.yaw),
            fixed6(s.roll),
            fixed6(row.variance)
        ));
    }
    lines.join("\n")
}

fn fixed6(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.6}"),
        _ => String::new(),
    }
}

/// File name for an export generated at `generated_at`.
pub fn export_file_name(generated_at: DateTime<Utc>) -> String {
    format!("{EXPORT_FILE_PREFIX}{}.csv", generated_at.timestamp_millis())
}

/// Errors writing an export to disk.
#[derive(Debug)]
pub enum ExportError {
    IoError(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::IoError(e) => write!(f, "Export IO error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}

/// Write `csv` into `dir` under a generated file name and return the path.
pub fn write_export(dir: &Path, csv: &str) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir).map_err(|e| ExportError::IoError(e.to_string()))?;
    let path = dir.join(export_file_name(Utc::now()));
    std::fs::write(&path, csv).map_err(|e| ExportError::IoError(e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn samples(times: &[u64]) -> Vec<AngleSample> {
        times
            .iter()
            .map(|&t| AngleSample {
                t,
                pitch: Some(t as f64 / 1000.0),
                yaw: None,
                roll: Some(-1.5),
            })
            .collect()
    }

    fn snap(t: u64, value: f64) -> VarianceSnapshot {
        VarianceSnapshot {
            t,
            channel: AngleChannel::Pitch,
            value,
        }
    }

    #[test]
    fn test_alignment_policy_parsing() {
        assert_eq!("timestamp".parse::<AlignmentPolicy>(), Ok(AlignmentPolicy::default()));
        assert_eq!(
            "Timestamp:250".parse::<AlignmentPolicy>(),
            Ok(AlignmentPolicy::Timestamp { max_skew_ms: 250 })
        );
        assert_eq!(
            "right-aligned".parse::<AlignmentPolicy>(),
            Ok(AlignmentPolicy::RightAligned)
        );
        assert_eq!(
            "right_aligned".parse::<AlignmentPolicy>(),
            Ok(AlignmentPolicy::RightAligned)
        );
        assert!("timestamp:soon".parse::<AlignmentPolicy>().is_err());
        assert!("nearest".parse::<AlignmentPolicy>().is_err());
    }

    #[test]
    fn test_right_aligned_five_samples_two_snapshots() {
        let s = samples(&[0, 1000, 2000, 3000, 4000]);
        let v = [snap(0, 0.5), snap(1, 0.75)];

        let rows = align(&s, &v, AlignmentPolicy::RightAligned);
        let variances: Vec<Option<f64>> = rows.iter().map(|r| r.variance).collect();
        assert_eq!(variances, vec![None, None, None, Some(0.5), Some(0.75)]);
    }

    #[test]
    fn test_timestamp_five_samples_two_snapshots() {
        let s = samples(&[0, 1000, 2000, 3000, 4000]);
        let v = [snap(3000, 0.5), snap(4000, 0.75)];

        let rows = align(&s, &v, AlignmentPolicy::default());
        let variances: Vec<Option<f64>> = rows.iter().map(|r| r.variance).collect();
        assert_eq!(variances, vec![None, None, None, Some(0.5), Some(0.75)]);
    }

    #[test]
    fn test_timestamp_drops_snapshots_of_evicted_samples() {
        let s = samples(&[5000, 6000, 7000]);
        let v = [snap(1000, 9.0), snap(6000, 2.0)];

        let rows = align(&s, &v, AlignmentPolicy::default());
        let variances: Vec<Option<f64>> = rows.iter().map(|r| r.variance).collect();
        assert_eq!(variances, vec![None, Some(2.0), None]);
    }

    #[test]
    fn test_timestamp_skew_tolerance() {
        let s = samples(&[0, 100, 200]);
        let v = [snap(140, 1.0)];

        let exact = align(&s, &v, AlignmentPolicy::default());
        assert!(exact.iter().all(|r| r.variance.is_none()));

        let loose = align(&s, &v, AlignmentPolicy::Timestamp { max_skew_ms: 50 });
        assert_eq!(loose[1].variance, Some(1.0));
    }

    #[test]
    fn test_empty_inputs() {
        let none: Vec<AngleSample> = Vec::new();
        let v = [snap(0, 1.0)];
        assert!(align(&none, &v, AlignmentPolicy::RightAligned).is_empty());
        assert!(align(&none, &v, AlignmentPolicy::default()).is_empty());

        let s = samples(&[0, 1]);
        let no_snaps: Vec<VarianceSnapshot> = Vec::new();
        let rows = align(&s, &no_snaps, AlignmentPolicy::RightAligned);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.variance.is_none()));
    }

    #[test]
    fn test_right_aligned_more_snapshots_than_samples() {
        let s = samples(&[0, 1]);
        let v = [snap(0, 1.0), snap(1, 2.0), snap(2, 3.0)];
        let rows = align(&s, &v, AlignmentPolicy::RightAligned);
        assert_eq!(rows[0].variance, Some(2.0));
        assert_eq!(rows[1].variance, Some(3.0));
    }

    #[test]
    fn test_csv_format() {
        let s = [AngleSample {
            t: 1234,
            pitch: Some(1.0),
            yaw: None,
            roll: Some(f64::NAN),
        }];
        let rows = align(&s, &[snap(1234, 0.123_456_78)], AlignmentPolicy::default());
        let csv = write_csv(&rows, AngleChannel::Yaw);

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "timestamp_ms,pitch_deg,yaw_deg,roll_deg,window_variance(yaw)"
        );
        assert_eq!(lines[1], "1234,1.000000,,,0.123457");
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_header_only_when_empty() {
        let csv = write_csv(&[], AngleChannel::Pitch);
        assert_eq!(csv, csv_header(AngleChannel::Pitch));
    }

    #[test]
    fn test_export_file_name() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(export_file_name(at), "head_sway_pose_1700000000123.csv");
    }

    #[test]
    fn test_write_export_creates_file() {
        let dir = std::env::temp_dir().join(format!("head-sway-export-{}", uuid::Uuid::new_v4()));
        let path = write_export(&dir, "a,b").unwrap();
        assert!(path.starts_with(&dir));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
