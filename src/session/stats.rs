//! Session statistics.
//!
//! Counts what the pipeline did during a session and keeps cumulative
//! totals on disk across sessions. Counters are atomic so the Ctrl+C
//! handler and the command console may read them while the runner works.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub struct SessionStats {
    /// Identifier of this session, used in log lines
    session_id: Uuid,
    /// Frames pulled from the source
    frames_processed: AtomicU64,
    /// Frames in which no pose was found
    frames_without_pose: AtomicU64,
    /// Stale frames dropped in favour of a newer one
    frames_skipped: AtomicU64,
    /// Samples added to the sample log
    samples_ingested: AtomicU64,
    /// Variance snapshots produced
    snapshots_produced: AtomicU64,
    /// CSV files written
    exports_written: AtomicU64,
    /// Explicit resets
    resets: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            frames_processed: AtomicU64::new(0),
            frames_without_pose: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            samples_ingested: AtomicU64::new(0),
            snapshots_produced: AtomicU64::new(0),
            exports_written: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Stats that continue from the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous session stats: {e}");
        }

        stats
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn record_frame(&self, had_pose: bool) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        if !had_pose {
            self.frames_without_pose.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_skipped(&self, count: u64) {
        self.frames_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots_produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.exports_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            session_id: self.session_id,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_without_pose: self.frames_without_pose.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            snapshots_produced: self.snapshots_produced.load(Ordering::Relaxed),
            exports_written: self.exports_written.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Session Statistics ({}):\n\
             - Frames processed: {}\n\
             - Frames without pose: {}\n\
             - Frames skipped: {}\n\
             - Samples ingested: {}\n\
             - Variance snapshots: {}\n\
             - Exports written: {}\n\
             - Resets: {}\n\
             - Session duration: {} seconds",
            s.session_id,
            s.frames_processed,
            s.frames_without_pose,
            s.frames_skipped,
            s.samples_ingested,
            s.snapshots_produced,
            s.exports_written,
            s.resets,
            s.session_duration_secs
        )
    }

    /// Write cumulative totals to disk. No-op without a persist path.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let s = self.snapshot();
            let persisted = PersistedStats {
                frames_processed: s.frames_processed,
                frames_without_pose: s.frames_without_pose,
                frames_skipped: s.frames_skipped,
                samples_ingested: s.samples_ingested,
                snapshots_produced: s.snapshots_produced,
                exports_written: s.exports_written,
                resets: s.resets,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_processed
                    .store(persisted.frames_processed, Ordering::Relaxed);
                self.frames_without_pose
                    .store(persisted.frames_without_pose, Ordering::Relaxed);
                self.frames_skipped
                    .store(persisted.frames_skipped, Ordering::Relaxed);
                self.samples_ingested
                    .store(persisted.samples_ingested, Ordering::Relaxed);
                self.snapshots_produced
                    .store(persisted.snapshots_produced, Ordering::Relaxed);
                self.exports_written
                    .store(persisted.exports_written, Ordering::Relaxed);
                self.resets.store(persisted.resets, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatsSnapshot {
    pub session_id: Uuid,
    pub frames_processed: u64,
    pub frames_without_pose: u64,
    pub frames_skipped: u64,
    pub samples_ingested: u64,
    pub snapshots_produced: u64,
    pub exports_written: u64,
    pub resets: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub frames_processed: u64,
    pub frames_without_pose: u64,
    #[serde(default)]
    pub frames_skipped: u64,
    pub samples_ingested: u64,
    pub snapshots_produced: u64,
    pub exports_written: u64,
    #[serde(default)]
    pub resets: u64,
    pub last_updated: DateTime<Utc>,
}

pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = SessionStats::new();
        stats.record_frame(true);
        stats.record_frame(false);
        stats.record_sample();
        stats.record_snapshot();
        stats.record_skipped(3);

        let s = stats.snapshot();
        assert_eq!(s.frames_processed, 2);
        assert_eq!(s.frames_without_pose, 1);
        assert_eq!(s.samples_ingested, 1);
        assert_eq!(s.snapshots_produced, 1);
        assert_eq!(s.frames_skipped, 3);
        assert_eq!(s.exports_written, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = SessionStats::new();
        let summary = stats.summary();
        assert!(summary.contains("Frames processed"));
        assert!(summary.contains("Variance snapshots"));
        assert!(summary.contains(&stats.session_id().to_string()));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("head-sway-stats-{}", Uuid::new_v4()))
            .join("session_stats.json");

        let stats = SessionStats::with_persistence(path.clone());
        stats.record_frame(true);
        stats.record_export();
        stats.save().unwrap();

        let reloaded = SessionStats::with_persistence(path.clone());
        let s = reloaded.snapshot();
        assert_eq!(s.frames_processed, 1);
        assert_eq!(s.exports_written, 1);
        assert_ne!(reloaded.session_id(), stats.session_id());

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
