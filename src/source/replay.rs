//! Replay of recorded detection frames.
//!
//! Input is JSON lines, one [`DetectionFrame`] per line, read from a file
//! or standard input. Blank lines are ignored; malformed lines are logged
//! and skipped so a damaged recording never stops the session.

use super::{spawn_feeder, SourceError, FRAME_CHANNEL_CAPACITY};
use crate::source::types::DetectionFrame;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Where recorded frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayInput {
    File(PathBuf),
    Stdin,
}

impl ReplayInput {
    /// `-` selects standard input, anything else is a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            ReplayInput::Stdin
        } else {
            ReplayInput::File(PathBuf::from(arg))
        }
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, ReplayInput::Stdin)
    }

    fn open(&self) -> Result<Box<dyn BufRead + Send>, SourceError> {
        match self {
            ReplayInput::File(path) => {
                let file = File::open(path)
                    .map_err(|e| SourceError::Open(format!("{}: {e}", path.display())))?;
                Ok(Box::new(BufReader::new(file)))
            }
            ReplayInput::Stdin => Ok(Box::new(BufReader::new(std::io::stdin()))),
        }
    }
}

/// Parse one recorded line. `None` for blank or malformed lines.
pub fn parse_frame_line(line: &str) -> Option<DetectionFrame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!("Skipping malformed frame: {e}");
            None
        }
    }
}

/// Feeds recorded frames into a bounded channel from a reader thread.
pub struct ReplaySource {
    input: ReplayInput,
    sender: Option<Sender<DetectionFrame>>,
    receiver: Receiver<DetectionFrame>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(input: ReplayInput) -> Self {
        let (sender, receiver) = bounded(FRAME_CHANNEL_CAPACITY);
        Self {
            input,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Open the input and start reading. Fails if the input cannot be
    /// opened or the source was already started.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        let sender = self.sender.take().ok_or(SourceError::AlreadyRunning)?;
        let reader = self.input.open()?;

        let frames = reader
            .lines()
            .map_while(|line| {
                line.map_err(|e| tracing::warn!("Stopping replay on read error: {e}"))
                    .ok()
            })
            .filter_map(|line| parse_frame_line(&line));

        self.running.store(true, Ordering::SeqCst);
        match spawn_feeder("replay-source", frames, sender, self.running.clone()) {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(input = ?self.input, "replay source started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Ask the reader thread to stop. Frames already queued stay readable.
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

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
        // Stdin reads can block indefinitely, so the thread is not joined.
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_frame_line() {
        assert!(parse_frame_line("").is_none());
        assert!(parse_frame_line("   ").is_none());
        assert!(parse_frame_line("{not json").is_none());
        let frame = parse_frame_line(r#"{"timestamp_ms": 7}"#).unwrap();
        assert_eq!(frame.timestamp_ms, Some(7));
        assert!(!frame.has_pose());
    }

    #[test]
    fn test_input_from_arg() {
        assert!(ReplayInput::from_arg("-").is_stdin());
        assert_eq!(
            ReplayInput::from_arg("frames.jsonl"),
            ReplayInput::File(PathBuf::from("frames.jsonl"))
        );
    }

    #[test]
    fn test_missing_file_fails_to_start() {
        let mut source = ReplaySource::new(ReplayInput::File(PathBuf::from(
            "/nonexistent/head-sway/frames.jsonl",
        )));
        assert!(matches!(source.start(), Err(SourceError::Open(_))));
        assert!(!source.is_running());
    }

    #[test]
    fn test_replays_file_and_disconnects() {
        let path = std::env::temp_dir()
            .join(format!("head-sway-replay-{}.jsonl", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{\"timestamp_ms\":1}\n\ngarbage\n{\"timestamp_ms\":2}\n").unwrap();

        let mut source = ReplaySource::new(ReplayInput::File(path.clone()));
        source.start().unwrap();
        assert!(matches!(source.start(), Err(SourceError::AlreadyRunning)));

        let rx = source.receiver().clone();
        let a = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let b = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(a.timestamp_ms, Some(1));
        assert_eq!(b.timestamp_ms, Some(2));
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());

        let _ = std::fs::remove_file(&path);
    }
}
