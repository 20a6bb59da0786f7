//! Detection frame sources.
//!
//! The pose estimator itself lives outside this crate. Sources here feed
//! its output into a bounded channel from a background thread, either by
//! replaying recorded JSON lines or by synthesising head motion.

pub mod replay;
pub mod synthetic;
pub mod types;

pub use replay::{ReplayInput, ReplaySource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
pub use types::{DetectionFrame, HeadKeypoints, LEFT_EAR_INDEX, NOSE_INDEX, RIGHT_EAR_INDEX};

use crossbeam_channel::{SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Capacity of the frame channel between a source thread and the runner.
pub const FRAME_CHANNEL_CAPACITY: usize = 256;

/// How long a feeder waits on a full channel before re-checking for stop.
const SEND_RETRY: Duration = Duration::from_millis(50);

/// Errors that can occur while starting a source.
#[derive(Debug)]
pub enum SourceError {
    /// The input could not be opened
    Open(String),
    AlreadyRunning,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open(e) => write!(f, "Could not open frame source: {e}"),
            SourceError::AlreadyRunning => write!(f, "Source is already running"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Push frames into `sender` on a new thread until the iterator ends, the
/// receiver goes away, or `running` is cleared.
///
/// Dropping the sender on exit is what tells the runner the source is done.
fn spawn_feeder<I>(
    name: &str,
    frames: I,
    sender: Sender<DetectionFrame>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, SourceError>
where
    I: Iterator<Item = DetectionFrame> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut sent: u64 = 0;
            'frames: for frame in frames {
                let mut pending = frame;
                loop {
                    if !running.load(Ordering::SeqCst) {
                        break 'frames;
                    }
                    match sender.send_timeout(pending, SEND_RETRY) {
                        Ok(()) => {
                            sent += 1;
                            break;
                        }
                        Err(SendTimeoutError::Timeout(back)) => pending = back,
                        Err(SendTimeoutError::Disconnected(_)) => break 'frames,
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
            tracing::debug!(frames = sent, "source feeder finished");
        })
        .map_err(|e| SourceError::Open(e.to_string()))
}
