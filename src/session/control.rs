//! Out-of-loop control: config file polling and a line-based console.
//!
//! Both run on their own threads and only ever talk to the runner through
//! its command channel.

use crate::config::{Config, ConfigError};
use crate::session::runner::Command;
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the config file is re-read.
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The `Configure` command for a config.
pub fn configure_command(config: &Config) -> Command {
    Command::Configure {
        settings: config.engine_settings(),
        tick_interval: config.tick_interval(),
    }
}

/// Whether two configs differ in anything the runner applies at runtime.
fn runtime_changed(a: &Config, b: &Config) -> bool {
    a.target_fps != b.target_fps
        || a.retention_window != b.retention_window
        || a.cadence_period != b.cadence_period
        || a.channel != b.channel
        || a.alignment != b.alignment
}

/// What one poll of the config file turned up.
#[derive(Debug, PartialEq)]
enum PollOutcome {
    Unchanged,
    Changed(Command),
    /// A problem not reported before
    Rejected(String),
    /// The same problem as the previous poll
    StillRejected,
}

#[derive(Debug, PartialEq)]
enum Rejection {
    Unreadable(String),
    Invalid(Config),
}

/// Tracks the applied config and the last rejected one between polls.
struct ConfigPoll {
    current: Config,
    rejected: Option<Rejection>,
}

impl ConfigPoll {
    fn new(initial: Config) -> Self {
        Self {
            current: initial,
            rejected: None,
        }
    }

    fn observe(&mut self, loaded: Result<Config, ConfigError>) -> PollOutcome {
        let next = match loaded {
            Ok(cfg) => cfg,
            Err(e) => {
                let message = e.to_string();
                return self.reject(
                    Rejection::Unreadable(message.clone()),
                    format!("Ignoring unreadable config: {message}"),
                );
            }
        };
        if !runtime_changed(&self.current, &next) {
            self.rejected = None;
            return PollOutcome::Unchanged;
        }
        if let Err(e) = next.validate() {
            return self.reject(
                Rejection::Invalid(next),
                format!("Ignoring config change: {e}"),
            );
        }

        self.rejected = None;
        let command = configure_command(&next);
        self.current = next;
        PollOutcome::Changed(command)
    }

    fn reject(&mut self, rejection: Rejection, reason: String) -> PollOutcome {
        if self.rejected.as_ref() == Some(&rejection) {
            return PollOutcome::StillRejected;
        }
        self.rejected = Some(rejection);
        PollOutcome::Rejected(reason)
    }
}

/// Re-read `path` every [`CONFIG_POLL_INTERVAL`] and forward runtime changes.
///
/// Invalid or unreadable files are logged once per distinct problem and
/// ignored; the previous settings stay in force.
pub fn spawn_config_watcher(
    path: PathBuf,
    initial: Config,
    commands: Sender<Command>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("config-watcher".to_string())
        .spawn(move || {
            let mut poll = ConfigPoll::new(initial);
            while running.load(Ordering::SeqCst) {
                thread::sleep(CONFIG_POLL_INTERVAL);

                match poll.observe(Config::load_from(&path)) {
                    PollOutcome::Unchanged | PollOutcome::StillRejected => {}
                    PollOutcome::Rejected(reason) => tracing::warn!("{reason}"),
                    PollOutcome::Changed(command) => {
                        tracing::debug!("config file changed");
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                }
            }
        })
}

/// Parse one console line into a command.
pub fn parse_console_line(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "e" | "export" => Some(Command::Export),
        "r" | "reset" | "clear" => Some(Command::Reset),
        "q" | "quit" | "stop" => Some(Command::Stop),
        _ => None,
    }
}

/// Read commands from `input` line by line until it closes.
pub fn spawn_console<R>(input: R, commands: Sender<Command>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_console_line(&line) {
                    Some(command) => {
                        let stop = command == Command::Stop;
                        if commands.send(command).is_err() || stop {
                            break;
                        }
                    }
                    None => eprintln!("Unknown command '{}' (export, reset, quit)", line.trim()),
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::AlignmentPolicy;
    use crossbeam_channel::unbounded;
    use std::io::Cursor;

    #[test]
    fn test_parse_console_line() {
        assert_eq!(parse_console_line("export"), Some(Command::Export));
        assert_eq!(parse_console_line(" R "), Some(Command::Reset));
        assert_eq!(parse_console_line("quit"), Some(Command::Stop));
        assert_eq!(parse_console_line("dance"), None);
    }

    #[test]
    fn test_console_forwards_until_quit() {
        let (tx, rx) = unbounded();
        let input = Cursor::new("export\n\nbogus\nreset\nquit\nexport\n");
        spawn_console(input, tx).unwrap().join().unwrap();

        let received: Vec<Command> = rx.try_iter().collect();
        assert_eq!(received, vec![Command::Export, Command::Reset, Command::Stop]);
    }

    #[test]
    fn test_runtime_changed_ignores_paths() {
        let a = Config::default();
        let mut b = a.clone();
        b.export_path = PathBuf::from("/elsewhere");
        assert!(!runtime_changed(&a, &b));
        b.target_fps = 30;
        assert!(runtime_changed(&a, &b));

        let mut c = a.clone();
        c.alignment = AlignmentPolicy::RightAligned;
        assert!(runtime_changed(&a, &c));
    }

    #[test]
    fn test_rejected_config_reported_once() {
        let initial = Config::default();
        let mut poll = ConfigPoll::new(initial.clone());

        let mut bad = initial.clone();
        bad.target_fps = 0;
        assert!(matches!(poll.observe(Ok(bad.clone())), PollOutcome::Rejected(_)));
        for _ in 0..5 {
            assert_eq!(poll.observe(Ok(bad.clone())), PollOutcome::StillRejected);
        }

        // a different invalid edit is reported again
        let mut worse = bad.clone();
        worse.cadence_period = Duration::ZERO;
        assert!(matches!(poll.observe(Ok(worse.clone())), PollOutcome::Rejected(_)));
        assert_eq!(poll.observe(Ok(worse)), PollOutcome::StillRejected);

        let unreadable = || Err(ConfigError::ParseError("expected value".to_string()));
        assert!(matches!(poll.observe(unreadable()), PollOutcome::Rejected(_)));
        assert_eq!(poll.observe(unreadable()), PollOutcome::StillRejected);

        let mut good = initial.clone();
        good.target_fps = 30;
        assert_eq!(
            poll.observe(Ok(good.clone())),
            PollOutcome::Changed(configure_command(&good))
        );
        assert_eq!(poll.observe(Ok(good)), PollOutcome::Unchanged);

        // once fixed, the same bad edit counts as new again
        assert!(matches!(poll.observe(Ok(bad)), PollOutcome::Rejected(_)));
    }

    #[test]
    fn test_watcher_forwards_changes() {
        let path = std::env::temp_dir()
            .join(format!("head-sway-watch-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let initial = Config::default();
        initial.save_to(&path).unwrap();

        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_config_watcher(path.clone(), initial.clone(), tx, running.clone()).unwrap();

        let mut changed = initial.clone();
        changed.cadence_period = Duration::from_secs(10);
        changed.save_to(&path).unwrap();

        let command = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(command, configure_command(&changed));

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
