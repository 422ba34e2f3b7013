//! Outcome reporting for sweeps and watch sessions.
//!
//! Every lifecycle milestone and every file outcome becomes an
//! [`ActivityEvent`] handed to an [`EventSink`]. [`Activity`] pairs a sink with
//! the session's moved-file counter; both the sweep and the watcher report
//! through the same `Arc<Activity>`, so the counter is atomic.
use crate::file_organizer::MoveOutcome;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// How an event should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Move,
}

/// One structured log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl ActivityEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            message: message.into(),
        }
    }
}

/// Consumer of activity events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ActivityEvent);
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events recorded so far.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Messages of the recorded events with the given severity.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.severity == severity)
            .map(|event| event.message)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: ActivityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Forwards events into an unbounded channel, e.g. for a UI task.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ActivityEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ActivityEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ActivityEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes one JSON object per line to stdout.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

impl EventSink for JsonLinesSink {
    fn emit(&self, event: ActivityEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
            }
            Err(e) => tracing::warn!("could not serialize activity event: {}", e),
        }
    }
}

/// The shared reporting handle of a session.
pub struct Activity {
    sink: Arc<dyn EventSink>,
    files_moved: AtomicUsize,
}

impl Activity {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            files_moved: AtomicUsize::new(0),
        }
    }

    pub fn emit(&self, severity: Severity, message: impl Into<String>) {
        self.sink.emit(ActivityEvent::new(severity, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Severity::Error, message);
    }

    /// Reports one classification outcome.
    ///
    /// Moves bump the counter and emit `"<name> → <folder>/"`; failures emit an
    /// error event. Skips are silent.
    pub fn record(&self, outcome: &MoveOutcome) {
        match outcome {
            MoveOutcome::Moved { from, to } => {
                self.files_moved.fetch_add(1, Ordering::SeqCst);
                let name = from
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let folder = to
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.emit(Severity::Move, format!("{} → {}/", name, folder));
            }
            MoveOutcome::Failed { path, error } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.error(format!("Error moving {}: {}", name, error));
            }
            MoveOutcome::Skipped { .. } => {}
        }
    }

    /// Number of files moved during this session so far.
    pub fn files_moved(&self) -> usize {
        self.files_moved.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_organizer::{MoveError, SkipReason};
    use std::path::PathBuf;

    fn activity() -> (Arc<MemorySink>, Activity) {
        let sink = Arc::new(MemorySink::new());
        let activity = Activity::new(sink.clone());
        (sink, activity)
    }

    #[test]
    fn test_moved_outcome_counts_and_reports() {
        let (sink, activity) = activity();
        activity.record(&MoveOutcome::Moved {
            from: PathBuf::from("/in/a.jpg"),
            to: PathBuf::from("/in/Images/a.jpg"),
        });

        assert_eq!(activity.files_moved(), 1);
        assert_eq!(sink.messages(Severity::Move), vec!["a.jpg → Images/"]);
    }

    #[test]
    fn test_failed_outcome_reports_error_without_counting() {
        let (sink, activity) = activity();
        activity.record(&MoveOutcome::Failed {
            path: PathBuf::from("/in/b.pdf"),
            error: MoveError::DestinationUnwritable {
                path: PathBuf::from("/in/Documents/PDF"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            },
        });

        assert_eq!(activity.files_moved(), 0);
        let errors = sink.messages(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Error moving b.pdf:"));
    }

    #[test]
    fn test_skip_is_silent() {
        let (sink, activity) = activity();
        activity.record(&MoveOutcome::Skipped {
            path: PathBuf::from("/in/Images/a.jpg"),
            reason: SkipReason::AlreadyInPlace,
        });
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_counter_is_shared_across_threads() {
        let (_sink, activity) = activity();
        let activity = Arc::new(activity);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let activity = Arc::clone(&activity);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        activity.record(&MoveOutcome::Moved {
                            from: PathBuf::from(format!("/in/{}_{}.txt", t, i)),
                            to: PathBuf::from(format!("/in/Text/{}_{}.txt", t, i)),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(activity.files_moved(), 100);
    }

    #[test]
    fn test_event_serializes_with_lowercase_severity() {
        let event = ActivityEvent::new(Severity::Warning, "File watcher stopped.");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["message"], "File watcher stopped.");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(ActivityEvent::new(Severity::Info, "hello"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "hello");
    }
}
