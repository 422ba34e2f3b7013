//! Reactive sorting of files as they appear in the watched directory.
//!
//! A polling [`notify::PollWatcher`] observes the directory non-recursively and
//! pushes raw events into a channel. The loop in [`DirectoryWatcher`] turns
//! them into [`WatchEvent`]s, drops files on the `Temp` skip-list, and hands
//! the rest to the [`FileOrganizer`]:
//!
//! - created files are classified after a debounce delay so writers can finish
//! - files renamed into the directory are classified at once
//!
//! Each classification runs as its own task, so one debounce never delays
//! intake of other events. On stop the loop refuses new events, waits for
//! classifications already running, and drops the watcher.
use crate::activity::Activity;
use crate::file_category::extension_of;
use crate::file_organizer::FileOrganizer;
use crate::stop::StopSignal;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Errors that end a watch session.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch directory {} is missing", .0.display())]
    TargetMissing(PathBuf),

    #[error("file watching failed: {0}")]
    Mechanism(#[from] notify::Error),

    #[error("the event source closed unexpectedly")]
    SourceClosed,

    #[error("this watcher has already been started")]
    AlreadyStarted,
}

/// Lifecycle of a [`DirectoryWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A new file appeared; it may still be being written.
    Created,
    /// A file was renamed into place, which usually marks it complete.
    RenamedInto,
}

/// A filesystem change worth classifying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    /// Extracts the events of interest from a raw notify event.
    ///
    /// Only creations and rename destinations directly inside `root` are
    /// kept; everything else is dropped.
    pub fn from_notify(event: &Event, root: &Path) -> Vec<WatchEvent> {
        match event.kind {
            EventKind::Create(_) => event
                .paths
                .iter()
                .filter(|path| is_direct_child(path, root))
                .map(|path| WatchEvent {
                    path: path.clone(),
                    kind: WatchEventKind::Created,
                })
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
                .paths
                .last()
                .filter(|path| is_direct_child(path, root))
                .map(|path| WatchEvent {
                    path: path.clone(),
                    kind: WatchEventKind::RenamedInto,
                })
                .into_iter()
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => event
                .paths
                .iter()
                .filter(|path| is_direct_child(path, root))
                .map(|path| WatchEvent {
                    path: path.clone(),
                    kind: WatchEventKind::RenamedInto,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn is_direct_child(path: &Path, root: &Path) -> bool {
    path.parent() == Some(root)
}

type RawEvent = notify::Result<Event>;

/// Watches one directory and sorts files that arrive in it.
pub struct DirectoryWatcher {
    root: PathBuf,
    organizer: Arc<FileOrganizer>,
    activity: Arc<Activity>,
    stop: StopSignal,
    debounce: Duration,
    poll_interval: Duration,
    state: watch::Sender<WatchState>,
}

impl DirectoryWatcher {
    /// Creates an idle watcher with a 500ms debounce and a 1s poll interval.
    pub fn new(
        root: PathBuf,
        organizer: Arc<FileOrganizer>,
        activity: Arc<Activity>,
        stop: StopSignal,
    ) -> Self {
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            root,
            organizer,
            activity,
            stop,
            debounce: Duration::from_millis(500),
            poll_interval: Duration::from_secs(1),
            state,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Polls the directory and sorts new files until the stop signal fires.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing, the poller cannot start, or the
    /// poller reports an unrecoverable error. The state then ends in
    /// [`WatchState::Error`] and the failure is reported once.
    pub async fn run(&self) -> Result<(), WatchError> {
        self.begin()?;

        let (tx, rx) = mpsc::unbounded_channel::<RawEvent>();
        let config = Config::default().with_poll_interval(self.poll_interval);
        let poller = PollWatcher::new(
            move |event: RawEvent| {
                let _ = tx.send(event);
            },
            config,
        )
        .and_then(|mut poller| {
            poller.watch(&self.root, RecursiveMode::NonRecursive)?;
            Ok(poller)
        });

        let poller = match poller {
            Ok(poller) => poller,
            Err(e) => return self.finish(Err(WatchError::Mechanism(e))),
        };

        let result = self.drive(rx).await;
        // Releasing the poller stops its scanning thread.
        drop(poller);
        self.finish(result)
    }

    /// Runs the event loop over an externally supplied raw event stream.
    ///
    /// For callers with their own event source instead of the built-in
    /// poller. The stream closing before a stop is treated as a watch failure.
    pub async fn run_with_source(
        &self,
        events: mpsc::UnboundedReceiver<RawEvent>,
    ) -> Result<(), WatchError> {
        self.begin()?;
        let result = self.drive(events).await;
        self.finish(result)
    }

    fn begin(&self) -> Result<(), WatchError> {
        if self.state() != WatchState::Idle {
            return Err(WatchError::AlreadyStarted);
        }
        if !self.root.is_dir() {
            return self.finish(Err(WatchError::TargetMissing(self.root.clone())));
        }

        self.state.send_replace(WatchState::Watching);
        self.activity.success(format!(
            "File watcher actively monitoring: {}",
            self.root.display()
        ));
        Ok(())
    }

    fn finish(&self, result: Result<(), WatchError>) -> Result<(), WatchError> {
        match &result {
            Ok(()) => {
                self.state.send_replace(WatchState::Stopped);
                self.activity.warning("File watcher stopped.");
            }
            Err(e) => {
                self.state.send_replace(WatchState::Error);
                self.activity.error(format!("File watcher failed: {}", e));
            }
        }
        result
    }

    async fn drive(&self, mut events: mpsc::UnboundedReceiver<RawEvent>) -> Result<(), WatchError> {
        let halt = StopSignal::new();
        let in_flight: Arc<Mutex<HashSet<PathBuf>>> = Arc::default();
        let mut tasks = JoinSet::new();

        let result = loop {
            tokio::select! {
                biased;

                _ = self.stop.stopped() => break Ok(()),

                incoming = events.recv() => {
                    if self.stop.is_stopped() {
                        break Ok(());
                    }
                    match incoming {
                        None => break Err(WatchError::SourceClosed),
                        Some(Err(e)) if self.is_transient(&e) => {
                            warn!("ignoring transient watch error: {}", e);
                        }
                        Some(Err(e)) => break Err(WatchError::Mechanism(e)),
                        Some(Ok(event)) => {
                            debug!("raw event: {:?}", event);
                            if !self.root.is_dir() {
                                break Err(WatchError::TargetMissing(self.root.clone()));
                            }
                            for watch_event in WatchEvent::from_notify(&event, &self.root) {
                                self.dispatch(watch_event, &halt, &in_flight, &mut tasks);
                            }
                        }
                    }
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("classification task ended abnormally: {}", e);
                    }
                }
            }
        };

        // No new intake from here on. Debounces still sleeping give up;
        // classifications already running are awaited.
        drop(events);
        halt.stop();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("classification task ended abnormally: {}", e);
            }
        }

        result
    }

    fn dispatch(
        &self,
        event: WatchEvent,
        halt: &StopSignal,
        in_flight: &Arc<Mutex<HashSet<PathBuf>>>,
        tasks: &mut JoinSet<()>,
    ) {
        if self
            .organizer
            .categories()
            .is_temp_extension(&extension_of(&event.path))
        {
            debug!("skipping temporary file {}", event.path.display());
            return;
        }
        if event.path.is_dir() {
            return;
        }
        match in_flight.lock() {
            Ok(mut paths) => {
                if !paths.insert(event.path.clone()) {
                    debug!("{} is already scheduled", event.path.display());
                    return;
                }
            }
            Err(e) => {
                error!("in-flight set poisoned: {}", e);
                return;
            }
        }

        let delay = match event.kind {
            WatchEventKind::Created => Some(self.debounce),
            WatchEventKind::RenamedInto => None,
        };
        let pending = Pending {
            path: event.path,
            delay,
            root: self.root.clone(),
            organizer: Arc::clone(&self.organizer),
            activity: Arc::clone(&self.activity),
            in_flight: Arc::clone(in_flight),
        };
        tasks.spawn(pending.run(self.stop.clone(), halt.clone()));
    }

    /// A missing child path is routine for a poller; anything else is fatal.
    fn is_transient(&self, error: &notify::Error) -> bool {
        let missing = match &error.kind {
            notify::ErrorKind::PathNotFound => true,
            notify::ErrorKind::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        };
        missing && self.root.is_dir()
    }
}

/// One scheduled classification, owned by its task.
struct Pending {
    path: PathBuf,
    delay: Option<Duration>,
    root: PathBuf,
    organizer: Arc<FileOrganizer>,
    activity: Arc<Activity>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Pending {
    /// Waits out the debounce, then classifies unless `stop` or `halt` fired.
    ///
    /// `stop` is the shared session flag; `halt` is raised by the loop once it
    /// stops taking events. Both are checked, since the loop may not have seen
    /// `stop` yet when the debounce ends.
    async fn run(self, stop: StopSignal, halt: StopSignal) {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.stopped() => return self.release(),
                _ = halt.stopped() => return self.release(),
            }
        }
        if stop.is_stopped() || halt.is_stopped() {
            return self.release();
        }

        let organizer = Arc::clone(&self.organizer);
        let job_path = self.path.clone();
        let root = self.root.clone();
        let outcome =
            tokio::task::spawn_blocking(move || organizer.classify_and_move(&job_path, &root))
                .await;
        self.release();

        match outcome {
            Ok(outcome) => self.activity.record(&outcome),
            Err(e) => self.activity.error(format!(
                "Error moving {}: classification crashed: {}",
                self.path.display(),
                e
            )),
        }
    }

    fn release(&self) {
        if let Ok(mut paths) = self.in_flight.lock() {
            paths.remove(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{MemorySink, Severity};
    use crate::file_category::CategoryTable;
    use notify::event::CreateKind;
    use std::fs;
    use tempfile::TempDir;

    fn table() -> CategoryTable {
        let mut table = CategoryTable::empty();
        table.push_category("Images", &[".jpg", ".png"]);
        table.push_subcategory("Documents", "PDF", &[".pdf"]);
        table.push_category("Temp", &[".tmp", ".crdownload"]);
        table
    }

    struct Harness {
        _temp_dir: TempDir,
        root: PathBuf,
        sink: Arc<MemorySink>,
        activity: Arc<Activity>,
        stop: StopSignal,
    }

    impl Harness {
        fn new() -> Self {
            let temp_dir = TempDir::new().expect("Failed to create temp directory");
            let root = temp_dir.path().canonicalize().unwrap();
            let sink = Arc::new(MemorySink::new());
            let activity = Arc::new(Activity::new(sink.clone()));
            Self {
                _temp_dir: temp_dir,
                root,
                sink,
                activity,
                stop: StopSignal::new(),
            }
        }

        fn watcher(&self, debounce_ms: u64) -> DirectoryWatcher {
            DirectoryWatcher::new(
                self.root.clone(),
                Arc::new(FileOrganizer::new(table(), true)),
                Arc::clone(&self.activity),
                self.stop.clone(),
            )
            .with_debounce(Duration::from_millis(debounce_ms))
            .with_poll_interval(Duration::from_millis(50))
        }

        fn created(&self, name: &str) -> RawEvent {
            Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(self.root.join(name)))
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        condition()
    }

    #[test]
    fn test_translate_create_event() {
        let root = PathBuf::from("/watch");
        let event = Event::new(EventKind::Create(CreateKind::Any)).add_path(root.join("a.jpg"));
        assert_eq!(
            WatchEvent::from_notify(&event, &root),
            vec![WatchEvent {
                path: root.join("a.jpg"),
                kind: WatchEventKind::Created
            }]
        );
    }

    #[test]
    fn test_translate_rename_uses_destination() {
        let root = PathBuf::from("/watch");
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("a.crdownload"))
            .add_path(root.join("a.zip"));
        assert_eq!(
            WatchEvent::from_notify(&event, &root),
            vec![WatchEvent {
                path: root.join("a.zip"),
                kind: WatchEventKind::RenamedInto
            }]
        );
    }

    #[test]
    fn test_translate_ignores_other_kinds_and_nested_paths() {
        let root = PathBuf::from("/watch");
        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(root.join("a.jpg"));
        let nested = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join("Images").join("a.jpg"));
        let renamed_away = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("a.jpg"))
            .add_path(root.join("Images").join("a.jpg"));

        assert!(WatchEvent::from_notify(&removed, &root).is_empty());
        assert!(WatchEvent::from_notify(&nested, &root).is_empty());
        assert!(WatchEvent::from_notify(&renamed_away, &root).is_empty());
    }

    #[tokio::test]
    async fn test_created_file_is_moved_after_debounce() {
        let harness = Harness::new();
        fs::write(harness.root.join("a.jpg"), "jpg").unwrap();
        let watcher = harness.watcher(300);
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = harness.stop.clone();

        let handle = tokio::spawn(async move { watcher.run_with_source(rx).await });
        tx.send(harness.created("a.jpg")).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.root.join("a.jpg").is_file(), "moved before debounce elapsed");

        let target = harness.root.join("Images/a.jpg");
        assert!(wait_for(|| target.is_file()).await);

        stop.stop();
        handle.await.unwrap().unwrap();
        assert_eq!(harness.activity.files_moved(), 1);
    }

    #[tokio::test]
    async fn test_renamed_file_is_moved_without_debounce() {
        let harness = Harness::new();
        fs::write(harness.root.join("b.pdf"), "pdf").unwrap();
        let watcher = harness.watcher(60_000);
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = harness.stop.clone();

        let handle = tokio::spawn(async move { watcher.run_with_source(rx).await });
        tx.send(Ok(Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(harness.root.join("b.pdf.part"))
            .add_path(harness.root.join("b.pdf"))))
            .unwrap();

        let target = harness.root.join("Documents/PDF/b.pdf");
        assert!(wait_for(|| target.is_file()).await);

        stop.stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_temp_files_are_never_classified() {
        let harness = Harness::new();
        fs::write(harness.root.join("c.tmp"), "tmp").unwrap();
        fs::write(harness.root.join("d.CRDOWNLOAD"), "partial").unwrap();
        let watcher = harness.watcher(20);
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = harness.stop.clone();

        let handle = tokio::spawn(async move { watcher.run_with_source(rx).await });
        tx.send(harness.created("c.tmp")).unwrap();
        tx.send(Ok(Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(harness.root.join("d.CRDOWNLOAD"))))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.stop();
        handle.await.unwrap().unwrap();

        assert!(harness.root.join("c.tmp").is_file());
        assert!(harness.root.join("d.CRDOWNLOAD").is_file());
        assert!(!harness.root.join("Temp").exists());
        assert!(harness.sink.messages(Severity::Move).is_empty());
    }

    #[tokio::test]
    async fn test_stop_during_debounce_leaves_file_alone() {
        let harness = Harness::new();
        fs::write(harness.root.join("a.png"), "png").unwrap();
        let watcher = harness.watcher(10_000);
        let mut state = watcher.subscribe_state();
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = harness.stop.clone();

        let handle = tokio::spawn(async move { watcher.run_with_source(rx).await });
        tx.send(harness.created("a.png")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        stop.stop();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("stop should not wait for the debounce")
            .unwrap()
            .unwrap();

        assert!(harness.root.join("a.png").is_file());
        assert_eq!(*state.borrow_and_update(), WatchState::Stopped);
        assert_eq!(
            harness.sink.messages(Severity::Warning),
            vec!["File watcher stopped."]
        );
    }

    #[tokio::test]
    async fn test_shared_stop_is_checked_after_debounce() {
        // The session flag is up but the loop has not raised `halt` yet.
        let harness = Harness::new();
        fs::write(harness.root.join("a.png"), "png").unwrap();
        let in_flight: Arc<Mutex<HashSet<PathBuf>>> = Arc::default();
        in_flight
            .lock()
            .unwrap()
            .insert(harness.root.join("a.png"));
        let pending = Pending {
            path: harness.root.join("a.png"),
            delay: Some(Duration::from_millis(20)),
            root: harness.root.clone(),
            organizer: Arc::new(FileOrganizer::new(table(), true)),
            activity: Arc::clone(&harness.activity),
            in_flight: Arc::clone(&in_flight),
        };
        harness.stop.stop();

        pending.run(harness.stop.clone(), StopSignal::new()).await;

        assert!(harness.root.join("a.png").is_file());
        assert!(!harness.root.join("Images").exists());
        assert!(in_flight.lock().unwrap().is_empty());
        assert_eq!(harness.activity.files_moved(), 0);
    }

    #[tokio::test]
    async fn test_pending_classifies_when_no_signal_fired() {
        let harness = Harness::new();
        fs::write(harness.root.join("b.pdf"), "pdf").unwrap();
        let pending = Pending {
            path: harness.root.join("b.pdf"),
            delay: Some(Duration::from_millis(10)),
            root: harness.root.clone(),
            organizer: Arc::new(FileOrganizer::new(table(), true)),
            activity: Arc::clone(&harness.activity),
            in_flight: Arc::default(),
        };

        pending.run(StopSignal::new(), StopSignal::new()).await;

        assert!(harness.root.join("Documents/PDF/b.pdf").is_file());
        assert_eq!(harness.activity.files_moved(), 1);
    }

    #[tokio::test]
    async fn test_mechanism_failure_ends_in_error_state() {
        let harness = Harness::new();
        let watcher = harness.watcher(20);
        let state = watcher.subscribe_state();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(Err(notify::Error::generic("poller crashed"))).unwrap();
        let result = watcher.run_with_source(rx).await;

        assert!(matches!(result, Err(WatchError::Mechanism(_))));
        assert_eq!(*state.borrow(), WatchState::Error);
        let errors = harness.sink.messages(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("poller crashed"));
    }

    #[tokio::test]
    async fn test_missing_child_error_is_transient() {
        let harness = Harness::new();
        let watcher = harness.watcher(20);
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = harness.stop.clone();

        let handle = tokio::spawn(async move { watcher.run_with_source(rx).await });
        tx.send(Err(notify::Error::path_not_found())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        stop.stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_target_fails_to_start() {
        let harness = Harness::new();
        let watcher = DirectoryWatcher::new(
            harness.root.join("nope"),
            Arc::new(FileOrganizer::new(table(), true)),
            Arc::clone(&harness.activity),
            harness.stop.clone(),
        );

        let result = watcher.run().await;
        assert!(matches!(result, Err(WatchError::TargetMissing(_))));
        assert_eq!(watcher.state(), WatchState::Error);
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let harness = Harness::new();
        let watcher = harness.watcher(20);
        harness.stop.stop();

        let (_tx, rx) = mpsc::unbounded_channel();
        watcher.run_with_source(rx).await.unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        assert!(matches!(
            watcher.run_with_source(rx).await,
            Err(WatchError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_polling_watcher_sorts_new_file() {
        let harness = Harness::new();
        let watcher = harness.watcher(50);
        let mut state = watcher.subscribe_state();
        let stop = harness.stop.clone();

        let handle = tokio::spawn(async move { watcher.run().await });
        state
            .wait_for(|s| *s == WatchState::Watching)
            .await
            .unwrap();
        // Let the poller take its baseline scan.
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(harness.root.join("new.png"), "png").unwrap();
        let target = harness.root.join("Images/new.png");
        assert!(wait_for(|| target.is_file()).await);

        stop.stop();
        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), WatchState::Stopped);
    }
}
