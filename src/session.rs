//! One organizer session: sweep the existing files, then watch for new ones.
//!
//! The sweep always finishes (or is stopped) before watching begins, so no
//! file is ever claimed by both at once.
use crate::activity::{Activity, EventSink};
use crate::config::{ConfigError, OrganizerConfig, WatchTarget};
use crate::file_organizer::{FileOrganizer, SweepError, SweepReport};
use crate::stop::StopSignal;
use crate::watcher::{DirectoryWatcher, WatchError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("sweep task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What a finished session did.
#[derive(Debug, Default)]
pub struct SessionSummary {
    /// Present when a sweep ran.
    pub sweep: Option<SweepReport>,
    /// Files moved by the sweep and the watcher together.
    pub files_moved: usize,
}

pub struct Session {
    config: Arc<OrganizerConfig>,
    organizer: Arc<FileOrganizer>,
    activity: Arc<Activity>,
    stop: StopSignal,
}

impl Session {
    /// Prepares a session; nothing touches the disk until it runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the ignore rules do not compile.
    pub fn new(config: OrganizerConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        let organizer = FileOrganizer::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            organizer: Arc::new(organizer),
            activity: Arc::new(Activity::new(sink)),
            stop: StopSignal::new(),
        })
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    /// Handle for stopping the session from elsewhere.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn activity(&self) -> Arc<Activity> {
        Arc::clone(&self.activity)
    }

    /// Validates the watch directory, reporting a failure as an event too.
    pub fn target(&self) -> Result<WatchTarget, ConfigError> {
        self.config.watch_target().inspect_err(|e| {
            self.activity.error(e.to_string());
        })
    }

    /// Sorts the files already in the watch directory.
    pub async fn sweep(&self) -> Result<SweepReport, SessionError> {
        let target = self.target()?;
        self.sweep_target(&target).await
    }

    async fn sweep_target(&self, target: &WatchTarget) -> Result<SweepReport, SessionError> {
        self.activity.info("Starting to organize existing files...");

        let organizer = Arc::clone(&self.organizer);
        let activity = Arc::clone(&self.activity);
        let stop = self.stop.clone();
        let base_dir = target.path().to_path_buf();
        let report = tokio::task::spawn_blocking(move || {
            organizer.classify_existing(&base_dir, &stop, &activity)
        })
        .await?
        .inspect_err(|e| self.activity.error(e.to_string()))?;

        if report.cancelled {
            self.activity.warning("Organization stopped by user");
        } else {
            self.activity.success("Finished organizing existing files!");
        }
        Ok(report)
    }

    /// Runs the session until the stop signal fires or watching fails.
    ///
    /// With `sweep_first`, existing files are sorted before watching starts;
    /// a sweep stopped early ends the session without watching.
    ///
    /// A file arriving after the sweep lists the directory but before the
    /// poller takes its first scan is part of that scan's baseline. It gets
    /// no event and stays where it is until the next sweep.
    pub async fn run(&self, sweep_first: bool) -> Result<SessionSummary, SessionError> {
        let target = self.target()?;
        let mut summary = SessionSummary::default();

        if sweep_first {
            let report = self.sweep_target(&target).await?;
            let cancelled = report.cancelled;
            summary.sweep = Some(report);
            if cancelled || self.stop.is_stopped() {
                summary.files_moved = self.activity.files_moved();
                return Ok(summary);
            }
        }

        let watcher = DirectoryWatcher::new(
            target.path().to_path_buf(),
            Arc::clone(&self.organizer),
            Arc::clone(&self.activity),
            self.stop.clone(),
        )
        .with_debounce(self.config.debounce())
        .with_poll_interval(self.config.poll_interval());
        watcher.run().await?;

        summary.files_moved = self.activity.files_moved();
        Ok(summary)
    }
}
