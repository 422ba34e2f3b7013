//! Classification and moving of files into category folders.
//!
//! [`FileOrganizer`] decides where a file belongs and moves it there exactly
//! once. It serves both the one-off sweep over files already in a directory
//! and the watcher's single-file moves. Per-file problems never escape as
//! errors: they come back as [`MoveOutcome::Failed`] so a sweep keeps going.
use crate::activity::Activity;
use crate::collision;
use crate::config::{CompiledIgnore, ConfigError, OrganizerConfig};
use crate::file_category::{CategoryTable, extension_of};
use crate::stop::StopSignal;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a file was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path vanished or is not a regular file.
    NotAFile,
    /// The file already sits in its category folder.
    AlreadyInPlace,
    /// An ignore rule matched the file name.
    Ignored,
}

/// Errors that can occur while moving a single file.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The category folder could not be created.
    #[error("cannot create folder {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The rename (or cross-device copy) failed.
    #[error("cannot move {} to {}: {source}", from.display(), to.display())]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of one classification attempt.
#[derive(Debug)]
pub enum MoveOutcome {
    Moved { from: PathBuf, to: PathBuf },
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf, error: MoveError },
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MoveOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, MoveOutcome::Skipped { .. })
    }

    /// The file this outcome is about, as it was before any move.
    pub fn source(&self) -> &Path {
        match self {
            MoveOutcome::Moved { from, .. } => from,
            MoveOutcome::Skipped { path, .. } | MoveOutcome::Failed { path, .. } => path,
        }
    }
}

/// Errors that stop a sweep before it starts.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("cannot read directory {}: {source}", path.display())]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Position of a sweep, reported after every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    pub processed: usize,
    pub total: usize,
}

/// Everything a sweep did, in listing order.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Files found when the directory was listed.
    pub total: usize,
    /// Files handled before the sweep ended.
    pub processed: usize,
    pub outcomes: Vec<MoveOutcome>,
    /// Files not yet handled when the sweep was stopped.
    pub pending: Vec<PathBuf>,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn moved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_moved()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }
}

/// A move the sweep would perform, computed without touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Folder relative to the base directory, e.g. `Documents/PDF`.
    pub category: PathBuf,
}

/// Moves files into category folders below a base directory.
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    categories: CategoryTable,
    handle_duplicates: bool,
    ignore: CompiledIgnore,
    progress_interval: usize,
}

impl FileOrganizer {
    /// Creates an organizer with no ignore rules and progress every 10 files.
    pub fn new(categories: CategoryTable, handle_duplicates: bool) -> Self {
        Self {
            categories,
            handle_duplicates,
            ignore: CompiledIgnore::default(),
            progress_interval: 10,
        }
    }

    /// Builds an organizer from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the ignore patterns do not compile.
    pub fn from_config(config: &OrganizerConfig) -> Result<Self, ConfigError> {
        for name in config.categories.unreachable_nested() {
            tracing::warn!(
                "category '{}' has subcategories but only Documents may be nested; it is never used",
                name
            );
        }

        Ok(Self {
            categories: config.categories.clone(),
            handle_duplicates: config.handle_duplicates,
            ignore: config.ignore.compile()?,
            progress_interval: config.progress_interval,
        })
    }

    pub fn with_ignore(mut self, ignore: CompiledIgnore) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_progress_interval(mut self, every: usize) -> Self {
        self.progress_interval = every;
        self
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Absolute category folder for `file_path` below `base_dir`.
    pub fn destination_dir(&self, file_path: &Path, base_dir: &Path) -> PathBuf {
        base_dir.join(self.categories.destination_subpath(&extension_of(file_path)))
    }

    /// Moves one file into its category folder.
    ///
    /// Returns `Skipped` when the file is gone, is not a regular file, is
    /// ignored, or already sits in its category folder. The last case keeps
    /// the watcher from reacting to its own moves.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dirsorter::file_category::CategoryTable;
    /// use dirsorter::file_organizer::{FileOrganizer, MoveOutcome};
    /// use std::path::Path;
    ///
    /// let organizer = FileOrganizer::new(CategoryTable::default(), true);
    /// match organizer.classify_and_move(Path::new("/downloads/a.jpg"), Path::new("/downloads")) {
    ///     MoveOutcome::Moved { to, .. } => println!("moved to {}", to.display()),
    ///     MoveOutcome::Failed { error, .. } => eprintln!("{}", error),
    ///     MoveOutcome::Skipped { .. } => {}
    /// }
    /// ```
    pub fn classify_and_move(&self, file_path: &Path, base_dir: &Path) -> MoveOutcome {
        let skipped = |reason| MoveOutcome::Skipped {
            path: file_path.to_path_buf(),
            reason,
        };

        if !file_path.is_file() {
            return skipped(SkipReason::NotAFile);
        }
        let Some(file_name) = file_path.file_name() else {
            return skipped(SkipReason::NotAFile);
        };
        if self.ignore.is_ignored(file_path) {
            return skipped(SkipReason::Ignored);
        }

        let destination_dir = self.destination_dir(file_path, base_dir);
        if file_path
            .parent()
            .is_some_and(|parent| same_dir(parent, &destination_dir))
        {
            return skipped(SkipReason::AlreadyInPlace);
        }

        let mut destination = destination_dir.join(file_name);
        if self.handle_duplicates {
            destination = collision::resolve(&destination);
        }

        if let Err(source) = fs::create_dir_all(&destination_dir) {
            return MoveOutcome::Failed {
                path: file_path.to_path_buf(),
                error: MoveError::DestinationUnwritable {
                    path: destination_dir,
                    source,
                },
            };
        }

        match relocate(file_path, &destination) {
            Ok(()) => MoveOutcome::Moved {
                from: file_path.to_path_buf(),
                to: destination,
            },
            Err(source) => MoveOutcome::Failed {
                path: file_path.to_path_buf(),
                error: MoveError::Relocate {
                    from: file_path.to_path_buf(),
                    to: destination,
                    source,
                },
            },
        }
    }

    /// Sorts every regular file directly inside `base_dir`.
    ///
    /// Equivalent to [`classify_existing_with`](Self::classify_existing_with)
    /// without a progress callback.
    pub fn classify_existing(
        &self,
        base_dir: &Path,
        stop: &StopSignal,
        activity: &Activity,
    ) -> Result<SweepReport, SweepError> {
        self.classify_existing_with(base_dir, stop, activity, |_| {})
    }

    /// Sorts every regular file directly inside `base_dir`, in listing order.
    ///
    /// The directory is listed once up front; files appearing later are left
    /// to the watcher. The stop signal is checked before each file. A stopped
    /// sweep returns the unprocessed files in [`SweepReport::pending`].
    ///
    /// # Errors
    ///
    /// Only a failure to list `base_dir` is an error. Individual files that
    /// cannot be moved show up as `Failed` outcomes.
    pub fn classify_existing_with(
        &self,
        base_dir: &Path,
        stop: &StopSignal,
        activity: &Activity,
        mut on_progress: impl FnMut(SweepProgress),
    ) -> Result<SweepReport, SweepError> {
        let files = self.list_files(base_dir)?;
        let total = files.len();
        let mut report = SweepReport {
            total,
            outcomes: Vec::with_capacity(total),
            ..Default::default()
        };

        for (index, path) in files.iter().enumerate() {
            if stop.is_stopped() {
                activity.warning(format!(
                    "Organization stopped. Processed {} of {} files.",
                    report.processed, total
                ));
                report.cancelled = true;
                report.pending = files[index..].to_vec();
                return Ok(report);
            }

            let outcome = self.classify_and_move(path, base_dir);
            activity.record(&outcome);
            report.outcomes.push(outcome);
            report.processed += 1;

            on_progress(SweepProgress {
                processed: report.processed,
                total,
            });
            if self.progress_interval > 0 && report.processed % self.progress_interval == 0 {
                activity.info(format!(
                    "Progress: {}/{} files processed...",
                    report.processed, total
                ));
            }
        }

        activity.success(format!("Organized {} existing files", total));
        Ok(report)
    }

    /// Computes the moves a sweep would make without changing anything.
    ///
    /// Numbered names are previewed against the current disk state only, so
    /// two planned files with the same name may show the same target.
    pub fn plan_existing(&self, base_dir: &Path) -> Result<Vec<PlannedMove>, SweepError> {
        let mut plan = Vec::new();

        for from in self.list_files(base_dir)? {
            let Some(file_name) = from.file_name() else {
                continue;
            };
            let category = self.categories.destination_subpath(&extension_of(&from));
            let destination_dir = base_dir.join(&category);
            if from
                .parent()
                .is_some_and(|parent| same_dir(parent, &destination_dir))
            {
                continue;
            }

            let mut to = destination_dir.join(file_name);
            if self.handle_duplicates {
                to = collision::resolve(&to);
            }
            plan.push(PlannedMove { from, to, category });
        }

        Ok(plan)
    }

    /// Regular, non-ignored files directly inside `base_dir`, in listing order.
    fn list_files(&self, base_dir: &Path) -> Result<Vec<PathBuf>, SweepError> {
        let entries = fs::read_dir(base_dir).map_err(|source| SweepError::ListDirectory {
            path: base_dir.to_path_buf(),
            source,
        })?;

        Ok(entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && !self.ignore.is_ignored(path))
            .collect())
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Renames `from` to `to`, copying across filesystems when rename cannot.
fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        result => result,
    }
}
