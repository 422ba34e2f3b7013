//! dirsorter - sorts files into category folders by extension
//!
//! This library classifies files by extension, moves them into category
//! folders under a base directory (resolving name collisions), sorts a
//! directory's existing files in one sweep, and watches a directory to sort
//! newly arriving files after a short settle delay.

pub mod activity;
pub mod cli;
pub mod collision;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod output;
pub mod session;
pub mod stop;
pub mod watcher;

pub use activity::{Activity, ActivityEvent, EventSink, Severity};
pub use config::{ConfigError, IgnoreRules, OrganizerConfig, WatchTarget};
pub use file_category::{CategoryRule, CategoryTable};
pub use file_organizer::{FileOrganizer, MoveOutcome, SkipReason, SweepReport};
pub use session::{Session, SessionError, SessionSummary};
pub use stop::StopSignal;
pub use watcher::{DirectoryWatcher, WatchError, WatchState};

pub use cli::{Cli, Command, run_cli};
