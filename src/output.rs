//! Output formatting and styling module.
//!
//! Provides a centralized interface for terminal output: colored activity
//! lines, progress tracking, and summary tables. [`ConsoleSink`] renders
//! session activity through the same formatter.

use crate::activity::{ActivityEvent, EventSink, Severity};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;

/// Manages all CLI output with consistent styling and formatting.
///
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Move messages (blue with →)
pub struct OutputFormatter;

impl OutputFormatter {
    /// Renders an activity event as a single colored line.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsorter::activity::{ActivityEvent, Severity};
    /// use dirsorter::output::OutputFormatter;
    ///
    /// let line = OutputFormatter::format_event(&ActivityEvent::new(Severity::Move, "a.jpg → Images/"));
    /// println!("{}", line);
    /// ```
    pub fn format_event(event: &ActivityEvent) -> String {
        let time = format!("[{}]", event.timestamp.format("%H:%M:%S")).dimmed();
        let body = match event.severity {
            Severity::Success => format!("{} {}", "✓".green(), event.message),
            Severity::Error => format!("{} {}", "✗".red(), event.message.red()),
            Severity::Warning => format!("{} {}", "⚠".yellow(), event.message),
            Severity::Move => format!("{} {}", "→".blue(), event.message),
            Severity::Info => event.message.cyan().to_string(),
        };
        format!("{} {}", time, body)
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates and returns a progress bar for file operations.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsorter::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Prints a summary table with file counts by category folder.
    pub fn summary_table(category_counts: &HashMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let mut categories: Vec<_> = category_counts.iter().collect();
        categories.sort_by_key(|&(name, _)| name);

        let max_category_len = categories
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in &categories {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(**count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_category_len
        );
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Prints activity events to the terminal.
///
/// While a progress bar is attached, lines are printed above it so the bar
/// is not torn.
#[derive(Default)]
pub struct ConsoleSink {
    progress: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_progress(&self, pb: ProgressBar) {
        if let Ok(mut slot) = self.progress.lock() {
            *slot = Some(pb);
        }
    }

    pub fn detach_progress(&self) {
        if let Ok(mut slot) = self.progress.lock() {
            *slot = None;
        }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: ActivityEvent) {
        let line = OutputFormatter::format_event(&event);
        let progress = self.progress.lock().ok().and_then(|slot| slot.clone());
        match progress {
            Some(pb) => pb.println(line),
            None if event.severity == Severity::Error => eprintln!("{}", line),
            None => println!("{}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_event_contains_message_and_time() {
        colored::control::set_override(false);
        let event = ActivityEvent::new(Severity::Move, "a.jpg → Images/");
        let line = OutputFormatter::format_event(&event);

        assert!(line.starts_with('['));
        assert!(line.ends_with("→ a.jpg → Images/"));
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1), "file");
        assert_eq!(plural(0), "files");
        assert_eq!(plural(3), "files");
    }
}
