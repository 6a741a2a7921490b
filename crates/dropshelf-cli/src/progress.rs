use colored::*;
use dropshelf_core::{DetectedFile, ImportReporter, ImportResult, ImportStage};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome counts since the reporter was created.
#[derive(Debug, Default)]
struct Tally {
    imported: AtomicUsize,
    duplicates: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record(&self, result: &ImportResult) {
        let counter = if result.is_duplicate {
            &self.duplicates
        } else if result.success {
            &self.imported
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> String {
        format!(
            "{} imported, {} duplicates, {} failed",
            self.imported.load(Ordering::Relaxed),
            self.duplicates.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed)
        )
    }
}

/// CLI reporter: one spinner per file in flight, a summary line per outcome
/// followed by the running totals.
pub struct CliReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
    tally: Tally,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            tally: Tally::default(),
        }
    }

    /// Running totals, as printed after each outcome.
    pub fn totals(&self) -> String {
        self.tally.summary()
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }
}

impl ImportReporter for CliReporter {
    fn on_import_start(&self, file: &DetectedFile) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(file.file_name.clone());
        pb.set_message("detected");
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(old) = bars.insert(file.path.clone(), pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_stage(&self, file: &DetectedFile, stage: ImportStage) {
        if stage.is_terminal() {
            return;
        }
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(&file.path) {
                pb.set_message(stage.to_string());
            }
        }
    }

    fn on_import_complete(&self, file: &DetectedFile, result: &ImportResult) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(pb) = bars.remove(&file.path) {
                pb.finish_and_clear();
            }
        }

        let title = result.book_title.as_deref().unwrap_or("");
        let line = if result.is_duplicate {
            format!("  {} {} duplicate of \"{}\"", "=".yellow(), file.file_name, title)
        } else if result.success {
            format!("  {} {} imported as \"{}\"", "✓".green(), file.file_name, title)
        } else {
            format!(
                "  {} {} {}",
                "✗".red(),
                file.file_name,
                result.error.as_deref().unwrap_or("failed").red()
            )
        };
        let _ = self.multi.println(line);

        self.tally.record(result);
        let _ = self
            .multi
            .println(format!("    {}", format!("({})", self.tally.summary()).dimmed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool, is_duplicate: bool) -> ImportResult {
        ImportResult {
            success,
            book_id: success.then(|| "id".to_string()),
            book_title: Some("Title".to_string()),
            error: (!success).then(|| "boom".to_string()),
            is_duplicate,
        }
    }

    #[test]
    fn test_totals_follow_each_outcome() {
        let reporter = CliReporter::new();
        assert_eq!(reporter.totals(), "0 imported, 0 duplicates, 0 failed");

        let file = DetectedFile::new(PathBuf::from("/drop/a.epub"), 10, chrono::Utc::now());
        reporter.on_import_complete(&file, &result(true, false));
        reporter.on_import_complete(&file, &result(true, true));
        reporter.on_import_complete(&file, &result(false, false));
        reporter.on_import_complete(&file, &result(true, false));
        assert_eq!(reporter.totals(), "2 imported, 1 duplicates, 1 failed");
    }
}
