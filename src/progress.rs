use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::model::{BatchReport, RunReport};

const TITLE_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Ok,
    Failed,
    Deprecated,
    Fatal,
}

impl ItemStatus {
    fn symbol(&self) -> &'static str {
        match self {
            ItemStatus::Ok => "✅",
            ItemStatus::Failed => "❌",
            ItemStatus::Deprecated => "⛔ (deprecated)",
            ItemStatus::Fatal => "💥 (connection fault)",
        }
    }
}

/// Human-readable progress: a bar per running batch, with item lines scrolling above.
pub struct Progress {
    multi: MultiProgress,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Print a line above any active bars.
    pub fn println(&self, line: impl AsRef<str>) {
        self.multi.suspend(|| println!("{}", line.as_ref()));
    }

    pub fn batch(&self, batch_num: usize, total_batches: usize, len: usize) -> BatchProgress<'_> {
        let style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = self.multi.add(ProgressBar::new(len as u64));
        bar.set_style(style);
        bar.set_prefix(format!("batch {batch_num}/{total_batches}"));

        self.println(format!(
            "🎬 Batch {batch_num}/{total_batches}: Processing {len} movies..."
        ));
        BatchProgress {
            progress: self,
            bar,
            batch_num,
            len,
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BatchProgress<'a> {
    progress: &'a Progress,
    bar: ProgressBar,
    batch_num: usize,
    len: usize,
}

impl BatchProgress<'_> {
    /// Report item `index` (1-based) of this batch.
    pub fn item(&self, index: usize, status: ItemStatus, label: &str, latency: Duration) {
        self.progress
            .println(item_line(index, self.len, status, label, latency));
        self.bar.inc(1);
    }

    pub fn note(&self, line: impl AsRef<str>) {
        self.progress.println(format!("    {}", line.as_ref()));
    }

    pub fn finish(self, report: &BatchReport) {
        self.bar.finish_and_clear();
        self.progress.multi.remove(&self.bar);
        let mut line = format!(
            "  📈 Batch {} summary: {} ✅, {} ❌, {} deprecated",
            self.batch_num,
            report.succeeded,
            report.failed,
            report.deprecated.len()
        );
        if report.aborted {
            line.push_str(&format!(
                ", aborted with {} left in queue",
                report.unattempted
            ));
        }
        self.progress.println(line);
    }
}

/// Remaining time, extrapolated from the latest item's latency.
pub fn eta(last_latency: Duration, remaining: usize) -> Option<Duration> {
    if remaining == 0 || last_latency.is_zero() {
        return None;
    }
    Some(last_latency * remaining as u32)
}

pub fn item_line(
    index: usize,
    total: usize,
    status: ItemStatus,
    label: &str,
    latency: Duration,
) -> String {
    let pct = if total == 0 {
        100.0
    } else {
        index as f64 / total as f64 * 100.0
    };
    let eta = eta(latency, total.saturating_sub(index))
        .map(|d| format!(", ETA: {:.0}s", d.as_secs_f64()))
        .unwrap_or_default();
    format!(
        "  [{index}/{total}] ({pct:.1}%) {} {} ({:.1}s){eta}",
        status.symbol(),
        truncate(label, TITLE_WIDTH),
        latency.as_secs_f64()
    )
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Final accounting lines for a run.
pub fn summary_lines(report: &RunReport, total: usize, elapsed: Duration, persisted: bool) -> Vec<String> {
    let mut lines = vec![
        "🎯 SCRAPING COMPLETE!".to_string(),
        "═══════════════════════════════════════".to_string(),
        format!("📊 Total movies processed: {total}"),
        format!(
            "🔎 Attempted: {}, succeeded: {}, failed: {}, deprecated: {}",
            report.attempted, report.succeeded, report.failed, report.deprecated_found
        ),
    ];
    if persisted {
        lines.push(format!("✅ Successfully saved: {} movies", report.records_written));
        lines.push(format!("📦 Successful batches: {}", report.success_batches));
        lines.push(format!("🧩 Partial batches: {}", report.partial_batches));
        lines.push(format!("❌ Failed batches: {}", report.failure_batches));
        lines.push(format!("🗑️  Deprecated URLs marked: {}", report.deprecated_marked));
        if report.records_written > 0 && total > 0 {
            let rate = report.records_written as f64 / total as f64 * 100.0;
            lines.push(format!("📈 Success rate: {rate:.1}%"));
        }
    } else {
        lines.push("🚫 Database update was disabled - no movies saved".to_string());
    }

    let secs = elapsed.as_secs_f64();
    let per_sec = if secs > 0.0 { total as f64 / secs } else { 0.0 };
    lines.push(format!("⏱️  Total time: {}", format_duration(elapsed)));
    lines.push(format!("🚀 Average speed: {per_sec:.2} movies/second"));
    lines.push("═══════════════════════════════════════".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_uses_latest_latency() {
        assert_eq!(eta(Duration::from_millis(1500), 4), Some(Duration::from_secs(6)));
        assert_eq!(eta(Duration::from_secs(1), 0), None);
        assert_eq!(eta(Duration::ZERO, 10), None);
    }

    #[test]
    fn item_line_shows_progress_and_eta() {
        let line = item_line(1, 4, ItemStatus::Ok, "Parasite", Duration::from_secs(2));
        assert_eq!(line, "  [1/4] (25.0%) ✅ Parasite (2.0s), ETA: 6s");

        let last = item_line(4, 4, ItemStatus::Failed, "42", Duration::from_secs(2));
        assert_eq!(last, "  [4/4] (100.0%) ❌ 42 (2.0s)");
    }

    #[test]
    fn long_titles_are_truncated() {
        let title = "Dr. Strangelove or: How I Learned to Stop Worrying and Love the Bomb";
        let line = item_line(1, 1, ItemStatus::Ok, title, Duration::from_millis(100));
        assert!(line.contains("Dr. Strangelove or: How I Learned to Sto..."));
    }

    #[test]
    fn durations_are_human_readable() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn summary_reports_rate_only_when_saved() {
        let report = RunReport {
            success_batches: 1,
            records_written: 1,
            attempted: 4,
            succeeded: 1,
            ..RunReport::default()
        };
        let lines = summary_lines(&report, 4, Duration::from_secs(2), true);
        assert!(lines.iter().any(|l| l == "📈 Success rate: 25.0%"));
        assert!(lines.iter().any(|l| l == "🚀 Average speed: 2.00 movies/second"));

        let lines = summary_lines(&RunReport::default(), 4, Duration::from_secs(2), false);
        assert!(lines.iter().all(|l| !l.contains("Success rate")));
        assert!(lines.iter().any(|l| l.contains("disabled")));
    }

    #[test]
    fn hidden_progress_tracks_batches() {
        let progress = Progress::hidden();
        let batch = progress.batch(1, 1, 2);
        batch.item(1, ItemStatus::Ok, "a", Duration::from_millis(10));
        batch.item(2, ItemStatus::Deprecated, "b", Duration::from_millis(10));
        assert_eq!(batch.bar.position(), 2);
        batch.finish(&BatchReport::default());
    }
}
