//! Sync results and the text shown to the user about them.
//!
//! Everything here is formatting over plain data; nothing is printed.

use crate::Action;

/// One path the run looked at, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Relative path below the mount root.
    pub path: String,
    /// What was (or, on a dry run, would be) done.
    pub action: Action,
}

/// Aggregate outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Processed paths in sorted order, up to a conflict halt if any.
    pub entries: Vec<ReportEntry>,
    /// Files uploaded (new or changed).
    pub pushed: usize,
    /// Files downloaded (new, changed, or kept over a local delete).
    pub pulled: usize,
    /// Files merged cleanly.
    pub merged: usize,
    /// Remote files deleted.
    pub deleted: usize,
    /// Files left alone.
    pub skipped: usize,
    /// Stale base entries dropped.
    pub forgotten: usize,
}

impl SyncReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed action and count it.
    pub fn record(&mut self, path: &str, action: Action) {
        match action {
            Action::Skip => self.skipped += 1,
            Action::PushNew | Action::Push => self.pushed += 1,
            Action::PullNew | Action::Pull | Action::ConflictKeepRemote => self.pulled += 1,
            Action::Merge => self.merged += 1,
            Action::DeleteRemote => self.deleted += 1,
            Action::ForgetBase => self.forgotten += 1,
        }
        self.note(path, action);
    }

    /// Record an action that did not complete (a conflicted merge) without
    /// counting it.
    pub fn note(&mut self, path: &str, action: Action) {
        self.entries.push(ReportEntry {
            path: path.to_string(),
            action,
        });
    }

    /// Number of entries with the given action.
    pub fn count_of(&self, action: Action) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    /// Action recorded for a path, if it was processed.
    pub fn action_for(&self, path: &str) -> Option<Action> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.action)
    }
}

/// Progress line for one path, e.g. `  push          a.txt`.
pub fn action_line(path: &str, action: Action) -> String {
    match action {
        Action::ConflictKeepRemote => format!(
            "  {:<14}{} (deleted locally, modified remotely; keeping remote)",
            action.label(),
            path
        ),
        _ => format!("  {:<14}{}", action.label(), path),
    }
}

/// Counter block printed after a successful run.
pub fn summary(report: &SyncReport) -> String {
    let mut out = format!(
        "  pushed:  {}\n  pulled:  {}\n  merged:  {}\n  deleted: {}\n  skipped: {}",
        report.pushed, report.pulled, report.merged, report.deleted, report.skipped
    );
    if report.forgotten > 0 {
        out.push_str(&format!("\n  forgot:  {}", report.forgotten));
    }
    out
}

const NOTICE_WIDTH: usize = 58;

/// Boxed notice for a merge conflict that halted the run.
///
/// `path` is what the user should open: usually the absolute local path.
pub fn conflict_notice(path: &str) -> String {
    let rule = "═".repeat(NOTICE_WIDTH);
    let line = |text: &str| format!("║  {:<w$}║", text, w = NOTICE_WIDTH - 2);

    let file = fit(path, NOTICE_WIDTH - 8);
    let mut out = Vec::new();
    out.push(format!("╔{}╗", rule));
    out.push(line("                 MERGE CONFLICT"));
    out.push(format!("╠{}╣", rule));
    out.push(line(&format!("File: {}", file)));
    out.push(format!("╠{}╣", rule));
    out.push(line("Both local and remote changed this file since last"));
    out.push(line("sync and the changes could not be merged automatically."));
    out.push(line(""));
    out.push(line("The file has been written with conflict markers:"));
    out.push(line("  <<<<<<< ours"));
    out.push(line("  ======="));
    out.push(line("  >>>>>>> theirs"));
    out.push(line(""));
    out.push(line("Nothing after this file was synced. Resolve the"));
    out.push(line("conflict, then run:"));
    out.push(line("  rmt sync <path> --push"));
    out.push(format!("╚{}╝", rule));
    out.join("\n")
}

/// Shorten `s` to at most `max` characters, keeping the end.
fn fit(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.to_string();
    }
    let tail: String = s.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_by_action() {
        let mut report = SyncReport::new();
        report.record("a", Action::Push);
        report.record("b", Action::PushNew);
        report.record("c", Action::Pull);
        report.record("d", Action::ConflictKeepRemote);
        report.record("e", Action::Merge);
        report.record("f", Action::DeleteRemote);
        report.record("g", Action::Skip);
        report.record("h", Action::ForgetBase);

        assert_eq!(report.pushed, 2);
        assert_eq!(report.pulled, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.forgotten, 1);
        assert_eq!(report.entries.len(), 8);
    }

    #[test]
    fn noted_conflict_is_not_counted() {
        let mut report = SyncReport::new();
        report.note("b.txt", Action::Merge);
        assert_eq!(report.merged, 0);
        assert_eq!(report.action_for("b.txt"), Some(Action::Merge));
        assert_eq!(report.count_of(Action::Merge), 1);
        assert_eq!(report.action_for("missing"), None);
    }

    #[test]
    fn action_line_layout() {
        assert_eq!(action_line("a.txt", Action::Push), "  push          a.txt");
        assert_eq!(
            action_line("b.txt", Action::PushNew),
            "  push (new)    b.txt"
        );
        assert!(action_line("c", Action::ConflictKeepRemote).contains("keeping remote"));
    }

    #[test]
    fn summary_lists_counters() {
        let report = SyncReport {
            pushed: 1,
            merged: 2,
            ..Default::default()
        };
        let text = summary(&report);
        assert!(text.contains("pushed:  1"));
        assert!(text.contains("merged:  2"));
        assert!(!text.contains("forgot"));
    }

    #[test]
    fn conflict_notice_explains_resolution() {
        let notice = conflict_notice("/home/me/site/b.txt");
        assert!(notice.contains("MERGE CONFLICT"));
        assert!(notice.contains("/home/me/site/b.txt"));
        assert!(notice.contains("<<<<<<< ours"));
        assert!(notice.contains(">>>>>>> theirs"));
        assert!(notice.contains("rmt sync <path> --push"));
    }

    #[test]
    fn conflict_notice_lines_have_equal_width() {
        let long = format!("/very/{}/file.txt", "deep/".repeat(30));
        let notice = conflict_notice(&long);
        let widths: Vec<usize> = notice.lines().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{:?}", widths);
        assert!(notice.contains("file.txt"));
    }
}
