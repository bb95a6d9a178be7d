// src/core/history.rs

use crate::models::{EntryKind, HistoryAction, HistoryEntry, TimelineRow};
use colored::*;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The append-only timeline of one top-level run.
///
/// Cloning shares the same timeline, so a handler holding its context can add
/// entries the engine sees. Independent runs get independent instances.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_entry(&self, entry: HistoryEntry) {
        log::trace!("History += {} '{}'", entry.kind, entry.name);
        self.lock().push(entry);
    }

    /// A snapshot of the timeline in insertion order.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    /// The most recent entry that is not an `Action`.
    pub fn latest(&self) -> Option<HistoryEntry> {
        self.lock()
            .iter()
            .rev()
            .find(|e| e.kind != EntryKind::Action)
            .cloned()
    }

    /// Attaches a sub-action to the most recent non-`Action` entry.
    /// Returns `false` when there is no such entry.
    pub fn add_action(&self, action: HistoryAction) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().rev().find(|e| e.kind != EntryKind::Action) {
            Some(entry) => {
                entry.sub_actions.push(action);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn export(&self) -> Vec<TimelineRow> {
        export(&self.lock())
    }
}

/// Builds the read-only table view of a timeline.
pub fn export(entries: &[HistoryEntry]) -> Vec<TimelineRow> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| TimelineRow {
            index: i + 1,
            kind: entry.kind,
            name: entry.name.clone(),
            description: entry.description.clone(),
            duration_to_next: entries
                .get(i + 1)
                .map(|next| (next.timestamp - entry.timestamp).to_std().unwrap_or_default()),
            sub_actions: entry.sub_actions.clone(),
        })
        .collect()
}

/// Formats a duration the way the timeline footer shows it, e.g. `1.5 Sec`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    if seconds < 60.0 {
        format!("{:.1} Sec", seconds)
    } else if minutes < 60.0 {
        format!("{:.1} Min", minutes)
    } else if hours < 24.0 {
        format!("{:.1} Hrs", hours)
    } else {
        format!("{:.1} Days", days)
    }
}

/// Renders a timeline as a text table with start time and total duration.
pub fn render_timeline(entries: &[HistoryEntry]) -> String {
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return t!("history.empty").to_string();
    };

    let rows = export(entries);
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(4);

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "{} {}",
        t!("history.started_at"),
        first.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        out,
        "{}",
        format!(
            "{:>3}  {:<name_width$}  {:<8}  {:>9}  {}",
            "#",
            "Name",
            "Type",
            "Duration",
            "Description",
            name_width = name_width
        )
        .bold()
    );
    for row in &rows {
        let duration = row.duration_to_next.map(format_elapsed).unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>3}  {:<name_width$}  {:<8}  {:>9}  {}",
            row.index.to_string().blue(),
            row.name,
            row.kind.to_string(),
            duration,
            row.description,
            name_width = name_width
        );
        for action in &row.sub_actions {
            let _ = writeln!(
                out,
                "{:>3}  {:<indent$}  {}",
                "",
                "",
                format!("└─ {}", action.description).dimmed(),
                indent = name_width + 23
            );
        }
    }
    let total = (last.timestamp - first.timestamp).to_std().unwrap_or_default();
    let _ = write!(out, "{} {}", t!("history.took"), format_elapsed(total));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn entry(kind: EntryKind, name: &str) -> HistoryEntry {
        HistoryEntry::new(kind, name, format!("{} entry", name))
    }

    #[test]
    fn test_latest_skips_actions() {
        let history = History::new();
        history.add_entry(entry(EntryKind::Command, "build"));
        history.add_entry(entry(EntryKind::Action, "compile"));

        let latest = history.latest().unwrap();
        assert_eq!(latest.kind, EntryKind::Command);
        assert_eq!(latest.name, "build");
        // Order is untouched by the lookup.
        let names: Vec<_> = history.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["build", "compile"]);
    }

    #[test]
    fn test_latest_on_empty_or_action_only_history() {
        let history = History::new();
        assert!(history.latest().is_none());
        history.add_entry(entry(EntryKind::Action, "compile"));
        assert!(history.latest().is_none());
    }

    #[test]
    fn test_add_action_attaches_to_previous_non_action_entry() {
        let history = History::new();
        assert!(!history.add_action(HistoryAction::new("step", "nothing to attach to")));

        history.add_entry(entry(EntryKind::Job, "nightly"));
        history.add_entry(entry(EntryKind::Action, "upload"));
        assert!(history.add_action(HistoryAction::new("step", "uploaded 3 files")));

        let entries = history.entries();
        assert_eq!(entries[0].sub_actions.len(), 1);
        assert_eq!(entries[0].sub_actions[0].description, "uploaded 3 files");
        assert!(entries[1].sub_actions.is_empty());
    }

    #[test]
    fn test_clones_share_one_timeline() {
        let history = History::new();
        let handle = history.clone();
        handle.add_entry(entry(EntryKind::Command, "a"));
        assert_eq!(history.len(), 1);
        history.clear();
        assert!(handle.is_empty());
    }

    #[test]
    fn test_export_computes_duration_to_next() {
        let mut first = entry(EntryKind::Command, "a");
        let mut second = entry(EntryKind::Command, "b");
        first.timestamp = second.timestamp - TimeDelta::milliseconds(1500);
        second.sub_actions.push(HistoryAction::new("x", "sub"));

        let rows = export(&[first, second]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].duration_to_next, Some(Duration::from_millis(1500)));
        assert_eq!(rows[1].duration_to_next, None);
        assert_eq!(rows[1].sub_actions.len(), 1);
    }

    #[test]
    fn test_format_elapsed_units() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5 Sec");
        assert_eq!(format_elapsed(Duration::from_secs(90)), "1.5 Min");
        assert_eq!(format_elapsed(Duration::from_secs(5400)), "1.5 Hrs");
        assert_eq!(format_elapsed(Duration::from_secs(36 * 3600)), "1.5 Days");
    }

    #[test]
    fn test_render_timeline_lists_every_entry() {
        colored::control::set_override(false);
        let history = History::new();
        history.add_entry(entry(EntryKind::Hook, "setup"));
        history.add_entry(entry(EntryKind::Command, "deploy"));
        history.add_action(HistoryAction::new("push", "pushed image"));

        let table = render_timeline(&history.entries());
        assert!(table.contains("setup"));
        assert!(table.contains("deploy"));
        assert!(table.contains("pushed image"));
        assert!(table.contains("Sec"));
    }
}
