//! Text and JSON rendering of run reports.

use crate::audit::{AuditEntry, AuditOutcome, RunCounts};
use crate::disk::DiskRecord;
use crate::duplicates::DetectionReport;
use crate::error::ApiError;
use crate::pipeline::{PipelineRun, SyncReport};
use crate::scan::{DiskChange, ScanReport};
use comfy_table::presets::{UTF8_BORDERS_ONLY, UTF8_FULL};
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_outcome(outcome: AuditOutcome) -> String {
    match outcome {
        AuditOutcome::Success => format!("{}", outcome.green()),
        AuditOutcome::Partial => format!("{}", outcome.yellow()),
        AuditOutcome::Failed => format!("{}", outcome.red()),
    }
}

/// Summary counts shared by every command.
pub fn format_counts(counts: &RunCounts, outcome: AuditOutcome, dry_run: bool) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Scanned", "Created", "Updated", "Errored", "Duplicates", "Sync changes"]);
    table.add_row(vec![
        counts.scanned.to_string(),
        counts.created.to_string(),
        counts.updated.to_string(),
        counts.errored.to_string(),
        counts.duplicates_found.to_string(),
        counts.sync_changed.to_string(),
    ]);

    let mut out = format!("{}\n", table);
    out.push_str(&format!("Outcome: {}", format_outcome(outcome)));
    if dry_run {
        out.push_str(" (dry run, nothing written)");
    }
    out.push('\n');
    out
}

pub fn format_scan_report(run: &PipelineRun<ScanReport>) -> String {
    let report = &run.report;
    let mut out = format!("{}\n\n", format_section_heading("Scan"));
    out.push_str(&format!("Discovered {} disk folder(s)\n\n", report.discovered));

    let interesting: Vec<_> = report
        .disks
        .iter()
        .filter(|d| d.change != DiskChange::Unchanged || !d.errors.is_empty())
        .collect();
    if !interesting.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Disk", "Change", "Reindexed", "Problems"]);
        for disk in interesting {
            let change = match disk.change {
                DiskChange::Created => "created",
                DiskChange::Updated => "updated",
                DiskChange::Unchanged => "-",
            };
            table.add_row(vec![
                disk.id.to_string(),
                change.to_string(),
                if disk.reindexed { "yes" } else { "no" }.to_string(),
                disk.errors.join("\n"),
            ]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    if report.interrupted {
        out.push_str(&format!(
            "{}\n",
            "Interrupted; remaining disks were not scanned".yellow()
        ));
    }
    out.push_str(&format_counts(&run.audit.counts, run.audit.outcome, false));
    out
}

pub fn format_detection_report(run: &PipelineRun<DetectionReport>) -> String {
    let report = &run.report;
    let mut out = format!("{}\n\n", format_section_heading("Duplicates"));
    out.push_str(&format!(
        "{} disk(s) with content: {} exact, {} partial ({} unchanged)\n\n",
        report.participants, report.exact, report.partial, report.unchanged
    ));
    if let Some(focus) = &report.focus {
        out.push_str(&format!("Only relations involving {}\n", focus));
    }
    if report.cleared > 0 {
        let verb = if report.dry_run { "Would clear" } else { "Cleared" };
        out.push_str(&format!("{} {} stored relation(s) first\n\n", verb, report.cleared));
    }

    let mut changes = Vec::new();
    for relation in &report.added {
        changes.push(("added", relation.first.to_string(), relation.second.to_string(), relation.kind.to_string()));
    }
    for relation in &report.changed {
        changes.push(("changed", relation.first.to_string(), relation.second.to_string(), relation.kind.to_string()));
    }
    for key in &report.removed {
        changes.push(("removed", key.low().to_string(), key.high().to_string(), "-".to_string()));
    }
    if !changes.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["", "First", "Second", "Kind"]);
        for (action, first, second, kind) in changes {
            table.add_row(vec![action.to_string(), first, second, kind]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    out.push_str(&format_counts(&run.audit.counts, run.audit.outcome, report.dry_run));
    out
}

pub fn format_sync_report(run: &PipelineRun<SyncReport>) -> String {
    let report = &run.report;
    let mut out = format!("{}\n\n", format_section_heading("Archive sync"));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Disk", "Operation", "From", "To", "Notes"]);
    let mut rows = 0;
    for item in report.items.iter().filter(|i| !i.skipped) {
        for outcome in &item.outcomes {
            let to = if outcome.dry_run {
                format!("{} (would)", outcome.to)
            } else {
                outcome.to.to_string()
            };
            table.add_row(vec![
                outcome.id.to_string(),
                outcome.operation.to_string(),
                outcome.from.to_string(),
                to,
                outcome.notes.iter().take(5).cloned().collect::<Vec<_>>().join("\n"),
            ]);
            rows += 1;
        }
        if let Some(error) = &item.error {
            table.add_row(vec![
                item.record.id.to_string(),
                "-".to_string(),
                "-".to_string(),
                item.record.sync_status.to_string(),
                format!("{}", error.red()),
            ]);
            rows += 1;
        }
    }
    if rows > 0 {
        out.push_str(&format!("{}\n\n", table));
    }

    if report.interrupted {
        out.push_str(&format!(
            "{}\n",
            "Interrupted; remaining disks were not checked".yellow()
        ));
    }
    out.push_str(&format_counts(&run.audit.counts, run.audit.outcome, report.dry_run));
    out
}

pub fn format_ready(run: &PipelineRun<DiskRecord>) -> String {
    let record = &run.report;
    let state = if record.upload_ready {
        "ready to upload"
    } else {
        "not ready to upload"
    };
    if run.audit.counts.updated == 0 {
        format!("{} is already {}\n", record.id, state)
    } else {
        format!("{} is now {}\n", record.id, state)
    }
}

pub fn format_audit_text(entries: &[AuditEntry]) -> String {
    if entries.is_empty() {
        return "No runs recorded\n".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Started", "Command", "Outcome", "Scanned", "Created", "Updated", "Errored", "Dup", "Sync",
    ]);
    for entry in entries {
        let c = &entry.counts;
        table.add_row(vec![
            entry.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.command.clone(),
            entry.outcome.to_string(),
            c.scanned.to_string(),
            c.created.to_string(),
            c.updated.to_string(),
            c.errored.to_string(),
            c.duplicates_found.to_string(),
            c.sync_changed.to_string(),
        ]);
    }
    format!("{}\n", table)
}

pub fn format_audit_json(entries: &[AuditEntry]) -> Result<String, ApiError> {
    serde_json::to_string_pretty(entries)
        .map_err(|e| ApiError::ConfigError(format!("Failed to encode audit log: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditRecorder;

    #[test]
    fn test_audit_json_round_trips_outcome() {
        let mut recorder = AuditRecorder::start("run-1", "scan");
        recorder.counts_mut().scanned = 3;
        let entries = vec![recorder.finish()];
        let json = format_audit_json(&entries).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["command"], "scan");
        assert_eq!(value[0]["counts"]["scanned"], 3);
        assert_eq!(value[0]["outcome"], "Success");
    }

    #[test]
    fn test_detection_report_mentions_clear_and_focus() {
        let run = PipelineRun {
            report: DetectionReport {
                cleared: 4,
                focus: Some(crate::types::DiskId::new("victor-basic")),
                dry_run: true,
                ..Default::default()
            },
            audit: AuditRecorder::start("run-2", "find-duplicates").finish(),
        };
        let text = format_detection_report(&run);
        assert!(text.contains("Only relations involving victor-basic"));
        assert!(text.contains("Would clear 4 stored relation(s)"));
    }

    #[test]
    fn test_empty_audit_text() {
        assert_eq!(format_audit_text(&[]), "No runs recorded\n");
    }
}
