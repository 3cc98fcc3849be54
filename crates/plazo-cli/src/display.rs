//! Plain-text cards and tables for the CLI.
//!
//! Renderers return strings so the layout can be tested without capturing
//! stdout.

use std::fmt::Write;

use chrono::{NaiveDate, SecondsFormat};
use plazo_core::{CaseEvent, CaseRecord, HolidayEntry, NotificationCheck};
use plazo_deadlines::{DeadlineDates, SweepReport};
use plazo_store::TransitionOutcome;

const LABEL_WIDTH: usize = 18;

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Observed holidays of `year`, one per line, shifted ones annotated.
pub fn holiday_table(year: i32, entries: &[HolidayEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Holidays {year} ({}) ===", entries.len());
    for entry in entries {
        let _ = write!(
            out,
            "  {} {}  {}",
            entry.observed_date,
            entry.observed_date.format("%a"),
            entry.name
        );
        if entry.is_shifted() {
            let _ = write!(out, " (from {})", entry.canonical_date);
        }
        out.push('\n');
    }
    out
}

pub fn deadline_card(submission: NaiveDate, dates: &DeadlineDates) -> String {
    let mut out = String::new();
    field(&mut out, "submitted", submission);
    field(&mut out, "warning", dates.warning_date);
    field(&mut out, "deadline", dates.deadline_date);
    out
}

pub fn notification_card(
    event: NaiveDate,
    notified: NaiveDate,
    check: &NotificationCheck,
) -> String {
    let mut out = String::new();
    field(&mut out, "event", event);
    field(&mut out, "notified", notified);
    field(&mut out, "business days", check.business_days);
    field(&mut out, "window", check.window_days);
    field(&mut out, "valid", yes_no(!check.exceeds_window));
    out
}

/// A case with its audit trail, oldest event first.
pub fn case_card(case: &CaseRecord, events: &[CaseEvent]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", case.id);
    field(&mut out, "status", case.status);
    if let Some(submitted) = case.submission_date {
        field(
            &mut out,
            "submitted",
            submitted.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    if let Some(deadline) = case.deadline_date {
        field(&mut out, "deadline", deadline);
    }
    if events.is_empty() {
        return out;
    }

    out.push_str("\nEvents\n");
    for event in events {
        let _ = write!(
            out,
            "  {} {:<18}",
            event.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            event.event_type
        );
        if let Some(details) = &event.details {
            let _ = write!(out, " {details}");
        }
        out.push('\n');
    }
    out
}

pub fn outcome_line(case_id: &str, outcome: &TransitionOutcome) -> String {
    match outcome {
        TransitionOutcome::Applied(event) => format!("{case_id}: {}", event.event_type),
        TransitionOutcome::Skipped { current } => {
            format!("{case_id}: unchanged, already {current}")
        }
    }
}

pub fn sweep_summary(report: &SweepReport) -> String {
    let mut out = String::new();
    field(&mut out, "scanned", report.scanned);
    field(&mut out, "escalated", report.escalated);
    field(&mut out, "already closed", report.skipped);
    field(&mut out, "failed", report.failed);
    out
}

fn field(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {label:<width$} {value}", width = LABEL_WIDTH);
}
