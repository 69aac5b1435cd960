//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, run
//! reports, and state snapshots to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::executor::{OpOutcome, RunReport, RunStatus};
use crate::planner::{ExecutionPlan, OperationKind};
use crate::state::StateSnapshot;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan op row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Run result row for table display.
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an execution plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ExecutionPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &ExecutionPlan, detailed: bool) -> String {
        if plan.is_converged() {
            return format!(
                "{} No changes required - state matches the stack document.\n",
                "✓".green()
            );
        }

        let mut output = String::from("\nExecution plan\n\n");

        let rows: Vec<PlanRow> = plan
            .ops
            .iter()
            .filter(|op| detailed || op.entry.operation != OperationKind::NoOp)
            .enumerate()
            .map(|(i, op)| PlanRow {
                index: i + 1,
                action: Self::format_operation(op.entry.operation),
                resource: op.entry.logical_id.clone(),
                kind: op.entry.kind.clone(),
                reason: Self::truncate(&op.entry.reason, 40),
            })
            .collect();

        if !rows.is_empty() {
            let table = Table::new(rows).to_string();
            output.push_str(&table);
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete\n",
            plan.create_count().to_string().green(),
            plan.update_count().to_string().yellow(),
            plan.delete_count().to_string().red()
        );

        output
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ReportJson::from(report)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a run report as text.
    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();

        let rows: Vec<ReportRow> = report
            .results
            .iter()
            .filter(|r| r.operation != OperationKind::NoOp)
            .map(|r| ReportRow {
                resource: r.logical_id.clone(),
                action: Self::format_operation(r.operation),
                outcome: Self::format_outcome(&r.outcome),
            })
            .collect();

        if !rows.is_empty() {
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let status = match report.status {
            RunStatus::Succeeded => format!("{} Run succeeded", "✓".green()),
            RunStatus::PartialFailure => {
                format!(
                    "{} Run partially failed - re-run to pick up the remainder",
                    "⚠".yellow()
                )
            }
            RunStatus::Failed => format!("{} Run failed", "✗".red()),
        };
        let _ = write!(output, "\n{status}\n");

        for result in &report.results {
            match &result.outcome {
                OpOutcome::Failed(message) => {
                    let _ = writeln!(output, "   {} {}: {message}", "✗".red(), result.logical_id);
                }
                OpOutcome::Skipped(cause) => {
                    let _ = writeln!(
                        output,
                        "   {} {}: skipped ({cause})",
                        "⚠".yellow(),
                        result.logical_id
                    );
                }
                OpOutcome::Succeeded => {}
            }
        }

        output
    }

    /// Formats a state snapshot.
    #[must_use]
    pub fn format_state(&self, snapshot: &StateSnapshot) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(snapshot).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(
                    output,
                    "\nState: {}/{}\n\n",
                    snapshot.stack, snapshot.environment
                );
                let _ = writeln!(output, "   Version: {}", snapshot.version);
                let _ = writeln!(output, "   Last updated: {}", snapshot.last_updated);
                let _ = writeln!(output, "   Resources: {}", snapshot.resources.len());

                let mut ids: Vec<&String> = snapshot.resources.keys().collect();
                ids.sort();
                for id in ids {
                    if let Some(record) = snapshot.get(id) {
                        let _ = writeln!(
                            output,
                            "     {} ({}) -> {}",
                            record.logical_id, record.kind, record.provider_id
                        );
                    }
                }

                if !snapshot.history.is_empty() {
                    let _ = writeln!(
                        output,
                        "\n   Recent history ({}):",
                        snapshot.history.len()
                    );
                    for entry in snapshot.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats an operation with color.
    fn format_operation(operation: OperationKind) -> String {
        match operation {
            OperationKind::Create => "+create".green().to_string(),
            OperationKind::Update => "~update".yellow().to_string(),
            OperationKind::Delete => "-delete".red().to_string(),
            OperationKind::NoOp => "noop".dimmed().to_string(),
        }
    }

    /// Formats an op outcome with color.
    fn format_outcome(outcome: &OpOutcome) -> String {
        match outcome {
            OpOutcome::Succeeded => "succeeded".green().to_string(),
            OpOutcome::Failed(_) => "failed".red().to_string(),
            OpOutcome::Skipped(_) => "skipped".yellow().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters. Counts chars
    /// rather than bytes so multi-byte input never splits mid-codepoint.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let prefix: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{prefix}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    total_ops: usize,
    creates: usize,
    updates: usize,
    deletes: usize,
    converged: bool,
    ops: Vec<PlanOpJson>,
}

#[derive(serde::Serialize)]
struct PlanOpJson {
    action: String,
    resource: String,
    kind: String,
    reason: String,
}

impl From<&ExecutionPlan> for PlanJson {
    fn from(plan: &ExecutionPlan) -> Self {
        Self {
            total_ops: plan.len(),
            creates: plan.create_count(),
            updates: plan.update_count(),
            deletes: plan.delete_count(),
            converged: plan.is_converged(),
            ops: plan
                .ops
                .iter()
                .filter(|op| op.entry.operation != OperationKind::NoOp)
                .map(|op| PlanOpJson {
                    action: op.entry.operation.to_string(),
                    resource: op.entry.logical_id.clone(),
                    kind: op.entry.kind.clone(),
                    reason: op.entry.reason.clone(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct ReportJson {
    status: String,
    results: Vec<ResultJson>,
}

#[derive(serde::Serialize)]
struct ResultJson {
    resource: String,
    action: String,
    outcome: String,
    detail: Option<String>,
}

impl From<&RunReport> for ReportJson {
    fn from(report: &RunReport) -> Self {
        let status = match report.status {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failed => "failed",
        };
        Self {
            status: status.to_string(),
            results: report
                .results
                .iter()
                .map(|r| {
                    let (outcome, detail) = match &r.outcome {
                        OpOutcome::Succeeded => ("succeeded", None),
                        OpOutcome::Failed(message) => ("failed", Some(message.clone())),
                        OpOutcome::Skipped(cause) => ("skipped", Some(cause.clone())),
                    };
                    ResultJson {
                        resource: r.logical_id.clone(),
                        action: r.operation.to_string(),
                        outcome: outcome.to_string(),
                        detail,
                    }
                })
                .collect(),
        }
    }
}
