//! Output formatting for plans and execution results.
//!
//! This module renders plans and execution results either as colored text
//! tables for humans or as JSON for tooling.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::Fingerprinter;
use crate::planner::{AttributeChange, DiffValue, ExecutionResult, Operation, Outcome, Plan};

/// Rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON.
    Json,
}

/// Output formatter for plans.
#[derive(Debug, Default)]
pub struct PlanFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan entry row for table display.
#[derive(Tabled)]
struct PlanEntryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "After")]
    after: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Execution result row for table display.
#[derive(Tabled)]
struct EntryResultRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

impl PlanFormatter {
    /// Creates a new formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan) -> String {
        if plan.is_empty() {
            let mut output = format!("{} No changes. Infrastructure matches the declarations.\n", "✓".green());
            Self::write_outputs(&mut output, plan);
            return output;
        }

        let mut output = String::new();
        let _ = write!(
            output,
            "\nExecution Plan\n   Fingerprint: {}\n\n",
            Fingerprinter::new().short_hash(&plan.fingerprint())
        );

        let rows: Vec<PlanEntryRow> = plan
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| PlanEntryRow {
                index: i + 1,
                operation: Self::format_operation(e.operation),
                resource: e.resource_id.to_string(),
                after: if e.depends_on.is_empty() {
                    String::from("-")
                } else {
                    e.depends_on
                        .iter()
                        .map(|d| (d + 1).to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
                reason: truncate(&e.reason, 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        for entry in plan.entries.iter().filter(|e| !e.changes.is_empty()) {
            let _ = writeln!(output, "\n  {} {}", entry.operation.symbol(), entry.resource_id);
            for change in &entry.changes {
                let _ = writeln!(output, "      {}", Self::format_change(change));
            }
        }

        let summary = plan.summary();
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to delete\n",
            summary.create.to_string().green(),
            summary.update.to_string().yellow(),
            summary.replace.to_string().magenta(),
            summary.delete.to_string().red()
        );

        if plan.has_destructive_changes() {
            let _ = write!(output, "\n{} This plan destroys existing resources.\n", "⚠".yellow());
        }

        Self::write_outputs(&mut output, plan);
        output
    }

    /// Appends the stack outputs section, if any.
    fn write_outputs(output: &mut String, plan: &Plan) {
        if plan.outputs.is_empty() {
            return;
        }
        output.push_str("\nOutputs:\n");
        for (name, value) in &plan.outputs {
            let rendered = match value {
                DiffValue::Known(v) => v.to_string(),
                DiffValue::Unknown(r) => format!("(known after apply: {r})"),
                DiffValue::Removed => String::from("(removed)"),
            };
            let _ = writeln!(output, "  {} = {rendered}", name.bold());
        }
    }

    /// Formats an execution result.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ExecutionJson::from(result)).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.all_successful() {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply incomplete", "✗".red())
                };

                let mut output = format!("{status} (run {})\n\n", result.run_id);

                let rows: Vec<EntryResultRow> = result
                    .results
                    .iter()
                    .map(|r| EntryResultRow {
                        index: r.index + 1,
                        operation: Self::format_operation(r.operation),
                        resource: r.resource_id.to_string(),
                        outcome: match &r.outcome {
                            Outcome::Applied { .. } => "applied".green().to_string(),
                            Outcome::Failed(e) => format!("{} {}", "failed:".red(), truncate(&e.to_string(), 50)),
                            Outcome::Skipped => "skipped".dimmed().to_string(),
                        },
                    })
                    .collect();

                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let _ = writeln!(output, "\n{result}");
                output
            }
        }
    }

    /// Formats an operation with color.
    fn format_operation(operation: Operation) -> String {
        let label = format!("{}{operation}", operation.symbol());
        match operation {
            Operation::Create => label.green().to_string(),
            Operation::Update => label.yellow().to_string(),
            Operation::Replace => label.magenta().to_string(),
            Operation::Delete => label.red().to_string(),
        }
    }

    /// Formats a single attribute change.
    fn format_change(change: &AttributeChange) -> String {
        let before = match (&change.before, change.sensitive) {
            (None, _) => String::new(),
            (Some(_), true) => String::from("(sensitive) => "),
            (Some(v), false) => format!("{v} => "),
        };
        let after = match (&change.after, change.sensitive) {
            (DiffValue::Known(_), true) => String::from("(sensitive)"),
            (DiffValue::Known(v), false) => v.to_string(),
            (DiffValue::Unknown(r), _) => format!("(known after apply: {r})"),
            (DiffValue::Removed, _) => String::from("(removed)"),
        };
        let marker = if change.forces_replacement {
            format!(" {}", "# forces replacement".red())
        } else {
            String::new()
        };
        format!("{}: {before}{after}{marker}", change.name)
    }
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson<'a> {
    fingerprint: String,
    summary: crate::planner::PlanSummary,
    waves: Vec<Vec<usize>>,
    entries: &'a [crate::planner::PlanEntry],
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: &'a BTreeMap<String, DiffValue>,
}

impl<'a> From<&'a Plan> for PlanJson<'a> {
    fn from(plan: &'a Plan) -> Self {
        Self {
            fingerprint: plan.fingerprint(),
            summary: plan.summary(),
            waves: plan.waves(),
            entries: &plan.entries,
            outputs: &plan.outputs,
        }
    }
}

#[derive(Serialize)]
struct ExecutionJson {
    run_id: String,
    success: bool,
    successful: usize,
    failed: usize,
    skipped: usize,
    not_run: usize,
    results: Vec<EntryResultJson>,
}

#[derive(Serialize)]
struct EntryResultJson {
    index: usize,
    resource: String,
    operation: Operation,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ExecutionResult> for ExecutionJson {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            run_id: result.run_id.to_string(),
            success: result.success,
            successful: result.successful,
            failed: result.failed,
            skipped: result.skipped,
            not_run: result.not_run,
            results: result
                .results
                .iter()
                .map(|r| {
                    let (outcome, error) = match &r.outcome {
                        Outcome::Applied { .. } => ("applied", None),
                        Outcome::Failed(e) => ("failed", Some(e.to_string())),
                        Outcome::Skipped => ("skipped", None),
                    };
                    EntryResultJson {
                        index: r.index,
                        resource: r.resource_id.to_string(),
                        operation: r.operation,
                        outcome,
                        error,
                    }
                })
                .collect(),
        }
    }
}
