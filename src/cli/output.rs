//! Output formatting for CLI commands.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{SpecHasher, ValidationResult};
use crate::planner::{DeploymentPlan, PlanAction};
use crate::reconciler::ReconcileSummary;
use crate::state::DeploymentState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan entry row for table display.
#[derive(Tabled)]
struct PlanEntryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "AZ")]
    zone: String,
    #[tabled(rename = "Networks")]
    networks: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

/// Instance row for state display.
#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Instance")]
    name: String,
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "AZ")]
    zone: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Bootstrap")]
    bootstrap: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, summary: &ReconcileSummary, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "plan": plan, "summary": summary });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, summary, detailed),
        }
    }

    fn format_plan_text(plan: &DeploymentPlan, summary: &ReconcileSummary, detailed: bool) -> String {
        if plan.is_empty() {
            return format!("{} No changes required - deployment is up to date.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = writeln!(output, "\n📋 Deployment Plan for '{}'", plan.deployment);
        let _ = write!(output, "   Manifest hash: {}\n\n", SpecHasher::new().short_hash(&plan.manifest_hash));

        let rows: Vec<PlanEntryRow> = plan
            .actionable()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| PlanEntryRow {
                index: i + 1,
                action: Self::format_action(entry.action),
                instance: entry.instance.clone(),
                zone: entry.availability_zone.clone().unwrap_or_else(|| String::from("-")),
                networks: Self::truncate(&entry.networks.join(", "), 40),
                changes: entry
                    .changes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            output.push_str("\nDetailed changes:\n");
            for entry in plan.actionable() {
                if entry.details.is_empty() {
                    continue;
                }
                let _ = writeln!(output, "   {}", entry.instance.bold());
                for detail in &entry.details {
                    let _ = writeln!(output, "     {detail}");
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to recreate, {} to update, {} to delete\n",
            plan.count(PlanAction::Create).to_string().green(),
            plan.count(PlanAction::Recreate).to_string().yellow(),
            plan.count(PlanAction::Update).to_string().yellow(),
            plan.count(PlanAction::Delete).to_string().red()
        );
        let _ = writeln!(
            output,
            "      {} kept, {} need shutdown",
            summary.existing, summary.shutdown
        );

        output
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let errors: Vec<_> = result
                    .errors
                    .iter()
                    .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                    .collect();
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": errors,
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Manifest is valid\n", "✓".green())
                } else {
                    let mut output = format!("{} {} errors:\n", "✗".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats deployment state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\n💾 State: {}\n\n", state.deployment);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(
                    output,
                    "   Manifest hash: {}",
                    state
                        .spec_hash
                        .as_deref()
                        .map_or_else(|| String::from("-"), |hash| SpecHasher::new().short_hash(hash))
                );
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Instances: {}", state.instances.len());
                let _ = writeln!(output, "   Addresses: {}", state.ip_addresses.len());
                let _ = writeln!(output, "   DNS records: {}", state.dns_records.len());

                if !state.instances.is_empty() {
                    let rows: Vec<InstanceRow> = state
                        .instances
                        .iter()
                        .map(|i| InstanceRow {
                            name: i.name(),
                            uuid: Self::truncate(&i.uuid.to_string(), 12),
                            zone: i.availability_zone.clone().unwrap_or_else(|| String::from("-")),
                            state: i.state.to_string(),
                            bootstrap: if i.bootstrap { "yes" } else { "" }.to_string(),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let _ = writeln!(
                            output,
                            "     {} - {} ({})",
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

    /// Formats an action with color.
    fn format_action(action: PlanAction) -> String {
        match action {
            PlanAction::Create => "+create".green().to_string(),
            PlanAction::Recreate => "±recreate".yellow().to_string(),
            PlanAction::Update => "~update".yellow().to_string(),
            PlanAction::Delete => "-delete".red().to_string(),
            PlanAction::Noop => "noop".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
