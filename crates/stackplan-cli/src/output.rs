//! Formatted output helpers for CLI commands.
//!
//! Plan layers, rollout events and the final report, with colored status
//! markers.

use std::fmt::Write;

use stackplan_common::types::NodeStatus;
use stackplan_graph::plan::OrderedPlan;
use stackplan_sdk::event::RolloutEvent;
use stackplan_sdk::rollout::RolloutReport;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Colored marker for a node status.
#[must_use]
pub const fn status_marker(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Ready => "\x1b[32m●\x1b[0m",
        NodeStatus::Failed => "\x1b[31m✗\x1b[0m",
        NodeStatus::Skipped => "\x1b[2m○\x1b[0m",
        NodeStatus::Pending | NodeStatus::Provisioning => "\x1b[33m…\x1b[0m",
    }
}

/// One line per layer: `  [n] id, id, ...`.
#[must_use]
pub fn format_layers(plan: &OrderedPlan) -> String {
    let mut out = String::new();
    for (index, layer) in plan.layers().iter().enumerate() {
        let ids: Vec<&str> = layer.iter().map(|id| id.as_str()).collect();
        let _ = writeln!(out, "  {DIM}[{index}]{RESET} {}", ids.join(", "));
    }
    out
}

/// Single progress line for a rollout event.
#[must_use]
pub fn format_event(event: &RolloutEvent) -> String {
    match event {
        RolloutEvent::LayerStarted { layer, nodes } => {
            format!("  {BOLD}layer {layer}{RESET} {DIM}({} resource(s)){RESET}", nodes.len())
        }
        RolloutEvent::NodeReady { id } => format!("    {GREEN}+{RESET} {id}"),
        RolloutEvent::NodeFailed { id, reason } => format!("    {RED}!{RESET} {id}: {reason}"),
        RolloutEvent::LayerCompleted { layer } => format!("  {DIM}layer {layer} done{RESET}"),
        RolloutEvent::Halted { layer, skipped } => {
            format!("  {RED}layer {layer} failed{RESET}, skipping {skipped} resource(s)")
        }
        RolloutEvent::Cancelled { skipped } => {
            format!("  {YELLOW}cancelled{RESET}, skipping {skipped} resource(s)")
        }
    }
}

/// Final per-node summary of a rollout.
#[must_use]
pub fn format_report(report: &RolloutReport) -> String {
    let mut out = String::new();
    let elapsed = report.finished_at - report.started_at;
    let _ = writeln!(
        out,
        "Rollout {} ({:?}) in {}ms",
        report.id,
        report.outcome,
        elapsed.num_milliseconds()
    );
    for (id, status) in &report.statuses {
        let _ = write!(out, "  {} {id} {DIM}{status}{RESET}", status_marker(*status));
        if let Some(reason) = report.failures.get(id) {
            let _ = write!(out, " {RED}{reason}{RESET}");
        }
        out.push('\n');
    }
    out
}
