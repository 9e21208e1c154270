//! Metric recording for tool runs and stage outcomes.
//!
//! Only the `metrics` facade is used here; binaries decide whether a
//! recorder (e.g. Prometheus) is installed.

use std::time::Duration;

use metrics::{counter, histogram};
use storyreel_models::StageOutcome;

use crate::command::Tool;

/// Metric names as constants for consistency.
pub mod names {
    pub const TOOL_RUNS_TOTAL: &str = "storyreel_tool_runs_total";
    pub const TOOL_DURATION_SECONDS: &str = "storyreel_tool_duration_seconds";
    pub const STAGE_OUTCOMES_TOTAL: &str = "storyreel_stage_outcomes_total";
    pub const ITEMS_TOTAL: &str = "storyreel_items_total";
}

/// Record one finished (or killed) tool process.
pub fn record_tool_run(tool: Tool, elapsed: Duration, success: bool) {
    let status = if success { "ok" } else { "error" };
    counter!(names::TOOL_RUNS_TOTAL, "tool" => tool.as_str(), "status" => status).increment(1);
    histogram!(names::TOOL_DURATION_SECONDS, "tool" => tool.as_str()).record(elapsed.as_secs_f64());
}

/// Record the outcome of a media stage.
pub fn record_stage_outcome(stage: &'static str, outcome: &StageOutcome) {
    counter!(names::STAGE_OUTCOMES_TOTAL, "stage" => stage, "outcome" => outcome.label()).increment(1);
}

/// Record an item reaching a terminal state.
pub fn record_item(status: &'static str) {
    counter!(names::ITEMS_TOTAL, "status" => status).increment(1);
}
