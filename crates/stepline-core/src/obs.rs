//! Structured observability hooks for the pipeline run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for key lifecycle events: start, step, finish, gate evaluation
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::{info, warn};

/// Span tagged with the run_id.
///
/// Attach it to the run's future with [`tracing::Instrument`] so every
/// event emitted while steps execute carries the run_id.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("stepline.run", run_id = %run_id)
}

/// Emit event: run started for a workflow.
pub fn emit_run_started(run_id: &str, workflow: &str) {
    info!(event = "run.started", run_id = %run_id, workflow = %workflow);
}

/// Emit event: event didn't match the workflow triggers, nothing ran.
pub fn emit_not_triggered(workflow: &str, trigger: &str) {
    info!(event = "run.not_triggered", workflow = %workflow, trigger = %trigger);
}

pub fn emit_step_started(run_id: &str, step: &str, index: usize) {
    info!(event = "run.step_started", run_id = %run_id, step = %step, index = index);
}

pub fn emit_step_finished(
    run_id: &str,
    step: &str,
    exit_code: Option<i32>,
    duration_ms: u64,
    success: bool,
) {
    if success {
        info!(
            event = "run.step_finished",
            run_id = %run_id,
            step = %step,
            exit_code = ?exit_code,
            duration_ms = duration_ms,
            success = success,
        );
    } else {
        warn!(
            event = "run.step_finished",
            run_id = %run_id,
            step = %step,
            exit_code = ?exit_code,
            duration_ms = duration_ms,
            success = success,
        );
    }
}

pub fn emit_step_skipped(run_id: &str, step: &str, reason: &str) {
    info!(event = "run.step_skipped", run_id = %run_id, step = %step, reason = %reason);
}

/// Emit event: run finished with duration, total events, and success status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, total_events: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total_events = total_events,
        success = success,
    );
}

/// Emit event: gate evaluation completed.
pub fn emit_gate_evaluated(run_id: &str, violations: usize, passed: bool) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        violations = violations,
        passed = passed,
    );
}
