//! Per-run counters: how long each pipeline state took and how many items
//! its stage attempted, finished and skipped.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::stages::StageReport;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageMetrics>,
    pub total_duration_ms: f64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
    pub items_attempted: u64,
    pub items_completed: u64,
    pub items_skipped: u64,
}

impl StageMetrics {
    fn add_duration(&mut self, duration_ms: f64) {
        self.calls += 1;
        self.total_duration_ms += duration_ms;
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
    }

    fn add_report(&mut self, report: &StageReport) {
        self.items_attempted += report.attempted as u64;
        self.items_completed += report.completed.len() as u64;
        self.items_skipped += report.skipped.len() as u64;
    }
}

/// Shared handle; clones record into the same snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&self, stage_name: &str) -> StageTimer {
        StageTimer {
            stage: stage_name.to_string(),
            started_at: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_items(&self, stage_name: &str, report: &StageReport) {
        self.with_stage(stage_name, |metrics| metrics.add_report(report));
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_outcome(&self, succeeded: bool) {
        if let Ok(mut guard) = self.inner.lock() {
            let counter = if succeeded {
                &mut guard.runs_succeeded
            } else {
                &mut guard.runs_failed
            };
            *counter += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn with_stage(&self, stage_name: &str, update: impl FnOnce(&mut StageMetrics)) {
        if let Ok(mut guard) = self.inner.lock() {
            update(guard.stages.entry(stage_name.to_string()).or_default());
        }
    }
}

/// Adds the time between creation and drop to its stage.
pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: MetricsCollector,
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        self.collector
            .with_stage(&self.stage, |metrics| metrics.add_duration(duration_ms));
        debug!(stage = self.stage.as_str(), duration_ms, "Stage duration recorded");
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        runs_succeeded = snapshot.runs_succeeded,
        runs_failed = snapshot.runs_failed,
        "Pipeline metrics summary"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            attempted = metrics.items_attempted,
            completed = metrics.items_completed,
            skipped = metrics.items_skipped,
            "Stage metrics"
        );
    }
}

type StageValue = fn(&StageMetrics) -> f64;

/// Per-stage series: name, type, help text, value.
const STAGE_SERIES: [(&str, &str, &str, StageValue); 5] = [
    (
        "neuroseg_stage_calls_total",
        "counter",
        "Times the pipeline entered the stage",
        |m: &StageMetrics| m.calls as f64,
    ),
    (
        "neuroseg_stage_duration_seconds_total",
        "counter",
        "Time spent in the stage",
        |m: &StageMetrics| m.total_duration_ms / 1_000.0,
    ),
    (
        "neuroseg_stage_items_total",
        "counter",
        "Items the stage attempted",
        |m: &StageMetrics| m.items_attempted as f64,
    ),
    (
        "neuroseg_stage_items_completed_total",
        "counter",
        "Items the stage finished",
        |m: &StageMetrics| m.items_completed as f64,
    ),
    (
        "neuroseg_stage_items_skipped_total",
        "counter",
        "Items skipped after a tool failure",
        |m: &StageMetrics| m.items_skipped as f64,
    ),
];

impl MetricsSnapshot {
    /// Prometheus text exposition of the snapshot.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let runs = [
            (
                "neuroseg_runs_succeeded_total",
                "counter",
                "Runs that reached done",
                self.runs_succeeded as f64,
            ),
            (
                "neuroseg_runs_failed_total",
                "counter",
                "Runs that ended in failed",
                self.runs_failed as f64,
            ),
            (
                "neuroseg_pipeline_duration_seconds",
                "gauge",
                "Duration of the last run",
                self.total_duration_ms / 1_000.0,
            ),
        ];
        for (name, kind, help, value) in runs {
            write_header(&mut out, name, kind, help);
            let _ = writeln!(out, "{name} {value}");
        }
        for (name, kind, help, value) in STAGE_SERIES {
            write_header(&mut out, name, kind, help);
            for (stage, metrics) in &self.stages {
                let _ = writeln!(out, "{name}{{stage=\"{stage}\"}} {}", value(metrics));
            }
        }
        out
    }
}

fn write_header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}
