use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting logger for pipeline events.
///
/// Decouples the use cases from where timings and progress end up (log
/// output, a report, nothing at all).
pub trait PipelineLogger: Send {
    /// Report frame-level progress. `total` is 0 for unbounded streams.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces per frame).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-pipeline summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events. Used by single-image calls and tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running aggregate for one stage or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl Aggregate {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Aggregates per-stage cost (`locate`, `normalize`, `predict`,
/// `annotate`) and metrics, and logs a summary with throughput at the end.
///
/// Progress lines are throttled to every `every_frames` frames.
pub struct StagePipelineLogger {
    every_frames: usize,
    stages: BTreeMap<String, Aggregate>,
    metrics: BTreeMap<String, Aggregate>,
    frames: usize,
    started: Instant,
}

impl StagePipelineLogger {
    pub fn new(every_frames: usize) -> Self {
        Self {
            every_frames: every_frames.max(1),
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            frames: 0,
            started: Instant::now(),
        }
    }

    pub fn stage(&self, name: &str) -> Option<&Aggregate> {
        self.stages.get(name)
    }

    pub fn metric_aggregate(&self, name: &str) -> Option<&Aggregate> {
        self.metrics.get(name)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Formatted summary, or `None` when nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }
        let elapsed_s = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Pipeline summary ({} frames, {:.1}s):",
            self.frames, elapsed_s
        )];
        for (name, agg) in &self.stages {
            lines.push(format!(
                "  {name:10}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                agg.mean(),
                agg.max,
                agg.total
            ));
        }
        for (name, agg) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}, max {:.0}", agg.mean(), agg.max));
        }
        if self.frames > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} fps",
                self.frames as f64 / elapsed_s
            ));
        }
        Some(lines.join("\n"))
    }
}

impl Default for StagePipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StagePipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames = self.frames.max(current);
        if current % self.every_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processed {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Processed {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
