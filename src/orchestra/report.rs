use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use log::info;
use serde::Serialize;

use crate::{FedErr, Result};

/// What a single worker reports at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub worker_id: String,
    /// The 1-based round ordinal.
    pub round: usize,
    pub mean_loss: f32,
    pub epsilon: f64,
    pub delta: f64,
    pub best_alpha: Option<f64>,
}

/// Every worker's report for one round, in worker order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub round: usize,
    pub workers: Vec<WorkerReport>,
}

impl RoundReport {
    /// The mean of the workers' epoch losses.
    pub fn mean_loss(&self) -> f32 {
        let total: f32 = self.workers.iter().map(|w| w.mean_loss).sum();
        total / self.workers.len().max(1) as f32
    }

    /// The largest epsilon spent by any worker.
    pub fn max_epsilon(&self) -> f64 {
        self.workers
            .iter()
            .map(|w| w.epsilon)
            .fold(0.0, f64::max)
    }
}

/// Receives the per-worker reports as rounds complete.
pub trait ReportSink: Send {
    fn report(&mut self, report: &WorkerReport) -> Result<()>;
}

/// Writes every report through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&mut self, report: &WorkerReport) -> Result<()> {
        info!(
            worker_id = report.worker_id.as_str(),
            round = report.round,
            mean_loss = report.mean_loss,
            epsilon = report.epsilon,
            delta = report.delta;
            "round report"
        );
        Ok(())
    }
}

/// Writes every report as a JSON object on its own line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn report(&mut self, report: &WorkerReport) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report).map_err(|e| FedErr::Io(e.into()))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every report in memory, cloned handles see the same reports.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<WorkerReport>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the reports received so far.
    pub fn reports(&self) -> Vec<WorkerReport> {
        match self.reports.lock() {
            Ok(reports) => reports.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReportSink for MemorySink {
    fn report(&mut self, report: &WorkerReport) -> Result<()> {
        let mut reports = match self.reports.lock() {
            Ok(reports) => reports,
            Err(poisoned) => poisoned.into_inner(),
        };
        reports.push(report.clone());
        Ok(())
    }
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn report(&mut self, report: &WorkerReport) -> Result<()> {
        (**self).report(report)
    }
}
