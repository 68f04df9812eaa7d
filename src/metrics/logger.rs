use super::{LatencyHistory, LatencySample};
use anyhow::Result;
use csv::Writer;
use std::fs::File;
use std::path::Path;

/// Writes a run as `step,<id>_latency..,<id>_load..,<id>_capacity..` rows.
pub struct MetricsLogger {
    writer: Writer<File>,
}

impl MetricsLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log_header(&mut self, server_ids: &[String]) -> Result<()> {
        let mut header = vec!["step".to_string()];
        for suffix in ["latency", "load", "capacity"] {
            header.extend(server_ids.iter().map(|id| format!("{}_{}", id, suffix)));
        }
        self.writer.write_record(&header)?;
        Ok(())
    }

    pub fn log(&mut self, sample: &LatencySample) -> Result<()> {
        let record = std::iter::once(sample.step.to_string()).chain(
            sample
                .latencies
                .iter()
                .chain(&sample.loads)
                .chain(&sample.capacities)
                .map(|v| v.to_string()),
        );
        self.writer.write_record(record)?;
        Ok(())
    }

    pub fn log_history(&mut self, history: &LatencyHistory) -> Result<()> {
        self.log_header(history.server_ids())?;
        for sample in history {
            self.log(sample)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
