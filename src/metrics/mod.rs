pub mod logger;
pub mod analyzer;

use serde::{Deserialize, Serialize};

/// Server state at the end of one step. Step 0 is the state before the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub step: usize,
    pub latencies: Vec<f64>,
    pub loads: Vec<f64>,
    pub capacities: Vec<f64>,
}

impl LatencySample {
    pub fn spread(&self) -> f64 {
        spread(&self.latencies)
    }
}

/// Difference between the slowest and fastest server.
pub fn spread(latencies: &[f64]) -> f64 {
    let max = latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = latencies.iter().copied().fold(f64::INFINITY, f64::min);
    if latencies.is_empty() { 0.0 } else { max - min }
}

/// Step-by-step record of a run, kept in step order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyHistory {
    server_ids: Vec<String>,
    samples: Vec<LatencySample>,
}

impl LatencyHistory {
    pub fn new(server_ids: Vec<String>) -> Self {
        Self {
            server_ids,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: LatencySample) {
        debug_assert_eq!(sample.latencies.len(), self.server_ids.len());
        self.samples.push(sample);
    }

    pub fn server_ids(&self) -> &[String] {
        &self.server_ids
    }

    pub fn samples(&self) -> &[LatencySample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &LatencySample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&LatencySample> {
        self.samples.last()
    }

    pub fn get(&self, step: usize) -> Option<&LatencySample> {
        self.samples.iter().find(|s| s.step == step)
    }

    /// `(server_id, latency)` pairs recorded for a step.
    pub fn pairs(&self, step: usize) -> Option<impl Iterator<Item = (&str, f64)>> {
        let sample = self.get(step)?;
        Some(
            self.server_ids
                .iter()
                .map(String::as_str)
                .zip(sample.latencies.iter().copied()),
        )
    }

    /// Latency of one server over the whole run.
    pub fn series(&self, server: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s.latencies[server]).collect()
    }
}

impl<'a> IntoIterator for &'a LatencyHistory {
    type Item = &'a LatencySample;
    type IntoIter = std::slice::Iter<'a, LatencySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
