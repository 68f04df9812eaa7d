// Stateless heuristic: weight each server by 1/latency.

use super::{Distribution, Policy};

#[derive(Debug, Clone, Copy, Default)]
pub struct InverseLatency;

impl Policy for InverseLatency {
    fn balance(&mut self, latencies: &[f64], distribution: &mut Distribution) {
        debug_assert_eq!(latencies.len(), distribution.len());

        let inverse: Vec<f64> = latencies
            .iter()
            .map(|&l| if l > 0.0 { 1.0 / l } else { 0.0 })
            .collect();
        let total: f64 = inverse.iter().sum();

        // No positive latency to weigh by: keep whatever split we had.
        if total > 0.0 {
            distribution.0 = inverse.into_iter().map(|inv| inv / total).collect();
        }
    }

    fn name(&self) -> &str {
        "InverseLatency"
    }
}
