use super::{LatencyHistory, spread};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub policy_name: String,
    pub steps: usize,
    pub final_latencies: Vec<f64>,
    pub final_spread: f64,
    pub mean_spread: f64,
    pub peak_latency: f64,
    /// Steps where at least one server sat above the latency limit.
    pub overload_steps: usize,
    /// First step after which the spread never again exceeded the tolerance.
    pub settle_step: Option<usize>,
}

pub fn analyze(
    history: &LatencyHistory,
    policy_name: &str,
    latency_limit: f64,
    settle_tolerance: f64,
) -> AnalysisReport {
    let samples = history.samples();

    let final_latencies = history
        .last()
        .map(|s| s.latencies.clone())
        .unwrap_or_default();

    let spreads: Vec<f64> = samples.iter().map(|s| s.spread()).collect();
    let mean_spread = if spreads.is_empty() {
        0.0
    } else {
        spreads.iter().sum::<f64>() / spreads.len() as f64
    };

    let peak_latency = samples
        .iter()
        .flat_map(|s| s.latencies.iter().copied())
        .fold(0.0, f64::max);

    let overload_steps = samples
        .iter()
        .filter(|s| s.latencies.iter().any(|&l| l > latency_limit))
        .count();

    // Walk back from the end while the spread stays inside the tolerance.
    let settled_tail = spreads
        .iter()
        .rev()
        .take_while(|&&s| s <= settle_tolerance)
        .count();
    let settle_step = (settled_tail > 0).then(|| samples[samples.len() - settled_tail].step);

    AnalysisReport {
        policy_name: policy_name.to_string(),
        steps: samples.last().map(|s| s.step).unwrap_or(0),
        final_spread: spread(&final_latencies),
        final_latencies,
        mean_spread,
        peak_latency,
        overload_steps,
        settle_step,
    }
}
