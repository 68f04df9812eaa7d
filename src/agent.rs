use crate::policies::{Distribution, Policy};
use tracing::debug;

/// A demand source that owns its control law and its current traffic split.
#[derive(Debug)]
pub struct Agent {
    id: u32,
    demand_rate: f64,
    policy: Box<dyn Policy>,
    distribution: Distribution,
    traced: bool,
}

impl Agent {
    pub fn new(id: u32, demand_rate: f64, policy: Box<dyn Policy>, num_servers: usize) -> Self {
        let distribution = policy.initial_distribution(num_servers);
        Self {
            id,
            demand_rate,
            policy,
            distribution,
            traced: false,
        }
    }

    /// Logs every distribution update of this agent at debug level.
    pub fn traced(mut self, traced: bool) -> Self {
        self.traced = traced;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn demand_rate(&self) -> f64 {
        self.demand_rate
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn rebalance(&mut self, latencies: &[f64]) {
        self.policy.balance(latencies, &mut self.distribution);

        if self.traced {
            debug!(
                "Agent {} ({}) updated distribution: {:?}",
                self.id,
                self.policy.name(),
                self.distribution.weights()
            );
        }
    }

    /// Per-server contribution of this agent for a step with the given demand.
    pub fn send_rates(&self, demand: f64) -> Vec<f64> {
        self.distribution.send_rates(demand)
    }
}
