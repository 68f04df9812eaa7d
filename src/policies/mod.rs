pub mod inverse_latency;
pub mod wardrop;

pub use inverse_latency::InverseLatency;
pub use wardrop::{Wardrop, WardropParams};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Share of an agent's demand sent to each server, indexed in registry order.
/// Every policy keeps this on the probability simplex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution(Vec<f64>);

impl Distribution {
    pub fn uniform(num_servers: usize) -> Self {
        Self(vec![1.0 / num_servers as f64; num_servers])
    }

    /// Wraps raw weights as-is. Callers are responsible for the simplex.
    pub fn from_weights(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    pub fn weights(&self) -> &[f64] {
        &self.0
    }

    pub fn weight(&self, server: usize) -> f64 {
        self.0[server]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_simplex(&self, tolerance: f64) -> bool {
        (self.total() - 1.0).abs() <= tolerance
            && self.0.iter().all(|w| (0.0..=1.0).contains(w))
    }

    /// Per-server send rate for the given demand.
    pub fn send_rates(&self, demand: f64) -> Vec<f64> {
        self.0.iter().map(|w| w * demand).collect()
    }
}

/// A control law turning an observed latency vector into a traffic split.
pub trait Policy: Send + Sync + fmt::Debug {
    /// Reads the frozen latency snapshot of the step and updates the
    /// distribution in place. Never fails.
    fn balance(&mut self, latencies: &[f64], distribution: &mut Distribution);

    fn name(&self) -> &str;

    /// Distribution an agent starts from before its first `balance`.
    fn initial_distribution(&self, num_servers: usize) -> Distribution {
        Distribution::uniform(num_servers)
    }
}

type PolicyFactory =
    Box<dyn Fn(usize, &WardropParams) -> Result<Box<dyn Policy>, ConfigError> + Send + Sync>;

pub struct PolicyRegistry {
    policies: HashMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            policies: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register("inverse-latency", |_, _| Ok(Box::new(InverseLatency)));
        self.register("heuristic", |_, _| Ok(Box::new(InverseLatency)));
        self.register("simple", |_, _| Ok(Box::new(InverseLatency)));
        self.register("wardrop", |n, params| Ok(Box::new(Wardrop::new(n, params)?)));
        self.register("equilibrium", |n, params| Ok(Box::new(Wardrop::new(n, params)?)));
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(usize, &WardropParams) -> Result<Box<dyn Policy>, ConfigError> + Send + Sync + 'static,
    {
        self.policies.insert(name.to_lowercase(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(&name.to_lowercase())
    }

    pub fn create(
        &self,
        name: &str,
        num_servers: usize,
        params: &WardropParams,
    ) -> Result<Box<dyn Policy>, ConfigError> {
        let factory = self
            .policies
            .get(&name.to_lowercase())
            .ok_or_else(|| ConfigError::UnknownPolicy(name.to_string()))?;
        factory(num_servers, params)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn global() -> &'static PolicyRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<PolicyRegistry> = OnceLock::new();
        REGISTRY.get_or_init(PolicyRegistry::new)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
