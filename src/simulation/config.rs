use crate::error::ConfigError;
use crate::policies::WardropParams;
use crate::server::{ServerRegistry, ServerSpec};
use crate::simulation::demand::DemandPattern;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityChange {
    /// Multiply the current capacity.
    Scale(f64),
    /// Replace the capacity outright.
    Set(f64),
}

impl CapacityChange {
    pub fn apply(self, capacity: f64) -> f64 {
        match self {
            CapacityChange::Scale(factor) => capacity * factor,
            CapacityChange::Set(value) => value,
        }
    }

    fn value(self) -> f64 {
        match self {
            CapacityChange::Scale(v) | CapacityChange::Set(v) => v,
        }
    }
}

/// One-time capacity change, applied during `step` before that step's
/// latencies are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disturbance {
    pub step: usize,
    pub server: String,
    pub change: CapacityChange,
}

// "401:srv2:x0.7" scales, "401:srv2:=500" sets.
impl FromStr for Disturbance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [step, server, change] = parts.as_slice() else {
            return Err(format!("expected <step>:<server>:x<factor>|=<capacity>, got `{}`", s));
        };

        let step = step
            .parse::<usize>()
            .map_err(|e| format!("bad step `{}`: {}", step, e))?;

        let change = if let Some(factor) = change.strip_prefix('x') {
            CapacityChange::Scale(factor.parse().map_err(|e| format!("bad factor `{}`: {}", factor, e))?)
        } else if let Some(value) = change.strip_prefix('=') {
            CapacityChange::Set(value.parse().map_err(|e| format!("bad capacity `{}`: {}", value, e))?)
        } else {
            return Err(format!("capacity change `{}` must start with `x` or `=`", change));
        };

        Ok(Self {
            step,
            server: server.to_string(),
            change,
        })
    }
}

/// Disturbances resolved to registry indices, keyed by step.
pub type DisturbanceSchedule = BTreeMap<usize, Vec<(usize, CapacityChange)>>;

pub fn build_schedule(
    disturbances: &[Disturbance],
    registry: &ServerRegistry,
) -> Result<DisturbanceSchedule, ConfigError> {
    let mut schedule = DisturbanceSchedule::new();
    let mut seen = HashSet::new();

    for d in disturbances {
        let index = registry
            .index_of(&d.server)
            .ok_or_else(|| ConfigError::UnknownServer {
                step: d.step,
                server: d.server.clone(),
            })?;

        if d.step == 0 {
            return Err(ConfigError::InvalidDisturbance {
                step: d.step,
                server: d.server.clone(),
                reason: "steps are numbered from 1".into(),
            });
        }

        let value = d.change.value();
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::InvalidDisturbance {
                step: d.step,
                server: d.server.clone(),
                reason: format!("capacity change {:?} would not leave a positive capacity", d.change),
            });
        }

        if !seen.insert((d.step, index)) {
            return Err(ConfigError::DuplicateDisturbance {
                step: d.step,
                server: d.server.clone(),
            });
        }

        schedule.entry(d.step).or_default().push((index, d.change));
    }

    // Changes compound, so replay them in step order against the starting capacities.
    let mut capacities = registry.capacities();
    for (&step, changes) in &schedule {
        for &(index, change) in changes {
            let capacity = change.apply(capacities[index]);
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(ConfigError::InvalidDisturbance {
                    step,
                    server: registry.servers()[index].id().to_string(),
                    reason: format!(
                        "capacity change {:?} takes capacity from {} to {}",
                        change, capacities[index], capacity
                    ),
                });
            }
            capacities[index] = capacity;
        }
    }

    Ok(schedule)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub name: String,
    pub policy_name: String,
    pub servers: Vec<ServerSpec>,
    pub num_agents: u32,
    pub steps: usize,
    pub demand: DemandPattern,
    pub disturbances: Vec<Disturbance>,
    pub wardrop: WardropParams,
    pub seed: Option<u64>,
    pub parallel: bool,
    /// Stop early once latencies move less than this for `settle_window` steps.
    pub convergence_tolerance: Option<f64>,
    pub settle_window: usize,
    /// Latency above which a server counts as overloaded in reports.
    pub latency_limit: f64,
    /// Largest latency spread still considered settled in reports.
    pub settle_tolerance: f64,
    pub trace_agent: Option<u32>,
    pub show_progress: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "default_sim".to_string(),
            policy_name: "wardrop".to_string(),
            servers: vec![ServerSpec::new("srv1", 800.0), ServerSpec::new("srv2", 1000.0)],
            num_agents: 30,
            steps: 1000,
            demand: DemandPattern::default(),
            disturbances: vec![Disturbance {
                step: 401,
                server: "srv2".to_string(),
                change: CapacityChange::Scale(0.7),
            }],
            wardrop: WardropParams::default(),
            seed: None,
            parallel: false,
            convergence_tolerance: None,
            settle_window: 10,
            latency_limit: 1.0,
            settle_tolerance: 1e-2,
            trace_agent: None,
            show_progress: false,
        }
    }
}

impl SimConfig {
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy_name = policy.into();
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_servers(mut self, servers: Vec<ServerSpec>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_demand(mut self, demand: DemandPattern) -> Self {
        self.demand = demand;
        self
    }

    pub fn with_disturbances(mut self, disturbances: Vec<Disturbance>) -> Self {
        self.disturbances = disturbances;
        self
    }

    pub fn validate_thresholds(&self) -> Result<(), ConfigError> {
        let mut checks = vec![
            ("latency_limit", self.latency_limit),
            ("settle_tolerance", self.settle_tolerance),
        ];
        if let Some(tolerance) = self.convergence_tolerance {
            checks.push(("convergence_tolerance", tolerance));
        }

        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}
