pub mod config;
pub mod demand;

pub use config::{CapacityChange, Disturbance, SimConfig};
pub use demand::{DemandPattern, DemandSource};

use crate::agent::Agent;
use crate::error::ConfigError;
use crate::metrics::analyzer::{self, AnalysisReport};
use crate::metrics::logger::MetricsLogger;
use crate::metrics::{LatencyHistory, LatencySample, spread};
use crate::policies::PolicyRegistry;
use crate::server::ServerRegistry;
use anyhow::Result;
use config::DisturbanceSchedule;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Closed loop: agents read one frozen latency snapshot, contribute their
/// traffic, and only then are the new latencies computed.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    registry: ServerRegistry,
    agents: Vec<Agent>,
    demand: DemandSource,
    schedule: DisturbanceSchedule,
    latencies: Vec<f64>,
    history: LatencyHistory,
    step: usize,
    converged_at: Option<usize>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let mut registry = ServerRegistry::new(&config.servers)?;
        config.wardrop.validate()?;
        config.validate_thresholds()?;
        let schedule = config::build_schedule(&config.disturbances, &registry)?;
        let mut demand = DemandSource::new(config.demand.clone(), config.seed)?;

        let policies = PolicyRegistry::global();
        if !policies.contains(&config.policy_name) {
            return Err(ConfigError::UnknownPolicy(config.policy_name.clone()));
        }
        let num_servers = registry.len();
        let mut agents = Vec::with_capacity(config.num_agents as usize);
        for id in 0..config.num_agents {
            let policy = policies.create(&config.policy_name, num_servers, &config.wardrop)?;
            let agent = Agent::new(id, demand.base_rate(), policy, num_servers)
                .traced(config.trace_agent == Some(id));
            agents.push(agent);
        }

        for (step, changes) in schedule.range(config.steps + 1..) {
            warn!(
                "{} disturbance(s) at step {} fall after the last step {} and will never apply",
                changes.len(),
                step,
                config.steps
            );
        }

        // Step 0: every agent at its starting split and base demand.
        let mut loads = vec![0.0; num_servers];
        for agent in &agents {
            accumulate_into(&mut loads, &agent.send_rates(agent.demand_rate()));
        }
        registry.set_loads(&loads);
        let latencies = registry.latencies();

        let mut history = LatencyHistory::new(registry.ids());
        history.push(LatencySample {
            step: 0,
            latencies: latencies.clone(),
            loads: registry.loads(),
            capacities: registry.capacities(),
        });

        Ok(Self {
            config,
            registry,
            agents,
            demand,
            schedule,
            latencies,
            history,
            step: 0,
            converged_at: None,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn history(&self) -> &LatencyHistory {
        &self.history
    }

    /// Latency snapshot the next step's agents will observe.
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn converged_at(&self) -> Option<usize> {
        self.converged_at
    }

    /// Advances one step and returns the new latency snapshot.
    pub fn step(&mut self) -> &[f64] {
        self.step += 1;
        let step = self.step;
        let num_servers = self.registry.len();

        // Drawn up front so the contribution phase only reads shared state.
        let mut demands = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            demands.push(self.demand.step_demand(agent.demand_rate()));
        }

        let latencies = &self.latencies;
        let loads = if self.config.parallel {
            self.agents
                .par_iter_mut()
                .zip(demands.par_iter())
                .map(|(agent, &demand)| {
                    agent.rebalance(latencies);
                    agent.send_rates(demand)
                })
                .reduce(
                    || vec![0.0; num_servers],
                    |mut acc, rates| {
                        accumulate_into(&mut acc, &rates);
                        acc
                    },
                )
        } else {
            let mut loads = vec![0.0; num_servers];
            for (agent, &demand) in self.agents.iter_mut().zip(&demands) {
                agent.rebalance(latencies);
                accumulate_into(&mut loads, &agent.send_rates(demand));
            }
            loads
        };

        if let Some(changes) = self.schedule.get(&step) {
            for &(server, change) in changes {
                let before = self.registry.servers()[server].capacity();
                let after = change.apply(before);
                self.registry.set_capacity(server, after);
                info!(
                    "Step {}: capacity of {} changed {:.2} -> {:.2}",
                    step,
                    self.registry.servers()[server].id(),
                    before,
                    after
                );
            }
        }

        // Every agent has contributed; the snapshot can be finalized.
        self.registry.set_loads(&loads);
        self.latencies = self.registry.latencies();

        self.history.push(LatencySample {
            step,
            latencies: self.latencies.clone(),
            loads: self.registry.loads(),
            capacities: self.registry.capacities(),
        });

        &self.latencies
    }

    /// Runs the remaining steps, or fewer when a convergence tolerance is set
    /// and met with no disturbance left to apply.
    pub fn run(&mut self) -> Result<()> {
        info!("Starting simulation: {}", self.config.name);
        info!("Policy: {}", self.config.policy_name);
        info!(
            "Agents: {}, Servers: {}, Steps: {}",
            self.agents.len(),
            self.registry.len(),
            self.config.steps
        );

        let remaining = self.config.steps.saturating_sub(self.step);
        let pb = if self.config.show_progress {
            let pb = ProgressBar::new(remaining as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} steps {msg}")?
                    .progress_chars("█▓░"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let settle_window = self.config.settle_window.max(1);
        let mut calm_steps = 0;

        for _ in 0..remaining {
            let previous = self.latencies.clone();
            self.step();
            let latencies = &self.latencies;

            let change = previous
                .iter()
                .zip(latencies)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            let current_spread = spread(latencies);

            pb.inc(1);
            pb.set_message(format!("Spread: {:.4}", current_spread));

            if latencies.iter().any(|&l| l > self.config.latency_limit) {
                warn!("Step {}: latency above limit {:?}", self.step, self.latencies);
            }

            if let Some(tolerance) = self.config.convergence_tolerance {
                calm_steps = if change <= tolerance { calm_steps + 1 } else { 0 };
                let pending = self.schedule.range(self.step + 1..).next().is_some();
                if calm_steps >= settle_window && !pending {
                    self.converged_at = Some(self.step);
                    info!("Converged at step {} (spread {:.6})", self.step, current_spread);
                    break;
                }
            }
        }

        pb.finish_with_message("Simulation complete");
        info!("Final latencies: {:?}", self.latencies);
        Ok(())
    }

    pub fn analyze(&self) -> AnalysisReport {
        analyzer::analyze(
            &self.history,
            &self.config.policy_name,
            self.config.latency_limit,
            self.config.settle_tolerance,
        )
    }

    /// Writes the history as CSV and the analysis as JSON under `dir`.
    pub fn save_results(&self, dir: impl AsRef<Path>) -> Result<AnalysisReport> {
        let dir = dir.as_ref();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

        std::fs::create_dir_all(dir)?;

        let csv_path = dir.join(format!("{}_{}.csv", self.config.name, timestamp));
        let mut logger = MetricsLogger::new(&csv_path)?;
        logger.log_history(&self.history)?;
        info!("Results saved to: {}", csv_path.display());

        let report = self.analyze();
        let json_path = dir.join(format!("{}_{}_analysis.json", self.config.name, timestamp));
        std::fs::write(&json_path, serde_json::to_string_pretty(&report)?)?;
        info!("Analysis saved to: {}", json_path.display());

        info!("Final spread: {:.6}", report.final_spread);
        info!("Peak latency: {:.4}", report.peak_latency);
        info!("Overloaded steps: {}", report.overload_steps);

        Ok(report)
    }
}

fn accumulate_into(loads: &mut [f64], rates: &[f64]) {
    for (load, rate) in loads.iter_mut().zip(rates) {
        *load += rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerSpec;

    fn constant_config(policy: &str) -> SimConfig {
        SimConfig {
            num_agents: 4,
            demand: DemandPattern::Constant { rate: 10.0 },
            disturbances: Vec::new(),
            ..SimConfig::default()
        }
        .with_policy(policy)
        .with_seed(3)
    }

    #[test]
    fn initial_snapshot_uses_uniform_split() {
        let sim = Simulation::new(constant_config("wardrop")).unwrap();

        let first = &sim.history().samples()[0];
        assert_eq!(first.step, 0);
        assert_eq!(first.loads, vec![20.0, 20.0]);
        assert_eq!(first.latencies, vec![20.0 / 800.0, 20.0 / 1000.0]);
        assert_eq!(sim.latencies(), first.latencies.as_slice());
    }

    #[test]
    fn disturbance_hits_capacity_on_its_step() {
        let mut config = constant_config("wardrop")
            .with_disturbances(vec!["3:srv2:x0.5".parse().unwrap()])
            .with_steps(5);
        config.wardrop.sigma = 0.0;
        let mut sim = Simulation::new(config).unwrap();

        sim.run().unwrap();

        let history = sim.history();
        assert_eq!(history.len(), 6);
        assert_eq!(history.samples()[2].capacities, vec![800.0, 1000.0]);
        assert_eq!(history.samples()[3].capacities, vec![800.0, 500.0]);
        assert_eq!(history.samples()[2].latencies[1], 0.02);
        assert_eq!(history.samples()[3].latencies[1], 0.04);
        assert_eq!(history.samples()[5].latencies[1], 0.04);
    }

    #[test]
    fn overloaded_run_still_completes() {
        let mut config = constant_config("inverse-latency").with_steps(4);
        config.latency_limit = 0.01;
        let mut sim = Simulation::new(config).unwrap();

        sim.run().unwrap();

        assert_eq!(sim.current_step(), 4);
        assert_eq!(sim.analyze().overload_steps, 5);
    }

    #[test]
    fn compounded_disturbances_are_rejected_at_construction() {
        let config = constant_config("wardrop").with_disturbances(vec![
            "1:srv1:x1e-200".parse().unwrap(),
            "2:srv1:x1e-200".parse().unwrap(),
        ]);

        assert!(matches!(
            Simulation::new(config).unwrap_err(),
            ConfigError::InvalidDisturbance { step: 2, .. }
        ));
    }

    #[test]
    fn zero_agents_leave_latencies_at_zero() {
        let config = SimConfig {
            num_agents: 0,
            ..constant_config("inverse-latency")
        }
        .with_steps(3);
        let mut sim = Simulation::new(config).unwrap();

        sim.run().unwrap();

        assert!(sim.history().iter().all(|s| s.latencies == vec![0.0, 0.0]));
    }

    #[test]
    fn construction_reports_configuration_errors() {
        let err = Simulation::new(constant_config("round-robin")).unwrap_err();
        assert_eq!(err, ConfigError::UnknownPolicy("round-robin".into()));

        let err = Simulation::new(constant_config("wardrop").with_servers(vec![])).unwrap_err();
        assert_eq!(err, ConfigError::NoServers);

        let err = Simulation::new(
            constant_config("wardrop").with_servers(vec![ServerSpec::new("srv1", -1.0)]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCapacity { .. }));

        let err = Simulation::new(
            constant_config("wardrop").with_demand(DemandPattern::Constant { rate: -2.0 }),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDemand(_)));

        let mut config = constant_config("inverse-latency");
        config.wardrop.dt = -0.01;
        assert!(matches!(
            Simulation::new(config).unwrap_err(),
            ConfigError::InvalidParameter { name: "dt", .. }
        ));
    }

    #[test]
    fn convergence_stop_waits_for_pending_disturbances() {
        let mut config = constant_config("wardrop")
            .with_disturbances(vec!["20:srv1:x0.9".parse().unwrap()])
            .with_steps(500);
        config.wardrop.sigma = 0.0;
        config.convergence_tolerance = Some(1e-9);
        config.settle_window = 5;
        let mut sim = Simulation::new(config).unwrap();

        sim.run().unwrap();

        // Nothing moves, so it stops as soon as the disturbance is behind it.
        assert_eq!(sim.converged_at(), Some(25));
        assert_eq!(sim.current_step(), 25);
        assert_eq!(sim.history().len(), 26);
    }
}
