use wardflow::metrics::spread;
use wardflow::prelude::*;

fn reference_config(policy: &str) -> SimConfig {
    SimConfig::default().with_policy(policy).with_seed(2024)
}

#[test]
fn history_covers_every_step_plus_the_initial_snapshot() {
    let mut sim = Simulation::new(reference_config("wardrop").with_steps(50)).unwrap();

    sim.run().unwrap();

    let steps: Vec<usize> = sim.history().iter().map(|s| s.step).collect();
    assert_eq!(steps, (0..=50).collect::<Vec<_>>());
    assert_eq!(sim.history().server_ids(), &["srv1".to_string(), "srv2".to_string()]);
}

#[test]
fn wardrop_closes_the_latency_gap_and_recovers_from_the_disturbance() {
    let mut sim = Simulation::new(reference_config("wardrop")).unwrap();
    let initial_spread = spread(sim.latencies());

    sim.run().unwrap();
    let history = sim.history();

    // srv2 loses 30% of its capacity on step 401.
    assert_eq!(history.samples()[400].capacities, vec![800.0, 1000.0]);
    assert!((history.samples()[401].capacities[1] - 700.0).abs() < 1e-9);
    let jolt = history.samples()[401].latencies[1] - history.samples()[400].latencies[1];
    assert!(jolt > 0.0);

    let settled_before = history.samples()[400].spread();
    let settled_after = history.last().unwrap().spread();
    assert!(initial_spread > 0.05);
    assert!(settled_before < 0.01, "spread before disturbance: {settled_before}");
    assert!(settled_after < 0.01, "final spread: {settled_after}");

    for agent in sim.agents() {
        assert!(agent.distribution().is_simplex(1e-9));
    }
}

#[test]
fn agents_all_read_the_same_frozen_snapshot() {
    let mut sim = Simulation::new(
        reference_config("wardrop").with_demand(DemandPattern::Constant { rate: 10.0 }),
    )
    .unwrap();

    sim.step();
    sim.step();

    // Identical agents observing one broadcast vector stay identical.
    let first = sim.agents()[0].distribution().clone();
    assert!(sim.agents().iter().all(|a| a.distribution() == &first));
}

#[test]
fn parallel_contribution_matches_sequential() {
    let config = reference_config("wardrop").with_steps(200);
    let mut sequential = Simulation::new(config.clone()).unwrap();
    let mut parallel = Simulation::new(SimConfig {
        parallel: true,
        ..config
    })
    .unwrap();

    sequential.run().unwrap();
    parallel.run().unwrap();

    for (a, b) in sequential.history().iter().zip(parallel.history()) {
        for (x, y) in a.latencies.iter().zip(&b.latencies) {
            assert!((x - y).abs() < 1e-9);
        }
    }
}

#[test]
fn heuristic_keeps_every_agent_on_the_simplex() {
    let mut sim = Simulation::new(reference_config("inverse-latency").with_steps(100)).unwrap();

    for _ in 0..100 {
        sim.step();
        for agent in sim.agents() {
            assert!(agent.distribution().is_simplex(1e-9));
        }
    }
}

#[test]
fn loads_account_for_all_demand() {
    let mut sim = Simulation::new(
        reference_config("inverse-latency")
            .with_demand(DemandPattern::Constant { rate: 20.0 })
            .with_steps(10),
    )
    .unwrap();

    sim.run().unwrap();

    let ids: Vec<u32> = sim.agents().iter().map(|a| a.id()).collect();
    assert_eq!(ids, (0..30).collect::<Vec<_>>());

    for sample in sim.history() {
        let total: f64 = sample.loads.iter().sum();
        assert!((total - 30.0 * 20.0).abs() < 1e-6);
    }
}

#[test]
fn noisy_demand_is_reproducible_with_a_seed() {
    let config = reference_config("wardrop")
        .with_demand(DemandPattern::Noisy { min: 10.0, max: 50.0, std_dev: 4.0 })
        .with_steps(30);

    let mut a = Simulation::new(config.clone()).unwrap();
    let mut b = Simulation::new(config).unwrap();
    a.run().unwrap();
    b.run().unwrap();

    assert_eq!(a.history().samples(), b.history().samples());
}

#[test]
fn convergence_stop_is_off_by_default() {
    let mut sim = Simulation::new(reference_config("wardrop").with_steps(120)).unwrap();

    sim.run().unwrap();

    assert_eq!(sim.converged_at(), None);
    assert_eq!(sim.current_step(), 120);
}

#[test]
fn saves_csv_and_analysis() {
    let dir = std::env::temp_dir().join(format!("wardflow_results_{}", std::process::id()));
    let mut sim = Simulation::new(reference_config("wardrop").with_steps(20)).unwrap();
    sim.run().unwrap();

    let report = sim.save_results(&dir).unwrap();

    assert_eq!(report.steps, 20);
    assert_eq!(report.policy_name, "wardrop");
    let files: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(files.iter().any(|f| f.ends_with(".csv")));
    assert!(files.iter().any(|f| f.ends_with("_analysis.json")));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn reference_config_file_matches_defaults() {
    let config: SimConfig =
        serde_json::from_str(include_str!("../configs/reference.json")).unwrap();
    let defaults = SimConfig::default();

    assert_eq!(config.servers, defaults.servers);
    assert_eq!(config.disturbances, defaults.disturbances);
    assert_eq!(config.demand, defaults.demand);
    assert_eq!(config.wardrop, defaults.wardrop);
    assert_eq!(config.seed, Some(42));
    assert!(Simulation::new(config).is_ok());
}
