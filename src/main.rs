//                            ,--. ,---.,--.
// ,--.   ,--.,--,--.,--.--. ,-|  |/  .-'|  | ,---. ,--.   ,--.
// |  |.'.|  ' ,-.  ||  .--'' .-. ||  `-,|  || .-. ||  |.'.|  |
// |   .'.   \ '-'  ||  |   \ `-' ||  .-'|  |' '-' '|   .'.   |
// '--'   '--'`--`--'`--'    `---' `--'  `--' `---' '--'   '--'

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use wardflow::metrics::analyzer::AnalysisReport;
use wardflow::prelude::*;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Level, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "wardrop")]
        policy: String,
        #[command(flatten)]
        setup: Setup,
    },

    Compare {
        #[arg(short, long, default_value = "wardrop,inverse-latency")]
        policies: String,
        #[command(flatten)]
        setup: Setup,
    },

    Analyze {
        #[arg(default_value = "results")]
        path: String,
    },

    List,
}

/// Flags shared by `run` and `compare`. A `--config` file replaces the defaults
/// the remaining flags are applied on top of.
#[derive(Args)]
struct Setup {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short = 'n', long)]
    agents: Option<u32>,
    #[arg(short, long)]
    steps: Option<usize>,
    /// Comma separated `id:capacity` pairs.
    #[arg(short = 'S', long)]
    servers: Option<String>,
    /// constant, uniform or noisy
    #[arg(short, long)]
    demand: Option<String>,
    #[arg(long, default_value_t = 10.0)]
    min_demand: f64,
    #[arg(long, default_value_t = 50.0)]
    max_demand: f64,
    #[arg(long, default_value_t = 5.0)]
    noise: f64,
    /// `<step>:<server>:x<factor>` or `<step>:<server>:=<capacity>`, repeatable.
    #[arg(long = "disturb")]
    disturbances: Vec<Disturbance>,
    #[arg(long)]
    no_disturbance: bool,
    #[arg(long)]
    dt: Option<f64>,
    #[arg(long)]
    sigma: Option<f64>,
    #[arg(long)]
    epsilon: Option<f64>,
    #[arg(long)]
    delta: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    parallel: bool,
    /// Stop once latencies move less than this between steps.
    #[arg(long)]
    converge: Option<f64>,
    #[arg(long)]
    trace_agent: Option<u32>,
    #[arg(short, long, default_value = "results")]
    output: PathBuf,
    #[arg(long)]
    no_save: bool,
}

fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { policy, setup } => {
            run_single_simulation(&policy, &setup)?;
        }

        Commands::Compare { policies, setup } => {
            compare_policies(&policies, &setup)?;
        }

        Commands::Analyze { path } => {
            analyze_results(&path)?;
        }

        Commands::List => {
            println!("\nAvailable Balancing Policies");

            for policy in PolicyRegistry::global().list() {
                println!("  - {}", policy);
            }

            println!("\nUsage: cargo run -- run --policy <name>");
            println!("Example: cargo run -- run --policy wardrop --steps 2000\n");
        }
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());

    Ok(())
}

fn build_config(policy: &str, setup: &Setup) -> Result<SimConfig> {
    let mut config = match &setup.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<SimConfig>(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SimConfig {
            show_progress: true,
            ..SimConfig::default()
        },
    };

    config.policy_name = policy.to_string();

    if let Some(agents) = setup.agents {
        config.num_agents = agents;
    }
    if let Some(steps) = setup.steps {
        config.steps = steps;
    }
    if let Some(servers) = &setup.servers {
        config.servers = parse_servers(servers)?;
    }
    if let Some(demand) = &setup.demand {
        config.demand = parse_demand(demand, setup.min_demand, setup.max_demand, setup.noise)?;
    }
    if setup.no_disturbance {
        config.disturbances.clear();
    }
    if !setup.disturbances.is_empty() {
        config.disturbances = setup.disturbances.clone();
    }

    let params = &mut config.wardrop;
    params.dt = setup.dt.unwrap_or(params.dt);
    params.sigma = setup.sigma.unwrap_or(params.sigma);
    params.epsilon = setup.epsilon.unwrap_or(params.epsilon);
    params.delta = setup.delta.unwrap_or(params.delta);

    config.seed = setup.seed.or(config.seed);
    config.parallel |= setup.parallel;
    config.convergence_tolerance = setup.converge.or(config.convergence_tolerance);
    config.trace_agent = setup.trace_agent.or(config.trace_agent);
    config.name = format!("{}_{}", policy, config.num_agents);

    Ok(config)
}

fn run_single_simulation(policy: &str, setup: &Setup) -> Result<()> {
    let config = build_config(policy, setup)?;

    info!("wardflow: Single Run");

    let mut sim = Simulation::new(config).context("invalid simulation setup")?;
    sim.run()?;

    let report = if setup.no_save {
        sim.analyze()
    } else {
        sim.save_results(&setup.output)?
    };
    comparison_table(&[report]);

    Ok(())
}

fn compare_policies(policies: &str, setup: &Setup) -> Result<()> {
    let names: Vec<&str> = policies.split(',').map(|s| s.trim()).collect();

    // Every policy sees the same agents and demand.
    let seed = setup.seed.unwrap_or_else(rand::random::<u64>);

    info!("wardflow: Comparison");
    info!("Policies: {}", names.join(", "));
    info!("Seed: {}", seed);

    let mut reports = Vec::new();

    for name in names {
        info!("Testing: {}", name);

        let mut config = build_config(name, setup)?;
        config.seed = Some(seed);

        let mut sim = Simulation::new(config).context("invalid simulation setup")?;
        sim.run()?;

        let report = if setup.no_save {
            sim.analyze()
        } else {
            sim.save_results(&setup.output)?
        };
        reports.push(report);
    }

    comparison_table(&reports);

    if !setup.no_save {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let comparison_path = setup.output.join(format!("comparison_{}.json", timestamp));
        std::fs::write(&comparison_path, serde_json::to_string_pretty(&reports)?)?;
        info!("Comparison saved to: {}", comparison_path.display());
    }

    Ok(())
}

fn analyze_results(path: &str) -> Result<()> {
    use std::fs;

    info!("Analyzing results in: {}", path);

    let mut reports = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().and_then(|s| s.to_str()) == Some("json")
            && path.to_string_lossy().contains("analysis")
        {
            let content = fs::read_to_string(&path)?;
            let report: AnalysisReport = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            reports.push(report);
        }
    }

    if reports.is_empty() {
        info!("No analysis files found.");
        return Ok(());
    }

    comparison_table(&reports);

    Ok(())
}

fn parse_servers(raw: &str) -> Result<Vec<ServerSpec>> {
    raw.split(',')
        .map(|entry| -> Result<ServerSpec> {
            let (id, capacity) = entry
                .trim()
                .split_once(':')
                .with_context(|| format!("server `{}` must look like id:capacity", entry))?;
            let capacity: f64 = capacity
                .parse()
                .with_context(|| format!("bad capacity for server `{}`", id))?;
            Ok(ServerSpec::new(id, capacity))
        })
        .collect()
}

fn parse_demand(name: &str, min: f64, max: f64, noise: f64) -> Result<DemandPattern> {
    match name.to_lowercase().as_str() {
        "constant" => Ok(DemandPattern::Constant { rate: min }),
        "uniform" => Ok(DemandPattern::Uniform { min, max }),
        "noisy" => Ok(DemandPattern::Noisy { min, max, std_dev: noise }),
        _ => anyhow::bail!("Unknown demand pattern: {}", name),
    }
}

fn comparison_table(reports: &[AnalysisReport]) {
    println!("\n╔═════════════════╦═══════╦═══════════════╦═══════════════╦══════════════╦═══════════╦══════════╗");
    println!("║ Policy          ║ Steps ║ Final spread  ║ Mean spread   ║ Peak latency ║ Overloads ║ Settled  ║");
    println!("╠═════════════════╬═══════╬═══════════════╬═══════════════╬══════════════╬═══════════╬══════════╣");

    for report in reports {
        let settled = report
            .settle_step
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "║ {:<15} ║ {:>5} ║ {:>13.6} ║ {:>13.6} ║ {:>12.4} ║ {:>9} ║ {:>8} ║",
            report.policy_name,
            report.steps,
            report.final_spread,
            report.mean_spread,
            report.peak_latency,
            report.overload_steps,
            settled,
        );
    }

    println!("╚═════════════════╩═══════╩═══════════════╩═══════════════╩══════════════╩═══════════╩══════════╝\n");

    if let Some(best) = reports
        .iter()
        .min_by(|a, b| a.mean_spread.total_cmp(&b.mean_spread))
    {
        println!("Most balanced: {} (mean spread {:.6})", best.policy_name, best.mean_spread);
    }

    println!();
}
