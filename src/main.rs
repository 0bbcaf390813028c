//! Command-line driver for the attack knowledge MDP.
//!
//! Commands:
//! - `generate` - build the state space and write the MDP snapshot
//! - `learn`    - train every configured run and print the learned attack path
//! - `baseline` - random-walk statistics for comparison
//! - `sweep`    - configured runs in parallel, summarised in one table

use anyhow::{Context, Result};
use attack_knowledge_mdp::analysis;
use attack_knowledge_mdp::mdp::KnowledgeMdp;
use attack_knowledge_mdp::persistence;
use attack_knowledge_mdp::simulation::{LearningRun, SimulationConfig, Simulator};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Learns attacker strategies over a network knowledge MDP.
#[derive(Parser, Debug)]
#[command(name = "attack-mdp")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Simulation configuration (TOML). Defaults apply when the file is absent.
    #[arg(short, long, default_value = "attack-mdp.toml")]
    config: PathBuf,

    /// Stop learning after this many seconds, keeping what was learned so far.
    #[arg(long)]
    max_seconds: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the state space and save the MDP snapshot.
    Generate {
        /// Overrides `mdp_path` from the configuration.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run every configured learning run in order.
    Learn {
        /// Seed the Q-table from a saved learning run. Overrides `warm_start`.
        #[arg(short, long)]
        warm_start: Option<PathBuf>,

        /// Train all runs on one agent, each continuing from the last.
        #[arg(long)]
        chain: bool,
    },

    /// Random-walk baseline from the initial state.
    Baseline {
        #[arg(short, long)]
        episodes: Option<usize>,
    },

    /// Run the configured learning runs on parallel threads.
    Sweep {
        #[arg(short, long)]
        threads: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = SimulationConfig::from_toml_file(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(seconds) = cli.max_seconds {
        let flag = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(seconds));
            tracing::warn!("Time limit of {}s reached, stopping", seconds);
            flag.store(true, Ordering::Relaxed);
        });
    }

    match cli.command {
        Commands::Generate { output } => cmd_generate(config, output),
        Commands::Learn { warm_start, chain } => cmd_learn(config, warm_start, chain, &cancel),
        Commands::Baseline { episodes } => cmd_baseline(config, episodes),
        Commands::Sweep { threads } => cmd_sweep(config, threads, &cancel),
    }
}

fn simulator(config: SimulationConfig) -> Result<Simulator> {
    Simulator::simworld(config).context("building the reference network")
}

fn load_mdp(simulator: &Simulator) -> Result<KnowledgeMdp> {
    let mdp = simulator
        .load_or_build_mdp()
        .context("preparing the knowledge MDP")?;
    println!(
        "{} {} states, {} terminal, {} transitions",
        "MDP:".bright_white().bold(),
        mdp.len(),
        mdp.terminal_count(),
        mdp.transition_count()
    );
    Ok(mdp)
}

fn cmd_generate(mut config: SimulationConfig, output: Option<PathBuf>) -> Result<()> {
    let path = output
        .or_else(|| config.mdp_path.clone())
        .unwrap_or_else(|| PathBuf::from("attack-mdp.bin"));
    config.mdp_path = None;
    let simulator = simulator(config)?;

    println!(
        "{} {} hosts, {} links",
        "Network:".bright_white().bold(),
        simulator.world().hosts().count(),
        simulator.world().link_count()
    );
    let mdp = simulator.build_mdp().context("generating the knowledge MDP")?;
    persistence::save_mdp(&mdp, &path)
        .with_context(|| format!("saving the MDP to {}", path.display()))?;

    println!(
        "{} {} states ({} terminal) and {} transitions written to {}",
        "Generated".bright_green().bold(),
        mdp.len(),
        mdp.terminal_count(),
        mdp.transition_count(),
        path.display()
    );
    Ok(())
}

fn print_run(mdp: &KnowledgeMdp, index: usize, run: &LearningRun) {
    let title = format!("Run {} (seed {})", index, run.snapshot.parameters.seed);
    println!("\n{}", title.bright_cyan().bold());
    if run.outcome.cancelled {
        println!(
            "   {} after {} episodes",
            "Cancelled".yellow(),
            run.outcome.episodes
        );
    }
    let rewards = analysis::trace_rewards(&run.snapshot.rewards);
    let window = (rewards.len() / 10).max(1);
    let trend = analysis::moving_average(&rewards, window);
    if let (Some(first), Some(last)) = (trend.first(), trend.last()) {
        println!(
            "   Reward trend (window {}): {:.3} -> {:.3}",
            window, first, last
        );
    }
    match (&run.path, &run.convergence) {
        (Some(path), _) => {
            println!("{}", analysis::policy_table(mdp, path));
            if let Some(reward) = run.snapshot.policy_reward {
                println!("   Policy reward: {}", format!("{:.2}", reward).bright_green());
            }
        }
        (None, Some(failure)) => println!("   {} {}", "Not converged:".red().bold(), failure),
        (None, None) => println!("   {}", "No policy".red()),
    }
}

fn cmd_learn(
    mut config: SimulationConfig,
    warm_start: Option<PathBuf>,
    chain: bool,
    cancel: &AtomicBool,
) -> Result<()> {
    if warm_start.is_some() {
        config.warm_start = warm_start;
    }
    config.chain_runs |= chain;
    let simulator = simulator(config)?;
    let mdp = load_mdp(&simulator)?;
    let runs = simulator
        .learn_all(&mdp, cancel)
        .context("running the learning runs")?;
    for (index, run) in runs.iter().enumerate() {
        print_run(&mdp, index, run);
    }
    Ok(())
}

fn cmd_baseline(mut config: SimulationConfig, episodes: Option<usize>) -> Result<()> {
    if let Some(episodes) = episodes {
        config.baseline_episodes = episodes;
    }
    let simulator = simulator(config)?;
    let mdp = load_mdp(&simulator)?;
    let Some(report) = simulator.baseline(&mdp) else {
        println!("{}", "No episodes to play".yellow());
        return Ok(());
    };

    println!("\n{}", "Random walk".bright_cyan().bold());
    println!("   Episodes: {}", report.episodes);
    println!(
        "   Transitions: min {:.0}, max {:.0}, mean {:.2}, median {:.1}, std {:.2}",
        report.transitions.min,
        report.transitions.max,
        report.transitions.mean,
        report.transitions.median,
        report.transitions.std_dev
    );
    println!(
        "   Reward: min {:.2}, max {:.2}, mean {:.2}, median {:.2}, std {:.2}",
        report.rewards.min,
        report.rewards.max,
        report.rewards.mean,
        report.rewards.median,
        report.rewards.std_dev
    );
    println!("   Zero-day exploits used: {}", report.zero_day_hits);
    println!("   Honeypot transitions: {}", report.honeypot_hits);
    println!(
        "   Best reward {} in {} steps, shortest walk {} steps",
        format!("{:.2}", report.best_reward).bright_green(),
        report.best_path.len(),
        report.shortest_path.len()
    );
    Ok(())
}

fn cmd_sweep(mut config: SimulationConfig, threads: Option<usize>, cancel: &AtomicBool) -> Result<()> {
    if let Some(threads) = threads {
        config.sweep_threads = threads;
    }
    let simulator = simulator(config)?;
    let mdp = load_mdp(&simulator)?;
    let runs = simulator.sweep(&mdp, cancel).context("running the sweep")?;

    let summaries: Vec<_> = runs.iter().map(LearningRun::summary).collect();
    println!("{}", analysis::summary_table(&summaries));
    if let Some((index, best)) = runs
        .iter()
        .enumerate()
        .filter(|(_, run)| run.snapshot.policy_reward.is_some())
        .max_by(|(_, a), (_, b)| {
            a.snapshot
                .policy_reward
                .partial_cmp(&b.snapshot.policy_reward)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    {
        print_run(&mdp, index, best);
    }
    Ok(())
}
