use attack_knowledge_mdp::analysis;
use attack_knowledge_mdp::environment::Topology;
use attack_knowledge_mdp::knowledge::NodeId;
use attack_knowledge_mdp::ml::LearningParameters;
use attack_knowledge_mdp::simulation::{self, SimulationConfig, Simulator};
use attack_knowledge_mdp::statespace::GoalPredicate;
use colored::*;
use std::sync::atomic::AtomicBool;

fn main() -> attack_knowledge_mdp::Result<()> {
    println!("{}", "=".repeat(80).bright_blue());
    println!("{}", "    ATTACK KNOWLEDGE MDP - WALKTHROUGH".bright_white().bold());
    println!("{}", "    From a cold start to root on the web server".bright_cyan());
    println!("{}", "=".repeat(80).bright_blue());

    let config = SimulationConfig {
        goal: GoalPredicate::root_on([NodeId::WebServer, NodeId::AdminPc]),
        runs: vec![LearningParameters {
            iterations: 20_000,
            initial_state_iterations: 5_000,
            log_every: 5_000,
            additional_information: "walkthrough".to_string(),
            ..LearningParameters::default()
        }],
        ..SimulationConfig::default()
    };
    let simulator = Simulator::simworld(config)?;
    let world = simulator.world();

    println!("\n🌐 {}", "Network:".bright_white().bold());
    for host in world.hosts() {
        let reachable: Vec<String> = world
            .reachable(host.id)
            .iter()
            .map(|n| n.to_string())
            .collect();
        println!(
            "   {} ({}) reaches {}",
            host.hostname.bright_white().bold(),
            host.id,
            reachable.join(", ")
        );
    }

    let mdp = simulator.build_mdp()?;
    println!(
        "\n⚙️  {} {} states, {} terminal, {} transitions",
        "MDP:".bright_white().bold(),
        mdp.len(),
        mdp.terminal_count(),
        mdp.transition_count()
    );

    let cancel = AtomicBool::new(false);
    let run = simulation::learn(&mdp, &simulator.config().runs[0], simulator.config().loop_window, &cancel)?;
    match &run.path {
        Some(path) => {
            println!("\n🎯 {}", "Learned attack path:".bright_green().bold());
            println!("{}", analysis::policy_table(&mdp, path));
        }
        None => println!("\n{}", "Learning did not converge".red().bold()),
    }

    if let Some(baseline) = simulator.baseline(&mdp) {
        println!("\n🎲 {}", "Random walk baseline:".bright_white().bold());
        println!("   Mean reward: {:.2}", baseline.rewards.mean);
        println!("   Mean length: {:.1} steps", baseline.transitions.mean);
        if let Some(reward) = run.snapshot.policy_reward {
            let gain = reward - baseline.rewards.mean;
            let text = format!("{:+.2}", gain);
            println!(
                "   Learned policy vs. baseline: {}",
                if gain >= 0.0 { text.green() } else { text.red() }
            );
        }
    }

    Ok(())
}
