//! # Attack Knowledge MDP
//!
//! Models a network attack as the growth of the attacker's knowledge and
//! learns which techniques to chain. This library provides tools to:
//!
//! - Compile a network description into a finite Markov decision process whose
//!   states are what the attacker knows
//! - Learn attack strategies over that MDP with tabular Q-learning
//! - Extract and render the learned attack path
//! - Compare learned policies against a random-walk baseline
//!
//! ## Key Features
//!
//! - **Knowledge Model**: value-typed, order-independent knowledge states
//! - **Action Catalog**: MITRE ATT&CK techniques with preconditions and effects
//! - **State Space**: breadth-first closure from the cold start to the goal
//! - **Rewards**: root gain, action cost tiers, zero-day and honeypot penalties
//! - **Learning**: annealed exploration and learning rate, reproducible by seed
//! - **Persistence**: MDP and learning-run snapshots
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use attack_knowledge_mdp::simulation::{SimulationConfig, Simulator};
//! use attack_knowledge_mdp::analysis;
//! use std::sync::atomic::AtomicBool;
//!
//! let simulator = Simulator::simworld(SimulationConfig::default()).unwrap();
//! let mdp = simulator.build_mdp().unwrap();
//!
//! let runs = simulator.learn_all(&mdp, &AtomicBool::new(false)).unwrap();
//! if let Some(path) = &runs[0].path {
//!     println!("{}", analysis::policy_table(&mdp, path));
//! }
//! ```

pub mod error;
pub mod knowledge;
pub mod environment;
pub mod attack;
pub mod statespace;
pub mod reward;
pub mod mdp;
pub mod ml;
pub mod persistence;
pub mod analysis;
pub mod simulation;

// Re-export commonly used types
pub use error::{ConvergenceFailure, Error, Result};
pub use knowledge::{AccessLevel, KnowledgeState, NodeId};
pub use environment::{NetworkWorld, Topology};
pub use attack::{ActionKind, NodeAction};
pub use statespace::{GoalPredicate, StateSpace};
pub use reward::{KnowledgeReward, RewardConfig, RewardWeights};
pub use mdp::{assemble, KnowledgeMdp, Mdp, MdpBuilder, StateId, StateReward};
pub use ml::{LearningParameters, PathStep, QLearningAgent, QTable};
pub use persistence::FullRun;
pub use simulation::{SimulationConfig, Simulator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
