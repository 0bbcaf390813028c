//! End-to-end driver: world, closure, MDP, learning runs.

use crate::analysis::{self, RunSummary, Statistics};
use crate::attack::NodeAction;
use crate::environment::NetworkWorld;
use crate::error::{ConvergenceFailure, Error, Result};
use crate::knowledge::KnowledgeState;
use crate::mdp::{assemble, KnowledgeMdp, StateId};
use crate::ml::{path_reward, LearningParameters, PathStep, QLearningAgent, QTable, RunOutcome};
use crate::persistence::{self, FullRun};
use crate::reward::{KnowledgeReward, RewardConfig};
use crate::statespace::{GoalPredicate, StateSpace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

type KnowledgeAgent<'a> = QLearningAgent<'a, KnowledgeState, NodeAction, KnowledgeReward>;

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub goal: GoalPredicate,
    pub reward: RewardConfig,
    /// One learning run per entry
    pub runs: Vec<LearningParameters>,
    /// MDP snapshot, reused when present
    pub mdp_path: Option<PathBuf>,
    /// Directory receiving one `run-<n>.json` per learning run
    pub output_dir: Option<PathBuf>,
    /// Learning-run snapshot whose Q entries seed the agents. A missing file
    /// is a cold start.
    pub warm_start: Option<PathBuf>,
    /// Train every parameter set in turn on one agent instead of a fresh one
    /// per run
    pub chain_runs: bool,
    pub sweep_threads: usize,
    pub loop_window: usize,
    pub baseline_episodes: usize,
    pub baseline_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            goal: GoalPredicate::default(),
            reward: RewardConfig::default(),
            runs: vec![LearningParameters::default()],
            mdp_path: None,
            output_dir: None,
            warm_start: None,
            chain_runs: false,
            sweep_threads: 4,
            loop_window: 10,
            baseline_episodes: 1000,
            baseline_seed: 0,
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the default configuration.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::persistence(path, e)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.reward.weights.validate()?;
        for params in &self.runs {
            params.validate()?;
        }
        if self.sweep_threads == 0 {
            return Err(Error::config("sweep_threads", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn run_path(&self, index: usize) -> Option<PathBuf> {
        self.output_dir
            .as_ref()
            .map(|dir| dir.join(format!("run-{}.json", index)))
    }
}

/// Outcome of one learning run over a knowledge MDP
#[derive(Debug, Clone)]
pub struct LearningRun {
    pub outcome: RunOutcome,
    pub path: Option<Vec<PathStep<NodeAction>>>,
    /// Why no policy could be extracted
    pub convergence: Option<ConvergenceFailure>,
    pub utility: HashMap<StateId, f64>,
    pub snapshot: FullRun<NodeAction>,
}

impl LearningRun {
    pub fn summary(&self) -> RunSummary {
        let params = &self.snapshot.parameters;
        RunSummary {
            label: if params.additional_information.is_empty() {
                format!("alpha {} / eps {}", params.learning_rate_start, params.epsilon_start)
            } else {
                params.additional_information.clone()
            },
            seed: params.seed,
            outcome: self.outcome,
            rewards: Statistics::from_values(&analysis::trace_rewards(&self.snapshot.rewards)),
            policy_length: self.path.as_ref().map(|p| p.len().saturating_sub(1)),
            policy_reward: self.snapshot.policy_reward,
        }
    }
}

/// Trains one agent and extracts its policy. A failed extraction is part of
/// the result, not an error.
pub fn learn(
    mdp: &KnowledgeMdp,
    params: &LearningParameters,
    loop_window: usize,
    cancel: &AtomicBool,
) -> Result<LearningRun> {
    let mut agent = QLearningAgent::new(mdp, params.clone())?;
    train(&mut agent, loop_window, cancel)
}

fn seeded_agent<'a>(
    mdp: &'a KnowledgeMdp,
    params: &LearningParameters,
    warm: Option<&QTable>,
) -> Result<KnowledgeAgent<'a>> {
    let mut agent = QLearningAgent::new(mdp, params.clone())?;
    if let Some(q) = warm {
        agent.load_q(q.clone());
    }
    Ok(agent)
}

/// Runs the agent's current parameters. The snapshot only carries the
/// episodes of this call.
fn train(agent: &mut KnowledgeAgent<'_>, loop_window: usize, cancel: &AtomicBool) -> Result<LearningRun> {
    let first_episode = agent.reward_trace().len();
    let outcome = agent.run_with_cancel(cancel);
    let mdp = agent.mdp();
    let params = agent.parameters().clone();

    let (path, convergence) = match agent.preferred_path(loop_window) {
        Ok(path) => (Some(path), None),
        Err(Error::Convergence(failure)) => {
            tracing::warn!("No policy extracted: {}", failure);
            (None, Some(failure))
        }
        Err(e) => return Err(e),
    };

    let snapshot = FullRun {
        rewards: agent.reward_trace()[first_episode..].to_vec(),
        policy: path
            .iter()
            .flatten()
            .filter_map(|step| step.action)
            .collect(),
        policy_reward: path.as_ref().map(|p| path_reward(mdp, p)),
        q: params.save_q.then(|| agent.q_table().entries()),
        parameters: params,
    };

    Ok(LearningRun {
        outcome,
        path,
        convergence,
        utility: agent.utility(),
        snapshot,
    })
}

/// Independent learning runs on a pool of `threads` workers sharing the MDP,
/// each agent seeded from `warm` when given. Results keep the order of
/// `params`.
pub fn sweep(
    mdp: &KnowledgeMdp,
    params: &[LearningParameters],
    warm: Option<&QTable>,
    threads: usize,
    loop_window: usize,
    cancel: &AtomicBool,
) -> Result<Vec<LearningRun>> {
    for p in params {
        p.validate()?;
    }
    let workers = threads.max(1).min(params.len().max(1));
    tracing::info!("Sweeping {} parameter sets on {} threads", params.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::Structural(format!("sweep thread pool: {}", e)))?;
    pool.install(|| {
        params
            .par_iter()
            .map(|p| {
                let mut agent = seeded_agent(mdp, p, warm)?;
                train(&mut agent, loop_window, cancel)
            })
            .collect()
    })
}

/// Rejects Q entries that address states or action slots `mdp` does not have
fn check_fits(q: &QTable, mdp: &KnowledgeMdp) -> Result<()> {
    for entry in q.entries() {
        let fits = entry.state.0 < mdp.len()
            && match entry.action {
                Some(slot) => slot < mdp.actions(entry.state).len(),
                None => mdp.is_terminal(entry.state),
            };
        if !fits {
            return Err(Error::Structural(format!(
                "warm-start entry ({}, {:?}) does not fit an MDP of {} states",
                entry.state.0,
                entry.action,
                mdp.len()
            )));
        }
    }
    Ok(())
}

/// Owns a configuration and the world it runs against
pub struct Simulator {
    config: SimulationConfig,
    world: NetworkWorld,
}

impl Simulator {
    pub fn new(config: SimulationConfig, world: NetworkWorld) -> Result<Self> {
        config.validate()?;
        let simulator = Self { config, world };
        for index in simulator.weak_optimism() {
            tracing::warn!(
                "Run {}: r_plus {} is below the largest step reward {}, exploration may stop early",
                index,
                simulator.config.runs[index].r_plus,
                simulator.max_step_reward()
            );
        }
        Ok(simulator)
    }

    /// Simulator over the reference five-node network
    pub fn simworld(config: SimulationConfig) -> Result<Self> {
        Self::new(config, NetworkWorld::simworld()?)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn world(&self) -> &NetworkWorld {
        &self.world
    }

    /// Largest reward one transition can pay in this world
    pub fn max_step_reward(&self) -> f64 {
        self.config.reward.weights.max_step_reward(self.world.targets().count())
    }

    /// Indices of runs whose optimistic value `r_plus` is below
    /// [`Self::max_step_reward`]
    pub fn weak_optimism(&self) -> Vec<usize> {
        let bound = self.max_step_reward();
        self.config
            .runs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.r_plus < bound)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn build_mdp(&self) -> Result<KnowledgeMdp> {
        let space = StateSpace::generate(&self.world, &self.config.goal)?;
        assemble(space, &self.config.reward)
    }

    /// Reuses the configured snapshot when it exists, otherwise builds the
    /// MDP and writes the snapshot.
    pub fn load_or_build_mdp(&self) -> Result<KnowledgeMdp> {
        let Some(path) = &self.config.mdp_path else {
            return self.build_mdp();
        };
        if let Some(mdp) = persistence::load_mdp(path)? {
            return Ok(mdp);
        }
        let mdp = self.build_mdp()?;
        persistence::save_mdp(&mdp, path)?;
        Ok(mdp)
    }

    /// Q-table of the configured warm-start snapshot, checked against `mdp`.
    /// `None` when no snapshot is configured, present or carrying Q entries.
    pub fn warm_start(&self, mdp: &KnowledgeMdp) -> Result<Option<QTable>> {
        let Some(path) = &self.config.warm_start else {
            return Ok(None);
        };
        let Some(run) = FullRun::<NodeAction>::load(path)? else {
            tracing::info!("No learning snapshot at {}, starting cold", path.display());
            return Ok(None);
        };
        let Some(q) = run.q_table() else {
            tracing::warn!("{} holds no Q entries, starting cold", path.display());
            return Ok(None);
        };
        check_fits(&q, mdp)?;
        tracing::info!("Warm start from {} ({} Q entries)", path.display(), q.len());
        Ok(Some(q))
    }

    /// Runs every configured parameter set in order, saving each snapshot.
    /// Stops early once `cancel` is set.
    pub fn learn_all(&self, mdp: &KnowledgeMdp, cancel: &AtomicBool) -> Result<Vec<LearningRun>> {
        let warm = self.warm_start(mdp)?;
        let mut chained: Option<KnowledgeAgent<'_>> = None;
        let mut runs = Vec::with_capacity(self.config.runs.len());
        for (index, params) in self.config.runs.iter().enumerate() {
            let mut agent = match chained.take() {
                Some(mut agent) => {
                    agent.set_parameters(params.clone())?;
                    agent
                }
                None => seeded_agent(mdp, params, warm.as_ref())?,
            };
            let run = train(&mut agent, self.config.loop_window, cancel)?;
            if self.config.chain_runs {
                chained = Some(agent);
            }

            if let Some(path) = self.config.run_path(index) {
                run.snapshot.save(path)?;
            }
            let cancelled = run.outcome.cancelled;
            runs.push(run);
            if cancelled {
                break;
            }
        }
        Ok(runs)
    }

    pub fn sweep(&self, mdp: &KnowledgeMdp, cancel: &AtomicBool) -> Result<Vec<LearningRun>> {
        let warm = self.warm_start(mdp)?;
        let runs = sweep(
            mdp,
            &self.config.runs,
            warm.as_ref(),
            self.config.sweep_threads,
            self.config.loop_window,
            cancel,
        )?;
        for (index, run) in runs.iter().enumerate() {
            if let Some(path) = self.config.run_path(index) {
                run.snapshot.save(path)?;
            }
        }
        Ok(runs)
    }

    pub fn baseline(&self, mdp: &KnowledgeMdp) -> Option<analysis::RandomWalkReport> {
        analysis::random_walk(mdp, self.config.baseline_episodes, self.config.baseline_seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::NodeId;

    fn small_config() -> SimulationConfig {
        let params = LearningParameters {
            iterations: 300,
            initial_state_iterations: 300,
            log_every: 0,
            ..LearningParameters::default()
        };
        SimulationConfig {
            goal: GoalPredicate::root_on([NodeId::WebServer]),
            runs: vec![params.clone(), LearningParameters { seed: 3, ..params }],
            sweep_threads: 2,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_toml_config() {
        let config = SimulationConfig::from_toml_str(
            r#"
            sweep_threads = 2
            loop_window = 4

            [goal]
            root_on = ["WebServer"]

            [reward.weights]
            terminal_bonus = 10.0

            [[runs]]
            seed = 9
            iterations = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.goal, GoalPredicate::root_on([NodeId::WebServer]));
        assert_eq!(config.reward.weights.terminal_bonus, 10.0);
        assert_eq!(config.reward.weights.high_cost, 0.3);
        assert_eq!(config.runs.len(), 1);
        assert_eq!(config.runs[0].seed, 9);
        assert_eq!(config.runs[0].ne, 5);
        assert_eq!(config.loop_window, 4);
    }

    #[test]
    fn test_goal_table_absent_keeps_default_goal() {
        let config = SimulationConfig::from_toml_str("loop_window = 4").unwrap();
        assert_eq!(config.goal, GoalPredicate::default());

        let config = SimulationConfig::from_toml_str("[goal]\nroot_on = [\"AdminPc\"]").unwrap();
        assert_eq!(config.goal, GoalPredicate::root_on([NodeId::AdminPc]));
    }

    #[test]
    fn test_toml_config_rejects_bad_values() {
        let err = SimulationConfig::from_toml_str("[[runs]]\nepsilon_start = 1.5\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { field: "epsilon_start", .. }));
        assert!(matches!(
            SimulationConfig::from_toml_str("sweep_threads = 0"),
            Err(Error::Configuration { field: "sweep_threads", .. })
        ));
        assert!(matches!(SimulationConfig::from_toml_str("runs = 3"), Err(Error::Toml(_))));
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let path = std::env::temp_dir().join(format!("akmdp-{}-missing.toml", std::process::id()));
        assert_eq!(SimulationConfig::from_toml_file(path).unwrap(), SimulationConfig::default());
    }

    #[test]
    fn test_sweep_matches_sequential_runs() {
        let simulator = Simulator::simworld(small_config()).unwrap();
        let mdp = simulator.build_mdp().unwrap();
        let cancel = AtomicBool::new(false);

        let sequential = simulator.learn_all(&mdp, &cancel).unwrap();
        let parallel = simulator.sweep(&mdp, &cancel).unwrap();

        assert_eq!(sequential.len(), 2);
        assert_eq!(parallel.len(), 2);
        for (a, b) in sequential.iter().zip(&parallel) {
            assert_eq!(a.snapshot, b.snapshot);
            assert_eq!(a.outcome, b.outcome);
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("akmdp-sim-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_warm_start_seeds_the_agent() {
        let dir = temp_dir("warm");
        let trained = Simulator::simworld(SimulationConfig {
            runs: vec![small_config().runs[0].clone()],
            output_dir: Some(dir.clone()),
            ..small_config()
        })
        .unwrap();
        let mdp = trained.build_mdp().unwrap();
        let cancel = AtomicBool::new(false);
        let first = trained.learn_all(&mdp, &cancel).unwrap();
        let saved = first[0].snapshot.q.clone().unwrap();
        assert!(!saved.is_empty());

        // cancelled before the first episode, so the table is exactly what was loaded
        let stopped = AtomicBool::new(true);
        let warm = Simulator::simworld(SimulationConfig {
            warm_start: Some(dir.join("run-0.json")),
            ..small_config()
        })
        .unwrap();
        assert_eq!(warm.warm_start(&mdp).unwrap().unwrap().entries(), saved);
        let runs = warm.learn_all(&mdp, &stopped).unwrap();
        assert_eq!(runs[0].outcome.episodes, 0);
        assert_eq!(runs[0].snapshot.q.as_ref(), Some(&saved));
        let swept = warm.sweep(&mdp, &stopped).unwrap();
        assert!(swept.iter().all(|r| r.snapshot.q.as_ref() == Some(&saved)));

        let cold = Simulator::simworld(SimulationConfig {
            warm_start: Some(dir.join("missing.json")),
            ..small_config()
        })
        .unwrap();
        assert!(cold.warm_start(&mdp).unwrap().is_none());
        let runs = cold.learn_all(&mdp, &stopped).unwrap();
        assert_eq!(runs[0].snapshot.q, Some(Vec::new()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_warm_start_must_fit_the_mdp() {
        let dir = temp_dir("stale");
        let simulator = Simulator::simworld(SimulationConfig {
            warm_start: Some(dir.join("stale.json")),
            ..small_config()
        })
        .unwrap();
        let mdp = simulator.build_mdp().unwrap();

        let mut q = QTable::default();
        q.set(StateId(mdp.len()), Some(0), 1.0);
        FullRun::<NodeAction> {
            parameters: LearningParameters::default(),
            rewards: Vec::new(),
            policy: Vec::new(),
            policy_reward: None,
            q: Some(q.entries()),
        }
        .save(dir.join("stale.json"))
        .unwrap();

        let err = simulator.warm_start(&mdp).unwrap_err();
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn test_chained_runs_continue_one_table() {
        let config = SimulationConfig {
            chain_runs: true,
            ..small_config()
        };
        let simulator = Simulator::simworld(config).unwrap();
        let mdp = simulator.build_mdp().unwrap();
        let runs = simulator.learn_all(&mdp, &AtomicBool::new(false)).unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].snapshot.rewards.len(), 600);
        assert_eq!(runs[1].snapshot.parameters.seed, 3);
        let first = QTable::from_entries(runs[0].snapshot.q.as_deref().unwrap());
        let second = QTable::from_entries(runs[1].snapshot.q.as_deref().unwrap());
        for entry in first.entries() {
            assert!(second.get(entry.state, entry.action).is_some());
        }

        let fresh = Simulator::simworld(small_config()).unwrap();
        let independent = fresh.learn_all(&mdp, &AtomicBool::new(false)).unwrap();
        assert_eq!(runs[0].snapshot, independent[0].snapshot);
        assert_ne!(runs[1].snapshot.q, independent[1].snapshot.q);
    }

    #[test]
    fn test_weak_optimism_is_flagged() {
        let mut config = small_config();
        config.runs[1].r_plus = 1.0;
        let simulator = Simulator::simworld(config).unwrap();

        let weights = RewardConfig::default().weights;
        assert_eq!(simulator.max_step_reward(), 4.0 * weights.root_gain + weights.terminal_bonus);
        assert_eq!(simulator.weak_optimism(), vec![1]);
    }

    #[test]
    fn test_cancelled_sweep_returns_partial_runs() {
        let simulator = Simulator::simworld(small_config()).unwrap();
        let mdp = simulator.build_mdp().unwrap();
        let cancel = AtomicBool::new(true);

        let runs = simulator.sweep(&mdp, &cancel).unwrap();
        assert!(runs.iter().all(|r| r.outcome.cancelled && r.outcome.episodes == 0));
        assert!(runs.iter().all(|r| r.path.is_none() && r.convergence.is_some()));
    }
}
