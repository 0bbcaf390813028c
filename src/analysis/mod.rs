use crate::attack::NodeAction;
use crate::error::{Error, Result};
use crate::mdp::{KnowledgeMdp, StateId};
use crate::ml::{PathStep, RunOutcome};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tabled::{Table, Tabled};

/// Summary statistics of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub std_dev: f64,
}

impl Statistics {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let data = Array1::from(values.to_vec());
        let mean = data.mean()?;
        let std_dev = data.std(0.0);

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        // most frequent value; the smallest wins a tie
        let mut mode = sorted[0];
        let mut best_run = 0;
        let mut i = 0;
        while i < n {
            let mut j = i;
            while j < n && sorted[j] == sorted[i] {
                j += 1;
            }
            if j - i > best_run {
                best_run = j - i;
                mode = sorted[i];
            }
            i = j;
        }

        Some(Self {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            mode,
            std_dev,
        })
    }

    pub fn from_counts(values: &[usize]) -> Option<Self> {
        let values: Vec<f64> = values.iter().map(|v| *v as f64).collect();
        Self::from_values(&values)
    }
}

/// Trailing moving average; empty when the window is wider than the data
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let data = Array1::from(values.to_vec());
    data.windows(window)
        .into_iter()
        .map(|w| w.sum() / window as f64)
        .collect()
}

/// Rewards of a learning trace, without episode numbers
pub fn trace_rewards(trace: &[(usize, f64)]) -> Vec<f64> {
    trace.iter().map(|(_, r)| *r).collect()
}

/// Per-state root mean squared error of several learned utilities against
/// an expected utility. A state a run never valued counts as 0.
pub fn utility_rmse(
    runs: &[HashMap<StateId, f64>],
    expected: &HashMap<StateId, f64>,
) -> Result<HashMap<StateId, f64>> {
    if runs.is_empty() {
        return Err(Error::config("runs", "at least one utility map is required"));
    }
    Ok(expected
        .iter()
        .map(|(state, target)| {
            let squared: f64 = runs
                .iter()
                .map(|u| (target - u.get(state).copied().unwrap_or(0.0)).powi(2))
                .sum();
            (*state, (squared / runs.len() as f64).sqrt())
        })
        .collect())
}

/// Uniformly random play from the initial state, as a baseline for learned policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomWalkReport {
    pub episodes: usize,
    pub transitions: Statistics,
    pub rewards: Statistics,
    pub best_reward: f64,
    pub best_path: Vec<NodeAction>,
    pub shortest_path: Vec<NodeAction>,
    pub zero_day_hits: usize,
    pub honeypot_hits: usize,
}

pub fn random_walk(mdp: &KnowledgeMdp, episodes: usize, seed: u64) -> Option<RandomWalkReport> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut lengths = Vec::with_capacity(episodes);
    let mut rewards = Vec::with_capacity(episodes);
    let mut best: Option<(f64, Vec<NodeAction>)> = None;
    let mut shortest: Option<Vec<NodeAction>> = None;
    let (mut zero_day_hits, mut honeypot_hits) = (0, 0);

    for _ in 0..episodes {
        let mut state = mdp.initial();
        let mut path = Vec::new();
        let mut total = 0.0;
        loop {
            let actions = mdp.actions(state);
            if mdp.is_terminal(state) || actions.is_empty() || path.len() > mdp.len() {
                total += mdp.reward(state, None);
                break;
            }
            let slot = rng.gen_range(0..actions.len());
            let action = actions[slot];
            let record = mdp.reward_record(state);
            if record.consumes_zero_day(&action) {
                zero_day_hits += 1;
            }
            if record.is_honeypot(&action) {
                honeypot_hits += 1;
            }
            total += mdp.reward(state, Some(slot));
            path.push(action);
            state = mdp.successor(state, slot);
        }

        lengths.push(path.len());
        rewards.push(total);
        if shortest.as_ref().map_or(true, |s| path.len() < s.len()) {
            shortest = Some(path.clone());
        }
        if best.as_ref().map_or(true, |(r, _)| total > *r) {
            best = Some((total, path));
        }
    }

    let (best_reward, best_path) = best?;
    Some(RandomWalkReport {
        episodes,
        transitions: Statistics::from_counts(&lengths)?,
        rewards: Statistics::from_values(&rewards)?,
        best_reward,
        best_path,
        shortest_path: shortest.unwrap_or_default(),
        zero_day_hits,
        honeypot_hits,
    })
}

#[derive(Tabled)]
pub struct PolicyRow {
    #[tabled(rename = "Step")]
    pub step: usize,
    #[tabled(rename = "Active Host")]
    pub actor: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Technique")]
    pub technique: String,
    #[tabled(rename = "Reward")]
    pub reward: String,
}

/// One row per step; the acting host is printed only when it changes.
pub fn policy_rows(mdp: &KnowledgeMdp, path: &[PathStep<NodeAction>]) -> Vec<PolicyRow> {
    let mut rows = Vec::with_capacity(path.len());
    let mut previous_actor = None;
    for (i, step) in path.iter().enumerate() {
        let Some(action) = &step.action else {
            rows.push(PolicyRow {
                step: i + 1,
                actor: String::new(),
                target: String::new(),
                technique: "(goal reached)".to_string(),
                reward: format!("{:.2}", mdp.reward(step.state, None)),
            });
            continue;
        };
        let reward = mdp
            .slot_of(step.state, action)
            .map(|slot| mdp.reward(step.state, Some(slot)))
            .unwrap_or(0.0);
        let actor = if previous_actor == Some(action.actor) {
            String::new()
        } else {
            previous_actor = Some(action.actor);
            action.actor.to_string()
        };
        rows.push(PolicyRow {
            step: i + 1,
            actor,
            target: action.target.to_string(),
            technique: format!("{} ({})", action.kind, action.kind.technique_id()),
            reward: format!("{:.2}", reward),
        });
    }
    rows
}

pub fn policy_table(mdp: &KnowledgeMdp, path: &[PathStep<NodeAction>]) -> String {
    Table::new(policy_rows(mdp, path)).to_string()
}

/// Result of one learning run, condensed for comparison tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub label: String,
    pub seed: u64,
    pub outcome: RunOutcome,
    pub rewards: Option<Statistics>,
    pub policy_length: Option<usize>,
    pub policy_reward: Option<f64>,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Run")]
    label: String,
    #[tabled(rename = "Seed")]
    seed: u64,
    #[tabled(rename = "Episodes")]
    episodes: String,
    #[tabled(rename = "Mean Reward")]
    mean_reward: String,
    #[tabled(rename = "Policy")]
    policy: String,
}

pub fn summary_table(summaries: &[RunSummary]) -> String {
    let rows = summaries.iter().map(|s| SummaryRow {
        label: s.label.clone(),
        seed: s.seed,
        episodes: if s.outcome.cancelled {
            format!("{} (cancelled)", s.outcome.episodes)
        } else {
            s.outcome.episodes.to_string()
        },
        mean_reward: s
            .rewards
            .as_ref()
            .map_or_else(|| "-".to_string(), |r| format!("{:.3}", r.mean)),
        policy: match (s.policy_length, s.policy_reward) {
            (Some(len), Some(reward)) => format!("{} steps, reward {:.2}", len, reward),
            _ => "not converged".to_string(),
        },
    });
    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::NetworkWorld;
    use crate::knowledge::NodeId;
    use crate::mdp::assemble;
    use crate::reward::RewardConfig;
    use crate::statespace::{GoalPredicate, StateSpace};

    fn small_mdp() -> KnowledgeMdp {
        let world = NetworkWorld::simworld().unwrap();
        let space = StateSpace::generate(&world, &GoalPredicate::root_on([NodeId::WebServer])).unwrap();
        assemble(space, &RewardConfig::default()).unwrap()
    }

    #[test]
    fn test_statistics() {
        let stats = Statistics::from_values(&[1.0, 2.0, 2.0, 3.0, 7.0]).unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 7.0);
        assert_eq!(stats.median, 2.0);
        assert_eq!(stats.mode, 2.0);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.097_617_696_340_303).abs() < 1e-9);
    }

    #[test]
    fn test_even_median_and_empty() {
        let stats = Statistics::from_counts(&[4, 1, 3, 2]).unwrap();
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.mode, 1.0);
        assert!(Statistics::from_values(&[]).is_none());
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(moving_average(&[1.0], 3).is_empty());
    }

    #[test]
    fn test_rmse() {
        let expected = HashMap::from([(StateId(0), 2.0), (StateId(1), 1.0)]);
        let runs = vec![
            HashMap::from([(StateId(0), 1.0), (StateId(1), 1.0)]),
            HashMap::from([(StateId(0), 3.0)]),
        ];
        let rmse = utility_rmse(&runs, &expected).unwrap();
        assert!((rmse[&StateId(0)] - 1.0).abs() < 1e-12);
        assert!((rmse[&StateId(1)] - 0.5f64.sqrt()).abs() < 1e-12);
        assert!(utility_rmse(&[], &expected).is_err());
    }

    #[test]
    fn test_random_walk_is_seeded() {
        let mdp = small_mdp();
        let first = random_walk(&mdp, 50, 7).unwrap();
        let second = random_walk(&mdp, 50, 7).unwrap();
        assert_eq!(first.episodes, 50);
        assert_eq!(first.best_path, second.best_path);
        assert_eq!(first.rewards, second.rewards);
        assert!(first.shortest_path.len() <= first.best_path.len());
        assert!(first.best_reward >= first.rewards.max - 1e-12);
        assert!(random_walk(&mdp, 0, 7).is_none());
    }

    #[test]
    fn test_policy_rows_hide_repeated_actor() {
        let mdp = small_mdp();
        let mut path = Vec::new();
        let mut state = mdp.initial();
        for _ in 0..2 {
            let action = mdp.actions(state)[0];
            path.push(PathStep { state, action: Some(action) });
            state = mdp.successor(state, 0);
        }
        let rows = policy_rows(&mdp, &path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].actor, "attacker");
        assert_eq!(rows[0].target, "router");
        assert!(rows[1].actor.is_empty());
        assert!(policy_table(&mdp, &path).contains("Technique"));
    }
}
