//! Tabular Q-learning over an [`Mdp`].
//!
//! The agent follows the exploratory Q-learning scheme of AIMA (21.8) with two
//! additions: epsilon-greedy selection whose epsilon anneals over the episode
//! counter, and a learning rate that anneals per state-action visit count.
//! Both schedules share the [`schedule::concession`] curve.

mod params;
mod policy;
pub mod schedule;

pub use params::LearningParameters;
pub use policy::{greedy_path, path_reward, PathStep};

use crate::error::Result;
use crate::mdp::{Mdp, StateId, StateReward};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key of a Q-table entry: a state and an action slot, or no action for the
/// value of ending in a terminal state.
pub type QKey = (StateId, Option<usize>);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub state: StateId,
    pub action: Option<usize>,
    pub value: f64,
}

/// Learned action values; absent entries read as unknown
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QTable {
    values: HashMap<QKey, f64>,
}

impl QTable {
    pub fn get(&self, state: StateId, action: Option<usize>) -> Option<f64> {
        self.values.get(&(state, action)).copied()
    }

    pub fn set(&mut self, state: StateId, action: Option<usize>, value: f64) {
        self.values.insert((state, action), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Entries sorted by state then action, terminal values first
    pub fn entries(&self) -> Vec<QEntry> {
        let mut entries: Vec<QEntry> = self
            .values
            .iter()
            .map(|(&(state, action), &value)| QEntry { state, action, value })
            .collect();
        entries.sort_by_key(|e| (e.state, e.action));
        entries
    }

    pub fn from_entries(entries: &[QEntry]) -> Self {
        Self {
            values: entries.iter().map(|e| ((e.state, e.action), e.value)).collect(),
        }
    }

    /// U(s) = max over the entries of s
    pub fn utility(&self) -> HashMap<StateId, f64> {
        let mut utility: HashMap<StateId, f64> = HashMap::new();
        for (&(state, _), &value) in &self.values {
            utility
                .entry(state)
                .and_modify(|u| *u = u.max(value))
                .or_insert(value);
        }
        utility
    }
}

/// Visit counts per state-action pair
#[derive(Debug, Clone, Default)]
pub struct VisitCounter {
    counts: HashMap<(StateId, usize), u32>,
}

impl VisitCounter {
    pub fn count(&self, state: StateId, action: usize) -> u32 {
        self.counts.get(&(state, action)).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, state: StateId, action: usize) -> u32 {
        let count = self.counts.entry((state, action)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub episodes: usize,
    pub cancelled: bool,
}

pub struct QLearningAgent<'a, S, A, R> {
    mdp: &'a Mdp<S, A, R>,
    params: LearningParameters,
    q: QTable,
    nsa: VisitCounter,
    rng: StdRng,
    rewards: Vec<(usize, f64)>,
}

impl<'a, S, A, R> QLearningAgent<'a, S, A, R>
where
    A: Clone,
    R: StateReward<A>,
{
    pub fn new(mdp: &'a Mdp<S, A, R>, params: LearningParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            mdp,
            rng: StdRng::seed_from_u64(params.seed),
            params,
            q: QTable::default(),
            nsa: VisitCounter::default(),
            rewards: Vec::new(),
        })
    }

    /// Swaps in new hyperparameters and reseeds; learned values are kept.
    pub fn set_parameters(&mut self, params: LearningParameters) -> Result<()> {
        params.validate()?;
        self.rng = StdRng::seed_from_u64(params.seed);
        self.params = params;
        Ok(())
    }

    pub fn parameters(&self) -> &LearningParameters {
        &self.params
    }

    pub fn mdp(&self) -> &'a Mdp<S, A, R> {
        self.mdp
    }

    pub fn q_table(&self) -> &QTable {
        &self.q
    }

    /// Warm start from persisted values
    pub fn load_q(&mut self, q: QTable) {
        self.q = q;
    }

    /// `(episode, summed reward)` for each episode run so far
    pub fn reward_trace(&self) -> &[(usize, f64)] {
        &self.rewards
    }

    pub fn utility(&self) -> HashMap<StateId, f64> {
        self.q.utility()
    }

    pub fn reset(&mut self) {
        self.q.clear();
        self.nsa.clear();
        self.rewards.clear();
    }

    pub fn run(&mut self) -> RunOutcome {
        self.run_with_cancel(&AtomicBool::new(false))
    }

    /// Runs every configured episode, checking `cancel` between episodes.
    pub fn run_with_cancel(&mut self, cancel: &AtomicBool) -> RunOutcome {
        let total = self.params.total_episodes();
        tracing::info!(
            "Learning for {} episodes ({} from the initial state)",
            total,
            self.params.initial_state_iterations
        );

        for episode in 0..total {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!("Learning cancelled after {} of {} episodes", episode, total);
                return RunOutcome {
                    episodes: episode,
                    cancelled: true,
                };
            }

            let start = if episode < self.params.iterations {
                StateId(self.rng.gen_range(0..self.mdp.len()))
            } else {
                self.mdp.initial()
            };
            let reward = self.run_episode(start, episode);
            self.rewards.push((episode, reward));

            if self.params.log_every > 0 && episode % self.params.log_every == 0 {
                tracing::info!(
                    "Episode {}: reward = {:.3}, epsilon = {:.4}, q entries = {}",
                    episode,
                    reward,
                    self.epsilon(episode),
                    self.q.len()
                );
            }
        }

        RunOutcome {
            episodes: total,
            cancelled: false,
        }
    }

    /// One trajectory from `start` until a terminal or dead-end state.
    fn run_episode(&mut self, start: StateId, episode: usize) -> f64 {
        let mdp = self.mdp;
        let gamma = self.params.discount_factor;
        let mut state = start;
        let mut total = 0.0;
        let mut steps = 0usize;

        loop {
            if mdp.is_terminal(state) {
                let r = mdp.reward(state, None);
                self.q.set(state, None, r);
                total += r;
                break;
            }
            if mdp.actions(state).is_empty() {
                break;
            }
            if self.params.max_steps_per_episode.is_some_and(|max| steps >= max) {
                break;
            }

            let slot = self.select_action(state, episode);
            let next = mdp.successor(state, slot);
            let r = mdp.reward(state, Some(slot));

            if mdp.is_terminal(next) {
                self.q.set(next, None, mdp.reward(next, None));
            }

            let count = self.nsa.increment(state, slot);
            let q_sa = self.q.get(state, Some(slot)).unwrap_or(0.0);
            let updated = q_sa + self.alpha(count) * (r + gamma * self.max_q(next) - q_sa);
            self.q.set(state, Some(slot), updated);

            total += r;
            state = next;
            steps += 1;
        }
        total
    }

    fn alpha(&self, count: u32) -> f64 {
        let p = &self.params;
        let t = schedule::progress(count as usize, p.learning_rate_max_count as usize);
        schedule::concession(p.learning_rate_end, p.learning_rate_start, p.learning_rate_slope, t)
    }

    pub fn epsilon(&self, episode: usize) -> f64 {
        let p = &self.params;
        let t = schedule::progress(episode, p.total_episodes());
        schedule::concession(p.epsilon_end, p.epsilon_start, p.epsilon_slope, t)
    }

    /// Optimistic exploration value f(u, n)
    fn exploration_value(&self, q: Option<f64>, visits: u32) -> f64 {
        match q {
            Some(u) if visits >= self.params.ne => u,
            _ => self.params.r_plus,
        }
    }

    fn max_q(&self, state: StateId) -> f64 {
        if self.mdp.is_terminal(state) {
            return self.q.get(state, None).unwrap_or(0.0);
        }
        (0..self.mdp.actions(state).len())
            .filter_map(|slot| self.q.get(state, Some(slot)))
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    fn select_action(&mut self, state: StateId, episode: usize) -> usize {
        let n = self.mdp.actions(state).len();
        if self.rng.gen::<f64>() < self.epsilon(episode) {
            return self.rng.gen_range(0..n);
        }

        let values: Vec<f64> = (0..n)
            .map(|slot| self.exploration_value(self.q.get(state, Some(slot)), self.nsa.count(state, slot)))
            .collect();
        let best = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<usize> = (0..n)
            .filter(|slot| values[*slot] >= best - self.params.error)
            .collect();
        tied[self.rng.gen_range(0..tied.len())]
    }

    /// Greedy path from the initial state under the current Q-table
    pub fn preferred_path(&self, loop_window: usize) -> Result<Vec<PathStep<A>>> {
        greedy_path(self.mdp, &self.q, loop_window)
    }
}
