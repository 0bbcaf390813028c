//! Finite, deterministic Markov decision processes.
//!
//! States are interned into dense [`StateId`]s; an action is addressed by its
//! slot in the owning state's action list. The learner only ever sees ids and
//! slots, which keeps the hot loop free of state hashing.

mod assembler;

pub use assembler::{assemble, KnowledgeMdp};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub usize);

/// Reward record owned by a single state
pub trait StateReward<A> {
    /// Reward for leaving this state with `action` into the state owning
    /// `next`. With no action, the reward of ending the episode here.
    fn reward(&self, action: Option<&A>, next: Option<&Self>) -> f64;
}

#[derive(Debug, Clone)]
pub struct Mdp<S, A, R> {
    states: Vec<S>,
    index: HashMap<S, StateId>,
    rewards: Vec<R>,
    actions: Vec<Vec<A>>,
    successors: Vec<Vec<StateId>>,
    terminal: Vec<bool>,
    initial: StateId,
}

/// Plain owned contents of an [`Mdp`], used for snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdpParts<S, A, R> {
    pub states: Vec<S>,
    pub rewards: Vec<R>,
    pub actions: Vec<Vec<A>>,
    pub successors: Vec<Vec<StateId>>,
    pub terminal: Vec<bool>,
    pub initial: StateId,
}

#[derive(Debug, Serialize)]
pub struct MdpPartsRef<'a, S, A, R> {
    pub states: &'a [S],
    pub rewards: &'a [R],
    pub actions: &'a [Vec<A>],
    pub successors: &'a [Vec<StateId>],
    pub terminal: &'a [bool],
    pub initial: StateId,
}

impl<S, A, R> Mdp<S, A, R>
where
    S: Clone + Eq + Hash,
{
    /// Rebuilds an MDP from its parts, checking every table lines up.
    pub fn from_parts(parts: MdpParts<S, A, R>) -> Result<Self> {
        let n = parts.states.len();
        if parts.rewards.len() != n
            || parts.actions.len() != n
            || parts.successors.len() != n
            || parts.terminal.len() != n
        {
            return Err(Error::Structural(format!(
                "table sizes disagree: {} states, {} rewards, {} action lists, {} successor lists, {} terminal flags",
                n,
                parts.rewards.len(),
                parts.actions.len(),
                parts.successors.len(),
                parts.terminal.len()
            )));
        }
        if parts.initial.0 >= n {
            return Err(Error::Structural(format!("initial state #{} out of range", parts.initial.0)));
        }

        for id in 0..n {
            let (actions, successors) = (&parts.actions[id], &parts.successors[id]);
            if actions.len() != successors.len() {
                return Err(Error::Structural(format!(
                    "state #{} has {} actions but {} transitions",
                    id,
                    actions.len(),
                    successors.len()
                )));
            }
            if parts.terminal[id] && !actions.is_empty() {
                return Err(Error::Structural(format!("terminal state #{} has outgoing actions", id)));
            }
            if let Some(bad) = successors.iter().find(|s| s.0 >= n) {
                return Err(Error::Structural(format!(
                    "state #{} transitions to unknown state #{}",
                    id, bad.0
                )));
            }
        }

        let mut index = HashMap::with_capacity(n);
        for (id, state) in parts.states.iter().enumerate() {
            if index.insert(state.clone(), StateId(id)).is_some() {
                return Err(Error::Structural(format!("state #{} is a duplicate", id)));
            }
        }

        Ok(Self {
            states: parts.states,
            index,
            rewards: parts.rewards,
            actions: parts.actions,
            successors: parts.successors,
            terminal: parts.terminal,
            initial: parts.initial,
        })
    }

    pub fn id_of(&self, state: &S) -> Option<StateId> {
        self.index.get(state).copied()
    }
}

impl<S, A, R> Mdp<S, A, R> {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> &S {
        &self.states[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len()).map(StateId)
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn actions(&self, id: StateId) -> &[A] {
        &self.actions[id.0]
    }

    pub fn successor(&self, id: StateId, slot: usize) -> StateId {
        self.successors[id.0][slot]
    }

    pub fn is_terminal(&self, id: StateId) -> bool {
        self.terminal[id.0]
    }

    pub fn reward_record(&self, id: StateId) -> &R {
        &self.rewards[id.0]
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal.iter().filter(|t| **t).count()
    }

    pub fn transition_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    /// Borrowed view with the same serialized layout as [`MdpParts`]
    pub fn as_parts(&self) -> MdpPartsRef<'_, S, A, R> {
        MdpPartsRef {
            states: &self.states,
            rewards: &self.rewards,
            actions: &self.actions,
            successors: &self.successors,
            terminal: &self.terminal,
            initial: self.initial,
        }
    }
}

impl<S, A, R> Mdp<S, A, R>
where
    A: PartialEq,
{
    pub fn slot_of(&self, id: StateId, action: &A) -> Option<usize> {
        self.actions[id.0].iter().position(|a| a == action)
    }

    /// Successor of `action` taken in `id`; asking for an action the state
    /// does not offer is a structural defect.
    pub fn state_transition(&self, id: StateId, action: &A) -> Result<StateId> {
        self.slot_of(id, action)
            .map(|slot| self.successor(id, slot))
            .ok_or_else(|| {
                Error::Structural(format!("state #{} has no transition for the requested action", id.0))
            })
    }
}

impl<S, A, R> Mdp<S, A, R>
where
    R: StateReward<A>,
{
    /// Reward of taking `slot` in `id`, or of ending in `id` when `slot` is `None`
    pub fn reward(&self, id: StateId, slot: Option<usize>) -> f64 {
        let here = &self.rewards[id.0];
        match slot {
            None => here.reward(None, None),
            Some(slot) => {
                let next = self.successor(id, slot);
                here.reward(Some(&self.actions[id.0][slot]), Some(&self.rewards[next.0]))
            }
        }
    }
}

impl<S: PartialEq, A: PartialEq, R: PartialEq> PartialEq for Mdp<S, A, R> {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states
            && self.rewards == other.rewards
            && self.actions == other.actions
            && self.successors == other.successors
            && self.terminal == other.terminal
            && self.initial == other.initial
    }
}

/// Incremental construction of an [`Mdp`]
#[derive(Debug)]
pub struct MdpBuilder<S, A, R> {
    parts: MdpParts<S, A, R>,
    index: HashMap<S, StateId>,
}

impl<S, A, R> Default for MdpBuilder<S, A, R> {
    fn default() -> Self {
        Self {
            parts: MdpParts {
                states: Vec::new(),
                rewards: Vec::new(),
                actions: Vec::new(),
                successors: Vec::new(),
                terminal: Vec::new(),
                initial: StateId(0),
            },
            index: HashMap::new(),
        }
    }
}

impl<S, A, R> MdpBuilder<S, A, R>
where
    S: Clone + Eq + Hash,
    A: PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a state; a state seen before keeps its first reward record.
    pub fn add_state(&mut self, state: S, reward: R) -> StateId {
        if let Some(id) = self.index.get(&state) {
            return *id;
        }
        let id = StateId(self.parts.states.len());
        self.index.insert(state.clone(), id);
        self.parts.states.push(state);
        self.parts.rewards.push(reward);
        self.parts.actions.push(Vec::new());
        self.parts.successors.push(Vec::new());
        self.parts.terminal.push(false);
        id
    }

    pub fn add_transition(&mut self, from: StateId, action: A, to: StateId) -> Result<()> {
        let n = self.parts.states.len();
        if from.0 >= n || to.0 >= n {
            return Err(Error::Structural(format!(
                "transition #{} -> #{} references an unknown state",
                from.0, to.0
            )));
        }
        if self.parts.actions[from.0].contains(&action) {
            return Err(Error::Structural(format!("state #{} already offers this action", from.0)));
        }
        self.parts.actions[from.0].push(action);
        self.parts.successors[from.0].push(to);
        Ok(())
    }

    pub fn mark_terminal(&mut self, id: StateId) {
        if let Some(flag) = self.parts.terminal.get_mut(id.0) {
            *flag = true;
        }
    }

    pub fn build(mut self, initial: StateId) -> Result<Mdp<S, A, R>> {
        self.parts.initial = initial;
        Mdp::from_parts(self.parts)
    }
}
