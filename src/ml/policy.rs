use super::QTable;
use crate::error::{ConvergenceFailure, Error, Result};
use crate::mdp::{Mdp, StateId, StateReward};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep<A> {
    pub state: StateId,
    /// `None` on the final, terminal step
    pub action: Option<A>,
}

/// Follows the best learned action from the initial state until a terminal
/// state. No exploration; ties go to the lowest action slot.
///
/// The last `loop_window` states (at least one) are remembered, and a path
/// longer than the state count is always a loop.
pub fn greedy_path<S, A: Clone, R>(
    mdp: &Mdp<S, A, R>,
    q: &QTable,
    loop_window: usize,
) -> Result<Vec<PathStep<A>>> {
    let window = loop_window.max(1);
    let mut recent: VecDeque<StateId> = VecDeque::with_capacity(window);
    let mut path = Vec::new();
    let mut state = mdp.initial();

    loop {
        if mdp.is_terminal(state) {
            path.push(PathStep { state, action: None });
            return Ok(path);
        }
        if recent.contains(&state) || path.len() > mdp.len() {
            return Err(Error::Convergence(ConvergenceFailure::LoopDetected {
                state: state.0,
                window: loop_window,
            }));
        }

        let mut best: Option<(usize, f64)> = None;
        for slot in 0..mdp.actions(state).len() {
            if let Some(value) = q.get(state, Some(slot)) {
                if best.map_or(true, |(_, b)| value > b) {
                    best = Some((slot, value));
                }
            }
        }
        let Some((slot, _)) = best else {
            return Err(Error::Convergence(ConvergenceFailure::NoQualifyingAction {
                state: state.0,
            }));
        };

        path.push(PathStep {
            state,
            action: Some(mdp.actions(state)[slot].clone()),
        });
        if recent.len() == window {
            recent.pop_front();
        }
        recent.push_back(state);
        state = mdp.successor(state, slot);
    }
}

/// Summed reward along a path, including the terminal reward
pub fn path_reward<S, A: PartialEq, R: StateReward<A>>(mdp: &Mdp<S, A, R>, path: &[PathStep<A>]) -> f64 {
    path.iter()
        .map(|step| match &step.action {
            Some(action) => mdp
                .slot_of(step.state, action)
                .map_or(0.0, |slot| mdp.reward(step.state, Some(slot))),
            None => mdp.reward(step.state, None),
        })
        .sum()
}
