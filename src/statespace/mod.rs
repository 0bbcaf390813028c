//! Reachable closure of knowledge states.

use crate::attack::NodeAction;
use crate::environment::NetworkWorld;
use crate::error::Result;
use crate::knowledge::{KnowledgeState, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// When the attacker has won
///
/// Fields left out of a config table impose no condition; the full default
/// goal applies only when the table is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPredicate {
    /// Root required on each of these nodes
    #[serde(default)]
    pub root_on: BTreeSet<NodeId>,
    /// Every data artifact stored on these nodes must have been collected
    #[serde(default)]
    pub data_read: BTreeSet<NodeId>,
    /// Public IP, private IP, hostname and OS of every non-attacker node known
    #[serde(default)]
    pub network_known: bool,
}

impl Default for GoalPredicate {
    fn default() -> Self {
        Self {
            root_on: BTreeSet::from([NodeId::WebServer, NodeId::AdminPc, NodeId::Database]),
            data_read: BTreeSet::from([NodeId::Database]),
            network_known: true,
        }
    }
}

impl GoalPredicate {
    pub fn root_on(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            root_on: nodes.into_iter().collect(),
            data_read: BTreeSet::new(),
            network_known: false,
        }
    }

    pub fn is_goal(&self, state: &KnowledgeState, world: &NetworkWorld) -> bool {
        if !self.root_on.iter().all(|n| state.has_root_access(*n)) {
            return false;
        }

        let data_read = self.data_read.iter().all(|n| {
            let known = state.node(*n).map(|k| &k.data);
            world.host(*n).map_or(true, |host| {
                host.data
                    .keys()
                    .all(|key| known.map_or(false, |d| d.contains_key(key)))
            })
        });
        if !data_read {
            return false;
        }

        !self.network_known
            || world.targets().all(|n| {
                state.node(n).map_or(false, |k| {
                    k.has_pub_ip() && k.has_priv_ip() && k.has_hostname() && k.has_os()
                })
            })
    }
}

/// Output of the closure: states in discovery order (start first) with
/// their change-producing outgoing actions.
#[derive(Debug, Clone)]
pub struct StateSpace {
    pub states: Vec<KnowledgeState>,
    pub edges: Vec<Vec<(NodeAction, usize)>>,
    pub goals: Vec<bool>,
}

impl StateSpace {
    /// Breadth-first closure from the start state. Goal states are recorded
    /// but not expanded.
    pub fn generate(world: &NetworkWorld, goal: &GoalPredicate) -> Result<Self> {
        let start = KnowledgeState::start(world.attacker(), world.perimeter());
        let mut space = StateSpace {
            states: Vec::new(),
            edges: Vec::new(),
            goals: Vec::new(),
        };
        let mut index: HashMap<KnowledgeState, usize> = HashMap::new();

        space.push(start.clone(), goal.is_goal(&start, world));
        index.insert(start, 0);

        let mut layer = vec![0usize];
        let mut depth = 0;
        while !layer.is_empty() {
            let mut next_layer = Vec::new();
            for id in layer {
                if space.goals[id] {
                    continue;
                }
                let legal = NodeAction::legal_actions(&space.states[id], world)?;
                let mut out = Vec::with_capacity(legal.len());
                for (action, next) in legal {
                    let to = match index.get(&next) {
                        Some(&existing) => existing,
                        None => {
                            let fresh = space.states.len();
                            let is_goal = goal.is_goal(&next, world);
                            space.push(next.clone(), is_goal);
                            index.insert(next, fresh);
                            next_layer.push(fresh);
                            fresh
                        }
                    };
                    out.push((action, to));
                }
                space.edges[id] = out;
            }
            depth += 1;
            tracing::debug!(
                "Depth {}: {} new states, {} total",
                depth,
                next_layer.len(),
                space.states.len()
            );
            layer = next_layer;
        }

        tracing::info!(
            "Generated {} states ({} goal) and {} transitions",
            space.len(),
            space.goal_count(),
            space.transition_count()
        );
        Ok(space)
    }

    fn push(&mut self, state: KnowledgeState, goal: bool) {
        self.states.push(state);
        self.edges.push(Vec::new());
        self.goals.push(goal);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn goal_count(&self) -> usize {
        self.goals.iter().filter(|g| **g).count()
    }

    pub fn transition_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }
}
