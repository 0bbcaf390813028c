use crate::attack::{ActionKind, NodeAction};
use crate::error::{Error, Result};
use crate::knowledge::{ExploitCategory, KnowledgeState, NodeId};
use crate::mdp::StateReward;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostTier {
    Low,
    Medium,
    High,
}

impl CostTier {
    pub fn of(kind: ActionKind) -> Self {
        match kind {
            ActionKind::IpPortScan
            | ActionKind::VulnerabilityScan
            | ActionKind::SoftwareDiscovery
            | ActionKind::ValidAccounts
            | ActionKind::DataFromLocalSystem => CostTier::Low,
            ActionKind::CreateAccount | ActionKind::ManInTheMiddle => CostTier::Medium,
            ActionKind::ExploitPublicFacingApplication
            | ActionKind::ExploitClientExecution
            | ActionKind::ExploitPrivilegeEscalation => CostTier::High,
        }
    }
}

/// Reward shaping constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub low_cost: f64,
    pub medium_cost: f64,
    pub high_cost: f64,
    /// Paid per node newly held at Root
    pub root_gain: f64,
    pub terminal_bonus: f64,
    pub zero_day_penalty: f64,
    pub failure_penalty: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            low_cost: 0.1,
            medium_cost: 0.2,
            high_cost: 0.3,
            root_gain: 1.0,
            terminal_bonus: 5.0,
            zero_day_penalty: 3.0,
            failure_penalty: 5.0,
        }
    }
}

impl RewardWeights {
    pub fn cost(&self, kind: ActionKind) -> f64 {
        match CostTier::of(kind) {
            CostTier::Low => self.low_cost,
            CostTier::Medium => self.medium_cost,
            CostTier::High => self.high_cost,
        }
    }

    /// Largest single-step reward; a sensible lower bound for `r_plus`.
    pub fn max_step_reward(&self, node_count: usize) -> f64 {
        self.root_gain * node_count as f64 + self.terminal_bonus
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("low_cost", self.low_cost),
            ("medium_cost", self.medium_cost),
            ("high_cost", self.high_cost),
            ("root_gain", self.root_gain),
            ("terminal_bonus", self.terminal_bonus),
            ("zero_day_penalty", self.zero_day_penalty),
            ("failure_penalty", self.failure_penalty),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config(field, format!("must be a finite value >= 0, got {}", value)));
            }
        }
        Ok(())
    }
}

/// A (target, technique, acting nodes) combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub target: NodeId,
    pub kind: ActionKind,
    pub actors: BTreeSet<NodeId>,
}

impl TransitionRule {
    pub fn matches(&self, action: &NodeAction) -> bool {
        action.target == self.target && action.kind == self.kind && self.actors.contains(&action.actor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub weights: RewardWeights,
    /// Trap transitions, penalised on use
    pub honeypots: Vec<TransitionRule>,
    /// States entered through a trap become absorbing failures
    pub failure_states_terminal: bool,
}

impl RewardConfig {
    pub fn is_honeypot(&self, action: &NodeAction) -> bool {
        self.honeypots.iter().any(|rule| rule.matches(action))
    }
}

/// True when the exploit can only work by burning a zero-day: every known
/// vulnerability of its category on the target is unpublished.
pub fn consumes_zero_day(state: &KnowledgeState, action: &NodeAction) -> bool {
    let category = match action.kind {
        ActionKind::ExploitPublicFacingApplication => ExploitCategory::PublicFacingApplication,
        ActionKind::ExploitClientExecution => ExploitCategory::ClientExecution,
        ActionKind::ExploitPrivilegeEscalation => ExploitCategory::PrivilegeEscalation,
        _ => return false,
    };
    let known = state.vulnerabilities_on(action.target, category);
    !known.is_empty() && known.iter().all(|v| v.zero_day)
}

/// Reward record attached to one knowledge state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeReward {
    pub root_count: usize,
    pub goal: bool,
    pub failed: bool,
    pub zero_day: BTreeSet<NodeAction>,
    pub honeypot: BTreeSet<NodeAction>,
    pub weights: RewardWeights,
}

impl KnowledgeReward {
    pub fn consumes_zero_day(&self, action: &NodeAction) -> bool {
        self.zero_day.contains(action)
    }

    pub fn is_honeypot(&self, action: &NodeAction) -> bool {
        self.honeypot.contains(action)
    }
}

impl StateReward<NodeAction> for KnowledgeReward {
    fn reward(&self, action: Option<&NodeAction>, next: Option<&Self>) -> f64 {
        let (Some(action), Some(next)) = (action, next) else {
            return if self.goal {
                self.weights.terminal_bonus
            } else if self.failed {
                -self.weights.failure_penalty
            } else {
                0.0
            };
        };

        let gained = next.root_count as f64 - self.root_count as f64;
        let mut value = gained * self.weights.root_gain;
        if next.goal {
            value += self.weights.terminal_bonus;
        }

        let mut cost = self.weights.cost(action.kind);
        if self.consumes_zero_day(action) {
            cost += self.weights.zero_day_penalty;
        }
        if self.is_honeypot(action) {
            cost += self.weights.failure_penalty;
        }
        value - cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::NetworkWorld;
    use crate::knowledge::AccessLevel;

    fn record(root_count: usize, goal: bool) -> KnowledgeReward {
        KnowledgeReward {
            root_count,
            goal,
            failed: false,
            zero_day: BTreeSet::new(),
            honeypot: BTreeSet::new(),
            weights: RewardWeights::default(),
        }
    }

    #[test]
    fn test_every_kind_has_a_cost() {
        let weights = RewardWeights::default();
        for kind in ActionKind::ALL {
            assert!(weights.cost(kind) > 0.0, "{} has no cost", kind);
        }
        assert_eq!(weights.cost(ActionKind::IpPortScan), 0.1);
        assert_eq!(weights.cost(ActionKind::CreateAccount), 0.2);
        assert_eq!(weights.cost(ActionKind::ExploitPrivilegeEscalation), 0.3);
    }

    #[test]
    fn test_terminal_rewards() {
        assert_eq!(record(3, true).reward(None, None), 5.0);
        assert_eq!(record(1, false).reward(None, None), 0.0);
        let mut failed = record(1, false);
        failed.failed = true;
        assert_eq!(failed.reward(None, None), -5.0);
    }

    #[test]
    fn test_root_gain_minus_cost() {
        let action = NodeAction::new(
            NodeId::WebServer,
            NodeId::WebServer,
            ActionKind::ExploitPrivilegeEscalation,
        );
        let reward = record(1, false).reward(Some(&action), Some(&record(2, false)));
        assert!((reward - 0.7).abs() < 1e-12);

        let to_goal = record(1, false).reward(Some(&action), Some(&record(2, true)));
        assert!((to_goal - 5.7).abs() < 1e-12);
    }

    #[test]
    fn test_flagged_transitions_are_penalised() {
        let action = NodeAction::new(NodeId::Attacker, NodeId::AdminPc, ActionKind::ExploitClientExecution);
        let mut here = record(1, false);
        here.zero_day.insert(action);
        here.honeypot.insert(action);
        let reward = here.reward(Some(&action), Some(&record(1, false)));
        assert!((reward - (-0.3 - 3.0 - 5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_day_derived_from_vulnerability_record() {
        let world = NetworkWorld::simworld().unwrap();
        let start = KnowledgeState::start(world.attacker(), world.perimeter());
        let mut edit = start.edit();
        edit.node(NodeId::AdminPc).raise_access(AccessLevel::User);
        let state = edit.finish();
        let state = ActionKind::SoftwareDiscovery
            .apply(NodeId::AdminPc, &state, NodeId::AdminPc, &world)
            .unwrap();

        let zero_day = NodeAction::new(NodeId::Attacker, NodeId::AdminPc, ActionKind::ExploitClientExecution);
        let public = NodeAction::new(NodeId::AdminPc, NodeId::AdminPc, ActionKind::ExploitPrivilegeEscalation);
        assert!(consumes_zero_day(&state, &zero_day));
        assert!(!consumes_zero_day(&state, &public));
    }

    #[test]
    fn test_weights_reject_negative() {
        let weights = RewardWeights {
            high_cost: -1.0,
            ..RewardWeights::default()
        };
        assert!(matches!(weights.validate(), Err(Error::Configuration { field: "high_cost", .. })));
    }
}
