use super::{Mdp, MdpBuilder, StateId};
use crate::attack::NodeAction;
use crate::error::Result;
use crate::knowledge::KnowledgeState;
use crate::reward::{consumes_zero_day, KnowledgeReward, RewardConfig};
use crate::statespace::StateSpace;
use std::collections::BTreeSet;

pub type KnowledgeMdp = Mdp<KnowledgeState, NodeAction, KnowledgeReward>;

/// Turns a generated closure into a knowledge MDP.
///
/// Goal states are terminal. With `failure_states_terminal`, every state
/// entered through a honeypot transition is terminal as well and loses its
/// outgoing actions.
pub fn assemble(space: StateSpace, config: &RewardConfig) -> Result<KnowledgeMdp> {
    config.weights.validate()?;
    let StateSpace { states, edges, goals } = space;

    let mut failed = vec![false; states.len()];
    if config.failure_states_terminal {
        for out in &edges {
            for (action, to) in out {
                if config.is_honeypot(action) {
                    failed[*to] = true;
                }
            }
        }
    }

    let mut builder = MdpBuilder::new();
    let mut ids = Vec::with_capacity(states.len());
    for (i, state) in states.into_iter().enumerate() {
        let out = &edges[i];
        let zero_day: BTreeSet<NodeAction> = out
            .iter()
            .filter(|(action, _)| consumes_zero_day(&state, action))
            .map(|(action, _)| *action)
            .collect();
        let honeypot: BTreeSet<NodeAction> = out
            .iter()
            .filter(|(action, _)| config.is_honeypot(action))
            .map(|(action, _)| *action)
            .collect();
        let reward = KnowledgeReward {
            root_count: state.root_count(),
            goal: goals[i],
            failed: failed[i],
            zero_day,
            honeypot,
            weights: config.weights,
        };
        ids.push(builder.add_state(state, reward));
    }

    let mut terminal = 0usize;
    for (i, out) in edges.iter().enumerate() {
        let from = ids[i];
        if goals[i] || failed[i] {
            builder.mark_terminal(from);
            terminal += 1;
            continue;
        }
        for (action, to) in out {
            builder.add_transition(from, *action, ids[*to])?;
        }
    }

    let initial = ids.first().copied().unwrap_or(StateId(0));
    let mdp = builder.build(initial)?;
    tracing::info!(
        "Assembled MDP: {} states, {} transitions, {} terminal",
        mdp.len(),
        mdp.transition_count(),
        terminal
    );
    Ok(mdp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::ActionKind;
    use crate::environment::NetworkWorld;
    use crate::knowledge::NodeId;
    use crate::reward::TransitionRule;
    use crate::statespace::GoalPredicate;

    fn small_space(world: &NetworkWorld) -> StateSpace {
        StateSpace::generate(world, &GoalPredicate::root_on([NodeId::WebServer])).unwrap()
    }

    #[test]
    fn test_every_action_has_a_transition() {
        let world = NetworkWorld::simworld().unwrap();
        let mdp = assemble(small_space(&world), &RewardConfig::default()).unwrap();

        for id in mdp.ids() {
            for action in mdp.actions(id) {
                let first = mdp.state_transition(id, action).unwrap();
                let second = mdp.state_transition(id, action).unwrap();
                assert_eq!(first, second);
                let replayed = action.apply(mdp.state(id), &world).unwrap();
                assert_eq!(&replayed, mdp.state(first));
            }
        }
    }

    #[test]
    fn test_cold_start_action() {
        let world = NetworkWorld::simworld().unwrap();
        let mdp = assemble(small_space(&world), &RewardConfig::default()).unwrap();
        assert_eq!(
            mdp.actions(mdp.initial()),
            &[NodeAction::new(NodeId::Attacker, NodeId::Router, ActionKind::IpPortScan)]
        );
        assert!(mdp.state(mdp.initial()).is_start());
    }

    #[test]
    fn test_honeypot_states_become_terminal() {
        let world = NetworkWorld::simworld().unwrap();
        let config = RewardConfig {
            honeypots: vec![TransitionRule {
                target: NodeId::WebServer,
                kind: ActionKind::VulnerabilityScan,
                actors: BTreeSet::from([NodeId::Attacker]),
            }],
            failure_states_terminal: true,
            ..RewardConfig::default()
        };
        let plain = assemble(small_space(&world), &RewardConfig::default()).unwrap();
        let trapped = assemble(small_space(&world), &config).unwrap();

        assert!(trapped.terminal_count() > plain.terminal_count());
        let failed = trapped
            .ids()
            .find(|id| trapped.reward_record(*id).failed)
            .unwrap();
        assert!(trapped.is_terminal(failed));
        assert!(trapped.actions(failed).is_empty());
        assert_eq!(trapped.reward(failed, None), -config.weights.failure_penalty);
    }
}
