use attack_knowledge_mdp::*;
use attack_knowledge_mdp::knowledge::Exposure;
use attack_knowledge_mdp::ml::greedy_path;
use attack_knowledge_mdp::persistence;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

fn world() -> NetworkWorld {
    NetworkWorld::simworld().unwrap()
}

fn small_mdp(world: &NetworkWorld) -> KnowledgeMdp {
    let space = StateSpace::generate(world, &GoalPredicate::root_on([NodeId::WebServer])).unwrap();
    assemble(space, &RewardConfig::default()).unwrap()
}

fn quick_parameters(seed: u64) -> LearningParameters {
    LearningParameters {
        seed,
        iterations: 20_000,
        initial_state_iterations: 2_000,
        log_every: 0,
        ..LearningParameters::default()
    }
}

fn hash_of(state: &KnowledgeState) -> u64 {
    let mut hasher = DefaultHasher::new();
    state.hash(&mut hasher);
    hasher.finish()
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("akmdp-it-{}-{}", std::process::id(), name))
}

#[test]
fn test_transitions_are_deterministic() {
    let world = world();
    let mdp = small_mdp(&world);
    for id in mdp.ids() {
        for action in mdp.actions(id) {
            let a = mdp.state_transition(id, action).unwrap();
            let b = mdp.state_transition(id, action).unwrap();
            assert_eq!(mdp.state(a), mdp.state(b));
        }
    }
}

#[test]
fn test_actions_are_idempotent_and_never_no_ops() {
    let world = world();
    let mdp = small_mdp(&world);
    for id in mdp.ids() {
        let state = mdp.state(id);
        for action in mdp.actions(id) {
            let next = action.apply(state, &world).unwrap();
            assert_ne!(&next, state, "{} is a no-op", action);
            let again = action.apply(&next, &world).unwrap();
            assert_eq!(again, next, "{} changed knowledge twice", action);
        }
    }
}

#[test]
fn test_insertion_order_does_not_matter() {
    let world = world();
    let start = KnowledgeState::start(world.attacker(), world.perimeter());

    let mut first = start.edit();
    first.discover(NodeId::WebServer);
    first.learn_software(NodeId::WebServer, "nginx", Exposure::Remote);
    first.learn_software(NodeId::WebServer, "PHP", Exposure::Remote);
    first.node(NodeId::WebServer).hostname = Some("webserver.simworld.com".to_string());
    let first = first.finish();

    let mut second = start.edit();
    second.node(NodeId::WebServer).hostname = Some("webserver.simworld.com".to_string());
    second.learn_software(NodeId::WebServer, "PHP", Exposure::Remote);
    second.discover(NodeId::WebServer);
    second.learn_software(NodeId::WebServer, "nginx", Exposure::Remote);
    let second = second.finish();

    assert_eq!(first, second);
    assert_eq!(hash_of(&first), hash_of(&second));
    assert_ne!(first, start);
}

#[test]
fn test_access_never_decreases() {
    let world = world();
    let mdp = small_mdp(&world);
    for id in mdp.ids() {
        let before = mdp.state(id);
        for slot in 0..mdp.actions(id).len() {
            let after = mdp.state(mdp.successor(id, slot));
            for node in before.tracked_nodes() {
                assert!(after.access(node) >= before.access(node));
                assert!(after.is_discovered(node) || !before.is_discovered(node));
            }
        }
    }
}

#[test]
fn test_full_closure_is_stable() {
    let world = world();
    let goal = GoalPredicate::default();
    let first = StateSpace::generate(&world, &goal).unwrap();
    let second = StateSpace::generate(&world, &goal).unwrap();

    assert!(first.goal_count() > 0);
    assert_eq!(first.len(), second.len());
    assert_eq!(first.transition_count(), second.transition_count());
    assert_eq!(first.states, second.states);
}

#[test]
fn test_learning_is_reproducible() {
    let world = world();
    let mdp = small_mdp(&world);

    let mut a = QLearningAgent::new(&mdp, quick_parameters(11)).unwrap();
    let mut b = QLearningAgent::new(&mdp, quick_parameters(11)).unwrap();
    a.run();
    b.run();

    let (qa, qb) = (a.q_table().entries(), b.q_table().entries());
    assert_eq!(qa.len(), qb.len());
    for (x, y) in qa.iter().zip(&qb) {
        assert_eq!((x.state, x.action), (y.state, y.action));
        assert_eq!(x.value.to_bits(), y.value.to_bits());
    }
}

#[test]
fn test_cold_start_has_one_action() {
    let world = world();
    let start = KnowledgeState::start(world.attacker(), world.perimeter());
    let legal = NodeAction::legal_actions(&start, &world).unwrap();
    assert_eq!(legal.len(), 1);
    assert_eq!(
        legal[0].0,
        NodeAction::new(NodeId::Attacker, NodeId::Router, ActionKind::IpPortScan)
    );
}

#[test]
fn test_untrained_table_yields_no_path() {
    let world = world();
    let mdp = small_mdp(&world);
    let err = greedy_path(&mdp, &QTable::default(), 10).unwrap_err();
    assert!(matches!(
        err,
        Error::Convergence(ConvergenceFailure::NoQualifyingAction { .. })
    ));
}

#[test]
fn test_credential_reuse() {
    let world = world();
    let start = KnowledgeState::start(world.attacker(), world.perimeter());
    let scanned = ActionKind::IpPortScan
        .apply(NodeId::Router, &start, NodeId::Attacker, &world)
        .unwrap();
    let mut edit = scanned.edit();
    edit.node(NodeId::AdminPc).raise_access(AccessLevel::Root);
    let admin_rooted = edit.finish();

    assert!(ActionKind::ValidAccounts
        .applicable_targets(&admin_rooted, NodeId::AdminPc, &world)
        .is_empty());

    // adminpc holds a key for the webserver
    let looted = ActionKind::DataFromLocalSystem
        .apply(NodeId::AdminPc, &admin_rooted, NodeId::AdminPc, &world)
        .unwrap();
    assert!(ActionKind::ValidAccounts
        .applicable_targets(&looted, NodeId::AdminPc, &world)
        .contains(&NodeId::WebServer));
    let reused = ActionKind::ValidAccounts
        .apply(NodeId::WebServer, &looted, NodeId::AdminPc, &world)
        .unwrap();
    assert!(reused.has_user_access(NodeId::WebServer));

    // the webserver's password file then upgrades the same account
    let local = ActionKind::DataFromLocalSystem
        .apply(NodeId::WebServer, &reused, NodeId::WebServer, &world)
        .unwrap();
    let rooted = ActionKind::ValidAccounts
        .apply(NodeId::WebServer, &local, NodeId::AdminPc, &world)
        .unwrap();
    assert!(rooted.has_root_access(NodeId::WebServer));
}

#[test]
fn test_learned_policy_reaches_goal() {
    let world = world();
    let mdp = small_mdp(&world);
    let mut agent = QLearningAgent::new(&mdp, quick_parameters(0)).unwrap();
    agent.run();

    let path = agent.preferred_path(mdp.len()).unwrap();
    let last = path.last().unwrap();
    assert!(last.action.is_none());
    assert!(mdp.reward_record(last.state).goal);
    assert!(mdp.state(last.state).has_root_access(NodeId::WebServer));
    assert_eq!(
        path[0].action,
        Some(NodeAction::new(NodeId::Attacker, NodeId::Router, ActionKind::IpPortScan))
    );
}

#[test]
fn test_pipeline_with_snapshots() {
    let dir = temp_dir("pipeline");
    let config = SimulationConfig {
        goal: GoalPredicate::root_on([NodeId::WebServer]),
        runs: vec![LearningParameters {
            iterations: 2_000,
            initial_state_iterations: 200,
            log_every: 0,
            ..LearningParameters::default()
        }],
        mdp_path: Some(dir.join("mdp.bin")),
        output_dir: Some(dir.clone()),
        ..SimulationConfig::default()
    };
    let simulator = Simulator::simworld(config).unwrap();

    let built = simulator.load_or_build_mdp().unwrap();
    assert!(dir.join("mdp.bin").exists());
    let loaded = simulator.load_or_build_mdp().unwrap();
    assert_eq!(built, loaded);

    let cancel = AtomicBool::new(false);
    let runs = simulator.learn_all(&loaded, &cancel).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].outcome.episodes, 2_200);

    let saved: FullRun<NodeAction> = FullRun::load(dir.join("run-0.json")).unwrap().unwrap();
    assert_eq!(saved, runs[0].snapshot);
    assert_eq!(saved.rewards.len(), 2_200);
    let restored = saved.q_table().unwrap();
    assert_eq!(restored.entries(), saved.q.clone().unwrap());

    let reloaded: Option<KnowledgeMdp> = persistence::load_mdp(dir.join("missing.bin")).unwrap();
    assert!(reloaded.is_none());

    std::fs::remove_dir_all(&dir).unwrap();
}
