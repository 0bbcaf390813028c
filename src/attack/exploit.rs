use super::host;
use crate::environment::{NetworkWorld, Topology};
use crate::error::Result;
use crate::knowledge::{
    AccessLevel, AccessRequirement, Credential, CredentialKind, DataArtifact, DataContent,
    DataOrigin, ExploitCategory, KnowledgeState, NodeId,
};
use std::collections::BTreeSet;

/// Data key of the account fabricated by create-account
pub const CREATED_ACCOUNT_KEY: u32 = u32::MAX;

fn remote_exploit_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
    category: ExploitCategory,
) -> BTreeSet<NodeId> {
    world
        .reachable(actor)
        .into_iter()
        .filter(|t| !state.has_root_access(*t) && !state.vulnerabilities_on(*t, category).is_empty())
        .collect()
}

pub(super) fn public_facing_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    remote_exploit_targets(state, actor, world, ExploitCategory::PublicFacingApplication)
}

pub(super) fn client_execution_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    remote_exploit_targets(state, actor, world, ExploitCategory::ClientExecution)
}

/// Shared effect of the remote exploits: a user shell on the target.
pub(super) fn gain_user(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let truth = host(world, target)?;
    let mut edit = state.edit();
    let node = edit.node(target);
    node.raise_access(AccessLevel::User);
    if node.priv_ip.is_none() {
        node.priv_ip = truth.priv_ip.clone();
    }
    Ok(edit.finish())
}

pub(super) fn privilege_escalation_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    let mut candidates = world.reachable(actor);
    candidates.insert(actor);
    candidates
        .into_iter()
        .filter(|t| {
            state.access(*t) == AccessLevel::User
                && !state
                    .vulnerabilities_on(*t, ExploitCategory::PrivilegeEscalation)
                    .is_empty()
        })
        .collect()
}

pub(super) fn privilege_escalation(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    _world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let mut edit = state.edit();
    edit.node(target).raise_access(AccessLevel::Root);
    Ok(edit.finish())
}

pub(super) fn valid_accounts_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    let reachable = world.reachable(actor);
    state
        .known_credentials()
        .into_iter()
        .map(|c| c.target)
        .filter(|t| state.is_discovered(*t) && reachable.contains(t))
        .collect()
}

pub(super) fn valid_accounts(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let truth = host(world, target)?;
    let grant = state
        .known_credentials()
        .into_iter()
        .filter(|c| c.target == target)
        .map(|c| c.grant)
        .max()
        .unwrap_or(AccessLevel::None);

    let mut edit = state.edit();
    let node = edit.node(target);
    node.raise_access(grant);
    if node.priv_ip.is_none() {
        node.priv_ip = truth.priv_ip.clone();
    }
    Ok(edit.finish())
}

pub(super) fn create_account_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    if actor != world.attacker() && state.has_root_access(actor) {
        BTreeSet::from([actor])
    } else {
        BTreeSet::new()
    }
}

pub(super) fn create_account(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    _world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let account = DataArtifact {
        content: DataContent::Credential(Credential {
            kind: CredentialKind::Password,
            grant: AccessLevel::Root,
            target,
            service: "local-account".to_string(),
        }),
        origin: DataOrigin::Created,
        requires: AccessRequirement::Root,
    };
    let mut edit = state.edit();
    edit.store_data(target, CREATED_ACCOUNT_KEY, account);
    Ok(edit.finish())
}
