use super::host;
use crate::environment::{NetworkWorld, Software, Topology};
use crate::error::Result;
use crate::knowledge::{Exposure, KnowledgeState, NodeId, SoftwareFact};
use std::collections::BTreeSet;

fn fill_details(fact: &mut SoftwareFact, truth: &Software) {
    if fact.version.is_none() {
        fact.version = Some(truth.version.clone());
    }
    if fact.vulnerabilities.is_none() {
        fact.vulnerabilities = Some(truth.vulnerabilities.clone());
    }
}

fn learn_if_unknown(slot: &mut Option<String>, value: Option<&String>) {
    if slot.is_none() {
        *slot = value.cloned();
    }
}

pub(super) fn ip_scan_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    if state.is_start() {
        return if actor == world.attacker() {
            BTreeSet::from([world.perimeter()])
        } else {
            BTreeSet::new()
        };
    }
    world.reachable(actor)
}

pub(super) fn ip_scan(
    target: NodeId,
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let truth = host(world, target)?;
    let external = actor == world.attacker();
    let mut edit = state.edit();

    edit.discover(target);
    let node = edit.node(target);
    learn_if_unknown(&mut node.pub_ip, truth.pub_ip.as_ref());
    if node.hostname.is_none() {
        node.hostname = Some(truth.hostname.clone());
    }
    if !external {
        learn_if_unknown(&mut node.priv_ip, truth.priv_ip.as_ref());
    }

    if external && target == world.perimeter() {
        for forwarded in world.forwarded_targets() {
            let behind = host(world, *forwarded)?;
            edit.discover(*forwarded);
            let node = edit.node(*forwarded);
            learn_if_unknown(&mut node.pub_ip, behind.pub_ip.as_ref());
            if node.hostname.is_none() {
                node.hostname = Some(behind.hostname.clone());
            }
            for software in world.visible_remote_software(actor, *forwarded) {
                edit.learn_software(*forwarded, &software.name, Exposure::Remote);
            }
        }
    }

    for software in world.visible_remote_software(actor, target) {
        edit.learn_software(target, &software.name, Exposure::Remote);
    }

    Ok(edit.finish())
}

pub(super) fn vuln_scan_targets(
    state: &KnowledgeState,
    actor: NodeId,
    world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    world
        .reachable(actor)
        .into_iter()
        .filter(|t| {
            state.has_remote_software(*t)
                || (*t == world.perimeter() && !state.is_start() && state.is_discovered(*t))
        })
        .collect()
}

pub(super) fn vuln_scan(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let truth = host(world, target)?;
    let mut edit = state.edit();

    let node = edit.node(target);
    if node.os.is_none() {
        node.os = Some(truth.os.clone());
    }
    if node.os_version.is_none() {
        node.os_version = Some(truth.os_version.clone());
    }

    for fact in edit.software_mut(target) {
        if let Some(software) = truth.find_software(&fact.name) {
            fill_details(fact, software);
        }
    }

    Ok(edit.finish())
}

pub(super) fn software_discovery_targets(
    state: &KnowledgeState,
    actor: NodeId,
    _world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    if state.has_user_access(actor) {
        BTreeSet::from([actor])
    } else {
        BTreeSet::new()
    }
}

pub(super) fn software_discovery(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let truth = host(world, target)?;
    let mut edit = state.edit();
    for software in &truth.software {
        let fact = edit.learn_software(target, &software.name, software.exposure);
        fill_details(fact, software);
    }
    Ok(edit.finish())
}

pub(super) fn local_data_targets(
    state: &KnowledgeState,
    actor: NodeId,
    _world: &NetworkWorld,
) -> BTreeSet<NodeId> {
    if state.has_user_access(actor) {
        BTreeSet::from([actor])
    } else {
        BTreeSet::new()
    }
}

pub(super) fn collect_local_data(
    target: NodeId,
    state: &KnowledgeState,
    _actor: NodeId,
    world: &NetworkWorld,
) -> Result<KnowledgeState> {
    let truth = host(world, target)?;
    let access = state.access(target);
    let mut edit = state.edit();
    for (key, artifact) in &truth.data {
        if artifact.requires.satisfied_by(access) {
            edit.store_data(target, *key, artifact.clone());
        }
    }
    Ok(edit.finish())
}
