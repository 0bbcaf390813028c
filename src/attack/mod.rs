//! Attacker techniques as pure knowledge transformations.
//!
//! Each [`ActionKind`] resolves to a pair of functions through a static table:
//! one lists the targets the technique may be used on, the other computes the
//! successor state. Both read the world; neither mutates anything.

mod exploit;
mod recon;

use crate::environment::{Host, NetworkWorld};
use crate::error::{Error, Result};
use crate::knowledge::{KnowledgeState, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use exploit::CREATED_ACCOUNT_KEY;

/// The technique catalog, loosely following MITRE ATT&CK
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    IpPortScan,
    VulnerabilityScan,
    ExploitPublicFacingApplication,
    ExploitClientExecution,
    ExploitPrivilegeEscalation,
    ValidAccounts,
    CreateAccount,
    DataFromLocalSystem,
    SoftwareDiscovery,
    ManInTheMiddle,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::IpPortScan,
        ActionKind::VulnerabilityScan,
        ActionKind::ExploitPublicFacingApplication,
        ActionKind::ExploitClientExecution,
        ActionKind::ExploitPrivilegeEscalation,
        ActionKind::ValidAccounts,
        ActionKind::CreateAccount,
        ActionKind::DataFromLocalSystem,
        ActionKind::SoftwareDiscovery,
        ActionKind::ManInTheMiddle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::IpPortScan => "ip-port-scan",
            ActionKind::VulnerabilityScan => "vulnerability-scan",
            ActionKind::ExploitPublicFacingApplication => "exploit-public-facing-application",
            ActionKind::ExploitClientExecution => "exploit-client-execution",
            ActionKind::ExploitPrivilegeEscalation => "exploit-privilege-escalation",
            ActionKind::ValidAccounts => "valid-accounts",
            ActionKind::CreateAccount => "create-account",
            ActionKind::DataFromLocalSystem => "data-from-local-system",
            ActionKind::SoftwareDiscovery => "software-discovery",
            ActionKind::ManInTheMiddle => "man-in-the-middle",
        }
    }

    /// ATT&CK technique id
    pub fn technique_id(&self) -> &'static str {
        match self {
            ActionKind::IpPortScan => "T1595.001",
            ActionKind::VulnerabilityScan => "T1595.002",
            ActionKind::ExploitPublicFacingApplication => "T1190",
            ActionKind::ExploitClientExecution => "T1203",
            ActionKind::ExploitPrivilegeEscalation => "T1068",
            ActionKind::ValidAccounts => "T1078",
            ActionKind::CreateAccount => "T1136",
            ActionKind::DataFromLocalSystem => "T1005",
            ActionKind::SoftwareDiscovery => "T1518",
            ActionKind::ManInTheMiddle => "T1557",
        }
    }

    pub fn is_exploit(&self) -> bool {
        matches!(
            self,
            ActionKind::ExploitPublicFacingApplication
                | ActionKind::ExploitClientExecution
                | ActionKind::ExploitPrivilegeEscalation
        )
    }

    pub fn rules(&self) -> &'static dyn ActionRules {
        &RULES[*self as usize]
    }

    pub fn applicable_targets(
        &self,
        state: &KnowledgeState,
        actor: NodeId,
        world: &NetworkWorld,
    ) -> BTreeSet<NodeId> {
        self.rules().applicable_targets(state, actor, world)
    }

    pub fn apply(
        &self,
        target: NodeId,
        state: &KnowledgeState,
        actor: NodeId,
        world: &NetworkWorld,
    ) -> Result<KnowledgeState> {
        self.rules().apply(target, state, actor, world)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Precondition and postcondition of one technique
pub trait ActionRules: Sync {
    /// Targets the technique may currently be used on while standing on `actor`
    fn applicable_targets(
        &self,
        state: &KnowledgeState,
        actor: NodeId,
        world: &NetworkWorld,
    ) -> BTreeSet<NodeId>;

    /// Successor knowledge. Never removes a fact; applying the same
    /// `(target, actor)` to the result changes nothing further.
    fn apply(
        &self,
        target: NodeId,
        state: &KnowledgeState,
        actor: NodeId,
        world: &NetworkWorld,
    ) -> Result<KnowledgeState>;
}

type TargetsFn = fn(&KnowledgeState, NodeId, &NetworkWorld) -> BTreeSet<NodeId>;
type ApplyFn = fn(NodeId, &KnowledgeState, NodeId, &NetworkWorld) -> Result<KnowledgeState>;

struct Rule {
    targets: TargetsFn,
    apply: ApplyFn,
}

impl ActionRules for Rule {
    fn applicable_targets(
        &self,
        state: &KnowledgeState,
        actor: NodeId,
        world: &NetworkWorld,
    ) -> BTreeSet<NodeId> {
        (self.targets)(state, actor, world)
    }

    fn apply(
        &self,
        target: NodeId,
        state: &KnowledgeState,
        actor: NodeId,
        world: &NetworkWorld,
    ) -> Result<KnowledgeState> {
        (self.apply)(target, state, actor, world)
    }
}

// Indexed by `ActionKind as usize`.
static RULES: [Rule; 10] = [
    Rule { targets: recon::ip_scan_targets, apply: recon::ip_scan },
    Rule { targets: recon::vuln_scan_targets, apply: recon::vuln_scan },
    Rule { targets: exploit::public_facing_targets, apply: exploit::gain_user },
    Rule { targets: exploit::client_execution_targets, apply: exploit::gain_user },
    Rule { targets: exploit::privilege_escalation_targets, apply: exploit::privilege_escalation },
    Rule { targets: exploit::valid_accounts_targets, apply: exploit::valid_accounts },
    Rule { targets: exploit::create_account_targets, apply: exploit::create_account },
    Rule { targets: recon::local_data_targets, apply: recon::collect_local_data },
    Rule { targets: recon::software_discovery_targets, apply: recon::software_discovery },
    Rule { targets: mitm_targets, apply: mitm },
];

// Man-in-the-middle is catalogued but has no defined behavior.
fn mitm_targets(_: &KnowledgeState, _: NodeId, _: &NetworkWorld) -> BTreeSet<NodeId> {
    BTreeSet::new()
}

fn mitm(_: NodeId, _: &KnowledgeState, _: NodeId, _: &NetworkWorld) -> Result<KnowledgeState> {
    Err(Error::UnsupportedAction(ActionKind::ManInTheMiddle.name()))
}

pub(crate) fn host(world: &NetworkWorld, id: NodeId) -> Result<&Host> {
    world
        .host(id)
        .ok_or_else(|| Error::Structural(format!("no host record for {}", id)))
}

/// An MDP action: `actor` uses `kind` against `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAction {
    pub actor: NodeId,
    pub target: NodeId,
    pub kind: ActionKind,
}

impl NodeAction {
    pub fn new(actor: NodeId, target: NodeId, kind: ActionKind) -> Self {
        Self { actor, target, kind }
    }

    pub fn apply(&self, state: &KnowledgeState, world: &NetworkWorld) -> Result<KnowledgeState> {
        self.kind.apply(self.target, state, self.actor, world)
    }

    /// Every action that changes `state`, paired with its successor.
    ///
    /// Actors are the nodes the attacker holds User or Root on; actors, kinds
    /// and targets are visited in a fixed order.
    pub fn legal_actions(
        state: &KnowledgeState,
        world: &NetworkWorld,
    ) -> Result<Vec<(NodeAction, KnowledgeState)>> {
        let mut legal = Vec::new();
        for actor in state.footholds() {
            for kind in ActionKind::ALL {
                for target in kind.applicable_targets(state, actor, world) {
                    let next = kind.apply(target, state, actor, world)?;
                    if next != *state {
                        legal.push((NodeAction::new(actor, target, kind), next));
                    }
                }
            }
        }
        Ok(legal)
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.actor, self.target, self.kind)
    }
}
