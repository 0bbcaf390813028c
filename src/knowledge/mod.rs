use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Network roles known to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Attacker,
    Router,
    WebServer,
    AdminPc,
    Database,
}

impl NodeId {
    pub const ALL: [NodeId; 5] = [
        NodeId::Attacker,
        NodeId::Router,
        NodeId::WebServer,
        NodeId::AdminPc,
        NodeId::Database,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeId::Attacker => "attacker",
            NodeId::Router => "router",
            NodeId::WebServer => "webserver",
            NodeId::AdminPc => "adminpc",
            NodeId::Database => "database",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Privilege held on a node. Ordered, and never lowered by a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    None,
    User,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExploitCategory {
    PublicFacingApplication,
    ClientExecution,
    PrivilegeEscalation,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Public identifier; `None` when the flaw was never published
    pub cve: Option<String>,
    pub category: ExploitCategory,
    pub zero_day: bool,
}

impl Vulnerability {
    pub fn public(cve: &str, category: ExploitCategory) -> Self {
        Self {
            cve: Some(cve.to_string()),
            category,
            zero_day: false,
        }
    }

    pub fn zero_day(category: ExploitCategory) -> Self {
        Self {
            cve: None,
            category,
            zero_day: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Exposure {
    Local,
    Remote,
}

/// What the attacker knows about one installed program
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoftwareFact {
    pub name: String,
    pub version: Option<String>,
    pub vulnerabilities: Option<BTreeSet<Vulnerability>>,
    pub exposure: Exposure,
}

impl SoftwareFact {
    pub fn named(name: &str, exposure: Exposure) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            vulnerabilities: None,
            exposure,
        }
    }

    pub fn is_detailed(&self) -> bool {
        self.version.is_some() && self.vulnerabilities.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessRequirement {
    Any,
    User,
    Root,
}

impl AccessRequirement {
    pub fn satisfied_by(&self, access: AccessLevel) -> bool {
        match self {
            AccessRequirement::Any => true,
            AccessRequirement::User => access >= AccessLevel::User,
            AccessRequirement::Root => access == AccessLevel::Root,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Gain {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataOrigin {
    Local,
    Sniffed,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
    Key,
    Password,
    PasswordFile,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub kind: CredentialKind,
    pub grant: AccessLevel,
    pub target: NodeId,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataContent {
    Credential(Credential),
    Inert { gain: Gain },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataArtifact {
    pub content: DataContent,
    pub origin: DataOrigin,
    pub requires: AccessRequirement,
}

impl DataArtifact {
    pub fn credential(&self) -> Option<&Credential> {
        match &self.content {
            DataContent::Credential(credential) => Some(credential),
            DataContent::Inert { .. } => None,
        }
    }
}

/// Everything learned about a single node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKnowledge {
    pub pub_ip: Option<String>,
    pub priv_ip: Option<String>,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub access: AccessLevel,
    pub data: BTreeMap<u32, DataArtifact>,
}

impl NodeKnowledge {
    pub fn has_pub_ip(&self) -> bool {
        self.pub_ip.is_some()
    }

    pub fn has_priv_ip(&self) -> bool {
        self.priv_ip.is_some()
    }

    pub fn has_hostname(&self) -> bool {
        self.hostname.is_some()
    }

    pub fn has_os(&self) -> bool {
        self.os.is_some()
    }

    pub fn has_os_version(&self) -> bool {
        self.os_version.is_some()
    }

    pub fn has_user_access(&self) -> bool {
        self.access >= AccessLevel::User
    }

    pub fn has_root_access(&self) -> bool {
        self.access == AccessLevel::Root
    }

    /// Raises access; a lower level never replaces a higher one.
    pub fn raise_access(&mut self, level: AccessLevel) {
        self.access = self.access.max(level);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkKnowledge {
    pub discovered: BTreeSet<NodeId>,
    pub sniffed: BTreeMap<u32, DataArtifact>,
}

/// The attacker's complete belief about the network.
///
/// Every collection is ordered, so two states holding the same facts are
/// equal and hash alike no matter the order the facts were learned in.
/// The `start` marker is not part of the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeState {
    pub network: NetworkKnowledge,
    pub nodes: BTreeMap<NodeId, NodeKnowledge>,
    pub software: BTreeMap<NodeId, BTreeMap<String, SoftwareFact>>,
    #[serde(default)]
    start: bool,
}

impl PartialEq for KnowledgeState {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network && self.nodes == other.nodes && self.software == other.software
    }
}

impl Eq for KnowledgeState {}

impl Hash for KnowledgeState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.network.hash(state);
        self.nodes.hash(state);
        self.software.hash(state);
    }
}

impl KnowledgeState {
    /// The attacker controls its own machine and has heard of the perimeter, nothing more.
    pub fn start(attacker: NodeId, perimeter: NodeId) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            attacker,
            NodeKnowledge {
                access: AccessLevel::Root,
                ..NodeKnowledge::default()
            },
        );
        nodes.insert(perimeter, NodeKnowledge::default());

        let mut network = NetworkKnowledge::default();
        network.discovered.insert(perimeter);

        Self {
            network,
            nodes,
            software: BTreeMap::new(),
            start: true,
        }
    }

    pub fn is_start(&self) -> bool {
        self.start
    }

    /// Copy-on-write entry point: the returned draft owns a copy of this state.
    pub fn edit(&self) -> KnowledgeEdit {
        let mut draft = self.clone();
        draft.start = false;
        KnowledgeEdit { draft }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeKnowledge> {
        self.nodes.get(&id)
    }

    pub fn is_discovered(&self, id: NodeId) -> bool {
        self.network.discovered.contains(&id)
    }

    /// Nodes the attacker has any record of
    pub fn tracked_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn access(&self, id: NodeId) -> AccessLevel {
        self.nodes.get(&id).map(|n| n.access).unwrap_or_default()
    }

    pub fn has_user_access(&self, id: NodeId) -> bool {
        self.access(id) >= AccessLevel::User
    }

    pub fn has_root_access(&self, id: NodeId) -> bool {
        self.access(id) == AccessLevel::Root
    }

    /// Nodes the attacker can act from
    pub fn footholds(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.has_user_access())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn root_count(&self) -> usize {
        self.nodes.values().filter(|n| n.has_root_access()).count()
    }

    pub fn software(&self, id: NodeId) -> impl Iterator<Item = &SoftwareFact> {
        self.software.get(&id).into_iter().flat_map(|m| m.values())
    }

    pub fn has_remote_software(&self, id: NodeId) -> bool {
        self.software(id).any(|s| s.exposure == Exposure::Remote)
    }

    /// Known vulnerabilities of a category on a node, from any software fact with details
    pub fn vulnerabilities_on(&self, id: NodeId, category: ExploitCategory) -> Vec<&Vulnerability> {
        self.software(id)
            .filter_map(|s| s.vulnerabilities.as_ref())
            .flatten()
            .filter(|v| v.category == category)
            .collect()
    }

    /// Credentials held anywhere: node data first (in node order), then sniffed traffic
    pub fn known_credentials(&self) -> Vec<&Credential> {
        self.nodes
            .values()
            .flat_map(|n| n.data.values())
            .chain(self.network.sniffed.values())
            .filter_map(DataArtifact::credential)
            .collect()
    }
}

/// Mutable draft of a [`KnowledgeState`]; only [`KnowledgeEdit::finish`] yields a state
#[derive(Debug)]
pub struct KnowledgeEdit {
    draft: KnowledgeState,
}

impl KnowledgeEdit {
    pub fn discover(&mut self, id: NodeId) -> &mut Self {
        self.draft.network.discovered.insert(id);
        self.draft.nodes.entry(id).or_default();
        self
    }

    pub fn node(&mut self, id: NodeId) -> &mut NodeKnowledge {
        self.draft.nodes.entry(id).or_default()
    }

    /// Records a program by name; existing details are kept.
    pub fn learn_software(&mut self, id: NodeId, name: &str, exposure: Exposure) -> &mut SoftwareFact {
        self.draft
            .software
            .entry(id)
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| SoftwareFact::named(name, exposure))
    }

    pub fn software_mut(&mut self, id: NodeId) -> impl Iterator<Item = &mut SoftwareFact> {
        self.draft.software.get_mut(&id).into_iter().flat_map(|m| m.values_mut())
    }

    pub fn store_data(&mut self, id: NodeId, key: u32, artifact: DataArtifact) -> &mut Self {
        self.node(id).data.entry(key).or_insert(artifact);
        self
    }

    pub fn sniff(&mut self, key: u32, artifact: DataArtifact) -> &mut Self {
        self.draft.network.sniffed.entry(key).or_insert(artifact);
        self
    }

    pub fn finish(self) -> KnowledgeState {
        self.draft
    }
}
