//! The simulated network the attacker moves through.
//!
//! A [`NetworkWorld`] is an explicit value: action rules and the state-space
//! generator receive it by reference, so several worlds can coexist.

mod simworld;

use crate::error::{Error, Result};
use crate::knowledge::{DataArtifact, Exposure, NodeId, Vulnerability};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ground-truth record of an installed program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Software {
    pub name: String,
    pub version: String,
    pub vulnerabilities: BTreeSet<Vulnerability>,
    pub exposure: Exposure,
}

impl Software {
    pub fn remote(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            vulnerabilities: BTreeSet::new(),
            exposure: Exposure::Remote,
        }
    }

    pub fn local(name: &str, version: &str) -> Self {
        Self {
            exposure: Exposure::Local,
            ..Self::remote(name, version)
        }
    }

    pub fn with_vulnerability(mut self, vulnerability: Vulnerability) -> Self {
        self.vulnerabilities.insert(vulnerability);
        self
    }
}

/// Ground-truth record of a machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: NodeId,
    pub hostname: String,
    pub pub_ip: Option<String>,
    pub priv_ip: Option<String>,
    pub os: String,
    pub os_version: String,
    pub software: Vec<Software>,
    pub data: BTreeMap<u32, DataArtifact>,
}

impl Host {
    pub fn new(id: NodeId, hostname: &str, os: &str, os_version: &str) -> Self {
        Self {
            id,
            hostname: hostname.to_string(),
            pub_ip: None,
            priv_ip: None,
            os: os.to_string(),
            os_version: os_version.to_string(),
            software: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_ips(mut self, pub_ip: Option<&str>, priv_ip: Option<&str>) -> Self {
        self.pub_ip = pub_ip.map(str::to_string);
        self.priv_ip = priv_ip.map(str::to_string);
        self
    }

    pub fn with_software(mut self, software: Software) -> Self {
        self.software.push(software);
        self
    }

    pub fn with_data(mut self, key: u32, artifact: DataArtifact) -> Self {
        self.data.insert(key, artifact);
        self
    }

    pub fn remote_software(&self) -> impl Iterator<Item = &Software> {
        self.software.iter().filter(|s| s.exposure == Exposure::Remote)
    }

    pub fn find_software(&self, name: &str) -> Option<&Software> {
        self.software.iter().find(|s| s.name == name)
    }
}

/// What a scanner sees of a target's remote services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Full,
    Whitelist(BTreeSet<String>),
}

/// Adjacency and scan visibility between nodes
pub trait Topology {
    fn reachable(&self, node: NodeId) -> BTreeSet<NodeId>;

    fn visible_remote_software(&self, scanner: NodeId, target: NodeId) -> Vec<&Software>;

    fn can_reach(&self, from: NodeId, to: NodeId) -> bool {
        self.reachable(from).contains(&to)
    }
}

#[derive(Debug, Clone)]
pub struct NetworkWorld {
    graph: DiGraph<NodeId, ()>,
    indices: BTreeMap<NodeId, NodeIndex>,
    hosts: BTreeMap<NodeId, Host>,
    attacker: NodeId,
    perimeter: NodeId,
    forwarded: BTreeSet<NodeId>,
    visibility: BTreeMap<(NodeId, NodeId), Visibility>,
}

impl NetworkWorld {
    pub fn builder(attacker: NodeId, perimeter: NodeId) -> WorldBuilder {
        WorldBuilder {
            attacker,
            perimeter,
            hosts: BTreeMap::new(),
            links: Vec::new(),
            forwarded: BTreeSet::new(),
            visibility: BTreeMap::new(),
        }
    }

    /// The five-node reference network
    pub fn simworld() -> Result<Self> {
        simworld::build()
    }

    pub fn attacker(&self) -> NodeId {
        self.attacker
    }

    pub fn perimeter(&self) -> NodeId {
        self.perimeter
    }

    /// Targets the perimeter forwards ports to
    pub fn forwarded_targets(&self) -> &BTreeSet<NodeId> {
        &self.forwarded
    }

    pub fn host(&self, id: NodeId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Every node except the attacker's own
    pub fn targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.hosts.keys().copied().filter(move |id| *id != self.attacker)
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Topology for NetworkWorld {
    fn reachable(&self, node: NodeId) -> BTreeSet<NodeId> {
        match self.indices.get(&node) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .map(|n| self.graph[n])
                .collect(),
            None => BTreeSet::new(),
        }
    }

    fn visible_remote_software(&self, scanner: NodeId, target: NodeId) -> Vec<&Software> {
        let Some(host) = self.hosts.get(&target) else {
            return Vec::new();
        };
        match self.visibility.get(&(scanner, target)) {
            None | Some(Visibility::Full) => host.remote_software().collect(),
            Some(Visibility::Whitelist(names)) => host
                .remote_software()
                .filter(|s| names.contains(&s.name))
                .collect(),
        }
    }
}

pub struct WorldBuilder {
    attacker: NodeId,
    perimeter: NodeId,
    hosts: BTreeMap<NodeId, Host>,
    links: Vec<(NodeId, NodeId)>,
    forwarded: BTreeSet<NodeId>,
    visibility: BTreeMap<(NodeId, NodeId), Visibility>,
}

impl WorldBuilder {
    pub fn host(mut self, host: Host) -> Self {
        self.hosts.insert(host.id, host);
        self
    }

    /// One-way link: `to` can be reached from `from`
    pub fn link(mut self, from: NodeId, to: NodeId) -> Self {
        self.links.push((from, to));
        self
    }

    pub fn link_all(mut self, from: NodeId, to: &[NodeId]) -> Self {
        self.links.extend(to.iter().map(|t| (from, *t)));
        self
    }

    pub fn forward(mut self, target: NodeId) -> Self {
        self.forwarded.insert(target);
        self
    }

    pub fn visibility(mut self, scanner: NodeId, target: NodeId, visibility: Visibility) -> Self {
        self.visibility.insert((scanner, target), visibility);
        self
    }

    pub fn whitelist(self, scanner: NodeId, target: NodeId, names: &[&str]) -> Self {
        let names = names.iter().map(|n| n.to_string()).collect();
        self.visibility(scanner, target, Visibility::Whitelist(names))
    }

    pub fn build(self) -> Result<NetworkWorld> {
        for id in [self.attacker, self.perimeter] {
            if !self.hosts.contains_key(&id) {
                return Err(Error::Structural(format!("world has no host record for {}", id)));
            }
        }

        let mut graph = DiGraph::new();
        let mut indices = BTreeMap::new();
        for id in self.hosts.keys() {
            indices.insert(*id, graph.add_node(*id));
        }

        for (from, to) in &self.links {
            match (indices.get(from), indices.get(to)) {
                (Some(&a), Some(&b)) => {
                    graph.update_edge(a, b, ());
                }
                _ => {
                    return Err(Error::Structural(format!(
                        "link {} -> {} references an unknown host",
                        from, to
                    )))
                }
            }
        }

        if let Some(missing) = self.forwarded.iter().find(|t| !self.hosts.contains_key(t)) {
            return Err(Error::Structural(format!("forwarded target {} has no host", missing)));
        }

        Ok(NetworkWorld {
            graph,
            indices,
            hosts: self.hosts,
            attacker: self.attacker,
            perimeter: self.perimeter,
            forwarded: self.forwarded,
            visibility: self.visibility,
        })
    }
}
