//! In-memory object tree of one open file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::dtype::TypeDesc;
use super::space::SpaceDesc;
use super::{Failure, Outcome};
use crate::h5d::H5D_layout_t;
use crate::h5e::{H5E_major_t, H5E_minor_t};

pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

/// Element storage shared by datasets and attributes.
///
/// Variable-length string elements hold, in their pointer-sized slot, the
/// 1-based index of their bytes in `strings`; 0 marks a null string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Payload {
    pub dtype: TypeDesc,
    pub space: SpaceDesc,
    pub data: Vec<u8>,
    pub strings: Vec<Vec<u8>>,
}

impl Payload {
    /// Zero-filled storage for `space` elements of `dtype`.
    pub(crate) fn new(dtype: TypeDesc, space: SpaceDesc) -> Outcome<Self> {
        let len = space
            .element_count()?
            .checked_mul(dtype.size())
            .ok_or_else(|| Failure::nospace("dataset storage too large"))?;
        Ok(Self {
            dtype,
            space,
            data: vec![0; len],
            strings: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DatasetNode {
    pub payload: Payload,
    pub layout: H5D_layout_t,
    pub chunk: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Group { links: BTreeMap<String, NodeId> },
    Dataset(DatasetNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub attrs: BTreeMap<String, Payload>,
}

impl Node {
    pub(crate) fn group(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            kind: NodeKind::Group {
                links: BTreeMap::new(),
            },
            attrs: BTreeMap::new(),
        }
    }
}

/// State of one open file. Shared by every identifier opened on the same
/// path; dropped when the last file identifier is released.
#[derive(Debug)]
pub(crate) struct FileState {
    pub path: PathBuf,
    pub writable: bool,
    pub refs: usize,
    pub userblock: usize,
    /// Unlinked nodes stay allocated so open identifiers keep working; only
    /// nodes reachable from the root are persisted.
    pub nodes: Vec<Node>,
}

fn not_found(desc: impl Into<String>) -> Failure {
    Failure::new(H5E_major_t::H5E_SYM, H5E_minor_t::H5E_NOTFOUND, desc)
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".")
}

impl FileState {
    pub(crate) fn new(path: PathBuf, writable: bool, userblock: usize) -> Self {
        Self {
            path,
            writable,
            refs: 0,
            userblock,
            nodes: vec![Node::group(String::new(), None)],
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Outcome<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| not_found(format!("object {id} does not exist")))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Outcome<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| not_found(format!("object {id} does not exist")))
    }

    pub(crate) fn links(&self, group: NodeId) -> Outcome<&BTreeMap<String, NodeId>> {
        match &self.node(group)?.kind {
            NodeKind::Group { links } => Ok(links),
            NodeKind::Dataset(_) => Err(Failure::bad_type("object is not a group")),
        }
    }

    pub(crate) fn dataset(&self, node: NodeId) -> Outcome<&DatasetNode> {
        match &self.node(node)?.kind {
            NodeKind::Dataset(dataset) => Ok(dataset),
            NodeKind::Group { .. } => Err(Failure::bad_type("object is not a dataset")),
        }
    }

    pub(crate) fn dataset_mut(&mut self, node: NodeId) -> Outcome<&mut DatasetNode> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Dataset(dataset) => Ok(dataset),
            NodeKind::Group { .. } => Err(Failure::bad_type("object is not a dataset")),
        }
    }

    /// Absolute path of `node`, or its last known path if it was unlinked.
    pub(crate) fn path_of(&self, mut node: NodeId) -> String {
        let mut parts = Vec::new();
        while let Some(n) = self.nodes.get(node) {
            match n.parent {
                Some(parent) => {
                    parts.push(n.name.as_str());
                    node = parent;
                }
                None => break,
            }
        }
        if parts.is_empty() {
            return "/".to_owned();
        }
        parts.reverse();
        parts.iter().fold(String::new(), |mut acc, part| {
            acc.push('/');
            acc.push_str(part);
            acc
        })
    }

    /// Follows `path` from `from` (or from the root when it starts with `/`).
    /// `None` when any component is missing or crosses a dataset.
    pub(crate) fn lookup(&self, from: NodeId, path: &str) -> Option<NodeId> {
        let mut current = if path.starts_with('/') { ROOT } else { from };
        for name in components(path) {
            let NodeKind::Group { links } = &self.nodes.get(current)?.kind else {
                return None;
            };
            current = *links.get(name)?;
        }
        Some(current)
    }

    pub(crate) fn resolve(&self, from: NodeId, path: &str) -> Outcome<NodeId> {
        self.lookup(from, path)
            .ok_or_else(|| not_found(format!("object '{path}' doesn't exist")))
    }

    /// Splits `path` into its parent group and final link name.
    pub(crate) fn split_parent(&self, from: NodeId, path: &str) -> Outcome<(NodeId, String)> {
        let parts: Vec<&str> = components(path).collect();
        let Some((leaf, dirs)) = parts.split_last() else {
            return Err(Failure::args("no name given"));
        };
        let mut current = if path.starts_with('/') { ROOT } else { from };
        for dir in dirs {
            current = *self
                .links(current)?
                .get(*dir)
                .ok_or_else(|| not_found(format!("component '{dir}' not found in '{path}'")))?;
        }
        self.links(current)?;
        Ok((current, (*leaf).to_owned()))
    }

    /// Adds a new child under `path`.
    pub(crate) fn insert(&mut self, from: NodeId, path: &str, kind: NodeKind) -> Outcome<NodeId> {
        let (parent, name) = self.split_parent(from, path)?;
        super::image::check_name(&name)?;
        let depth = std::iter::successors(Some(parent), |&n| self.nodes.get(n).and_then(|n| n.parent)).count();
        super::image::check_depth(depth)?;
        if self.links(parent)?.contains_key(&name) {
            return Err(Failure::new(
                H5E_major_t::H5E_SYM,
                H5E_minor_t::H5E_EXISTS,
                format!("name already exists: '{path}'"),
            ));
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.clone(),
            parent: Some(parent),
            kind,
            attrs: BTreeMap::new(),
        });
        if let NodeKind::Group { links } = &mut self.nodes[parent].kind {
            links.insert(name, id);
        }
        Ok(id)
    }

    pub(crate) fn unlink(&mut self, from: NodeId, path: &str) -> Outcome<()> {
        let (parent, name) = self.split_parent(from, path)?;
        match &mut self.node_mut(parent)?.kind {
            NodeKind::Group { links } => links
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| not_found(format!("link '{path}' doesn't exist"))),
            NodeKind::Dataset(_) => Err(Failure::bad_type("object is not a group")),
        }
    }
}
