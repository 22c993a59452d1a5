//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Tree nodes of the device information model."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use r_ied_common::config::NameMatching;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::cell::AttributeCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NodeKind {
    Ied,
    LogicalDevice,
    LogicalNode,
    DataObject,
    DataAttribute,
}

impl NodeKind {
    pub fn is_leaf(self) -> bool {
        matches!(self, NodeKind::DataAttribute)
    }
}

pub(crate) fn names_match(matching: NameMatching, declared: &str, requested: &str) -> bool {
    match matching {
        NameMatching::Exact => declared == requested,
        NameMatching::CaseInsensitive => declared.eq_ignore_ascii_case(requested),
    }
}

/// Look a name up in an ordered child map under the given policy. Siblings are
/// unique case-insensitively, so at most one entry can match.
pub(crate) fn lookup<'a>(
    children: &'a IndexMap<String, Arc<Node>>,
    name: &str,
    matching: NameMatching,
) -> Option<&'a Arc<Node>> {
    match matching {
        NameMatching::Exact => children.get(name),
        NameMatching::CaseInsensitive => children
            .get(name)
            .or_else(|| children.values().find(|child| names_match(matching, &child.name, name))),
    }
}

#[derive(Debug)]
enum NodeBody {
    Container(IndexMap<String, Arc<Node>>),
    Leaf(Arc<AttributeCell>),
}

/// Element of the information tree. Shape is fixed once built; only leaf cells change.
#[derive(Debug)]
pub struct Node {
    name: String,
    kind: NodeKind,
    body: NodeBody,
}

impl Node {
    pub(crate) fn container(
        name: impl Into<String>,
        kind: NodeKind,
        children: IndexMap<String, Arc<Node>>,
    ) -> Self {
        debug_assert!(!kind.is_leaf());
        Self {
            name: name.into(),
            kind,
            body: NodeBody::Container(children),
        }
    }

    pub(crate) fn leaf(name: impl Into<String>, cell: AttributeCell) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::DataAttribute,
            body: NodeBody::Leaf(Arc::new(cell)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    pub fn cell(&self) -> Option<&AttributeCell> {
        self.shared_cell().map(|cell| cell.as_ref())
    }

    /// Cell behind a shared pointer, for handles that outlive a resolution.
    pub(crate) fn shared_cell(&self) -> Option<&Arc<AttributeCell>> {
        match &self.body {
            NodeBody::Leaf(cell) => Some(cell),
            NodeBody::Container(_) => None,
        }
    }

    /// Children in declaration order; empty for leaves.
    pub fn children(&self) -> impl Iterator<Item = &Arc<Node>> {
        let children = match &self.body {
            NodeBody::Container(children) => Some(children.values()),
            NodeBody::Leaf(_) => None,
        };
        children.into_iter().flatten()
    }

    pub fn child(&self, name: &str, matching: NameMatching) -> Option<&Arc<Node>> {
        match &self.body {
            NodeBody::Container(children) => lookup(children, name, matching),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Number of leaf cells in this subtree.
    pub fn leaf_count(&self) -> usize {
        match &self.body {
            NodeBody::Leaf(_) => 1,
            NodeBody::Container(children) => children.values().map(|c| c.leaf_count()).sum(),
        }
    }
}
