//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Model store: resolution, synchronised access and frame batches."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! The store owns the frozen root forest. Every read and write goes through
//! one leaf cell's lock; the tree itself is never locked because its shape
//! cannot change after [`ModelBuilder::build`](crate::builder::ModelBuilder::build).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use r_ied_common::config::{ModelConfig, NameMatching, StalenessPolicy};
use serde::Serialize;
use tracing::{debug, trace};

use crate::builder::{ModelBuilder, ModelDeclaration};
use crate::cell::{AttributeCell, QualityHint, Snapshot};
use crate::error::{DeclarationError, ModelError, Result};
use crate::node::{Node, NodeKind};
use crate::path::{ObjectPath, Resolver, Target};
use crate::quality::QualityView;
use crate::update::{BatchReport, FrameUpdate, LeafHandle, UpdateTarget};
use crate::value::{TypeDescriptor, Value, VectorField};

/// Renderable copy of one leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafView {
    pub path: String,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub value: serde_json::Value,
    pub quality: QualityView,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LeafView {
    pub fn new(path: impl Into<String>, snapshot: &Snapshot) -> Self {
        Self {
            path: path.into(),
            ty: snapshot.ty.type_name(),
            value: snapshot.value.to_json(&snapshot.ty),
            quality: snapshot.quality.into(),
            updated_at: snapshot.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildDescriptor {
    pub name: String,
    pub kind: NodeKind,
    #[serde(rename = "definition", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeDescriptor>,
}

/// Result of enumerating a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "listing", rename_all = "kebab-case")]
pub enum Listing {
    Directory {
        path: String,
        children: Vec<ChildDescriptor>,
    },
    Definition {
        path: String,
        definition: TypeDescriptor,
    },
}

/// Type tree of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Definition {
    Leaf(TypeDescriptor),
    Branch {
        kind: NodeKind,
        children: IndexMap<String, Definition>,
    },
    /// Every IED, keyed by name; the answer for the empty path.
    Forest(IndexMap<String, Definition>),
}

/// Values of a subtree, nested by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValueTree {
    Leaf(LeafView),
    Branch(IndexMap<String, ValueTree>),
}

struct Located<'a> {
    path: ObjectPath,
    target: Target<'a>,
}

impl<'a> Located<'a> {
    fn node(&self) -> &'a Arc<Node> {
        self.target.node
    }

    fn cell(&self) -> Result<&'a AttributeCell> {
        self.target
            .node
            .cell()
            .ok_or_else(|| ModelError::WrongNodeKind {
                path: self.path.to_string(),
                expected: "data-attribute",
                found: self.target.node.kind(),
            })
    }
}

#[derive(Debug)]
pub struct ModelStore {
    roots: IndexMap<String, Arc<Node>>,
    matching: NameMatching,
    staleness: StalenessPolicy,
}

impl ModelStore {
    pub(crate) fn new(
        roots: IndexMap<String, Arc<Node>>,
        matching: NameMatching,
        staleness: StalenessPolicy,
    ) -> Self {
        Self {
            roots,
            matching,
            staleness,
        }
    }

    pub fn from_declaration(
        declaration: &ModelDeclaration,
        config: &ModelConfig,
    ) -> std::result::Result<Self, DeclarationError> {
        ModelBuilder::from_declaration(declaration.clone())
            .with_config(config)
            .build()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.roots.values()
    }

    pub fn name_matching(&self) -> NameMatching {
        self.matching
    }

    pub fn staleness(&self) -> StalenessPolicy {
        self.staleness
    }

    pub fn leaf_count(&self) -> usize {
        self.roots.values().map(|root| root.leaf_count()).sum()
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.roots, self.matching)
    }

    /// Resolve path text to a node, plus the vector half if one was addressed.
    pub fn resolve(&self, path: &str) -> Result<Target<'_>> {
        Ok(self.locate(path)?.target)
    }

    fn locate(&self, path: &str) -> Result<Located<'_>> {
        let (target, path) = self.resolver().resolve_canonical(&ObjectPath::parse(path)?)?;
        Ok(Located { path, target })
    }

    /// `path` spelled with the declared names of the nodes it resolves to.
    pub fn canonical_path(&self, path: &str) -> Result<ObjectPath> {
        Ok(self.locate(path)?.path)
    }

    pub fn get(&self, path: &str) -> Result<Snapshot> {
        let located = self.locate(path)?;
        let snapshot = located
            .cell()?
            .snapshot(located.target.field, self.staleness, Utc::now());
        trace!(path = %located.path, "get");
        Ok(snapshot)
    }

    /// Coerce `text` to the leaf's type and store it with fresh quality.
    /// On any failure the cell keeps its previous value.
    pub fn set(&self, path: &str, text: &str) -> Result<Snapshot> {
        let located = self.locate(path)?;
        let cell = located.cell()?;
        let field = located.target.field;
        let value = cell
            .field_type(field)
            .coerce(text)
            .map_err(|source| ModelError::TypeCoercion {
                path: located.path.to_string(),
                source,
            })?;
        let snapshot = cell
            .write(field, value, QualityHint::Fresh, Utc::now())
            .map_err(|source| ModelError::TypeMismatch {
                path: located.path.to_string(),
                source,
            })?;
        debug!(path = %located.path, input = text, "attribute set");
        Ok(snapshot)
    }

    /// Typed write used by the computation path.
    pub fn write(&self, path: &str, value: Value, quality: QualityHint) -> Result<()> {
        let located = self.locate(path)?;
        let cell = located.cell()?;
        cell.write(located.target.field, value, quality, Utc::now())
            .map(drop)
            .map_err(|source| ModelError::TypeMismatch {
                path: located.path.to_string(),
                source,
            })
    }

    pub fn handle(&self, path: &str) -> Result<LeafHandle> {
        let located = self.locate(path)?;
        let node = located.node();
        let cell = node
            .shared_cell()
            .ok_or_else(|| ModelError::WrongNodeKind {
                path: located.path.to_string(),
                expected: "data-attribute",
                found: node.kind(),
            })?;
        Ok(LeafHandle::new(
            Arc::clone(cell),
            located.target.field,
            located.path.to_string(),
            self.staleness,
        ))
    }

    /// Children of a container in declaration order, or the definition of a
    /// leaf. An empty path lists the IEDs.
    pub fn enumerate(&self, path: &str) -> Result<Listing> {
        let parsed = ObjectPath::parse(path)?;
        if parsed.is_empty() {
            return Ok(Listing::Directory {
                path: String::new(),
                children: self.roots.values().map(describe).collect(),
            });
        }
        let (target, parsed) = self.resolver().resolve_canonical(&parsed)?;
        let listing = match target.node.cell() {
            Some(cell) => Listing::Definition {
                path: parsed.to_string(),
                definition: cell.field_type(target.field).descriptor(),
            },
            None => Listing::Directory {
                path: parsed.to_string(),
                children: target.node.children().map(describe).collect(),
            },
        };
        Ok(listing)
    }

    /// Nested type tree rooted at `path`.
    pub fn definition(&self, path: &str) -> Result<Definition> {
        let parsed = ObjectPath::parse(path)?;
        if parsed.is_empty() {
            return Ok(Definition::Forest(
                self.roots
                    .values()
                    .map(|n| (n.name().to_owned(), definition_of(n, None)))
                    .collect(),
            ));
        }
        let target = self.resolver().resolve(&parsed)?;
        Ok(definition_of(target.node, target.field))
    }

    /// Nested snapshot of every leaf under `path`; empty path dumps the model.
    pub fn values(&self, path: &str) -> Result<ValueTree> {
        let parsed = ObjectPath::parse(path)?;
        let now = Utc::now();
        if parsed.is_empty() {
            let branch = self
                .roots
                .values()
                .map(|n| {
                    let child = ObjectPath::from_segments([n.name()]);
                    (n.name().to_owned(), self.values_of(n, None, &child, now))
                })
                .collect();
            return Ok(ValueTree::Branch(branch));
        }
        let (target, parsed) = self.resolver().resolve_canonical(&parsed)?;
        Ok(self.values_of(target.node, target.field, &parsed, now))
    }

    fn values_of(
        &self,
        node: &Arc<Node>,
        field: Option<VectorField>,
        path: &ObjectPath,
        now: DateTime<Utc>,
    ) -> ValueTree {
        match node.cell() {
            Some(cell) => {
                let snapshot = cell.snapshot(field, self.staleness, now);
                ValueTree::Leaf(LeafView::new(path.to_string(), &snapshot))
            }
            None => ValueTree::Branch(
                node.children()
                    .map(|child| {
                        let child_path = path.child(child.name());
                        (
                            child.name().to_owned(),
                            self.values_of(child, None, &child_path, now),
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Apply a decoded frame batch. Entries whose path does not resolve or
    /// whose value does not fit are skipped and counted; the rest are applied.
    pub fn apply_frame_update<I>(&self, batch: I) -> BatchReport
    where
        I: IntoIterator<Item = FrameUpdate>,
    {
        let mut report = BatchReport::default();
        for update in batch {
            let path = update.target_path().to_owned();
            match self.apply_one(update) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    report.skipped += 1;
                    debug!(path = %path, code = %err.code(), error = %err, "frame update skipped");
                }
            }
        }
        trace!(applied = report.applied, skipped = report.skipped, "frame batch applied");
        report
    }

    fn apply_one(&self, update: FrameUpdate) -> Result<()> {
        match update.target {
            UpdateTarget::Path(path) => self.write(&path, update.value, update.quality),
            UpdateTarget::Handle(handle) => handle.write(update.value, update.quality),
        }
    }
}

fn describe(node: &Arc<Node>) -> ChildDescriptor {
    ChildDescriptor {
        name: node.name().to_owned(),
        kind: node.kind(),
        ty: node.cell().map(|cell| cell.attribute_type().descriptor()),
    }
}

fn definition_of(node: &Arc<Node>, field: Option<VectorField>) -> Definition {
    match node.cell() {
        Some(cell) => Definition::Leaf(cell.field_type(field).descriptor()),
        None => Definition::Branch {
            kind: node.kind(),
            children: node
                .children()
                .map(|child| (child.name().to_owned(), definition_of(child, None)))
                .collect(),
        },
    }
}
