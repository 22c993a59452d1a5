//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Object reference parsing and tree resolution."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Addressing of nodes by object reference.
//!
//! References look like `R1/C1.MMXU1.A.phsA.cVal.mag.f`. `/` and `.` are
//! interchangeable separators, leading and trailing separators are ignored and
//! an empty segment between two separators is malformed. Segment 0 names the
//! IED, 1 the logical device, 2 the logical node; everything after that is
//! resolved one child lookup at a time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use r_ied_common::config::NameMatching;

use crate::error::ResolveError;
use crate::node::{lookup, names_match, Node};
use crate::value::{AttributeType, VectorField};

pub const SEPARATORS: [char; 2] = ['/', '.'];

const LN_DEPTH: usize = 2;

/// Parsed object reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectPath {
    segments: Vec<String>,
}

impl ObjectPath {
    pub fn parse(text: &str) -> Result<Self, ResolveError> {
        let trimmed = text.trim().trim_matches(|c: char| SEPARATORS.contains(&c));
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let mut segments = Vec::new();
        for (depth, segment) in trimmed.split(|c: char| SEPARATORS.contains(&c)).enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(ResolveError::EmptySegment { depth });
            }
            segments.push(segment.to_owned());
        }
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn child(&self, name: &str) -> ObjectPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Self { segments }
    }
}

/// Canonical form: `IED/LD.LN.DO.DA`.
impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match idx {
                0 => {}
                1 => f.write_str("/")?,
                _ => f.write_str(".")?,
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectPath {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectPath::parse(s)
    }
}

/// Node reached by a resolution, plus the vector half when the path went below
/// a vector leaf.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub node: &'a Arc<Node>,
    pub field: Option<VectorField>,
}

impl<'a> Target<'a> {
    fn node(node: &'a Arc<Node>) -> Self {
        Self { node, field: None }
    }
}

/// Read-only walker over the root forest. Resolution never creates nodes.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    roots: &'a IndexMap<String, Arc<Node>>,
    matching: NameMatching,
}

impl<'a> Resolver<'a> {
    pub fn new(roots: &'a IndexMap<String, Arc<Node>>, matching: NameMatching) -> Self {
        Self { roots, matching }
    }

    pub fn resolve_ied(&self, ied: &str) -> Result<&'a Arc<Node>, ResolveError> {
        lookup(self.roots, ied, self.matching)
            .ok_or_else(|| ResolveError::IedNotFound { name: ied.to_owned() })
    }

    pub fn resolve_ld(&self, ied: &str, ld: &str) -> Result<&'a Arc<Node>, ResolveError> {
        self.resolve_ied(ied)?
            .child(ld, self.matching)
            .ok_or_else(|| ResolveError::LdNotFound { name: ld.to_owned() })
    }

    pub fn resolve_ln(
        &self,
        ied: &str,
        ld: &str,
        ln: &str,
    ) -> Result<&'a Arc<Node>, ResolveError> {
        self.resolve_ld(ied, ld)?
            .child(ln, self.matching)
            .ok_or_else(|| ResolveError::LnNotFound { name: ln.to_owned() })
    }

    /// Descend from a logical node through `components`, one lookup each.
    pub fn resolve_item<S: AsRef<str>>(
        &self,
        ln: &'a Arc<Node>,
        components: &[S],
    ) -> Result<Target<'a>, ResolveError> {
        self.descend(ln, components, LN_DEPTH + 1)
    }

    pub fn resolve(&self, path: &ObjectPath) -> Result<Target<'a>, ResolveError> {
        match path.segments() {
            [] => Err(ResolveError::EmptyPath),
            [ied] => self.resolve_ied(ied).map(Target::node),
            [ied, ld] => self.resolve_ld(ied, ld).map(Target::node),
            [ied, ld, ln, components @ ..] => {
                let ln = self.resolve_ln(ied, ld, ln)?;
                self.resolve_item(ln, components)
            }
        }
    }

    /// Resolve `path` and spell it back with the declared names of the nodes it
    /// reached. Differs from the request only under case-insensitive matching.
    pub fn resolve_canonical(
        &self,
        path: &ObjectPath,
    ) -> Result<(Target<'a>, ObjectPath), ResolveError> {
        let target = self.resolve(path)?;
        let segments = path.segments();
        let mut node = self.resolve_ied(&segments[0])?;
        let mut names = vec![node.name().to_owned()];
        for segment in &segments[1..] {
            match node.child(segment, self.matching) {
                Some(child) => {
                    names.push(child.name().to_owned());
                    node = child;
                }
                None => break,
            }
        }
        if let Some(field) = target.field {
            let tail = segments.len() - names.len();
            names.push(field.name().to_owned());
            if tail == 2 {
                names.push("f".to_owned());
            }
        }
        Ok((target, ObjectPath { segments: names }))
    }

    fn descend<S: AsRef<str>>(
        &self,
        start: &'a Arc<Node>,
        components: &[S],
        base_depth: usize,
    ) -> Result<Target<'a>, ResolveError> {
        let mut current = start;
        for (offset, component) in components.iter().enumerate() {
            let name = component.as_ref();
            let depth = base_depth + offset;
            if let Some(cell) = current.cell() {
                let rest = &components[offset..];
                let field = match cell.attribute_type() {
                    AttributeType::Vector => {
                        VectorField::from_segments(rest, |declared, requested| {
                            names_match(self.matching, declared, requested)
                        })
                    }
                    _ => None,
                };
                return match field {
                    Some(field) => Ok(Target {
                        node: current,
                        field: Some(field),
                    }),
                    None => Err(ResolveError::BelowLeaf {
                        name: name.to_owned(),
                        depth,
                    }),
                };
            }
            current = current.child(name, self.matching).ok_or_else(|| {
                ResolveError::ComponentNotFound {
                    name: name.to_owned(),
                    depth,
                }
            })?;
        }
        Ok(Target::node(current))
    }
}
