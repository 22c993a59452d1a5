//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Model declarations and the one-shot tree builder."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! The information tree is declared once and frozen. A declaration is either
//! parsed from a TOML model file or assembled in code through [`ModelBuilder`];
//! both end in the same validation pass.
//!
//! ```toml
//! [enums.Beh]
//! on = 1
//! blocked = 2
//!
//! [[ied]]
//! name = "R1"
//! [[ied.ld]]
//! name = "C1"
//! [[ied.ld.ln]]
//! name = "MMXU1"
//! [[ied.ld.ln.do]]
//! name = "A"
//! [[ied.ld.ln.do.children]]
//! name = "phsA"
//! [[ied.ld.ln.do.children.children]]
//! name = "cVal"
//! type = "vector"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use r_ied_common::config::{ModelConfig, NameMatching, StalenessPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cell::AttributeCell;
use crate::error::DeclarationError;
use crate::node::{Node, NodeKind};
use crate::path::{ObjectPath, SEPARATORS};
use crate::store::ModelStore;
use crate::value::{AttributeType, EnumType};

/// Declared attribute type as written in a model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeDecl {
    Float32,
    Int32,
    Boolean,
    Timestamp,
    Quality,
    Vector,
    VisString(usize),
    Enum(String),
}

impl FromStr for TypeDecl {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || DeclarationError::InvalidType {
            text: s.to_owned(),
        };
        if let Some(name) = text.strip_prefix("enum:") {
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid());
            }
            return Ok(TypeDecl::Enum(name.to_owned()));
        }
        let lower = text.to_ascii_lowercase();
        let parsed = match lower.as_str() {
            "float32" => TypeDecl::Float32,
            "int32" => TypeDecl::Int32,
            "boolean" | "bool" => TypeDecl::Boolean,
            "timestamp" => TypeDecl::Timestamp,
            "quality" => TypeDecl::Quality,
            "vector" => TypeDecl::Vector,
            other => {
                let len = other
                    .strip_prefix("visstring")
                    .or_else(|| other.strip_prefix("vis-string"))
                    .map(|rest| rest.trim_start_matches('(').trim_end_matches(')'))
                    .ok_or_else(invalid)?;
                let max_len = len.parse::<usize>().map_err(|_| invalid())?;
                if max_len == 0 {
                    return Err(invalid());
                }
                TypeDecl::VisString(max_len)
            }
        };
        Ok(parsed)
    }
}

impl TryFrom<String> for TypeDecl {
    type Error = DeclarationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeDecl> for String {
    fn from(value: TypeDecl) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDecl::Float32 => f.write_str("float32"),
            TypeDecl::Int32 => f.write_str("int32"),
            TypeDecl::Boolean => f.write_str("boolean"),
            TypeDecl::Timestamp => f.write_str("timestamp"),
            TypeDecl::Quality => f.write_str("quality"),
            TypeDecl::Vector => f.write_str("vector"),
            TypeDecl::VisString(max_len) => write!(f, "visstring{max_len}"),
            TypeDecl::Enum(name) => write!(f, "enum:{name}"),
        }
    }
}

/// Leaf declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDecl,
    /// Text run through the same coercion as a `set` request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectDecl {
    Attribute(DaDecl),
    Object(DoDecl),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoDecl {
    pub name: String,
    #[serde(default)]
    pub children: Vec<ObjectDecl>,
}

impl DoDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&mut self, name: impl Into<String>, ty: TypeDecl) -> &mut Self {
        self.children.push(ObjectDecl::Attribute(DaDecl {
            name: name.into(),
            ty,
            initial: None,
        }));
        self
    }

    pub fn attribute_with(
        &mut self,
        name: impl Into<String>,
        ty: TypeDecl,
        initial: impl Into<String>,
    ) -> &mut Self {
        self.children.push(ObjectDecl::Attribute(DaDecl {
            name: name.into(),
            ty,
            initial: Some(initial.into()),
        }));
        self
    }

    pub fn data_object(&mut self, name: impl Into<String>, f: impl FnOnce(&mut DoDecl)) -> &mut Self {
        let mut object = DoDecl::new(name);
        f(&mut object);
        self.children.push(ObjectDecl::Object(object));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LnDecl {
    pub name: String,
    #[serde(default, rename = "do")]
    pub objects: Vec<DoDecl>,
}

impl LnDecl {
    pub fn data_object(&mut self, name: impl Into<String>, f: impl FnOnce(&mut DoDecl)) -> &mut Self {
        let mut object = DoDecl::new(name);
        f(&mut object);
        self.objects.push(object);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LdDecl {
    pub name: String,
    #[serde(default, rename = "ln")]
    pub nodes: Vec<LnDecl>,
}

impl LdDecl {
    pub fn logical_node(&mut self, name: impl Into<String>, f: impl FnOnce(&mut LnDecl)) -> &mut Self {
        let mut node = LnDecl {
            name: name.into(),
            ..LnDecl::default()
        };
        f(&mut node);
        self.nodes.push(node);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IedDecl {
    pub name: String,
    #[serde(default, rename = "ld")]
    pub devices: Vec<LdDecl>,
}

impl IedDecl {
    pub fn logical_device(
        &mut self,
        name: impl Into<String>,
        f: impl FnOnce(&mut LdDecl),
    ) -> &mut Self {
        let mut device = LdDecl {
            name: name.into(),
            ..LdDecl::default()
        };
        f(&mut device);
        self.devices.push(device);
        self
    }
}

/// Whole model file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDeclaration {
    #[serde(default)]
    pub enums: IndexMap<String, IndexMap<String, i32>>,
    #[serde(default, rename = "ied")]
    pub ieds: Vec<IedDecl>,
}

impl ModelDeclaration {
    pub fn from_toml_str(text: &str) -> Result<Self, DeclarationError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model declaration {}", path.display()))?;
        let declaration = Self::from_toml_str(&text)
            .with_context(|| format!("invalid model declaration {}", path.display()))?;
        info!(
            path = %path.display(),
            ieds = declaration.ieds.len(),
            enums = declaration.enums.len(),
            "loaded model declaration"
        );
        Ok(declaration)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialise model declaration")
    }
}

/// Programmatic front end over [`ModelDeclaration`].
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    declaration: ModelDeclaration,
    matching: NameMatching,
    staleness: StalenessPolicy,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_declaration(declaration: ModelDeclaration) -> Self {
        Self {
            declaration,
            ..Self::default()
        }
    }

    /// Take the matching and staleness policies from configuration.
    pub fn with_config(mut self, config: &ModelConfig) -> Self {
        self.matching = config.name_matching;
        self.staleness = config.staleness;
        self
    }

    pub fn name_matching(mut self, matching: NameMatching) -> Self {
        self.matching = matching;
        self
    }

    pub fn staleness(mut self, staleness: StalenessPolicy) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn enum_type<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let members = members.into_iter().map(|(n, ord)| (n.into(), ord)).collect();
        self.declaration.enums.insert(name.into(), members);
        self
    }

    pub fn ied(mut self, name: impl Into<String>, f: impl FnOnce(&mut IedDecl)) -> Self {
        let mut ied = IedDecl {
            name: name.into(),
            ..IedDecl::default()
        };
        f(&mut ied);
        self.declaration.ieds.push(ied);
        self
    }

    pub fn declaration(&self) -> &ModelDeclaration {
        &self.declaration
    }

    pub fn build(self) -> Result<ModelStore, DeclarationError> {
        let enums = build_enums(&self.declaration.enums)?;
        let mut roots = IndexMap::new();
        for ied in &self.declaration.ieds {
            let path = ObjectPath::from_segments([ied.name.as_str()]);
            let mut devices = IndexMap::new();
            for ld in &ied.devices {
                let ld_path = path.child(&ld.name);
                let mut nodes = IndexMap::new();
                for ln in &ld.nodes {
                    let ln_path = ld_path.child(&ln.name);
                    let mut objects = IndexMap::new();
                    for object in &ln.objects {
                        let node = build_object(&ln_path, object, &enums)?;
                        insert_unique(&mut objects, &ln_path, node)?;
                    }
                    let node = Node::container(&ln.name, NodeKind::LogicalNode, objects);
                    insert_unique(&mut nodes, &ld_path, node)?;
                }
                let node = Node::container(&ld.name, NodeKind::LogicalDevice, nodes);
                insert_unique(&mut devices, &path, node)?;
            }
            let node = Node::container(&ied.name, NodeKind::Ied, devices);
            insert_unique(&mut roots, &ObjectPath::default(), node)?;
        }
        let store = ModelStore::new(roots, self.matching, self.staleness);
        debug!(
            ieds = store.roots().count(),
            leaves = store.leaf_count(),
            matching = %self.matching,
            "model built"
        );
        Ok(store)
    }
}

fn build_enums(
    declared: &IndexMap<String, IndexMap<String, i32>>,
) -> Result<IndexMap<String, Arc<EnumType>>, DeclarationError> {
    let mut enums = IndexMap::new();
    for (name, members) in declared {
        if members.is_empty() {
            return Err(DeclarationError::EmptyEnumType { name: name.clone() });
        }
        let mut seen = Vec::with_capacity(members.len());
        for ordinal in members.values() {
            if seen.contains(ordinal) {
                return Err(DeclarationError::DuplicateEnumOrdinal {
                    name: name.clone(),
                    ordinal: *ordinal,
                });
            }
            seen.push(*ordinal);
        }
        enums.insert(name.clone(), Arc::new(EnumType::new(name, members.clone())));
    }
    Ok(enums)
}

fn build_object(
    parent: &ObjectPath,
    object: &DoDecl,
    enums: &IndexMap<String, Arc<EnumType>>,
) -> Result<Node, DeclarationError> {
    let path = parent.child(&object.name);
    let mut children = IndexMap::new();
    for child in &object.children {
        let node = match child {
            ObjectDecl::Object(nested) => build_object(&path, nested, enums)?,
            ObjectDecl::Attribute(attribute) => build_attribute(&path, attribute, enums)?,
        };
        insert_unique(&mut children, &path, node)?;
    }
    Ok(Node::container(&object.name, NodeKind::DataObject, children))
}

fn build_attribute(
    parent: &ObjectPath,
    attribute: &DaDecl,
    enums: &IndexMap<String, Arc<EnumType>>,
) -> Result<Node, DeclarationError> {
    let path = parent.child(&attribute.name);
    let ty = match &attribute.ty {
        TypeDecl::Float32 => AttributeType::Float32,
        TypeDecl::Int32 => AttributeType::Int32,
        TypeDecl::Boolean => AttributeType::Boolean,
        TypeDecl::Timestamp => AttributeType::Timestamp,
        TypeDecl::Quality => AttributeType::Quality,
        TypeDecl::Vector => AttributeType::Vector,
        TypeDecl::VisString(max_len) => AttributeType::VisString { max_len: *max_len },
        TypeDecl::Enum(enum_name) => match enums.get(enum_name) {
            Some(ty) => AttributeType::Enum(Arc::clone(ty)),
            None => {
                return Err(DeclarationError::UnknownEnumType {
                    path: path.to_string(),
                    enum_name: enum_name.clone(),
                })
            }
        },
    };
    let initial = match &attribute.initial {
        Some(text) => ty
            .coerce(text)
            .map_err(|source| DeclarationError::InvalidInitialValue {
                path: path.to_string(),
                source,
            })?,
        None => ty.default_value(),
    };
    Ok(Node::leaf(&attribute.name, AttributeCell::new(ty, initial)))
}

fn validate_name(parent: &ObjectPath, name: &str) -> Result<(), DeclarationError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.contains(SEPARATORS) {
        Some("name contains a path separator")
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("name contains whitespace or control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DeclarationError::InvalidName {
            parent: parent.to_string(),
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Siblings must differ case-insensitively so both matching policies resolve
/// to the same node.
fn insert_unique(
    siblings: &mut IndexMap<String, Arc<Node>>,
    parent: &ObjectPath,
    node: Node,
) -> Result<(), DeclarationError> {
    validate_name(parent, node.name())?;
    if siblings
        .keys()
        .any(|existing| existing.eq_ignore_ascii_case(node.name()))
    {
        return Err(DeclarationError::DuplicateName {
            parent: parent.to_string(),
            name: node.name().to_owned(),
        });
    }
    siblings.insert(node.name().to_owned(), Arc::new(node));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_decl_text_forms() {
        assert_eq!("float32".parse::<TypeDecl>().unwrap(), TypeDecl::Float32);
        assert_eq!(
            "VisString255".parse::<TypeDecl>().unwrap(),
            TypeDecl::VisString(255)
        );
        assert_eq!(
            "vis-string(64)".parse::<TypeDecl>().unwrap(),
            TypeDecl::VisString(64)
        );
        assert_eq!(
            "enum:Beh".parse::<TypeDecl>().unwrap(),
            TypeDecl::Enum("Beh".into())
        );
        assert!("visstring0".parse::<TypeDecl>().is_err());
        assert!("double".parse::<TypeDecl>().is_err());
        assert_eq!(TypeDecl::VisString(32).to_string(), "visstring32");
    }

    #[test]
    fn parses_nested_declaration() {
        let text = r#"
            [enums.Beh]
            on = 1
            blocked = 2

            [[ied]]
            name = "R1"
            [[ied.ld]]
            name = "C1"
            [[ied.ld.ln]]
            name = "MMXU1"
            [[ied.ld.ln.do]]
            name = "Beh"
            [[ied.ld.ln.do.children]]
            name = "stVal"
            type = "enum:Beh"
            initial = "blocked"
            [[ied.ld.ln.do]]
            name = "A"
            [[ied.ld.ln.do.children]]
            name = "phsA"
            [[ied.ld.ln.do.children.children]]
            name = "cVal"
            type = "vector"
        "#;
        let decl = ModelDeclaration::from_toml_str(text).unwrap();
        let objects = &decl.ieds[0].devices[0].nodes[0].objects;
        assert_eq!(objects.len(), 2);
        assert!(matches!(objects[1].children[0], ObjectDecl::Object(_)));

        let store = ModelBuilder::from_declaration(decl).build().unwrap();
        assert_eq!(store.leaf_count(), 2);
    }

    #[test]
    fn rejects_case_insensitive_duplicates() {
        let err = ModelBuilder::new()
            .ied("R1", |ied| {
                ied.logical_device("C1", |ld| {
                    ld.logical_node("MMXU1", |_| {});
                    ld.logical_node("mmxu1", |_| {});
                });
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateName { ref name, .. } if name == "mmxu1"));
    }

    #[test]
    fn rejects_separator_in_name() {
        let err = ModelBuilder::new()
            .ied("R1", |ied| {
                ied.logical_device("C1.bad", |_| {});
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidName { .. }));
    }

    #[test]
    fn rejects_unknown_enum_and_bad_initial() {
        let unknown = ModelBuilder::new()
            .ied("R1", |ied| {
                ied.logical_device("C1", |ld| {
                    ld.logical_node("XCBR1", |ln| {
                        ln.data_object("Pos", |d| {
                            d.attribute("stVal", TypeDecl::Enum("Dbpos".into()));
                        });
                    });
                });
            })
            .build()
            .unwrap_err();
        assert!(matches!(unknown, DeclarationError::UnknownEnumType { .. }));

        let bad_initial = ModelBuilder::new()
            .ied("R1", |ied| {
                ied.logical_device("C1", |ld| {
                    ld.logical_node("MMXU1", |ln| {
                        ln.data_object("Hz", |d| {
                            d.attribute_with("mag", TypeDecl::Float32, "fifty");
                        });
                    });
                });
            })
            .build()
            .unwrap_err();
        match bad_initial {
            DeclarationError::InvalidInitialValue { path, .. } => {
                assert_eq!(path, "R1/C1.MMXU1.Hz.mag")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_degenerate_enums() {
        let empty = ModelBuilder::new()
            .enum_type("Beh", Vec::<(String, i32)>::new())
            .build()
            .unwrap_err();
        assert!(matches!(empty, DeclarationError::EmptyEnumType { .. }));

        let clash = ModelBuilder::new()
            .enum_type("Beh", [("on", 1), ("test", 1)])
            .build()
            .unwrap_err();
        assert!(matches!(
            clash,
            DeclarationError::DuplicateEnumOrdinal { ordinal: 1, .. }
        ));
    }
}
