//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Error taxonomy for resolution, coercion and model declaration."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::node::NodeKind;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Stable codes handed to transport collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    NotALeaf,
    BadValue,
    WrongDepth,
}

/// Failure to turn a path into a node. Depths are zero-based segment indices:
/// 0 is the IED, 1 the logical device, 2 the logical node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("path is empty")]
    EmptyPath,
    #[error("empty path segment at depth {depth}")]
    EmptySegment { depth: usize },
    #[error("unknown IED '{name}'")]
    IedNotFound { name: String },
    #[error("unknown logical device '{name}'")]
    LdNotFound { name: String },
    #[error("unknown logical node '{name}'")]
    LnNotFound { name: String },
    #[error("unknown component '{name}' at depth {depth}")]
    ComponentNotFound { name: String, depth: usize },
    #[error("segment '{name}' at depth {depth} continues below a leaf attribute")]
    BelowLeaf { name: String, depth: usize },
}

impl ResolveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::EmptyPath
            | ResolveError::EmptySegment { .. }
            | ResolveError::BelowLeaf { .. } => ErrorCode::WrongDepth,
            ResolveError::IedNotFound { .. }
            | ResolveError::LdNotFound { .. }
            | ResolveError::LnNotFound { .. }
            | ResolveError::ComponentNotFound { .. } => ErrorCode::NotFound,
        }
    }

    /// Depth of the first segment that failed, when one exists.
    pub fn depth(&self) -> Option<usize> {
        match self {
            ResolveError::EmptyPath => None,
            ResolveError::IedNotFound { .. } => Some(0),
            ResolveError::LdNotFound { .. } => Some(1),
            ResolveError::LnNotFound { .. } => Some(2),
            ResolveError::EmptySegment { depth }
            | ResolveError::ComponentNotFound { depth, .. }
            | ResolveError::BelowLeaf { depth, .. } => Some(*depth),
        }
    }

    /// Name of the first segment that failed, when one exists.
    pub fn segment(&self) -> Option<&str> {
        match self {
            ResolveError::EmptyPath | ResolveError::EmptySegment { .. } => None,
            ResolveError::IedNotFound { name }
            | ResolveError::LdNotFound { name }
            | ResolveError::LnNotFound { name }
            | ResolveError::ComponentNotFound { name, .. }
            | ResolveError::BelowLeaf { name, .. } => Some(name),
        }
    }
}

/// Raised when text cannot be turned into a value of the leaf's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce '{input}' to {expected}: {reason}")]
pub struct CoercionError {
    pub input: String,
    pub expected: String,
    pub reason: String,
}

impl CoercionError {
    pub(crate) fn new(input: &str, expected: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            expected: expected.into(),
            reason: reason.into(),
        }
    }
}

/// Raised when a pre-typed value does not fit the leaf's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("'{path}' is a {found}, expected {expected}")]
    WrongNodeKind {
        path: String,
        expected: &'static str,
        found: NodeKind,
    },
    #[error("value for '{path}' rejected: {source}")]
    TypeCoercion {
        path: String,
        #[source]
        source: CoercionError,
    },
    #[error("value for '{path}' rejected: {source}")]
    TypeMismatch {
        path: String,
        #[source]
        source: TypeMismatch,
    },
    #[error("frame batch skipped {skipped} of {total} updates")]
    PartialBatchApplied { skipped: usize, total: usize },
}

impl ModelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::Resolve(err) => err.code(),
            ModelError::WrongNodeKind { .. } => ErrorCode::NotALeaf,
            ModelError::TypeCoercion { .. }
            | ModelError::TypeMismatch { .. }
            | ModelError::PartialBatchApplied { .. } => ErrorCode::BadValue,
        }
    }
}

/// Problems found while building the tree from a declaration. These are
/// start-up failures; a running store never produces them.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("invalid name '{name}' under '{parent}': {reason}")]
    InvalidName {
        parent: String,
        name: String,
        reason: &'static str,
    },
    #[error("duplicate name '{name}' under '{parent}'")]
    DuplicateName { parent: String, name: String },
    #[error("enum type '{name}' declares no members")]
    EmptyEnumType { name: String },
    #[error("enum type '{name}' uses ordinal {ordinal} more than once")]
    DuplicateEnumOrdinal { name: String, ordinal: i32 },
    #[error("attribute '{path}' references unknown enum type '{enum_name}'")]
    UnknownEnumType { path: String, enum_name: String },
    #[error("invalid attribute type '{text}'")]
    InvalidType { text: String },
    #[error("invalid initial value for '{path}': {source}")]
    InvalidInitialValue {
        path: String,
        #[source]
        source: CoercionError,
    },
    #[error("failed to parse model declaration: {0}")]
    Parse(#[from] toml::de::Error),
}
