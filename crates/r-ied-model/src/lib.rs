//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "IEC 61850 style object-model store for relay prototyping."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Live, addressable model of IED data: IED, logical device, logical node,
//! data objects and data attributes. The tree is built once from a
//! declaration and shared behind an `Arc`; simulation, frame decoding and
//! query handlers all read and write through per-leaf cells.

pub mod builder;
pub mod cell;
pub mod error;
pub mod node;
pub mod path;
pub mod quality;
pub mod query;
pub mod store;
pub mod update;
pub mod value;

pub use builder::{
    DaDecl, DoDecl, IedDecl, LdDecl, LnDecl, ModelBuilder, ModelDeclaration, ObjectDecl, TypeDecl,
};
pub use cell::{AttributeCell, QualityHint, Snapshot};
pub use error::{
    CoercionError, DeclarationError, ErrorCode, ModelError, ResolveError, Result, TypeMismatch,
};
pub use node::{Node, NodeKind};
pub use path::{ObjectPath, Resolver, Target};
pub use quality::{Quality, QualityView, Validity};
pub use query::{QueryError, QueryPort, QueryResult};
pub use store::{ChildDescriptor, Definition, LeafView, Listing, ModelStore, ValueTree};
pub use update::{BatchReport, FrameUpdate, LeafHandle, UpdateTarget};
pub use value::{AttributeType, EnumType, TypeDescriptor, Value, Vector, VectorField};
