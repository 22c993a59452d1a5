//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Transport-neutral query port over the model store."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Request handlers shared by every external transport. Each returns a
//! serialisable payload or a [`QueryError`] carrying a stable code.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::{ErrorCode, ModelError};
use crate::store::{Definition, LeafView, Listing, ModelStore, ValueTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct QueryError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<ModelError> for QueryError {
    fn from(err: ModelError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone)]
pub struct QueryPort {
    store: Arc<ModelStore>,
}

impl QueryPort {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn handle_get(&self, path: &str) -> QueryResult<LeafView> {
        let snapshot = self.store.get(path).map_err(|err| reject("get", path, err))?;
        Ok(LeafView::new(self.canonical(path), &snapshot))
    }

    pub fn handle_definition(&self, path: &str) -> QueryResult<Definition> {
        self.store
            .definition(path)
            .map_err(|err| reject("definition", path, err))
    }

    pub fn handle_directory(&self, path: &str) -> QueryResult<Listing> {
        self.store
            .enumerate(path)
            .map_err(|err| reject("directory", path, err))
    }

    pub fn handle_set(&self, path: &str, text: &str) -> QueryResult<LeafView> {
        let snapshot = self
            .store
            .set(path, text)
            .map_err(|err| reject("set", path, err))?;
        Ok(LeafView::new(self.canonical(path), &snapshot))
    }

    pub fn handle_values(&self, path: &str) -> QueryResult<ValueTree> {
        self.store
            .values(path)
            .map_err(|err| reject("values", path, err))
    }

    /// Declared spelling of a path that has already resolved.
    fn canonical(&self, path: &str) -> String {
        self.store
            .canonical_path(path)
            .map_or_else(|_| path.to_owned(), |p| p.to_string())
    }
}

fn reject(op: &'static str, path: &str, err: ModelError) -> QueryError {
    debug!(op, path, code = %err.code(), error = %err, "query rejected");
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ModelBuilder, TypeDecl};

    fn port() -> QueryPort {
        let store = ModelBuilder::new()
            .enum_type("Beh", [("on", 1), ("blocked", 2), ("test", 3)])
            .ied("R1", |ied| {
                ied.logical_device("C1", |ld| {
                    ld.logical_node("LLN0", |ln| {
                        ln.data_object("Beh", |d| {
                            d.attribute("stVal", TypeDecl::Enum("Beh".into()));
                        });
                    });
                });
            })
            .build()
            .unwrap();
        QueryPort::new(Arc::new(store))
    }

    #[test]
    fn get_renders_enum_by_name() {
        let port = port();
        port.handle_set("R1.C1.LLN0.Beh.stVal", "3").unwrap();
        let view = port.handle_get("R1/C1/LLN0/Beh/stVal").unwrap();
        assert_eq!(view.path, "R1/C1.LLN0.Beh.stVal");
        assert_eq!(view.value, serde_json::json!("test"));
        assert_eq!(view.ty, "enum");
    }

    #[test]
    fn errors_carry_stable_codes() {
        let port = port();
        let err = port.handle_get("R1/C1.LLN0.Mod.stVal").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let err = port.handle_set("R1/C1.LLN0.Beh.stVal", "sideways").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadValue);
        let err = port.handle_set("R1/C1.LLN0.Beh", "on").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotALeaf);
        let err = port.handle_get("R1/C1.LLN0.Beh.stVal.x").unwrap_err();
        assert_eq!(err.code, ErrorCode::WrongDepth);

        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["code"], "WRONG_DEPTH");
    }

    #[test]
    fn definition_of_container_nests_types() {
        let port = port();
        let json = serde_json::to_value(port.handle_definition("R1/C1.LLN0").unwrap()).unwrap();
        assert_eq!(json["kind"], "logical-node");
        assert_eq!(json["children"]["Beh"]["children"]["stVal"]["type"], "enum");
    }

    #[test]
    fn leaf_views_use_declared_names() {
        use r_ied_common::config::NameMatching;

        let store = ModelBuilder::new()
            .name_matching(NameMatching::CaseInsensitive)
            .ied("R1", |ied| {
                ied.logical_device("C1", |ld| {
                    ld.logical_node("LLN0", |ln| {
                        ln.data_object("NamPlt", |d| {
                            d.attribute("configRev", TypeDecl::VisString(64));
                        });
                    });
                });
            })
            .build()
            .unwrap();
        let port = QueryPort::new(Arc::new(store));

        let view = port.handle_set("r1/c1.lln0.namplt.CONFIGREV", "rev-2").unwrap();
        assert_eq!(view.path, "R1/C1.LLN0.NamPlt.configRev");
        let view = port.handle_get("R1.C1.LLN0.NAMPLT.configrev").unwrap();
        assert_eq!(view.path, "R1/C1.LLN0.NamPlt.configRev");
        assert_eq!(view.value, serde_json::json!("rev-2"));
    }

    #[test]
    fn definition_of_root_is_keyed_by_ied() {
        let port = port();
        let json = serde_json::to_value(port.handle_definition("").unwrap()).unwrap();
        assert!(json.get("kind").is_none());
        assert_eq!(json["R1"]["kind"], "ied");
        assert_eq!(json["R1"]["children"]["C1"]["kind"], "logical-device");
    }
}
