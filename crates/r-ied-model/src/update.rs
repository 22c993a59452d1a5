//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Update ports: frame batches and cached leaf handles."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use r_ied_common::config::StalenessPolicy;
use serde::Serialize;

use crate::cell::{AttributeCell, QualityHint, Snapshot};
use crate::error::{ModelError, Result};
use crate::value::{AttributeType, Value, VectorField};

/// Pre-resolved writer for one leaf. The computation loop resolves its
/// targets once at start-up and writes through these on every tick.
#[derive(Clone)]
pub struct LeafHandle {
    cell: Arc<AttributeCell>,
    field: Option<VectorField>,
    path: String,
    staleness: StalenessPolicy,
}

impl LeafHandle {
    pub(crate) fn new(
        cell: Arc<AttributeCell>,
        field: Option<VectorField>,
        path: String,
        staleness: StalenessPolicy,
    ) -> Self {
        Self {
            cell,
            field,
            path,
            staleness,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.cell.field_type(self.field)
    }

    pub fn write(&self, value: Value, quality: QualityHint) -> Result<()> {
        self.update(|_| value, quality).map(drop)
    }

    /// Derive the new value from the current one without another writer
    /// slipping in between, e.g. a counter increment.
    pub fn update<F>(&self, next: F, quality: QualityHint) -> Result<Snapshot>
    where
        F: FnOnce(&Value) -> Value,
    {
        self.cell
            .update(self.field, next, quality, Utc::now())
            .map_err(|source| ModelError::TypeMismatch {
                path: self.path.clone(),
                source,
            })
    }

    pub fn read(&self) -> Snapshot {
        self.cell.snapshot(self.field, self.staleness, Utc::now())
    }
}

impl fmt::Debug for LeafHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafHandle")
            .field("path", &self.path)
            .field("field", &self.field)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum UpdateTarget {
    Path(String),
    Handle(LeafHandle),
}

/// One decoded value destined for a leaf.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub target: UpdateTarget,
    pub value: Value,
    pub quality: QualityHint,
}

impl FrameUpdate {
    pub fn at_path(path: impl Into<String>, value: Value) -> Self {
        Self {
            target: UpdateTarget::Path(path.into()),
            value,
            quality: QualityHint::Fresh,
        }
    }

    pub fn at_handle(handle: LeafHandle, value: Value) -> Self {
        Self {
            target: UpdateTarget::Handle(handle),
            value,
            quality: QualityHint::Fresh,
        }
    }

    pub fn with_quality(mut self, quality: QualityHint) -> Self {
        self.quality = quality;
        self
    }

    pub fn target_path(&self) -> &str {
        match &self.target {
            UpdateTarget::Path(path) => path,
            UpdateTarget::Handle(handle) => handle.path(),
        }
    }
}

/// Outcome of a best-effort batch: bad entries are skipped and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.applied + self.skipped
    }

    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }

    pub fn into_result(self) -> Result<BatchReport> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(ModelError::PartialBatchApplied {
                skipped: self.skipped,
                total: self.total(),
            })
        }
    }
}

impl std::ops::AddAssign for BatchReport {
    fn add_assign(&mut self, rhs: Self) {
        self.applied += rhs.applied;
        self.skipped += rhs.skipped;
    }
}
