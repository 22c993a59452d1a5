//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Leaf attribute cell and its synchronisation primitive."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use r_ied_common::config::StalenessPolicy;

use crate::error::TypeMismatch;
use crate::quality::{Quality, Validity};
use crate::value::{AttributeType, Value, VectorField};

/// How a write treats the quality already stored in the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityHint {
    /// Source is trusted: validity good, detail flags cleared.
    #[default]
    Fresh,
    /// Source flagged as doubtful: existing flags kept, validity questionable.
    Suspect,
    /// Replace the quality word wholesale.
    Explicit(Quality),
}

impl QualityHint {
    pub fn apply(self, previous: Quality) -> Quality {
        match self {
            QualityHint::Fresh => previous.refreshed(),
            QualityHint::Suspect => previous.with_validity(Validity::Questionable),
            QualityHint::Explicit(quality) => quality,
        }
    }
}

/// Consistent copy of a cell taken under its read guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub ty: AttributeType,
    pub value: Value,
    pub quality: Quality,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CellState {
    value: Value,
    quality: Quality,
    updated_at: Option<DateTime<Utc>>,
}

/// One leaf value guarded by its own lock. Guards are held only while the
/// state is copied in or out, never across another cell.
#[derive(Debug)]
pub struct AttributeCell {
    ty: AttributeType,
    state: RwLock<CellState>,
}

impl AttributeCell {
    /// `initial` must already conform to `ty`; the builder guarantees this.
    pub(crate) fn new(ty: AttributeType, initial: Value) -> Self {
        Self {
            ty,
            state: RwLock::new(CellState {
                value: initial,
                quality: Quality::initial(),
                updated_at: None,
            }),
        }
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.ty
    }

    /// Type seen through `field`: a vector half is a plain float.
    pub fn field_type(&self, field: Option<VectorField>) -> AttributeType {
        match field {
            Some(_) => AttributeType::Float32,
            None => self.ty.clone(),
        }
    }

    pub fn snapshot(
        &self,
        field: Option<VectorField>,
        staleness: StalenessPolicy,
        now: DateTime<Utc>,
    ) -> Snapshot {
        let state = self.state.read();
        self.render(&state, field, staleness, now)
    }

    /// The single write primitive shared by every update port. Returns the
    /// state as left by this write, taken before the guard is released.
    pub(crate) fn write(
        &self,
        field: Option<VectorField>,
        value: Value,
        hint: QualityHint,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, TypeMismatch> {
        self.update(field, |_| value, hint, now)
    }

    /// Read-modify-write under one write guard. `next` sees the current value
    /// through `field` (a vector half as a float) and its result is conformed
    /// like any other write; on mismatch the cell is left untouched.
    pub(crate) fn update<F>(
        &self,
        field: Option<VectorField>,
        next: F,
        hint: QualityHint,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, TypeMismatch>
    where
        F: FnOnce(&Value) -> Value,
    {
        let mut state = self.state.write();
        let current = field_value(&state.value, field);
        let value = self.field_type(field).conform(next(&current))?;
        match (field, value) {
            (Some(field), Value::Float32(half)) => match &mut state.value {
                Value::Vector(vector) => vector.set(field, half),
                other => {
                    return Err(TypeMismatch {
                        expected: "vector".to_owned(),
                        found: format!("{other:?}"),
                    })
                }
            },
            (_, value) => state.value = value,
        }
        state.quality = hint.apply(state.quality);
        state.updated_at = Some(now);
        // written at `now`, so no staleness policy can flag it yet
        Ok(self.render(&state, field, StalenessPolicy::InitialOnly, now))
    }

    fn render(
        &self,
        state: &CellState,
        field: Option<VectorField>,
        staleness: StalenessPolicy,
        now: DateTime<Utc>,
    ) -> Snapshot {
        let mut quality = state.quality;
        if let StalenessPolicy::MaxAge { max_age } = staleness {
            let stale = match state.updated_at {
                Some(at) => now
                    .signed_duration_since(at)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false),
                None => true,
            };
            if stale {
                quality.insert(Quality::OLD_DATA);
            }
        }
        Snapshot {
            ty: self.field_type(field),
            value: field_value(&state.value, field),
            quality,
            updated_at: state.updated_at,
        }
    }
}

fn field_value(value: &Value, field: Option<VectorField>) -> Value {
    match (field, value) {
        (Some(field), Value::Vector(vector)) => Value::Float32(vector.get(field)),
        _ => value.clone(),
    }
}
