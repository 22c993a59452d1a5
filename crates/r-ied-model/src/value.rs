//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Attribute types, typed values and text coercion."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CoercionError, TypeMismatch};
use crate::quality::{Quality, QualityView};

/// Named enumeration with explicit ordinals, e.g. `Beh` or `Health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    members: IndexMap<String, i32>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, members: IndexMap<String, i32>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, i32)> {
        self.members.iter().map(|(name, ord)| (name.as_str(), *ord))
    }

    pub fn name_of(&self, ordinal: i32) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, ord)| **ord == ordinal)
            .map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, ordinal: i32) -> bool {
        self.members.values().any(|ord| *ord == ordinal)
    }

    /// Member lookup: exact name first, then a unique case-insensitive match.
    pub fn ordinal_of(&self, name: &str) -> Option<i32> {
        if let Some(ord) = self.members.get(name) {
            return Some(*ord);
        }
        let mut matches = self
            .members
            .iter()
            .filter(|(member, _)| member.eq_ignore_ascii_case(name));
        match (matches.next(), matches.next()) {
            (Some((_, ord)), None) => Some(*ord),
            _ => None,
        }
    }

    fn first_ordinal(&self) -> i32 {
        self.members.values().next().copied().unwrap_or_default()
    }
}

/// Declared type of a leaf attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    Float32,
    Int32,
    Enum(Arc<EnumType>),
    VisString { max_len: usize },
    Timestamp,
    Quality,
    Boolean,
    /// Magnitude/angle pair held in one cell so both halves change together.
    Vector,
}

impl AttributeType {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeType::Float32 => "float32",
            AttributeType::Int32 => "int32",
            AttributeType::Enum(_) => "enum",
            AttributeType::VisString { .. } => "vis-string",
            AttributeType::Timestamp => "timestamp",
            AttributeType::Quality => "quality",
            AttributeType::Boolean => "boolean",
            AttributeType::Vector => "vector",
        }
    }

    /// Value a freshly built cell holds when the declaration gives none.
    pub fn default_value(&self) -> Value {
        match self {
            AttributeType::Float32 => Value::Float32(0.0),
            AttributeType::Int32 => Value::Int32(0),
            AttributeType::Enum(ty) => Value::Enum(ty.first_ordinal()),
            AttributeType::VisString { .. } => Value::VisString(String::new()),
            AttributeType::Timestamp => Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
            AttributeType::Quality => Value::Quality(Quality::GOOD),
            AttributeType::Boolean => Value::Boolean(false),
            AttributeType::Vector => Value::Vector(Vector::default()),
        }
    }

    /// Parse text received from the external request layer.
    pub fn coerce(&self, text: &str) -> Result<Value, CoercionError> {
        let trimmed = text.trim();
        match self {
            AttributeType::Float32 => parse_f32(text, trimmed, "float32").map(Value::Float32),
            AttributeType::Int32 => trimmed
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|err| CoercionError::new(text, "int32", err.to_string())),
            AttributeType::Enum(ty) => coerce_enum(ty, text, trimmed),
            AttributeType::VisString { max_len } => {
                coerce_vis_string(strip_line_end(text), *max_len).map(Value::VisString)
            }
            AttributeType::Timestamp => coerce_timestamp(text, trimmed).map(Value::Timestamp),
            AttributeType::Quality => Quality::parse(trimmed).map(Value::Quality),
            AttributeType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => Ok(Value::Boolean(true)),
                "false" | "0" | "off" => Ok(Value::Boolean(false)),
                _ => Err(CoercionError::new(
                    text,
                    "boolean",
                    "expected true/false, 1/0 or on/off",
                )),
            },
            AttributeType::Vector => coerce_vector(text, trimmed).map(Value::Vector),
        }
    }

    /// Check a pre-typed value against this type, truncating over-long strings.
    pub fn conform(&self, value: Value) -> Result<Value, TypeMismatch> {
        let mismatch = |value: &Value| TypeMismatch {
            expected: self.to_string(),
            found: value.describe(),
        };
        match (self, value) {
            (AttributeType::Float32, Value::Float32(v)) if v.is_finite() => Ok(Value::Float32(v)),
            (AttributeType::Int32, Value::Int32(v)) => Ok(Value::Int32(v)),
            (AttributeType::Enum(ty), Value::Enum(ord)) if ty.contains(ord) => Ok(Value::Enum(ord)),
            (AttributeType::VisString { max_len }, Value::VisString(s)) => {
                coerce_vis_string(&s, *max_len)
                    .map(Value::VisString)
                    .map_err(|_| mismatch(&Value::VisString(s)))
            }
            (AttributeType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(ts)),
            (AttributeType::Quality, Value::Quality(q)) if q.is_defined() => Ok(Value::Quality(q)),
            (AttributeType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (AttributeType::Vector, Value::Vector(v)) if v.is_finite() => Ok(Value::Vector(v)),
            (_, other) => Err(mismatch(&other)),
        }
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        let mut descriptor = TypeDescriptor {
            kind: self.type_name(),
            max_length: None,
            enum_type: None,
            members: None,
            fields: None,
        };
        match self {
            AttributeType::VisString { max_len } => descriptor.max_length = Some(*max_len),
            AttributeType::Enum(ty) => {
                descriptor.enum_type = Some(ty.name().to_owned());
                descriptor.members = Some(
                    ty.members()
                        .map(|(name, ordinal)| EnumMember {
                            name: name.to_owned(),
                            ordinal,
                        })
                        .collect(),
                );
            }
            AttributeType::Vector => descriptor.fields = Some(vec!["mag", "ang"]),
            _ => {}
        }
        descriptor
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Enum(ty) => write!(f, "enum {}", ty.name()),
            AttributeType::VisString { max_len } => write!(f, "vis-string({max_len})"),
            other => f.write_str(other.type_name()),
        }
    }
}

/// Serializable type metadata used by definition and directory listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDescriptor {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<EnumMember>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<&'static str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub ordinal: i32,
}

/// Magnitude and angle (degrees) of a phasor, as in `cVal`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub mag: f32,
    pub ang: f32,
}

impl Vector {
    pub fn new(mag: f32, ang: f32) -> Self {
        Self { mag, ang }
    }

    pub fn get(&self, field: VectorField) -> f32 {
        match field {
            VectorField::Magnitude => self.mag,
            VectorField::Angle => self.ang,
        }
    }

    pub fn set(&mut self, field: VectorField, value: f32) {
        match field {
            VectorField::Magnitude => self.mag = value,
            VectorField::Angle => self.ang = value,
        }
    }

    fn is_finite(&self) -> bool {
        self.mag.is_finite() && self.ang.is_finite()
    }
}

/// Half of a [`Vector`] addressed by `mag[.f]` or `ang[.f]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorField {
    Magnitude,
    Angle,
}

impl VectorField {
    pub fn name(self) -> &'static str {
        match self {
            VectorField::Magnitude => "mag",
            VectorField::Angle => "ang",
        }
    }

    /// Match the segments that follow a vector leaf. `eq` applies the store's
    /// name-matching policy.
    pub fn from_segments<S, F>(segments: &[S], eq: F) -> Option<VectorField>
    where
        S: AsRef<str>,
        F: Fn(&str, &str) -> bool,
    {
        let (head, rest) = segments.split_first()?;
        let field = [VectorField::Magnitude, VectorField::Angle]
            .into_iter()
            .find(|field| eq(field.name(), head.as_ref()))?;
        match rest {
            [] => Some(field),
            [f] if eq("f", f.as_ref()) => Some(field),
            _ => None,
        }
    }
}

/// A typed attribute payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    Float32(f32),
    Int32(i32),
    Enum(i32),
    VisString(String),
    Timestamp(DateTime<Utc>),
    Quality(Quality),
    Boolean(bool),
    Vector(Vector),
}

impl Value {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) | Value::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::VisString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector> {
        match self {
            Value::Vector(v) => Some(*v),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Value::Float32(v) => format!("float32 {v}"),
            Value::Int32(v) => format!("int32 {v}"),
            Value::Enum(v) => format!("enum ordinal {v}"),
            Value::VisString(v) => format!("vis-string of {} chars", v.chars().count()),
            Value::Timestamp(_) => "timestamp".to_owned(),
            Value::Quality(_) => "quality".to_owned(),
            Value::Boolean(_) => "boolean".to_owned(),
            Value::Vector(v) => format!("vector ({}, {})", v.mag, v.ang),
        }
    }

    /// JSON rendering for responses; enums render as their member name.
    pub fn to_json(&self, ty: &AttributeType) -> serde_json::Value {
        match self {
            Value::Float32(v) => json!(widen(*v)),
            Value::Int32(v) => json!(v),
            Value::Enum(ord) => match ty {
                AttributeType::Enum(enum_ty) => match enum_ty.name_of(*ord) {
                    Some(name) => json!(name),
                    None => json!(ord),
                },
                _ => json!(ord),
            },
            Value::VisString(v) => json!(v),
            Value::Timestamp(ts) => json!(ts.to_rfc3339()),
            Value::Quality(q) => json!(QualityView::from(*q)),
            Value::Boolean(v) => json!(v),
            Value::Vector(v) => json!({ "mag": widen(v.mag), "ang": widen(v.ang) }),
        }
    }
}

/// Widen through the shortest decimal form so `123.45f32` renders as `123.45`.
fn widen(value: f32) -> f64 {
    value
        .to_string()
        .parse::<f64>()
        .unwrap_or_else(|_| f64::from(value))
}

fn parse_f32(input: &str, trimmed: &str, expected: &str) -> Result<f32, CoercionError> {
    let value = trimmed
        .parse::<f32>()
        .map_err(|err| CoercionError::new(input, expected, err.to_string()))?;
    if !value.is_finite() {
        return Err(CoercionError::new(input, expected, "value is not finite"));
    }
    Ok(value)
}

fn coerce_enum(ty: &EnumType, input: &str, trimmed: &str) -> Result<Value, CoercionError> {
    if let Some(ord) = ty.ordinal_of(trimmed) {
        return Ok(Value::Enum(ord));
    }
    if let Ok(ord) = trimmed.parse::<i32>() {
        if ty.contains(ord) {
            return Ok(Value::Enum(ord));
        }
    }
    Err(CoercionError::new(
        input,
        format!("enum {}", ty.name()),
        "not a defined member name or ordinal",
    ))
}

/// Visible ASCII only, truncated to `max_len` characters.
/// Vis-strings keep inner and leading blanks; only one trailing line end goes.
fn strip_line_end(text: &str) -> &str {
    match text.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => text,
    }
}

fn coerce_vis_string(input: &str, max_len: usize) -> Result<String, CoercionError> {
    if let Some(bad) = input.chars().find(|c| !(' '..='~').contains(c)) {
        return Err(CoercionError::new(
            input,
            format!("vis-string({max_len})"),
            format!("character {bad:?} is not visible ASCII"),
        ));
    }
    Ok(input.chars().take(max_len).collect())
}

fn coerce_timestamp(input: &str, trimmed: &str) -> Result<DateTime<Utc>, CoercionError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    let seconds = trimmed.parse::<f64>().map_err(|_| {
        CoercionError::new(
            input,
            "timestamp",
            "expected RFC 3339 or seconds since the epoch",
        )
    })?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(CoercionError::new(input, "timestamp", "epoch seconds out of range"));
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999))
        .single()
        .ok_or_else(|| CoercionError::new(input, "timestamp", "epoch seconds out of range"))
}

/// `mag,ang` with optional whitespace.
fn coerce_vector(input: &str, trimmed: &str) -> Result<Vector, CoercionError> {
    let Some((mag, ang)) = trimmed.split_once(',') else {
        return Err(CoercionError::new(input, "vector", "expected 'mag,ang'"));
    };
    Ok(Vector {
        mag: parse_f32(input, mag.trim(), "vector")?,
        ang: parse_f32(input, ang.trim(), "vector")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn behaviour() -> AttributeType {
        let members = [("on", 1), ("blocked", 2), ("test", 3), ("off", 5)]
            .into_iter()
            .map(|(name, ord)| (name.to_owned(), ord))
            .collect();
        AttributeType::Enum(Arc::new(EnumType::new("Beh", members)))
    }

    #[test]
    fn float_coercion_rejects_garbage_and_non_finite() {
        let ty = AttributeType::Float32;
        assert_eq!(ty.coerce(" 123.45 ").unwrap(), Value::Float32(123.45));
        assert!(ty.coerce("abc").is_err());
        assert!(ty.coerce("NaN").is_err());
        assert!(ty.coerce("inf").is_err());
    }

    #[test]
    fn enum_coercion_accepts_names_and_defined_ordinals() {
        let ty = behaviour();
        assert_eq!(ty.coerce("blocked").unwrap(), Value::Enum(2));
        assert_eq!(ty.coerce("OFF").unwrap(), Value::Enum(5));
        assert_eq!(ty.coerce("3").unwrap(), Value::Enum(3));
        assert!(ty.coerce("4").is_err());
        assert!(ty.coerce("sleepy").is_err());
    }

    #[test]
    fn vis_string_truncates_and_rejects_control_characters() {
        let ty = AttributeType::VisString { max_len: 8 };
        assert_eq!(
            ty.coerce("1234567890").unwrap(),
            Value::VisString("12345678".into())
        );
        assert!(ty.coerce("tab\there").is_err());
    }

    #[test]
    fn vis_string_drops_one_trailing_line_end() {
        let ty = AttributeType::VisString { max_len: 16 };
        assert_eq!(ty.coerce("xyz\n").unwrap(), Value::VisString("xyz".into()));
        assert_eq!(ty.coerce(" xyz \r\n").unwrap(), Value::VisString(" xyz ".into()));
        assert!(ty.coerce("xyz\n\n").is_err());
    }

    #[test]
    fn timestamp_accepts_rfc3339_and_epoch_seconds() {
        let ty = AttributeType::Timestamp;
        let Value::Timestamp(rfc) = ty.coerce("2024-01-01T00:00:00Z").unwrap() else {
            panic!("expected timestamp");
        };
        let Value::Timestamp(epoch) = ty.coerce("1704067200").unwrap() else {
            panic!("expected timestamp");
        };
        assert_eq!(rfc, epoch);
        assert!(ty.coerce("yesterday").is_err());
    }

    #[test]
    fn vector_coercion_needs_both_halves() {
        let ty = AttributeType::Vector;
        assert_eq!(
            ty.coerce("6350.85, -120").unwrap(),
            Value::Vector(Vector::new(6350.85, -120.0))
        );
        assert!(ty.coerce("6350.85").is_err());
    }

    #[test]
    fn conform_rejects_wrong_variant_and_undefined_ordinal() {
        assert!(AttributeType::Float32.conform(Value::Int32(1)).is_err());
        assert!(behaviour().conform(Value::Enum(9)).is_err());
        let undefined: Value = serde_json::from_str(r#"{"type":"quality","value":65535}"#).unwrap();
        assert!(AttributeType::Quality.conform(undefined).is_err());
        assert_eq!(
            AttributeType::VisString { max_len: 3 }
                .conform(Value::VisString("abcdef".into()))
                .unwrap(),
            Value::VisString("abc".into())
        );
    }

    #[test]
    fn vector_fields_match_with_optional_f_suffix() {
        let exact = |a: &str, b: &str| a == b;
        assert_eq!(
            VectorField::from_segments(&["mag", "f"], exact),
            Some(VectorField::Magnitude)
        );
        assert_eq!(
            VectorField::from_segments(&["ang"], exact),
            Some(VectorField::Angle)
        );
        assert_eq!(VectorField::from_segments(&["mag", "i"], exact), None);
        assert_eq!(VectorField::from_segments::<&str, _>(&[], exact), None);
    }

    #[test]
    fn json_rendering_keeps_short_float_form_and_enum_names() {
        let json = Value::Float32(123.45).to_json(&AttributeType::Float32);
        assert_eq!(json.to_string(), "123.45");
        let beh = Value::Enum(2).to_json(&behaviour());
        assert_eq!(beh, json!("blocked"));
    }
}
