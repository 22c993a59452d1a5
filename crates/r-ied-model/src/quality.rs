//! ---
//! ied_section: "02-object-model"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "IEC 61850-7-3 style quality bitset."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Quality word carried by every attribute cell.
//!
//! Bits 0-1 hold the validity, the remaining bits are detail and source flags in
//! the order of IEC 61850-7-3. The word is plain data; cells copy it under their
//! own lock so flags and value always travel together.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoercionError;

const VALIDITY_MASK: u16 = 0b11;
const ALL_BITS: u16 = 0x1FFF;

/// Detail flags cleared by a fresh write.
const DETAIL_MASK: u16 = Quality::OVERFLOW.0
    | Quality::OUT_OF_RANGE.0
    | Quality::BAD_REFERENCE.0
    | Quality::OSCILLATORY.0
    | Quality::FAILURE.0
    | Quality::OLD_DATA.0
    | Quality::INCONSISTENT.0
    | Quality::INACCURATE.0;

const FLAG_NAMES: [(&str, Quality); 11] = [
    ("overflow", Quality::OVERFLOW),
    ("outOfRange", Quality::OUT_OF_RANGE),
    ("badReference", Quality::BAD_REFERENCE),
    ("oscillatory", Quality::OSCILLATORY),
    ("failure", Quality::FAILURE),
    ("oldData", Quality::OLD_DATA),
    ("inconsistent", Quality::INCONSISTENT),
    ("inaccurate", Quality::INACCURATE),
    ("substituted", Quality::SUBSTITUTED),
    ("test", Quality::TEST),
    ("operatorBlocked", Quality::OPERATOR_BLOCKED),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Validity {
    Good,
    Invalid,
    Reserved,
    Questionable,
}

impl Validity {
    fn bits(self) -> u16 {
        match self {
            Validity::Good => 0b00,
            Validity::Invalid => 0b01,
            Validity::Reserved => 0b10,
            Validity::Questionable => 0b11,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(u16);

impl Quality {
    pub const GOOD: Quality = Quality(0);
    pub const OVERFLOW: Quality = Quality(1 << 2);
    pub const OUT_OF_RANGE: Quality = Quality(1 << 3);
    pub const BAD_REFERENCE: Quality = Quality(1 << 4);
    pub const OSCILLATORY: Quality = Quality(1 << 5);
    pub const FAILURE: Quality = Quality(1 << 6);
    pub const OLD_DATA: Quality = Quality(1 << 7);
    pub const INCONSISTENT: Quality = Quality(1 << 8);
    pub const INACCURATE: Quality = Quality(1 << 9);
    pub const SUBSTITUTED: Quality = Quality(1 << 10);
    pub const TEST: Quality = Quality(1 << 11);
    pub const OPERATOR_BLOCKED: Quality = Quality(1 << 12);

    /// Quality of a cell that has not been written since start-up.
    pub const fn initial() -> Quality {
        Quality(0b11 | Quality::OLD_DATA.0)
    }

    /// Build from raw bits; bits beyond the defined flags are dropped.
    pub const fn from_bits(bits: u16) -> Quality {
        Quality(bits & ALL_BITS)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// No bit outside the defined flags is set.
    pub const fn is_defined(self) -> bool {
        self.0 & !ALL_BITS == 0
    }

    pub fn validity(self) -> Validity {
        match self.0 & VALIDITY_MASK {
            0b00 => Validity::Good,
            0b01 => Validity::Invalid,
            0b10 => Validity::Reserved,
            _ => Validity::Questionable,
        }
    }

    pub fn with_validity(self, validity: Validity) -> Quality {
        Quality((self.0 & !VALIDITY_MASK) | validity.bits())
    }

    pub fn contains(self, flag: Quality) -> bool {
        flag.0 & !VALIDITY_MASK != 0 && self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: Quality) {
        self.0 |= flag.0 & !VALIDITY_MASK;
    }

    pub fn remove(&mut self, flag: Quality) {
        self.0 &= !(flag.0 & !VALIDITY_MASK);
    }

    /// Good validity with no detail flags; source, test and blocked flags survive.
    pub fn refreshed(self) -> Quality {
        Quality(self.0 & !(DETAIL_MASK | VALIDITY_MASK))
    }

    pub fn is_fresh(self) -> bool {
        self.validity() == Validity::Good && !self.contains(Quality::OLD_DATA)
    }

    /// Names of the set detail/source flags, in bit order.
    pub fn flag_names(self) -> Vec<&'static str> {
        FLAG_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Parse `0x0083`, `131`, or `|`-joined names such as `questionable|oldData`.
    pub fn parse(text: &str) -> Result<Quality, CoercionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CoercionError::new(text, "quality", "empty input"));
        }
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let bits = u16::from_str_radix(hex, 16)
                .map_err(|err| CoercionError::new(text, "quality", err.to_string()))?;
            return Self::checked_bits(text, bits);
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            let bits = trimmed
                .parse::<u16>()
                .map_err(|err| CoercionError::new(text, "quality", err.to_string()))?;
            return Self::checked_bits(text, bits);
        }

        let mut quality = Quality::GOOD;
        for token in trimmed.split('|').map(str::trim) {
            if let Ok(validity) = Validity::from_str(token) {
                quality = quality.with_validity(validity);
                continue;
            }
            let Some((_, flag)) = FLAG_NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(token))
            else {
                return Err(CoercionError::new(
                    text,
                    "quality",
                    format!("unknown quality flag '{token}'"),
                ));
            };
            quality.insert(*flag);
        }
        Ok(quality)
    }

    fn checked_bits(text: &str, bits: u16) -> Result<Quality, CoercionError> {
        if bits & !ALL_BITS != 0 {
            return Err(CoercionError::new(
                text,
                "quality",
                "undefined quality bits set",
            ));
        }
        Ok(Quality(bits))
    }
}

impl fmt::Debug for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quality({self})")
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.validity())?;
        for name in self.flag_names() {
            write!(f, "|{name}")?;
        }
        Ok(())
    }
}

impl FromStr for Quality {
    type Err = CoercionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::parse(s)
    }
}

/// Strict counterpart of [`Quality::from_bits`].
impl TryFrom<u16> for Quality {
    type Error = CoercionError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        Quality::checked_bits(&bits.to_string(), bits)
    }
}

/// Serializable breakdown used in query responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityView {
    pub validity: Validity,
    pub flags: Vec<&'static str>,
    pub bits: u16,
}

impl From<Quality> for QualityView {
    fn from(quality: Quality) -> Self {
        Self {
            validity: quality.validity(),
            flags: quality.flag_names(),
            bits: quality.bits(),
        }
    }
}
