use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::bbox::BBox;

/// Binary gender estimate. The discriminants match the oracle's raw codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female = 0,
    Male = 1,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => write!(f, "Female"),
            Gender::Male => write!(f, "Male"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalField {
    Age,
    Gender,
    Embedding,
}

impl fmt::Display for SignalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalField::Age => write!(f, "age"),
            SignalField::Gender => write!(f, "gender"),
            SignalField::Embedding => write!(f, "embedding"),
        }
    }
}

/// A per-detection signal that is present but cannot be used.
///
/// Never fatal: the field is dropped for that frame.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed {field} signal: {reason}")]
pub struct MalformedSignal {
    pub field: SignalField,
    pub reason: String,
}

impl MalformedSignal {
    pub fn new(field: SignalField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Demographic value exactly as the oracle reported it.
///
/// Oracles are free to report numbers, numeric strings, labels or garbage;
/// coercion to typed values happens in [`RawSignal::to_age`] and
/// [`RawSignal::to_gender`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSignal {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawSignal {
    /// Truncates to a whole number of years and checks `valid`.
    pub fn to_age(&self, valid: &RangeInclusive<u32>) -> Result<u32, MalformedSignal> {
        let value = match self {
            RawSignal::Number(n) => *n,
            RawSignal::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                MalformedSignal::new(SignalField::Age, format!("{s:?} is not an integer"))
            })? as f64,
            RawSignal::Other(v) => {
                return Err(MalformedSignal::new(
                    SignalField::Age,
                    format!("unsupported value {v}"),
                ))
            }
        };
        if !value.is_finite() {
            return Err(MalformedSignal::new(SignalField::Age, "not a finite number"));
        }
        let years = value.trunc();
        if years < *valid.start() as f64 || years > *valid.end() as f64 {
            return Err(MalformedSignal::new(
                SignalField::Age,
                format!("{years} outside {}..={}", valid.start(), valid.end()),
            ));
        }
        Ok(years as u32)
    }

    /// Accepts the raw codes 0/1 (as numbers or strings) and the labels
    /// "female"/"male" in any case.
    pub fn to_gender(&self) -> Result<Gender, MalformedSignal> {
        let code = match self {
            RawSignal::Number(n) if n.is_finite() => n.trunc() as i64,
            RawSignal::Text(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("female") {
                    return Ok(Gender::Female);
                }
                if s.eq_ignore_ascii_case("male") {
                    return Ok(Gender::Male);
                }
                s.parse::<i64>().map_err(|_| {
                    MalformedSignal::new(SignalField::Gender, format!("{s:?} is not a gender"))
                })?
            }
            other => {
                return Err(MalformedSignal::new(
                    SignalField::Gender,
                    format!("unsupported value {other:?}"),
                ))
            }
        };
        Gender::try_from(code)
    }
}

impl From<f64> for RawSignal {
    fn from(value: f64) -> Self {
        RawSignal::Number(value)
    }
}

impl TryFrom<i64> for Gender {
    type Error = MalformedSignal;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Gender::Female),
            1 => Ok(Gender::Male),
            other => Err(MalformedSignal::new(
                SignalField::Gender,
                format!("unknown code {other}"),
            )),
        }
    }
}

/// One face found by the oracle in the current frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BBox,
    pub det_score: f64,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub age: Option<RawSignal>,
    #[serde(default)]
    pub gender: Option<RawSignal>,
}
