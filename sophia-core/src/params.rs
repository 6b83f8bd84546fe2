//! Strategy parameters: values, declared domains, and canonical fingerprints.
//!
//! A `ParameterSet` uniquely identifies one optimizer candidate. It is stored in
//! a `BTreeMap` so serialization and hashing see keys in a fixed order.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::domain::SymbolSpecError;

/// Setup-time configuration errors. Never clamped silently.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown parameter '{name}' for strategy '{strategy}'")]
    UnknownParameter { strategy: String, name: String },

    #[error("parameter '{name}' expects {expected}, got {got}")]
    WrongType {
        name: String,
        expected: ParamKind,
        got: ParamValue,
    },

    #[error("parameter '{name}' = {value} outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid parameter combination: {0}")]
    InvalidCombination(String),

    #[error("risk setting '{field}' invalid: {reason}")]
    InvalidRisk { field: &'static str, reason: String },

    #[error("symbol spec: {0}")]
    Symbol(#[from] SymbolSpecError),

    #[error("no symbol spec configured for '{0}'")]
    UnknownSymbol(String),
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Bool,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Int => write!(f, "an integer"),
            ParamKind::Float => write!(f, "a number"),
            ParamKind::Bool => write!(f, "a boolean"),
        }
    }
}

/// A single parameter value.
///
/// Untagged so configs read naturally (`entry_period = 20`, `vol_threshold = 1.2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Int(v) => Some(v as f64),
            ParamValue::Float(v) => Some(v),
            ParamValue::Bool(_) => None,
        }
    }

    fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// Declared domain of one parameter: type plus inclusive range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDomain {
    pub name: String,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
}

impl ParameterDomain {
    pub fn int(name: &str, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Int,
            min: min as f64,
            max: max as f64,
        }
    }

    pub fn float(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float,
            min,
            max,
        }
    }

    pub fn boolean(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Bool,
            min: 0.0,
            max: 1.0,
        }
    }

    /// Check type and range. Integers are accepted where floats are declared.
    pub fn validate(&self, value: &ParamValue) -> Result<(), ConfigError> {
        let type_ok = match (self.kind, value.kind()) {
            (ParamKind::Bool, ParamKind::Bool) => true,
            (ParamKind::Int, ParamKind::Int) => true,
            (ParamKind::Float, ParamKind::Float | ParamKind::Int) => true,
            _ => false,
        };
        if !type_ok {
            return Err(ConfigError::WrongType {
                name: self.name.clone(),
                expected: self.kind,
                got: *value,
            });
        }
        if let Some(v) = value.as_f64() {
            if !v.is_finite() || v < self.min || v > self.max {
                return Err(ConfigError::OutOfRange {
                    name: self.name.clone(),
                    value: v,
                    min: self.min,
                    max: self.max,
                });
            }
        }
        Ok(())
    }

    /// Uniform sample within the domain.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self.kind {
            ParamKind::Bool => ParamValue::Bool(rng.gen_bool(0.5)),
            ParamKind::Int => ParamValue::Int(rng.gen_range(self.min as i64..=self.max as i64)),
            ParamKind::Float => ParamValue::Float(rng.gen_range(self.min..=self.max)),
        }
    }

    /// Bounded random perturbation: a step of up to `scale` × range, kept inside the domain.
    ///
    /// Integer steps move by at least one unit so mutation never stalls on narrow ranges.
    pub fn perturb<R: Rng>(&self, value: &ParamValue, scale: f64, rng: &mut R) -> ParamValue {
        let span = self.max - self.min;
        match (self.kind, value) {
            (ParamKind::Bool, ParamValue::Bool(b)) => ParamValue::Bool(!b),
            (ParamKind::Int, ParamValue::Int(v)) => {
                let reach = ((span * scale).round() as i64).max(1);
                let step = loop {
                    let s = rng.gen_range(-reach..=reach);
                    if s != 0 {
                        break s;
                    }
                };
                let next = (v + step).clamp(self.min as i64, self.max as i64);
                ParamValue::Int(next)
            }
            (ParamKind::Float, _) => {
                let current = value.as_f64().unwrap_or(self.min);
                let step = rng.gen_range(-1.0..=1.0) * span * scale;
                ParamValue::Float((current + step).clamp(self.min, self.max))
            }
            _ => self.sample(rng),
        }
    }
}

/// Mapping from parameter name to value for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merged(&self, other: &ParameterSet) -> ParameterSet {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.0.insert(k.clone(), *v);
        }
        out
    }

    /// Validate every entry against `domains`. Unknown names are errors.
    pub fn validate(&self, strategy: &str, domains: &[ParameterDomain]) -> Result<(), ConfigError> {
        for (name, value) in self.iter() {
            let domain = domains.iter().find(|d| &d.name == name).ok_or_else(|| {
                ConfigError::UnknownParameter {
                    strategy: strategy.to_string(),
                    name: name.clone(),
                }
            })?;
            domain.validate(value)?;
        }
        Ok(())
    }

    /// BLAKE3 hex digest of the canonical `name=value` encoding.
    ///
    /// Floats hash by bit pattern, so 1.5 and 1.50000001 are distinct candidates.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in self.iter() {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            match value {
                ParamValue::Bool(b) => hasher.update(&[0, *b as u8]),
                ParamValue::Int(v) => hasher.update(&[1]).update(&v.to_le_bytes()),
                ParamValue::Float(v) => hasher.update(&[2]).update(&v.to_bits().to_le_bytes()),
            };
            hasher.update(b";");
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Read a non-negative integer parameter.
    pub fn usize_param(&self, name: &str) -> Result<Option<usize>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(Some(*v as usize)),
            Some(other) => Err(ConfigError::WrongType {
                name: name.to_string(),
                expected: ParamKind::Int,
                got: *other,
            }),
        }
    }

    /// Read a numeric parameter (integers widen to f64).
    pub fn f64_param(&self, name: &str) -> Result<Option<f64>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or(ConfigError::WrongType {
                name: name.to_string(),
                expected: ParamKind::Float,
                got: *v,
            }),
        }
    }

    pub fn bool_param(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(ParamValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ConfigError::WrongType {
                name: name.to_string(),
                expected: ParamKind::Bool,
                got: *other,
            }),
        }
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
