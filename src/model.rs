//! Data types shared by the generators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a single dataset cell or attribute level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Parse a value from its textual form.
    ///
    /// Returns `None` for an empty string.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        if let Ok(int) = text.parse::<i64>() {
            return Some(Value::Int(int));
        }
        match text.parse::<f64>() {
            Ok(float) if float.is_finite() => Some(Value::Float(float)),
            _ => Some(Value::Text(text.to_string())),
        }
    }

    /// Get the numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(int) => Some(*int as f64),
            Value::Float(float) => Some(*float),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(int) => write!(f, "{int}"),
            // Debug keeps the decimal point of whole floats (`6.0`).
            Value::Float(float) => write!(f, "{float:?}"),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i64> for Value {
    fn from(int: i64) -> Self {
        Value::Int(int)
    }
}

impl From<usize> for Value {
    fn from(int: usize) -> Self {
        Value::Int(int as i64)
    }
}

impl From<f64> for Value {
    fn from(float: f64) -> Self {
        Value::Float(float)
    }
}

/// Respondent-specific weight of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Weight {
    /// Part-worth of every level of a discrete attribute.
    Levels(Vec<f64>),
    /// Linear coefficient of a continuous attribute.
    Linear(f64),
}

/// Preference vector of one respondent.
///
/// Drawn once per respondent and reused for every one of its tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    /// Index of the segment the respondent belongs to, if segments are defined.
    pub segment: Option<usize>,
    /// Weights in attribute order.
    pub weights: Vec<Weight>,
    /// Alternative-specific constant of the "none" option.
    pub none_asc: f64,
    /// Alternative-specific constants of the competitors.
    pub competitor_ascs: Vec<f64>,
}

/// Kind of alternative in a choice task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltKind {
    Product,
    NoChoice,
    Competitor(usize),
}

/// Alternative of a choice task.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub label: String,
    pub kind: AltKind,
    /// Attribute values in attribute order (empty for the "none" option).
    pub profile: Vec<Value>,
    /// Deterministic utility.
    pub utility: f64,
    /// Random utility shock.
    pub shock: f64,
    pub chosen: bool,
}

impl Alternative {
    pub fn total_utility(&self) -> f64 {
        self.utility + self.shock
    }
}

/// Single decision scenario presented to one respondent.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceTask {
    /// Zero-based respondent index.
    pub i_resp: usize,
    /// Zero-based task index.
    pub i_task: usize,
    pub alternatives: Vec<Alternative>,
}

impl ChoiceTask {
    /// Get the chosen alternative.
    pub fn chosen(&self) -> Option<&Alternative> {
        self.alternatives.iter().find(|alt| alt.chosen)
    }
}
