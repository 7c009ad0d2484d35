use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::LabelError;

pub const MIN_VALUE: u8 = 1;
pub const MAX_VALUE: u8 = 9;

/// A property state, always within 1-9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Value(u8);

impl Value {
    pub fn new(raw: i64) -> Result<Self, LabelError> {
        if (MIN_VALUE as i64..=MAX_VALUE as i64).contains(&raw) {
            Ok(Self(raw as u8))
        } else {
            Err(LabelError::ValueOutOfRange(raw))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Value {
    type Error = LabelError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Value::new(raw)
    }
}

impl From<Value> for u8 {
    fn from(value: Value) -> Self {
        value.0
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How values of one property combine on a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// At most one value per frame, assigning replaces
    #[default]
    Exclusive,
    /// Any number of values per frame, toggled independently
    Multi,
}

/// The active values of one property on one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameLabel(BTreeSet<Value>);

impl FrameLabel {
    pub fn single(value: Value) -> Self {
        Self(BTreeSet::from([value]))
    }

    pub fn contains(&self, value: Value) -> bool {
        self.0.contains(&value)
    }

    pub fn insert(&mut self, value: Value) -> bool {
        self.0.insert(value)
    }

    pub fn remove(&mut self, value: Value) -> bool {
        self.0.remove(&value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Values in ascending order.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.0.iter().copied()
    }

    /// Lowest active value, used as the representative of a label.
    pub fn first(&self) -> Option<Value> {
        self.0.first().copied()
    }
}

impl FromIterator<Value> for FrameLabel {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for FrameLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values().map(|v| v.to_string()).collect();
        write!(f, "[{}]", values.join(", "))
    }
}
