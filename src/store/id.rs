use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Any JSON number. Older data files carry fractional wall-clock ids such
/// as `1700000000001.42`, so ids are compared by numeric value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Number);

impl NodeId {
    /// Integer floor of the id; negative ids count as 0.
    pub fn floor(&self) -> u64 {
        if let Some(v) = self.0.as_u64() {
            return v;
        }
        match self.0.as_f64() {
            Some(v) if v.is_finite() && v > 0.0 => v.floor() as u64,
            _ => 0,
        }
    }

    /// `floor(max) + 1`, or 1 for an empty collection.
    pub fn next_after<'a>(ids: impl IntoIterator<Item = &'a NodeId>) -> Option<NodeId> {
        match ids.into_iter().map(NodeId::floor).max() {
            None => Some(NodeId::from(1u64)),
            Some(max) => max.checked_add(1).map(NodeId::from),
        }
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(Number::from(value))
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.0.as_u64(), other.0.as_u64()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.0.as_i64(), other.0.as_i64()) {
            return a == b;
        }
        match (self.0.as_f64(), other.0.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for NodeId {}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<Number>(s.trim()).map(Self)
    }
}
