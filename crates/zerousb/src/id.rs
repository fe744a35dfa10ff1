//! Vendor and product identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// A 16-bit USB vendor or product code
///
/// Rendered as four lowercase hex digits (`0483`) in logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub u16);

impl Id {
    /// Wildcard used by [`crate::ConnectionManager::find`]
    pub const ANY: Id = Id(0);

    /// Whether this id matches `other`, treating [`Id::ANY`] as a wildcard
    pub fn matches(self, other: u16) -> bool {
        self == Self::ANY || self.0 == other
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl From<u16> for Id {
    fn from(value: u16) -> Self {
        Id(value)
    }
}

impl From<Id> for u16 {
    fn from(id: Id) -> Self {
        id.0
    }
}

/// Parses `0x0483`, `0X0483` or bare `0483` as hexadecimal
impl FromStr for Id {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u16::from_str_radix(hex, 16).map(Id)
    }
}
