//! Surrogate key types and the dense key allocator.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The two independent key spaces of the locality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySpace {
    City,
    State,
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City => write!(f, "city"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Fixed number of digits a key is zero-padded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyWidth(usize);

impl KeyWidth {
    /// State keys are always two digits.
    pub const STATE: Self = Self(2);

    /// Default width for city keys.
    pub const DEFAULT_CITY: Self = Self(4);

    /// Widest key that still fits a `u32` counter.
    pub const MAX_DIGITS: usize = 9;

    pub fn new(digits: usize) -> Result<Self> {
        if digits == 0 || digits > Self::MAX_DIGITS {
            return Err(EtlError::Config(format!(
                "key width must be between 1 and {} digits, got {digits}",
                Self::MAX_DIGITS
            )));
        }
        Ok(Self(digits))
    }

    pub fn digits(self) -> usize {
        self.0
    }

    /// Largest integer representable at this width.
    pub fn max_value(self) -> u32 {
        // digits <= 9, so the power fits in a u32
        10u32.pow(self.0 as u32) - 1
    }

    pub fn format(self, value: u32) -> String {
        format!("{value:0width$}", width = self.0)
    }

    /// Parses a key of exactly this width. `"0001"` is valid for width 4, `"1"` is not.
    pub fn parse(self, key: &str) -> Option<u32> {
        if key.len() != self.0 || !key.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        key.parse().ok()
    }
}

impl Default for KeyWidth {
    fn default() -> Self {
        Self::DEFAULT_CITY
    }
}

/// Surrogate keys of one locality. The composite is the literal
/// concatenation of the city and state keys, never a numeric sum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalityKey {
    id_city: String,
    id_state: String,
    id_composite: String,
}

impl LocalityKey {
    pub fn new(id_city: impl Into<String>, id_state: impl Into<String>) -> Self {
        let id_city = id_city.into();
        let id_state = id_state.into();
        let id_composite = format!("{id_city}{id_state}");
        Self {
            id_city,
            id_state,
            id_composite,
        }
    }

    pub fn id_city(&self) -> &str {
        &self.id_city
    }

    pub fn id_state(&self) -> &str {
        &self.id_state
    }

    pub fn id_composite(&self) -> &str {
        &self.id_composite
    }
}

/// Hands out dense, zero-padded keys for one key space.
#[derive(Debug, Clone, Copy)]
pub struct KeyAllocator {
    space: KeySpace,
    width: KeyWidth,
}

impl KeyAllocator {
    pub fn new(space: KeySpace, width: KeyWidth) -> Self {
        Self { space, width }
    }

    pub fn cities(width: KeyWidth) -> Self {
        Self::new(KeySpace::City, width)
    }

    pub fn states() -> Self {
        Self::new(KeySpace::State, KeyWidth::STATE)
    }

    /// Assigns `existing_max + 1, existing_max + 2, ...` to the distinct
    /// `values` in ascending order.
    ///
    /// With `existing_max == 0` this is a fresh allocation starting at 1.
    /// Either every value gets a key or the call fails with
    /// [`EtlError::KeyWidthExceeded`]; no partial mapping is returned.
    ///
    /// # Errors
    ///
    /// Returns `KeyWidthExceeded` when the last key would not fit the width.
    pub fn allocate<K, I>(&self, existing_max: u32, values: I) -> Result<BTreeMap<K, String>>
    where
        K: Ord,
        I: IntoIterator<Item = K>,
    {
        let distinct: BTreeSet<K> = values.into_iter().collect();
        let needed = u64::try_from(distinct.len()).unwrap_or(u64::MAX);
        let last = u64::from(existing_max).saturating_add(needed);

        if last > u64::from(self.width.max_value()) {
            return Err(EtlError::KeyWidthExceeded {
                space: self.space,
                width: self.width.digits(),
                next: u64::from(self.width.max_value()) + 1,
            });
        }

        let mut next = existing_max;
        let mut keys = BTreeMap::new();
        for value in distinct {
            next += 1;
            keys.insert(value, self.width.format(next));
        }
        Ok(keys)
    }
}
