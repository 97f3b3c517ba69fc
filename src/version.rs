// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version numbers and release tiers.
//!
//! A __version number__ is an ordered triple of major, minor, and patch
//! components. Version numbers are totally ordered by comparing major, then
//! minor, then patch. Every release also belongs to exactly one __tier__,
//! e.g., "Dev" or "Alpha". The tier is not part of the version number itself.
//! Instead, the tier selects which ledger records the release.
//!
//! # Version Schemes
//!
//! Relic supports two schemes for how far a version component may grow:
//!
//! - __Tiered__: every component lives in `[0, 9]`. Overflowing the patch
//!   component rolls over into minor, minor into major, and major into the
//!   next tier.
//! - __Unbounded__: the patch component grows forever. Nothing rolls over,
//!   and tiers are never promoted.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Ordered triple of major, minor, and patch components.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionNumber {
    /// Smallest version a tier can start with.
    pub const MINIMAL: Self = Self::new(0, 0, 1);

    /// Version used in previous labels when no prior version exists.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Construct new version number.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Label form used in ledgers and archive names, e.g., "V1.2.3".
    pub fn label(&self) -> String {
        format!("V{self}")
    }

    /// Parse label form, e.g., "V1.2.3". Leading "V" is optional.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError`] if label is not three dotted integers.
    pub fn from_label(label: &str) -> Result<Self, ValidationError> {
        label.strip_prefix('V').unwrap_or(label).parse()
    }
}

impl Display for VersionNumber {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for VersionNumber {
    type Err = ValidationError;

    /// Parse three dotted integers.
    ///
    /// Components must be plain ASCII digits. Multi-digit components may not
    /// start with zero. Range checks depend on the active [`VersionScheme`],
    /// so they are left to [`VersionScheme::validate`].
    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::Malformed {
            input: data.to_string(),
        };

        let parts = data.split('.').collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(malformed());
        }

        let mut components = [0u32; 3];
        for (slot, part) in components.iter_mut().zip(parts.iter()) {
            if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(malformed());
            }

            if part.len() > 1 && part.starts_with('0') {
                return Err(ValidationError::LeadingZero {
                    input: data.to_string(),
                    component: part.to_string(),
                });
            }

            *slot = part.parse().map_err(|_| malformed())?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

/// Named stage in a release progression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Tier(String);

impl Tier {
    /// Construct new tier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Tier {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.pad(self.as_str())
    }
}

/// Ordered listing of tiers.
///
/// # Invariant
///
/// - Never empty.
/// - No duplicate tier names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TierOrder(Vec<Tier>);

impl TierOrder {
    /// Construct new tier order.
    ///
    /// # Errors
    ///
    /// - Return [`TierOrderError::Empty`] if no tiers are given.
    /// - Return [`TierOrderError::Duplicate`] if a tier is listed twice.
    pub fn new(tiers: impl IntoIterator<Item = Tier>) -> Result<Self, TierOrderError> {
        let tiers = tiers.into_iter().collect::<Vec<_>>();
        if tiers.is_empty() {
            return Err(TierOrderError::Empty);
        }

        for (index, tier) in tiers.iter().enumerate() {
            if tiers[..index].contains(tier) {
                return Err(TierOrderError::Duplicate(tier.clone()));
            }
        }

        Ok(Self(tiers))
    }

    /// First tier of the progression.
    pub fn initial(&self) -> &Tier {
        &self.0[0]
    }

    /// Tier that follows given tier, if any.
    pub fn after(&self, tier: &Tier) -> Option<&Tier> {
        self.position(tier).and_then(|index| self.0.get(index + 1))
    }

    pub fn position(&self, tier: &Tier) -> Option<usize> {
        self.0.iter().position(|entry| entry == tier)
    }

    pub fn contains(&self, tier: &Tier) -> bool {
        self.position(tier).is_some()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Tier> {
        self.0.iter()
    }
}

impl Default for TierOrder {
    fn default() -> Self {
        Self(
            ["Dev", "Alpha", "Beta", "Release", "Stable"]
                .into_iter()
                .map(Tier::new)
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for TierOrder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tiers = Vec::<Tier>::deserialize(deserializer)?;
        TierOrder::new(tiers).map_err(serde::de::Error::custom)
    }
}

/// How far version components may grow before rolling over.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionScheme {
    /// Single digit components with rollover and tier promotion.
    #[default]
    Tiered,

    /// Patch grows without bound, no rollover, no promotion.
    Unbounded,
}

impl VersionScheme {
    /// Highest value a component may hold, if any.
    pub fn ceiling(&self) -> Option<u32> {
        match self {
            Self::Tiered => Some(9),
            Self::Unbounded => None,
        }
    }

    /// Validate operator-entered version candidate.
    ///
    /// Candidate must be three dotted integers without leading zeros, fit
    /// under the scheme's ceiling, and be strictly greater than `floor`.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError::Malformed`] if candidate is not three
    ///   dotted integers.
    /// - Return [`ValidationError::LeadingZero`] if a multi-digit component
    ///   starts with zero.
    /// - Return [`ValidationError::OutOfRange`] if a component exceeds the
    ///   ceiling.
    /// - Return [`ValidationError::NotNewer`] if candidate does not exceed
    ///   `floor`.
    pub fn validate(
        &self,
        candidate: &str,
        floor: Option<VersionNumber>,
    ) -> Result<VersionNumber, ValidationError> {
        let version: VersionNumber = candidate.trim().parse()?;

        if let Some(ceiling) = self.ceiling() {
            let components = [version.major, version.minor, version.patch];
            if components.iter().any(|component| *component > ceiling) {
                return Err(ValidationError::OutOfRange { version, ceiling });
            }
        }

        if let Some(floor) = floor {
            if version <= floor {
                return Err(ValidationError::NotNewer {
                    version,
                    last: floor,
                });
            }
        }

        Ok(version)
    }
}

/// Rejection of an operator-entered version.
///
/// All variants are retryable: the operator is asked again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Candidate is not three dotted integers.
    #[error("invalid version {input:?}: must be X.Y.Z with digits only, e.g., 0.0.1")]
    Malformed { input: String },

    /// Multi-digit component starts with zero.
    #[error("invalid version {input:?}: leading zero in component {component:?}")]
    LeadingZero { input: String, component: String },

    /// Component exceeds the scheme's ceiling.
    #[error("invalid version {version}: components may not exceed {ceiling}")]
    OutOfRange { version: VersionNumber, ceiling: u32 },

    /// Candidate is not strictly greater than last recorded version.
    #[error("version {version} is not newer than last version {last}")]
    NotNewer {
        version: VersionNumber,
        last: VersionNumber,
    },
}

/// Invalid tier listing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierOrderError {
    #[error("tier list cannot be empty")]
    Empty,

    #[error("tier {0:?} is listed more than once")]
    Duplicate(Tier),
}
