// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version sequencing.
//!
//! Compute the next valid version from the last recorded one. Under the
//! tiered scheme the patch component rolls over into minor, minor into major,
//! and major into the next tier. Promotion to a new tier resets the version
//! to [`VersionNumber::MINIMAL`], and changes which ledger receives the next
//! entry.

use crate::version::{Tier, TierOrder, ValidationError, VersionNumber, VersionScheme};

use tracing::{debug, instrument};

/// Release state recovered from a ledger.
///
/// Threaded explicitly through sequencing and ledger calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseState {
    pub tier: Tier,
    pub last_version: Option<VersionNumber>,
    pub last_sequence_id: u32,
    pub last_note: Option<String>,
}

impl ReleaseState {
    /// State of a tier with no prior releases.
    pub fn fresh(tier: Tier) -> Self {
        Self {
            tier,
            last_version: None,
            last_sequence_id: 0,
            last_note: None,
        }
    }
}

/// Suggested next version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced {
    /// Version to suggest to the operator.
    pub version: VersionNumber,

    /// Tier the next release belongs to.
    pub tier: Tier,

    /// Whether the tier was promoted to get here.
    pub promoted: bool,
}

/// Computes next versions for a given tier order and scheme.
#[derive(Debug, Clone)]
pub struct Sequencer {
    tiers: TierOrder,
    scheme: VersionScheme,
}

impl Sequencer {
    /// Construct new version sequencer.
    pub fn new(tiers: TierOrder, scheme: VersionScheme) -> Self {
        Self { tiers, scheme }
    }

    pub fn tiers(&self) -> &TierOrder {
        &self.tiers
    }

    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    /// Compute next version after `last` in `tier`.
    ///
    /// No prior version yields [`VersionNumber::MINIMAL`] in the given tier.
    ///
    /// # Errors
    ///
    /// - Return [`SequencerError::UnknownTier`] if tier is not part of the
    ///   tier order.
    /// - Return [`SequencerError::TiersExhausted`] if major overflows while in
    ///   the last tier.
    /// - Return [`SequencerError::Overflow`] if a component of `last` cannot
    ///   be incremented at all.
    #[instrument(skip(self), level = "debug")]
    pub fn next(&self, last: Option<VersionNumber>, tier: &Tier) -> Result<Sequenced> {
        if !self.tiers.contains(tier) {
            return Err(SequencerError::UnknownTier(tier.clone()));
        }

        let Some(last) = last else {
            return Ok(Sequenced {
                version: VersionNumber::MINIMAL,
                tier: tier.clone(),
                promoted: false,
            });
        };

        let bump = |component: u32| {
            component
                .checked_add(1)
                .ok_or_else(|| SequencerError::Overflow {
                    tier: tier.clone(),
                    last,
                })
        };

        let Some(ceiling) = self.scheme.ceiling() else {
            return Ok(Sequenced {
                version: VersionNumber::new(last.major, last.minor, bump(last.patch)?),
                tier: tier.clone(),
                promoted: false,
            });
        };

        let VersionNumber {
            mut major,
            mut minor,
            mut patch,
        } = last;

        patch = bump(patch)?;
        if patch > ceiling {
            patch = 0;
            minor = bump(minor)?;
        }
        if minor > ceiling {
            minor = 0;
            major = bump(major)?;
        }

        if major > ceiling {
            let Some(next_tier) = self.tiers.after(tier) else {
                return Err(SequencerError::TiersExhausted {
                    tier: tier.clone(),
                    last,
                });
            };

            debug!("promote tier {tier} to {next_tier}");
            return Ok(Sequenced {
                version: VersionNumber::MINIMAL,
                tier: next_tier.clone(),
                promoted: true,
            });
        }

        Ok(Sequenced {
            version: VersionNumber::new(major, minor, patch),
            tier: tier.clone(),
            promoted: false,
        })
    }

    /// Validate operator override against last version of the target tier.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError`] describing why the candidate was rejected.
    pub fn validate(
        &self,
        candidate: &str,
        floor: Option<VersionNumber>,
    ) -> Result<VersionNumber, ValidationError> {
        self.scheme.validate(candidate, floor)
    }

    /// Series completed by given version, if any.
    ///
    /// Only the tiered scheme has series to complete.
    pub fn milestone(&self, version: &VersionNumber) -> Option<Milestone> {
        let ceiling = self.scheme.ceiling()?;
        match (
            version.major == ceiling,
            version.minor == ceiling,
            version.patch == ceiling,
        ) {
            (true, true, true) => Some(Milestone::Major),
            (_, true, true) => Some(Milestone::Minor),
            (_, _, true) => Some(Milestone::Patch),
            _ => None,
        }
    }
}

/// Completed version series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    /// Patch component reached its ceiling.
    Patch,

    /// Minor and patch components reached their ceiling.
    Minor,

    /// Every component reached its ceiling.
    Major,
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patch => fmt.write_str("patch series"),
            Self::Minor => fmt.write_str("minor series"),
            Self::Major => fmt.write_str("major series"),
        }
    }
}

/// Version sequencing error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    /// Every tier has been consumed.
    #[error("all tiers exhausted: {last} is the final version of last tier {tier}")]
    TiersExhausted { tier: Tier, last: VersionNumber },

    /// Recorded version is too large to increment.
    #[error("cannot increment version {last} of tier {tier}")]
    Overflow { tier: Tier, last: VersionNumber },

    /// Tier is not part of the configured tier order.
    #[error("tier {0:?} is not part of the configured tier order")]
    UnknownTier(Tier),
}

/// Friendly result alias :3
type Result<T, E = SequencerError> = std::result::Result<T, E>;
