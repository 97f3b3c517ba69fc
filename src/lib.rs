// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Versioned release archiver.
//!
//! Relic packages a project tree into a versioned zip archive, and records
//! each release in an append-only, human-readable ledger. Versions progress
//! through a tiered rollover scheme: every component lives in `[0, 9]`,
//! overflowing components roll over into the next higher one, and an
//! overflowing major component promotes the release to the next tier, e.g.,
//! from "Dev" to "Alpha". Each tier keeps its own ledger.
//!
//! # Release Flow
//!
//! 1. Recover last release from the active tier's [`Ledger`].
//! 2. Compute the suggested next version through the [`Sequencer`].
//! 3. Let the [`Operator`](release::operator::Operator) accept or override
//!    the version, and enter a release note.
//! 4. Pack the project tree through the [`ArchiveBuilder`].
//! 5. Append the release to the ledger.
//!
//! See [`ReleaseOrchestrator`] for the state machine tying these together.

pub mod archive;
pub mod config;
pub mod ledger;
pub mod path;
pub mod release;
pub mod sequencer;
pub mod version;

pub use archive::{ArchiveBuilder, ArchiveJob, ArchiveSummary, ExclusionSet};
pub use config::ReleaseConfig;
pub use ledger::{Ledger, LedgerEntry};
pub use release::{ReleaseOrchestrator, ReleaseReport, Stage};
pub use sequencer::{ReleaseState, Sequencer};
pub use version::{Tier, TierOrder, VersionNumber, VersionScheme};
