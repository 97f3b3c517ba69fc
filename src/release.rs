// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release orchestration.
//!
//! A __release__ walks through a fixed sequence of stages:
//!
//! ```text
//! Idle -> RecoveringLedger -> SequencingVersion -> AwaitingNote
//!      -> Archiving -> AppendingLedger -> Done
//! ```
//!
//! Any stage may end in `Aborted` instead, either because the operator
//! cancelled a prompt, or because of a fatal error. Data only flows forward:
//! recovered ledger state feeds the sequencer, the chosen version and note
//! feed the archiver, and the finished archive feeds the ledger.
//!
//! # Ordering Guarantee
//!
//! The archive is always built before the ledger is touched. Thus, a ledger
//! never records a release whose archive does not exist. The reverse is not
//! guaranteed: if the ledger append fails after the archive was written, the
//! archive exists without a matching entry. This is reported through
//! [`ReleaseError::LedgerAppend`] along with the entry line, so the operator
//! can append it manually.
//!
//! # Single Writer
//!
//! Only one release may run against a given ledger directory at a time.
//! Nothing is locked, so concurrent releases can interleave their appends.

pub mod operator;

use crate::{
    archive::{ArchiveBuilder, ArchiveError, ArchiveJob, ArchiveSummary},
    config::ReleaseConfig,
    ledger::{LedgerEntry, LedgerError},
    sequencer::{Milestone, ReleaseState, SequencerError},
    version::{Tier, VersionNumber},
};
use operator::{Operator, PromptError};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{debug, info, instrument, warn};

/// Note recorded when the operator leaves the note empty.
pub const NO_NOTE: &str = "No_Note";

/// Characters replaced by underscores in archive names.
const UNSAFE_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Stage of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    RecoveringLedger,
    SequencingVersion,
    AwaitingNote,
    Archiving,
    AppendingLedger,
    Done,
    Aborted,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let stage = match self {
            Self::Idle => "idle",
            Self::RecoveringLedger => "recovering ledger",
            Self::SequencingVersion => "sequencing version",
            Self::AwaitingNote => "awaiting note",
            Self::Archiving => "archiving",
            Self::AppendingLedger => "appending ledger",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        fmt.write_str(stage)
    }
}

/// Outcome of a finished release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub sequence_id: u32,
    pub tier: Tier,
    pub version: VersionNumber,
    pub note: String,
    pub promoted: bool,
    pub milestone: Option<Milestone>,
    pub archive: ArchiveSummary,
    pub ledger_path: PathBuf,
}

/// Drives one release from ledger recovery to ledger append.
#[derive(Debug)]
pub struct ReleaseOrchestrator<O>
where
    O: Operator,
{
    config: ReleaseConfig,
    operator: O,
    archiver: ArchiveBuilder,
    stage: Stage,
}

impl<O> ReleaseOrchestrator<O>
where
    O: Operator,
{
    /// Construct new release orchestrator.
    pub fn new(config: ReleaseConfig, operator: O) -> Self {
        Self {
            config,
            operator,
            archiver: ArchiveBuilder::new(),
            stage: Stage::Idle,
        }
    }

    /// Use given archive builder, e.g., one reporting progress.
    pub fn with_archiver(mut self, archiver: ArchiveBuilder) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Run release to completion.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::Cancelled`] if operator cancels a prompt, or
    ///   declines confirmation.
    /// - Return [`ReleaseError::Prompt`] if operator cannot be asked.
    /// - Return [`ReleaseError::Sequencer`] if all tiers are exhausted.
    /// - Return [`ReleaseError::Ledger`] if release cannot be recorded.
    /// - Return [`ReleaseError::Archive`] if archive cannot be built.
    /// - Return [`ReleaseError::LedgerAppend`] if archive was built, but the
    ///   ledger append failed.
    pub fn run(&mut self) -> Result<ReleaseReport> {
        match self.run_stages() {
            Ok(report) => {
                self.enter(Stage::Done);
                Ok(report)
            }
            Err(err) => {
                warn!("release aborted while {}", self.stage);
                self.enter(Stage::Aborted);
                Err(err)
            }
        }
    }

    fn run_stages(&mut self) -> Result<ReleaseReport> {
        self.enter(Stage::RecoveringLedger);
        let state = recover_state(&self.config);

        self.enter(Stage::SequencingVersion);
        let target = self.sequence(&state)?;
        let sequencer = self.config.sequencer();
        let version = loop {
            let answer = self
                .operator
                .version(&target.suggested, target.floor.as_ref(), &target.tier)
                .map_err(|err| self.prompt_error(err))?;
            let answer = match answer.trim() {
                "" => target.suggested.to_string(),
                answer => answer.to_string(),
            };

            match sequencer.validate(&answer, target.floor) {
                Ok(version) => break version,
                Err(err) => self.operator.reject(&err),
            }
        };

        let milestone = sequencer.milestone(&version);
        if let Some(milestone) = milestone {
            info!("{milestone} completed for {}", version.label());
        }

        self.enter(Stage::AwaitingNote);
        let hint = state.last_note.as_deref().unwrap_or("New release");
        let note = self
            .operator
            .note(hint)
            .map_err(|err| self.prompt_error(err))?;
        let note = normalize_note(&note);

        let project = self.config.project.name.as_str();
        let archive_name = archive_name(project, &version, &note);
        let previous = target.floor.or(state.last_version).unwrap_or(VersionNumber::ZERO);
        let ledger = self.config.ledger(&target.tier);
        let sequence_id = target
            .last_sequence_id
            .checked_add(1)
            .ok_or_else(|| ReleaseError::SequenceExhausted {
                ledger: ledger.path().to_path_buf(),
                last: target.last_sequence_id,
            })?;
        let entry = LedgerEntry {
            sequence_id,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            previous_label: format!("{project}_{}", previous.label()),
            tier: target.tier.clone(),
            version,
            note: note.clone(),
            archive_name: archive_name.clone(),
        };

        // INVARIANT: Never build an archive the ledger cannot record.
        let line = entry.encode()?;
        debug!("ledger entry: {line}");

        let output = self.config.output.archive_dir.join(&archive_name);
        let confirmed = self
            .operator
            .confirm(&format!(
                "Release {} {} as {:?}?",
                target.tier,
                version.label(),
                output.display()
            ))
            .map_err(|err| self.prompt_error(err))?;
        if !confirmed {
            return Err(ReleaseError::Cancelled { stage: self.stage });
        }

        self.enter(Stage::Archiving);
        let job = ArchiveJob {
            root: self.config.project.root.clone(),
            exclusions: self.config.exclusions(),
            output,
            size_warning_threshold: self.config.size_warning_threshold(),
        };
        let archive = self.archiver.build(&job)?;

        self.enter(Stage::AppendingLedger);
        ledger
            .append(&entry)
            .map_err(|err| ReleaseError::LedgerAppend {
                source: err,
                archive: archive.path.clone(),
                ledger: ledger.path().to_path_buf(),
                line,
            })?;
        info!("recorded {} in {:?}", version.label(), ledger.path().display());

        Ok(ReleaseReport {
            sequence_id: entry.sequence_id,
            tier: target.tier,
            version,
            note,
            promoted: target.promoted,
            milestone,
            archive,
            ledger_path: ledger.path().to_path_buf(),
        })
    }

    /// Determine tier, suggestion, and floor of the next release.
    ///
    /// Promotion into a tier whose ledger already holds entries continues
    /// that ledger's sequence.
    #[instrument(skip(self), level = "debug")]
    fn sequence(&self, state: &ReleaseState) -> Result<Target> {
        let sequencer = self.config.sequencer();
        let mut sequenced = sequencer.next(state.last_version, &state.tier)?;
        let mut target = Target {
            tier: sequenced.tier.clone(),
            suggested: sequenced.version,
            floor: state.last_version,
            last_sequence_id: state.last_sequence_id,
            promoted: false,
        };

        while sequenced.promoted {
            info!("promote tier {} to {}", target.tier, sequenced.tier);
            target.promoted = true;
            target.tier = sequenced.tier.clone();
            target.suggested = sequenced.version;
            target.floor = None;
            target.last_sequence_id = 0;

            let ledger = self.config.ledger(&sequenced.tier);
            match ledger.recover_last() {
                Ok(Some(entry)) => {
                    target.floor = Some(entry.version);
                    target.last_sequence_id = entry.sequence_id;
                    sequenced = sequencer.next(Some(entry.version), &sequenced.tier)?;
                    target.suggested = sequenced.version;
                    if !sequenced.promoted {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("{err}, starting {} fresh", sequenced.tier);
                    break;
                }
            }
        }

        Ok(target)
    }

    fn enter(&mut self, stage: Stage) {
        debug!("release stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn prompt_error(&self, err: PromptError) -> ReleaseError {
        match err {
            PromptError::Cancelled => ReleaseError::Cancelled { stage: self.stage },
            err => ReleaseError::Prompt(err),
        }
    }
}

#[derive(Debug)]
struct Target {
    tier: Tier,
    suggested: VersionNumber,
    floor: Option<VersionNumber>,
    last_sequence_id: u32,
    promoted: bool,
}

/// Recover release state from ledgers.
///
/// The active tier is the last tier in tier order whose ledger exists. With no
/// ledger at all, the first tier starts fresh. A ledger that cannot be read,
/// or holds no well formed entry, degrades to a fresh start of its own tier.
#[instrument(skip(config), level = "debug")]
pub fn recover_state(config: &ReleaseConfig) -> ReleaseState {
    let tiers = &config.versioning.tiers;
    let Some(ledger) = tiers
        .iter()
        .rev()
        .map(|tier| config.ledger(tier))
        .find(|ledger| ledger.exists())
    else {
        info!("no ledger found, starting with tier {}", tiers.initial());
        return ReleaseState::fresh(tiers.initial().clone());
    };

    info!("detected tier {} from {:?}", ledger.tier(), ledger.path().display());
    match ledger.recover_last() {
        Ok(Some(entry)) => ReleaseState {
            tier: entry.tier,
            last_version: Some(entry.version),
            last_sequence_id: entry.sequence_id,
            last_note: Some(entry.note),
        },
        Ok(None) => ReleaseState::fresh(ledger.tier().clone()),
        Err(err) => {
            warn!("{err}, treating as no prior version");
            ReleaseState::fresh(ledger.tier().clone())
        }
    }
}

/// Normalize operator-entered note.
///
/// Collapses whitespace, replaces characters the ledger cannot record, and
/// capitalizes the first character. Empty notes become [`NO_NOTE`].
pub fn normalize_note(input: &str) -> String {
    let mut note = input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('`', "'");
    while note.contains(">>") {
        note = note.replace(">>", ">");
    }

    let mut chars = note.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => NO_NOTE.into(),
    }
}

/// Derive archive file name from project, version, and note.
///
/// Filesystem-unsafe characters and whitespace in the note become
/// underscores.
pub fn archive_name(project: &str, version: &VersionNumber, note: &str) -> String {
    let note = note
        .chars()
        .map(|c| {
            if UNSAFE_CHARS.contains(&c) || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect::<String>();

    format!("{project}_{}_{note}.zip", version.label())
}

/// Release error types.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// Operator cancelled the release.
    #[error("release cancelled while {stage}")]
    Cancelled { stage: Stage },

    /// Operator could not be asked.
    #[error(transparent)]
    Prompt(PromptError),

    /// No next version exists.
    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    /// Release cannot be recorded.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Ledger sequence ID cannot grow any further.
    #[error("ledger {:?} reached the last sequence ID D{last}", ledger.display())]
    SequenceExhausted { ledger: PathBuf, last: u32 },

    /// Archive could not be built. The ledger was not touched.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Archive exists, but the ledger does not reflect it.
    #[error(
        "archive {:?} was written, but ledger {:?} was not updated; append this entry manually:\n{line}",
        archive.display(),
        ledger.display()
    )]
    LedgerAppend {
        #[source]
        source: LedgerError,
        archive: PathBuf,
        ledger: PathBuf,
        line: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("Initial release", "Initial release"; "kept as is")]
    #[test_case("  fix   cart\ttotals ", "Fix cart totals"; "whitespace collapsed")]
    #[test_case("", NO_NOTE; "empty")]
    #[test_case("   ", NO_NOTE; "blank")]
    #[test_case("use `x` >> y", "Use 'x' > y"; "unrecordable characters")]
    #[test_case("ärger", "Ärger"; "unicode capitalized")]
    #[test]
    fn note_normalization(input: &str, expect: &str) {
        pretty_assertions::assert_eq!(normalize_note(input), expect);
    }

    #[test]
    fn archive_name_is_derived_from_note() {
        let version = VersionNumber::new(0, 0, 1);
        pretty_assertions::assert_eq!(
            archive_name("Proj", &version, "Initial release"),
            "Proj_V0.0.1_Initial_release.zip"
        );
        pretty_assertions::assert_eq!(
            archive_name("Proj", &version, "What? a/b: \"c\" <d>|*"),
            "Proj_V0.0.1_What__a_b___c___d___.zip"
        );
    }

    #[test]
    fn stage_display() {
        pretty_assertions::assert_eq!(Stage::AppendingLedger.to_string(), "appending ledger");
        pretty_assertions::assert_eq!(Stage::Aborted.to_string(), "aborted");
    }
}
