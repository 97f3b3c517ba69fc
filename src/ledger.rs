// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Append-only release ledger.
//!
//! Every tier keeps its own __ledger__: a human-readable markdown file that
//! records each release in that tier. The ledger is the only durable store of
//! version history. Entries are never rewritten once appended.
//!
//! # Ledger Layout
//!
//! A ledger starts with a header line, followed by a block per release. Each
//! block is one entry line terminated by a separator line:
//!
//! ```text
//! ### Proj Dev Versions
//!
//! # D001 >> `2025-01-01 10:00:00` >> `Proj_V0.0.0` >> `V0.0.1` >> `Initial release` >> `Proj_V0.0.1_Initial_release.zip`
//! ---
//! ```
//!
//! Entry lines are a fixed record format, not free text. Fields appear in a
//! fixed order, delimited by `" >> "`, and every field except the sequence
//! marker is wrapped in backticks. Fields may never contain the quote
//! character, the delimiter, or a line break. Thus, any line the encoder
//! produces is mechanically recoverable by the decoder.
//!
//! # Single Writer
//!
//! No file locking is performed. Only one release process may run against a
//! given ledger at a time, otherwise appends can interleave and break the
//! sequence numbering.

use crate::version::{Tier, ValidationError, VersionNumber};

use std::{
    fs::{read_to_string, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Field delimiter of entry lines.
pub const SEPARATOR: &str = " >> ";

/// Quote character wrapping every entry field after the sequence marker.
pub const QUOTE: char = '`';

/// Line terminating every entry block.
pub const BLOCK_END: &str = "---";

const MARKER: &str = "# D";
const FIELD_COUNT: usize = 6;

/// Immutable record of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub sequence_id: u32,
    pub timestamp: String,
    pub previous_label: String,
    pub tier: Tier,
    pub version: VersionNumber,
    pub note: String,
    pub archive_name: String,
}

impl LedgerEntry {
    /// Encode entry into its ledger line, without trailing newline.
    ///
    /// Tier is implied by the ledger file, so it is not written.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Unencodable`] if sequence ID is zero, or a field
    ///   contains the quote character, the delimiter, or a line break.
    pub fn encode(&self) -> Result<String> {
        if self.sequence_id == 0 {
            return Err(LedgerError::Unencodable {
                field: "sequence",
                value: "0".into(),
            });
        }

        let version = self.version.label();
        let fields = [
            ("timestamp", self.timestamp.as_str()),
            ("previous label", self.previous_label.as_str()),
            ("version", version.as_str()),
            ("note", self.note.as_str()),
            ("archive name", self.archive_name.as_str()),
        ];

        let mut line = format!("{MARKER}{:03}", self.sequence_id);
        for (field, value) in fields {
            if !is_encodable(value) {
                return Err(LedgerError::Unencodable {
                    field,
                    value: value.to_string(),
                });
            }

            line.push_str(SEPARATOR);
            line.push(QUOTE);
            line.push_str(value);
            line.push(QUOTE);
        }

        Ok(line)
    }

    /// Decode ledger line into entry of given tier.
    ///
    /// Lines that do not start with the sequence marker (headers, separator
    /// lines, blank lines, free text) are not entries, and yield `None`.
    /// Lines that do start with the marker must be well formed.
    ///
    /// # Errors
    ///
    /// - Return [`DecodeError`] if line looks like an entry but its fields
    ///   fail count, quoting, or type checks.
    pub fn decode(line: &str, tier: &Tier) -> Result<Option<Self>, DecodeError> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(MARKER) else {
            return Ok(None);
        };

        let fields = rest.split(SEPARATOR).collect::<Vec<_>>();
        if fields.len() != FIELD_COUNT {
            return Err(DecodeError::FieldCount {
                found: fields.len(),
            });
        }

        let sequence = fields[0].trim();
        let sequence_id = match sequence.parse::<u32>() {
            Ok(id) if id > 0 && sequence.bytes().all(|byte| byte.is_ascii_digit()) => id,
            _ => {
                return Err(DecodeError::Sequence {
                    value: sequence.to_string(),
                })
            }
        };

        let timestamp = unquote("timestamp", fields[1])?;
        let previous_label = unquote("previous label", fields[2])?;
        let version = unquote("version", fields[3])?;
        let note = unquote("note", fields[4])?;
        let archive_name = unquote("archive name", fields[5])?;

        let version = VersionNumber::from_label(version).map_err(|err| DecodeError::Version {
            value: version.to_string(),
            source: err,
        })?;

        Ok(Some(Self {
            sequence_id,
            timestamp: timestamp.into(),
            previous_label: previous_label.into(),
            tier: tier.clone(),
            version,
            note: note.into(),
            archive_name: archive_name.into(),
        }))
    }
}

fn is_encodable(value: &str) -> bool {
    !value.contains(QUOTE)
        && !value.contains(SEPARATOR.trim())
        && !value.contains(['\n', '\r'])
}

fn unquote<'a>(field: &'static str, value: &'a str) -> Result<&'a str, DecodeError> {
    value
        .trim()
        .strip_prefix(QUOTE)
        .and_then(|value| value.strip_suffix(QUOTE))
        .ok_or(DecodeError::Unquoted { field })
}

/// Ledger of a single tier.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    project: String,
    tier: Tier,
}

impl Ledger {
    /// Construct ledger handle for project tier inside target directory.
    ///
    /// Nothing is read or created until the ledger is used.
    pub fn new(dir: impl AsRef<Path>, project: impl Into<String>, tier: Tier) -> Self {
        let project = project.into();
        let path = dir
            .as_ref()
            .join(format!("{project}_{tier}_Versions.md"));

        Self {
            path,
            project,
            tier,
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn tier(&self) -> &Tier {
        &self.tier
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Header line written before the first entry of the tier.
    pub fn header(&self) -> String {
        format!("### {} {} Versions", self.project, self.tier)
    }

    /// Recover most recent entry.
    ///
    /// Scans from the end of the ledger for the first well formed entry line.
    /// Malformed entry lines on the way are logged and skipped. Returns `None`
    /// if the ledger does not exist or holds no entry line at all.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Read`] if ledger exists but cannot be read.
    /// - Return [`LedgerError::Corrupt`] if the ledger holds entry lines, but
    ///   every one of them is malformed. Reports the most recent one.
    #[instrument(skip(self), level = "debug")]
    pub fn recover_last(&self) -> Result<Option<LedgerEntry>> {
        let Some(content) = self.read()? else {
            debug!("no ledger at {:?}", self.path.display());
            return Ok(None);
        };

        let lines = content.lines().collect::<Vec<_>>();
        let mut corrupt = None;
        for (index, line) in lines.iter().enumerate().rev() {
            match LedgerEntry::decode(line, &self.tier) {
                Ok(Some(entry)) => return Ok(Some(entry)),
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "skip corrupt entry in ledger {:?} at line {}: {err}",
                        self.path.display(),
                        index + 1
                    );
                    if corrupt.is_none() {
                        corrupt = Some(LedgerError::Corrupt {
                            path: self.path.clone(),
                            line: index + 1,
                            source: err,
                        });
                    }
                }
            }
        }

        match corrupt {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    /// List every entry in recorded order.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Read`] if ledger exists but cannot be read.
    /// - Return [`LedgerError::Corrupt`] if any entry line is malformed.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let Some(content) = self.read()? else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let entry = LedgerEntry::decode(line, &self.tier).map_err(|err| {
                LedgerError::Corrupt {
                    path: self.path.clone(),
                    line: index + 1,
                    source: err,
                }
            })?;
            entries.extend(entry);
        }

        Ok(entries)
    }

    /// Append entry to ledger.
    ///
    /// Creates the ledger and any missing parent directory. The header is
    /// written only when the entry is the first of its tier. Existing bytes
    /// are never rewritten or truncated. The entry block is written in one
    /// call, and synced before returning.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::TierMismatch`] if entry belongs to other tier.
    /// - Return [`LedgerError::Unencodable`] if entry cannot be encoded.
    /// - Return [`LedgerError::CreateDir`] if parent directory cannot be
    ///   created.
    /// - Return [`LedgerError::Write`] if ledger cannot be opened or written.
    #[instrument(skip(self, entry), fields(sequence_id = entry.sequence_id), level = "debug")]
    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        if entry.tier != self.tier {
            return Err(LedgerError::TierMismatch {
                expect: self.tier.clone(),
                found: entry.tier.clone(),
            });
        }

        // INVARIANT: Encode before touching the file system.
        let line = entry.encode()?;

        let mut block = String::new();
        if entry.sequence_id == 1 {
            block.push_str(&self.header());
            block.push_str("\n\n");
        }
        block.push_str(&line);
        block.push('\n');
        block.push_str(BLOCK_END);
        block.push('\n');

        if let Some(parent) = self.path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| LedgerError::CreateDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        let write_err = |err| LedgerError::Write {
            source: err,
            path: self.path.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(block.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        debug!("appended entry to {:?}", self.path.display());

        Ok(())
    }

    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        read_to_string(&self.path)
            .map(Some)
            .map_err(|err| LedgerError::Read {
                source: err,
                path: self.path.clone(),
            })
    }
}

/// Malformed entry line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected 6 fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid sequence marker {value:?}")]
    Sequence { value: String },

    #[error("{field} field is not wrapped in backticks")]
    Unquoted { field: &'static str },

    #[error("invalid version label {value:?}")]
    Version {
        value: String,
        #[source]
        source: ValidationError,
    },
}

/// Ledger error types.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Ledger exists but cannot be read.
    #[error("failed to read ledger at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Ledger cannot be opened for appending or written to.
    #[error("failed to write ledger at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory containing the ledger cannot be created.
    #[error("failed to create ledger directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Entry line found, but it is malformed.
    #[error("corrupt entry in ledger {:?} at line {line}", path.display())]
    Corrupt {
        #[source]
        source: DecodeError,
        path: PathBuf,
        line: usize,
    },

    /// Entry field cannot be represented in the record format.
    #[error("cannot record {field} {value:?} in ledger")]
    Unencodable { field: &'static str, value: String },

    /// Entry belongs to a different tier than the ledger.
    #[error("entry of tier {found} cannot be appended to {expect} ledger")]
    TierMismatch { expect: Tier, found: Tier },
}

/// Friendly result alias :3
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::write;
    use tempfile::TempDir;

    fn entry(sequence_id: u32, version: VersionNumber, note: &str) -> LedgerEntry {
        LedgerEntry {
            sequence_id,
            timestamp: "2025-01-01 10:00:00".into(),
            previous_label: "Proj_V0.0.0".into(),
            tier: Tier::new("Dev"),
            version,
            note: note.into(),
            archive_name: format!("Proj_{}_{}.zip", version.label(), note.replace(' ', "_")),
        }
    }

    #[test]
    fn encode_entry_line() -> anyhow::Result<()> {
        let result = entry(1, VersionNumber::new(0, 0, 1), "Initial release").encode()?;
        let expect = "# D001 >> `2025-01-01 10:00:00` >> `Proj_V0.0.0` >> `V0.0.1` \
            >> `Initial release` >> `Proj_V0.0.1_Initial_release.zip`";
        assert_eq!(result, expect);
        Ok(())
    }

    #[test]
    fn encode_refuses_unsafe_fields() {
        let mut bad = entry(1, VersionNumber::new(0, 0, 1), "Fix");
        bad.note = "uses `code`".into();
        assert!(matches!(
            bad.encode(),
            Err(LedgerError::Unencodable { field: "note", .. })
        ));

        bad.note = "a >> b".into();
        assert!(matches!(bad.encode(), Err(LedgerError::Unencodable { .. })));

        bad.note = "two\nlines".into();
        assert!(matches!(bad.encode(), Err(LedgerError::Unencodable { .. })));
    }

    #[test]
    fn decode_skips_non_entry_lines() -> anyhow::Result<()> {
        let dev = Tier::new("Dev");
        assert_eq!(LedgerEntry::decode("### Proj Dev Versions", &dev)?, None);
        assert_eq!(LedgerEntry::decode("---", &dev)?, None);
        assert_eq!(LedgerEntry::decode("   ", &dev)?, None);
        Ok(())
    }

    #[test]
    fn decode_rejects_malformed_entry_lines() {
        let dev = Tier::new("Dev");
        assert_eq!(
            LedgerEntry::decode("# D001 >> `2025` >> `Proj_V0.0.0`", &dev),
            Err(DecodeError::FieldCount { found: 3 })
        );
        assert_eq!(
            LedgerEntry::decode("# Dxx >> `a` >> `b` >> `V0.0.1` >> `d` >> `e`", &dev),
            Err(DecodeError::Sequence {
                value: "xx".into()
            })
        );
        assert_eq!(
            LedgerEntry::decode("# D001 >> `a` >> `b` >> V0.0.1 >> `d` >> `e`", &dev),
            Err(DecodeError::Unquoted { field: "version" })
        );
        assert!(matches!(
            LedgerEntry::decode("# D001 >> `a` >> `b` >> `V0.x.1` >> `d` >> `e`", &dev),
            Err(DecodeError::Version { .. })
        ));
    }

    #[test]
    fn recover_last_from_fixture() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path(), "Proj", Tier::new("Dev"));
        write(
            ledger.path(),
            indoc! {r#"
                ### Proj Dev Versions

                # D001 >> `2025-01-01 10:00:00` >> `Proj_V0.0.0` >> `V0.0.1` >> `Initial release` >> `Proj_V0.0.1_Initial_release.zip`
                ---
                # D002 >> `2025-01-02 10:00:00` >> `Proj_V0.0.1` >> `V0.0.2` >> `Cart fixes` >> `Proj_V0.0.2_Cart_fixes.zip`
                ---

            "#},
        )?;

        let result = ledger.recover_last()?.map(|entry| (entry.sequence_id, entry.version, entry.note));
        let expect = Some((2, VersionNumber::new(0, 0, 2), "Cart fixes".to_string()));
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn recover_last_missing_or_empty_ledger() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path(), "Proj", Tier::new("Dev"));
        assert_eq!(ledger.recover_last()?, None);

        write(ledger.path(), "### Proj Dev Versions\n\n")?;
        assert_eq!(ledger.recover_last()?, None);

        Ok(())
    }

    #[test]
    fn recover_last_skips_corrupt_tail() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path(), "Proj", Tier::new("Dev"));
        write(
            ledger.path(),
            indoc! {r#"
                ### Proj Dev Versions

                # D001 >> `2025-01-01 10:00:00` >> `Proj_V0.0.0` >> `V0.0.1` >> `One` >> `Proj_V0.0.1_One.zip`
                ---
                # D002 >> `2025-01-02 10:00:00` >> `Proj_V0.0.1` >> `V0.0.2` >> `Two` >> `Proj_V0.0.2_Two.zip`
                ---
                # D003 >> `2025-01-03 10:00:00` >> `Proj_V0.0.2` >> `V0.0.3` >> `Three` >> `Proj_V0.0.3_Three.zip`
                ---
                # D004 >> garbage
                ---
            "#},
        )?;

        let result = ledger.recover_last()?.map(|entry| (entry.sequence_id, entry.version, entry.note));
        let expect = Some((3, VersionNumber::new(0, 0, 3), "Three".to_string()));
        assert_eq!(result, expect);

        // INVARIANT: Strict listing still refuses the corrupt line.
        assert!(matches!(ledger.entries(), Err(LedgerError::Corrupt { line: 9, .. })));

        Ok(())
    }

    #[test]
    fn recover_last_reports_ledger_without_valid_entry() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path(), "Proj", Tier::new("Dev"));
        write(
            ledger.path(),
            indoc! {r#"
                ### Proj Dev Versions

                # D001 >> broken
                ---
                # D002 >> `a` >> `b` >> `V0.0.x` >> `d` >> `e`
                ---
            "#},
        )?;

        let result = ledger.recover_last();
        assert!(matches!(result, Err(LedgerError::Corrupt { line: 5, .. })));

        Ok(())
    }

    #[test]
    fn append_then_recover_round_trip() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path().join("nested").join("logs"), "Proj", Tier::new("Dev"));

        let mut version = VersionNumber::new(0, 0, 1);
        for sequence_id in 1..=12 {
            let note = format!("Release number {sequence_id}");
            ledger.append(&entry(sequence_id, version, &note))?;

            let last = ledger.recover_last()?.expect("entry was just appended");
            assert_eq!(last.sequence_id, sequence_id);
            assert_eq!(last.version, version);
            assert_eq!(last.note, note);

            version = VersionNumber::new(0, version.minor + (version.patch + 1) / 10, (version.patch + 1) % 10);
        }

        let ids = ledger.entries()?.into_iter().map(|entry| entry.sequence_id).collect::<Vec<_>>();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());

        let content = read_to_string(ledger.path())?;
        assert_eq!(content.matches("### Proj Dev Versions").count(), 1);
        assert!(content.starts_with("### Proj Dev Versions\n\n# D001 >> "));
        assert_eq!(content.lines().filter(|line| *line == BLOCK_END).count(), 12);

        Ok(())
    }

    #[test]
    fn append_never_rewrites_existing_bytes() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path(), "Proj", Tier::new("Dev"));
        ledger.append(&entry(1, VersionNumber::new(0, 0, 1), "First"))?;
        let before = read_to_string(ledger.path())?;

        ledger.append(&entry(2, VersionNumber::new(0, 0, 2), "Second"))?;
        let after = read_to_string(ledger.path())?;
        assert!(after.starts_with(&before));

        Ok(())
    }

    #[test]
    fn append_rejects_foreign_tier() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ledger = Ledger::new(dir.path(), "Proj", Tier::new("Alpha"));
        let result = ledger.append(&entry(1, VersionNumber::new(0, 0, 1), "First"));
        assert!(matches!(result, Err(LedgerError::TierMismatch { .. })));
        assert!(!ledger.exists());
        Ok(())
    }
}
