// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use relic::{
    config::{OutputSettings, ProjectSettings, ReleaseConfig},
    ledger::{Ledger, LedgerEntry},
    version::{Tier, VersionNumber},
};

use anyhow::Result;
use std::{
    fs::{create_dir_all, write, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use zip::ZipArchive;

pub(crate) struct ReleaseFixture {
    dir: TempDir,
    config: ReleaseConfig,
}

impl ReleaseFixture {
    pub(crate) fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path().join("project");
        let out = dir.path().join("out");
        create_dir_all(&root)?;

        let mut config = ReleaseConfig {
            project: ProjectSettings {
                name: "Proj".into(),
                root,
            },
            output: OutputSettings {
                archive_dir: out.clone(),
                ledger_dir: out.join("CHANGELOG"),
            },
            ..Default::default()
        };
        config.archive.size_warning_mb = 1;

        Ok(Self { dir, config })
    }

    pub(crate) fn config(&self) -> ReleaseConfig {
        self.config.clone()
    }

    pub(crate) fn config_mut(&mut self) -> &mut ReleaseConfig {
        &mut self.config
    }

    pub(crate) fn scratch(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn add_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.config.project.root.join(path);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, contents)?;

        Ok(())
    }

    pub(crate) fn ledger(&self, tier: &str) -> Ledger {
        self.config.ledger(&Tier::new(tier))
    }

    pub(crate) fn archive_path(&self, name: &str) -> PathBuf {
        self.config.output.archive_dir.join(name)
    }

    /// Record release directly in a tier's ledger.
    pub(crate) fn record(&self, tier: &str, sequence_id: u32, version: VersionNumber) -> Result<()> {
        let tier = Tier::new(tier);
        let entry = LedgerEntry {
            sequence_id,
            timestamp: "2025-01-01 12:00:00".into(),
            previous_label: format!("Proj_{}", VersionNumber::ZERO.label()),
            tier: tier.clone(),
            version,
            note: "Recorded".into(),
            archive_name: format!("Proj_{}_Recorded.zip", version.label()),
        };
        self.config.ledger(&tier).append(&entry)?;

        Ok(())
    }
}

impl ReleaseFixture {
    /// Append raw text to a tier's ledger, creating it if needed.
    pub(crate) fn append_raw(&self, tier: &str, text: impl AsRef<[u8]>) -> Result<()> {
        let ledger = self.ledger(tier);
        if let Some(parent) = ledger.path().parent() {
            create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(ledger.path())?;
        file.write_all(text.as_ref())?;

        Ok(())
    }
}

pub(crate) fn archive_entries(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let archive = ZipArchive::new(File::open(path)?)?;
    let mut names = archive.file_names().map(str::to_owned).collect::<Vec<_>>();
    names.sort();

    Ok(names)
}
