// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the release configuration file that Relic uses to
//! simplify the process of serialization and deserialization. Configuration
//! is static: nothing in it is derived at runtime.
//!
//! # General Layout
//!
//! ```toml
//! [project]
//! name = "Proj"
//! root = "."
//!
//! [output]
//! archive_dir = "../Versions"
//! ledger_dir = "../Versions/CHANGELOG"
//!
//! [archive]
//! exclude = ["node_modules", ".git"]
//! size_warning_mb = 100
//!
//! [versioning]
//! tiers = ["Dev", "Alpha", "Beta", "Release", "Stable"]
//! scheme = "tiered"
//! ```
//!
//! The `archive` and `versioning` sections are optional. All path fields
//! undergo shell expansion. Relative paths are resolved against the directory
//! of the configuration file when loaded through [`ReleaseConfig::load`].

use crate::{
    archive::{ExclusionSet, MIB},
    ledger::Ledger,
    sequencer::Sequencer,
    version::{Tier, TierOrder, VersionScheme},
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Release configuration layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ReleaseConfig {
    /// Project being released.
    pub project: ProjectSettings,

    /// Where archives and ledgers go.
    pub output: OutputSettings,

    /// How the project tree is packed.
    #[serde(default)]
    pub archive: ArchiveSettings,

    /// How versions progress.
    #[serde(default)]
    pub versioning: VersioningSettings,
}

impl ReleaseConfig {
    /// Load configuration from file.
    ///
    /// Relative paths are resolved against the configuration file's directory.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError`] if file content is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;
        let mut config: ReleaseConfig = data.parse()?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for field in [
            &mut config.project.root,
            &mut config.output.archive_dir,
            &mut config.output.ledger_dir,
        ] {
            if field.is_relative() {
                *field = base.join(&*field);
            }
        }

        Ok(config)
    }

    /// Exclusion set of archive settings.
    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(self.archive.exclude.iter().cloned())
    }

    /// Size warning threshold in bytes.
    pub fn size_warning_threshold(&self) -> u64 {
        self.archive.size_warning_mb.saturating_mul(MIB)
    }

    /// Version sequencer of versioning settings.
    pub fn sequencer(&self) -> Sequencer {
        Sequencer::new(self.versioning.tiers.clone(), self.versioning.scheme)
    }

    /// Ledger of given tier.
    pub fn ledger(&self, tier: &Tier) -> Ledger {
        Ledger::new(&self.output.ledger_dir, &self.project.name, tier.clone())
    }
}

impl FromStr for ReleaseConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ReleaseConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        for field in [
            &mut config.project.root,
            &mut config.output.archive_dir,
            &mut config.output.ledger_dir,
        ] {
            *field = expand(field)?;
        }

        // INVARIANT: Project name ends up in file names and ledger records.
        let name = config.project.name.as_str();
        if name.trim().is_empty()
            || name.contains(['/', '\\', '`', '\n', '\r'])
            || name.contains(">>")
        {
            return Err(ConfigError::InvalidValue {
                field: "project.name",
                value: name.to_string(),
            });
        }

        Ok(config)
    }
}

impl Display for ReleaseConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Project settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectSettings {
    /// Name used in archive names and ledger records.
    pub name: String,

    /// Root of the tree to archive.
    pub root: PathBuf,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            name: "Project".into(),
            root: PathBuf::from("."),
        }
    }
}

/// Output locations.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct OutputSettings {
    /// Directory receiving archives.
    pub archive_dir: PathBuf,

    /// Directory receiving one ledger per tier.
    pub ledger_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("../Versions"),
            ledger_dir: PathBuf::from("../Versions/CHANGELOG"),
        }
    }
}

/// Archive settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ArchiveSettings {
    /// Names excluded at every level of the project tree.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Files above this many MiB are flagged.
    #[serde(default = "default_size_warning_mb")]
    pub size_warning_mb: u64,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            exclude: default_exclude(),
            size_warning_mb: default_size_warning_mb(),
        }
    }
}

fn default_exclude() -> Vec<String> {
    ["node_modules", ".git", "__pycache__", "package-lock.json"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_size_warning_mb() -> u64 {
    100
}

/// Versioning settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct VersioningSettings {
    /// Tier progression, first tier is the initial one.
    #[serde(default)]
    pub tiers: TierOrder,

    /// Rollover scheme of version components.
    #[serde(default)]
    pub scheme: VersionScheme,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Field holds an unusable value.
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
