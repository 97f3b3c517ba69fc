// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project archiving.
//!
//! Pack a project tree into a deflate-compressed zip archive. Traversal is
//! depth-first and sorted by file name, so the same tree always yields the
//! same entries in the same order. Entry names are paths relative to the
//! project root, always joined with forward slashes regardless of host.
//!
//! # Failure Handling
//!
//! Problems with individual source files are __warnings__: a file that cannot
//! be read due to missing permissions is skipped, and an oversized file is
//! flagged but still packed. Any other I/O failure is __fatal__.
//!
//! The archive is first written to a temporary file next to its destination,
//! then renamed into place once complete. Thus, a failed build never leaves a
//! corrupt archive at the destination path.
//!
//! # See Also
//!
//! 1. [`ExclusionSet`]

pub mod exclude;

pub use exclude::{Exclusion, ExclusionSet};

use ignore::{DirEntry, WalkBuilder};
use indicatif::ProgressBar;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{self, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, instrument, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Description of one packaging operation.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    /// Root of the tree to pack.
    pub root: PathBuf,

    /// Names pruned at every level of the tree.
    pub exclusions: ExclusionSet,

    /// Final path of the archive.
    pub output: PathBuf,

    /// Files larger than this many bytes are flagged.
    pub size_warning_threshold: u64,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Final path of the archive.
    pub path: PathBuf,

    /// Number of files packed.
    pub entry_count: usize,

    /// Relative paths left out, excluded or unreadable, in traversal order.
    pub skipped_paths: Vec<String>,

    /// Size of the finished archive.
    pub total_bytes_written: u64,

    /// Non-fatal problems met while packing.
    pub warnings: Vec<ArchiveWarning>,
}

/// Non-fatal archiving problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveWarning {
    /// File exceeds size warning threshold, but was still packed.
    Oversized { path: String, size: u64 },

    /// Entry could not be read due to missing permissions, so it was skipped.
    Unreadable { path: String },
}

impl Display for ArchiveWarning {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Oversized { path, size } => {
                write!(fmt, "large file {path:?} ({:.1} MiB)", *size as f64 / MIB as f64)
            }
            Self::Unreadable { path } => write!(fmt, "cannot read {path:?}, skipped"),
        }
    }
}

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Packs project trees into zip archives.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    progress: ProgressBar,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Construct new archive builder without visible progress.
    pub fn new() -> Self {
        Self {
            progress: ProgressBar::hidden(),
        }
    }

    /// Report packing progress through given progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Build archive described by job.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::Root`] if root cannot be resolved.
    /// - Return [`ArchiveError::CreateDir`] if output directory cannot be
    ///   created.
    /// - Return [`ArchiveError::Temp`] if temporary archive cannot be created.
    /// - Return [`ArchiveError::Walk`] if traversal fails for reasons other
    ///   than missing permissions.
    /// - Return [`ArchiveError::Read`] if source file fails for reasons other
    ///   than missing permissions.
    /// - Return [`ArchiveError::Zip`] or [`ArchiveError::Write`] if archive
    ///   cannot be written.
    /// - Return [`ArchiveError::Persist`] if finished archive cannot be moved
    ///   into place.
    #[instrument(skip(self, job), fields(root = %job.root.display()), level = "debug")]
    pub fn build(&self, job: &ArchiveJob) -> Result<ArchiveSummary> {
        let root = job.root.canonicalize().map_err(|err| ArchiveError::Root {
            source: err,
            path: job.root.clone(),
        })?;

        let file_name = job
            .output
            .file_name()
            .ok_or_else(|| ArchiveError::Destination(job.output.clone()))?;
        let output_dir = match job.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        mkdirp::mkdirp(&output_dir).map_err(|err| ArchiveError::CreateDir {
            source: err,
            path: output_dir.clone(),
        })?;
        let output_dir = output_dir
            .canonicalize()
            .map_err(|err| ArchiveError::CreateDir {
                source: err,
                path: output_dir.clone(),
            })?;
        let destination = output_dir.join(file_name);

        let temp = tempfile::Builder::new()
            .prefix(".relic-")
            .suffix(".zip.part")
            .tempfile_in(&output_dir)
            .map_err(|err| ArchiveError::Temp {
                source: err,
                path: output_dir.clone(),
            })?;

        // INVARIANT: Never pack the archive into itself.
        let exclusions = job
            .exclusions
            .clone()
            .with_paths([destination.clone(), temp.path().to_path_buf()]);

        info!("pack {:?} into {:?}", root.display(), destination.display());
        let mut summary = ArchiveSummary {
            path: destination.clone(),
            ..Default::default()
        };

        {
            let mut zip = ZipWriter::new(BufWriter::new(temp.as_file()));
            self.pack(&root, exclusions, job.size_warning_threshold, &mut zip, &mut summary)?;

            let mut writer = zip.finish().map_err(|err| ArchiveError::Zip {
                source: err,
                path: destination.clone(),
            })?;
            writer.flush().map_err(|err| ArchiveError::Write {
                source: err,
                path: destination.clone(),
            })?;
        }

        let write_err = |err| ArchiveError::Write {
            source: err,
            path: destination.clone(),
        };
        temp.as_file().sync_all().map_err(write_err)?;
        summary.total_bytes_written = temp.as_file().metadata().map_err(write_err)?.len();

        // INVARIANT: Atomically replace any previous archive of the same name.
        temp.persist(&destination)
            .map_err(|err| ArchiveError::Persist {
                source: err.error,
                path: destination.clone(),
            })?;
        self.progress.finish_and_clear();

        info!(
            "packed {} files into {:?} ({} bytes)",
            summary.entry_count,
            destination.display(),
            summary.total_bytes_written
        );

        Ok(summary)
    }

    fn pack<W>(
        &self,
        root: &Path,
        exclusions: ExclusionSet,
        threshold: u64,
        zip: &mut ZipWriter<W>,
        summary: &mut ArchiveSummary,
    ) -> Result<()>
    where
        W: Write + io::Seek,
    {
        // INVARIANT: Pruned and unreadable paths share one list to keep
        //   traversal order.
        let skipped = Arc::new(Mutex::new(Vec::new()));

        let pruned = Arc::clone(&skipped);
        let filter_root = root.to_path_buf();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|lhs, rhs| lhs.cmp(rhs))
            .filter_entry(move |entry| {
                keep_entry(&filter_root, &exclusions, entry, &pruned)
            })
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) if is_permission_denied(&err) => {
                    let path = error_path(&err)
                        .map(|path| entry_name(root, path))
                        .unwrap_or_else(|| err.to_string());
                    warn!("cannot read {path:?}, skipped");
                    record_skip(&skipped, path.clone());
                    summary.warnings.push(ArchiveWarning::Unreadable { path });
                    continue;
                }
                Err(err) => {
                    return Err(ArchiveError::Walk {
                        source: err,
                        path: root.to_path_buf(),
                    })
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() || (file_type.is_symlink() && !path.is_file()) {
                continue;
            }

            let name = entry_name(root, path);
            let mut file = match File::open(path) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                    warn!("cannot read {name:?}, skipped");
                    record_skip(&skipped, name.clone());
                    summary.warnings.push(ArchiveWarning::Unreadable { path: name });
                    continue;
                }
                Err(err) => {
                    return Err(ArchiveError::Read {
                        source: err,
                        path: path.to_path_buf(),
                    })
                }
            };

            let size = file
                .metadata()
                .map_err(|err| ArchiveError::Read {
                    source: err,
                    path: path.to_path_buf(),
                })?
                .len();
            if size > threshold {
                let warning = ArchiveWarning::Oversized {
                    path: name.clone(),
                    size,
                };
                warn!("{warning}");
                summary.warnings.push(warning);
            }

            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(size >= u64::from(u32::MAX));
            zip.start_file(name.as_str(), options)
                .map_err(|err| ArchiveError::Zip {
                    source: err,
                    path: path.to_path_buf(),
                })?;
            io::copy(&mut file, zip).map_err(|err| ArchiveError::Write {
                source: err,
                path: path.to_path_buf(),
            })?;

            debug!("packed {name:?}");
            summary.entry_count += 1;
            self.progress.set_message(name);
            self.progress.inc(1);
        }

        summary.skipped_paths = skipped
            .lock()
            .map(|skipped| skipped.clone())
            .unwrap_or_default();

        Ok(())
    }
}

fn keep_entry(
    root: &Path,
    exclusions: &ExclusionSet,
    entry: &DirEntry,
    skipped: &Mutex<Vec<String>>,
) -> bool {
    if entry.depth() == 0 {
        return true;
    }

    let Some(parent) = entry.path().parent() else {
        return true;
    };

    match exclusions.matches(parent, entry.file_name()) {
        None => true,
        Some(Exclusion::Name) => {
            let name = entry_name(root, entry.path());
            debug!("exclude {name:?}");
            record_skip(skipped, name);
            false
        }
        Some(Exclusion::Path) => {
            debug!("skip own archive {:?}", entry.path().display());
            false
        }
    }
}

fn record_skip(skipped: &Mutex<Vec<String>>, path: String) {
    if let Ok(mut skipped) = skipped.lock() {
        skipped.push(path);
    }
}

/// Relative archive entry name of path, joined with forward slashes.
pub fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_permission_denied(err: &ignore::Error) -> bool {
    err.io_error()
        .is_some_and(|err| err.kind() == ErrorKind::PermissionDenied)
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

/// Archiving error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Project root cannot be resolved.
    #[error("failed to resolve project root {:?}", path.display())]
    Root {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Destination has no file name.
    #[error("archive destination {:?} is not a file path", .0.display())]
    Destination(PathBuf),

    /// Output directory cannot be created.
    #[error("failed to create archive directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Temporary archive cannot be created.
    #[error("failed to create temporary archive in {:?}", path.display())]
    Temp {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Traversal failed.
    #[error("failed to walk {:?}", path.display())]
    Walk {
        #[source]
        source: ignore::Error,
        path: PathBuf,
    },

    /// Source file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Zip container cannot be written.
    #[error("failed to write zip entry for {:?}", path.display())]
    Zip {
        #[source]
        source: zip::result::ZipError,
        path: PathBuf,
    },

    /// Archive bytes cannot be written.
    #[error("failed to write archive data for {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Finished archive cannot be moved into place.
    #[error("failed to move finished archive to {:?}", path.display())]
    Persist {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn tree(files: &[(&str, &str)]) -> anyhow::Result<TempDir> {
        let dir = TempDir::new()?;
        for (path, contents) in files {
            let path = dir.path().join(path);
            create_dir_all(path.parent().expect("file has parent"))?;
            write(path, contents)?;
        }
        Ok(dir)
    }

    fn archive_names(path: &Path) -> anyhow::Result<Vec<String>> {
        let archive = ZipArchive::new(File::open(path)?)?;
        Ok(archive.file_names().map(str::to_owned).collect())
    }

    fn job(root: &Path, output: PathBuf) -> ArchiveJob {
        ArchiveJob {
            root: root.to_path_buf(),
            exclusions: ExclusionSet::new(["node_modules", ".git"]),
            output,
            size_warning_threshold: 100 * MIB,
        }
    }

    #[test]
    fn excludes_names_at_every_depth() -> anyhow::Result<()> {
        let root = tree(&[
            ("a/node_modules/x.txt", "x"),
            ("node_modules/y.txt", "y"),
            ("a/x.txt", "ax"),
            ("b/c/d.txt", "d"),
            (".git/HEAD", "ref"),
        ])?;
        let out = TempDir::new()?;

        let summary = ArchiveBuilder::new().build(&job(root.path(), out.path().join("proj.zip")))?;

        let mut names = archive_names(&summary.path)?;
        names.sort();
        assert_eq!(names, vec!["a/x.txt", "b/c/d.txt"]);
        assert_eq!(summary.entry_count, 2);
        assert_eq!(
            summary.skipped_paths,
            vec![".git", "a/node_modules", "node_modules"]
        );
        assert!(summary.total_bytes_written > 0);
        assert!(summary.warnings.is_empty());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_are_skipped_with_warning() -> anyhow::Result<()> {
        use std::fs::{set_permissions, Permissions};
        use std::os::unix::fs::PermissionsExt;

        let root = tree(&[("a.txt", "a"), ("locked/inner.txt", "i"), ("secret.txt", "s")])?;
        let out = TempDir::new()?;
        let locked = root.path().join("locked");
        let secret = root.path().join("secret.txt");
        set_permissions(&locked, Permissions::from_mode(0o000))?;
        set_permissions(&secret, Permissions::from_mode(0o000))?;

        // INVARIANT: Privileged users ignore permission bits, nothing to check.
        let privileged = File::open(&secret).is_ok();
        let result = if privileged {
            None
        } else {
            Some(ArchiveBuilder::new().build(&job(root.path(), out.path().join("proj.zip"))))
        };
        set_permissions(&locked, Permissions::from_mode(0o755))?;
        set_permissions(&secret, Permissions::from_mode(0o644))?;

        let Some(result) = result else {
            return Ok(());
        };
        let summary = result?;

        assert_eq!(archive_names(&summary.path)?, vec!["a.txt"]);
        assert_eq!(summary.entry_count, 1);
        assert!(summary.skipped_paths.contains(&"locked".to_string()));
        assert!(summary.skipped_paths.contains(&"secret.txt".to_string()));
        assert!(summary.warnings.contains(&ArchiveWarning::Unreadable {
            path: "locked".into()
        }));
        assert!(summary.warnings.contains(&ArchiveWarning::Unreadable {
            path: "secret.txt".into()
        }));

        Ok(())
    }

    #[test]
    fn rebuild_yields_same_entries() -> anyhow::Result<()> {
        let root = tree(&[("src/lib.rs", "fn main() {}"), ("README.md", "# hi"), ("z/a.txt", "a")])?;
        let out = TempDir::new()?;
        let job = job(root.path(), out.path().join("proj.zip"));

        let first = ArchiveBuilder::new().build(&job)?;
        let first_names = archive_names(&first.path)?;
        let second = ArchiveBuilder::new().build(&job)?;
        let second_names = archive_names(&second.path)?;

        assert_eq!(first.entry_count, second.entry_count);
        assert_eq!(first_names, second_names);

        Ok(())
    }

    #[test]
    fn skips_own_archive_inside_root() -> anyhow::Result<()> {
        let root = tree(&[("index.html", "<html></html>"), ("dist/old.txt", "old")])?;
        let output = root.path().join("dist").join("proj.zip");

        let first = ArchiveBuilder::new().build(&job(root.path(), output.clone()))?;
        assert_eq!(first.entry_count, 2);

        // Archive from the previous run now lies inside the tree.
        let second = ArchiveBuilder::new().build(&job(root.path(), output))?;
        let mut names = archive_names(&second.path)?;
        names.sort();
        assert_eq!(names, vec!["dist/old.txt", "index.html"]);

        Ok(())
    }

    #[test]
    fn oversized_files_are_flagged_but_packed() -> anyhow::Result<()> {
        let root = tree(&[("big.bin", "0123456789"), ("small.txt", "1")])?;
        let out = TempDir::new()?;
        let mut job = job(root.path(), out.path().join("proj.zip"));
        job.size_warning_threshold = 5;

        let summary = ArchiveBuilder::new().build(&job)?;
        assert_eq!(summary.entry_count, 2);
        assert_eq!(
            summary.warnings,
            vec![ArchiveWarning::Oversized {
                path: "big.bin".into(),
                size: 10
            }]
        );

        Ok(())
    }

    #[test]
    fn failed_build_leaves_no_archive() -> anyhow::Result<()> {
        let root = tree(&[("a.txt", "a")])?;
        let out = TempDir::new()?;
        let blocker = out.path().join("blocker");
        write(&blocker, "not a directory")?;

        let output = blocker.join("proj.zip");
        let result = ArchiveBuilder::new().build(&job(root.path(), output.clone()));
        assert!(matches!(
            result,
            Err(ArchiveError::CreateDir { .. } | ArchiveError::Temp { .. })
        ));
        assert!(!output.exists());

        Ok(())
    }

    #[test]
    fn missing_root_is_fatal() -> anyhow::Result<()> {
        let out = TempDir::new()?;
        let result = ArchiveBuilder::new().build(&job(
            &out.path().join("missing"),
            out.path().join("proj.zip"),
        ));
        assert!(matches!(result, Err(ArchiveError::Root { .. })));
        Ok(())
    }

    #[test]
    fn entry_names_use_forward_slashes() {
        let root = Path::new("/proj");
        let path = Path::new("/proj").join("a").join("b").join("c.txt");
        assert_eq!(entry_name(root, &path), "a/b/c.txt");
    }
}
