// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive exclusion rules.
//!
//! An __exclusion set__ decides what the archiver never packs. It holds two
//! kinds of rules:
//!
//! - __Names__: literal path segments, e.g., "node_modules". A name matches a
//!   directory or file of that exact name at any depth of the tree, not just
//!   at the root.
//! - __Paths__: exact paths that must never be packed. The archiver pins its
//!   own destination here so an archive written inside the tree it packs
//!   cannot include itself.
//!
//! The set is a pure predicate over a parent directory and an entry name.
//! Traversal consults it before descending into a directory, so excluded
//! subtrees are never walked at all.

use std::{
    collections::BTreeSet,
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Names and paths pruned from archive traversal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    names: BTreeSet<OsString>,
    paths: BTreeSet<PathBuf>,
}

impl ExclusionSet {
    /// Construct new exclusion set from literal names.
    pub fn new(names: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            paths: BTreeSet::new(),
        }
    }

    /// Pin exact paths that must never be packed.
    pub fn with_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Determine why entry `name` inside `parent` is excluded, if at all.
    pub fn matches(&self, parent: &Path, name: &OsStr) -> Option<Exclusion> {
        if self.names.contains(name) {
            return Some(Exclusion::Name);
        }

        if !self.paths.is_empty() && self.paths.contains(&parent.join(name)) {
            return Some(Exclusion::Path);
        }

        None
    }

    /// Check if entry `name` inside `parent` is excluded.
    pub fn excludes(&self, parent: &Path, name: &OsStr) -> bool {
        self.matches(parent, name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.paths.is_empty()
    }
}

impl Display for ExclusionSet {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let names = self
            .names
            .iter()
            .map(|name| name.to_string_lossy())
            .collect::<Vec<_>>();
        fmt.write_str(&names.join(", "))
    }
}

/// Reason an entry was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Entry name is listed in the set.
    Name,

    /// Entry path is pinned in the set.
    Path,
}
