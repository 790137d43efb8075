//! File selection rules for packaging: extension allow-list plus
//! directory pruning for VCS metadata and build output.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::pack::PackError;

/// Directory names pruned from every walk unless the config overrides them.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "target",
    "node_modules",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".idea",
    ".vscode",
];

/// Accepted file extensions, stored lowercase without the leading dot.
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ExtensionSet {
    exts: BTreeSet<String>,
}

impl ExtensionSet {
    pub fn new<I, S>(exts: I) -> Result<Self, PackError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exts: BTreeSet<String> = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        if exts.is_empty() {
            return Err(PackError::EmptyExtensions);
        }
        Ok(Self { exts })
    }

    /// Parse a comma separated list such as `py,rs,.md`.
    pub fn parse_list(list: &str) -> Result<Self, PackError> {
        Self::new(list.split(','))
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.exts.contains(&ext.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.exts.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for ExtensionSet {
    type Error = PackError;

    fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<ExtensionSet> for Vec<String> {
    fn from(set: ExtensionSet) -> Self {
        set.exts.into_iter().collect()
    }
}

/// Extension of the final path component: the suffix after its last `.`.
/// Dotfiles like `.gitignore` and names ending in `.` have none.
pub fn extension_of(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// True when `path` (relative to its source root) carries an accepted
/// extension.
pub fn accepts(path: &Path, extensions: &ExtensionSet) -> bool {
    extension_of(path).is_some_and(|ext| extensions.contains(ext))
}

/// Directory names that are never descended into.
#[derive(Debug, Clone)]
pub struct DirExclusions {
    names: BTreeSet<String>,
}

impl DirExclusions {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim_end_matches('/').to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, dir_name: &OsStr) -> bool {
        dir_name
            .to_str()
            .is_some_and(|n| self.names.contains(n))
    }
}

impl Default for DirExclusions {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_DIRS)
    }
}
