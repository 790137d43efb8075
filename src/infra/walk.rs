//! Source-root walker shared by `pack` and `changes`.
//! - Prunes excluded directory names before descending (never visited)
//! - `--exclude` globs prune directories and drop files
//! - Optional .gitignore awareness, off by default
//! - Hidden files included by default, symlinks not followed
//! - Unreadable entries are recorded, never fatal
//!
//! Traversal is `ignore::WalkBuilder`; globs are a `globset::GlobSet`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

use crate::core::matcher::DirExclusions;

/// An entry the walk could not visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry
{
    pub path: PathBuf,
    pub reason: String,
}

/// Files found under one root, relative to it, plus anything unreadable.
#[derive(Debug, Default)]
pub struct WalkOutcome
{
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
}

/// Walker with directory exclusions and optional extra ignore globs.
/// Globs are checked on directories while descending and again on files.
#[derive(Debug, Clone)]
pub struct FileWalker
{
    /// Directory names never descended into
    exclusions: DirExclusions,

    /// `--exclude` / `ignore_patterns` globs, root-relative
    ignore_patterns: GlobSet,

    /// Honor .gitignore/.ignore files; default false
    respect_gitignore: bool,

    /// Include hidden (dot) files; default true
    include_hidden: bool,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g. "**/*.min.js").
    /// Patterns match on paths relative to the walked root.
    pub fn new(
        exclusions: DirExclusions,
        additional_ignores: &[String],
    ) -> Result<Self, globset::Error>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            exclusions,
            ignore_patterns: builder.build()?,
            respect_gitignore: false,
            include_hidden: true,
        })
    }

    /// (Optional) Honor .gitignore, .git/info/exclude and .ignore files.
    pub fn with_gitignore(
        mut self,
        respect: bool,
    ) -> Self
    {
        self.respect_gitignore = respect;
        self
    }

    /// Dotfiles and dot-directories are walked unless this is false.
    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    /// WalkBuilder for one root with every toggle applied.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Start from nothing, then opt in
        b.standard_filters(false);
        b.hidden(!self.include_hidden);
        b.follow_links(false);

        if self.respect_gitignore
        {
            b.git_ignore(true);
            b.git_global(true);
            b.git_exclude(true);
            b.ignore(true);
            b.parents(true);
            b.require_git(false);
        }

        let exclusions = self
            .exclusions
            .clone();
        let extra = self
            .ignore_patterns
            .clone();
        let root_owned = root.to_path_buf();

        b.filter_entry(move |ent: &DirEntry| {
            // Never prune the root itself
            if ent.depth() == 0
            {
                return true;
            }

            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            if !is_dir
            {
                return true;
            }

            if exclusions.is_excluded(ent.file_name())
            {
                return false;
            }

            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            !extra.is_match(rel)
        });

        b
    }

    /// Traverse files under `root`. Paths in the outcome are relative to
    /// `root` and sorted.
    pub fn walk(
        &self,
        root: &Path,
    ) -> WalkOutcome
    {
        let mut outcome = WalkOutcome::default();

        for res in self
            .build_walk(root)
            .build()
        {
            let entry = match res
            {
                Ok(entry) => entry,
                Err(err) =>
                {
                    let path = error_path(&err).unwrap_or_else(|| root.to_path_buf());
                    tracing::debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                    outcome
                        .skipped
                        .push(SkippedEntry { path, reason: err.to_string() });
                    continue;
                }
            };

            // Keep only regular files
            if !entry
                .file_type()
                .is_some_and(|ft| ft.is_file())
            {
                continue;
            }

            let rel = match entry
                .path()
                .strip_prefix(root)
            {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };

            // Late file-level extra ignore filtering
            if self
                .ignore_patterns
                .is_match(&rel)
            {
                continue;
            }

            outcome
                .files
                .push(rel);
        }

        // Deterministic order (stable output & tests)
        outcome
            .files
            .sort();

        outcome
    }

    /// Traverse and keep only files for which `filter` returns true.
    pub fn walk_with_filter<F>(
        &self,
        root: &Path,
        filter: F,
    ) -> WalkOutcome
    where
        F: Fn(&Path) -> bool,
    {
        let mut outcome = self.walk(root);
        outcome
            .files
            .retain(|p| filter(p));
        outcome
    }
}

/// Dig the offending path out of an `ignore` error, if it carries one.
fn error_path(err: &ignore::Error) -> Option<PathBuf>
{
    match err
    {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } =>
        {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        ignore::Error::Partial(errs) => errs
            .iter()
            .find_map(error_path),
        _ => None,
    }
}
