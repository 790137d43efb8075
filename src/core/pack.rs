//! Filepath: src/core/pack.rs
//! Codebase-to-context packaging.
//!
//! Walks each source root in the order given, keeps files whose extension
//! is accepted, reads them as text and frames each one as a
//! `<file path="...">` block inside a `<codebase>` wrapper. Output is
//! byte-identical for an unchanged tree: roots keep their order, paths
//! within a root are sorted, nothing time-dependent is embedded.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::cli::{AppContext, PackArgs};
use crate::core::matcher::{self, DirExclusions, ExtensionSet};
use crate::core::report::{Tint, tint};
use crate::core::snapshot::Snapshot;
use crate::core::tags::{self, DOCUMENT_CLOSE, DOCUMENT_OPEN};
use crate::infra::config::{PipelineConfig, load_config};
use crate::infra::io::{NotTextReason, TextRead, format_kb, read_text};
use crate::infra::utils::copy_to_clipboard;
use crate::infra::walk::FileWalker;

/// Fatal packaging errors. Per-file problems are warnings instead.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("source root {0} does not exist")]
    RootMissing(PathBuf),

    #[error("source root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("extension list is empty")]
    EmptyExtensions,

    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(#[from] globset::Error),
}

/// A directory to package plus the extensions accepted under it.
#[derive(Debug, Clone)]
pub struct SourceRoot {
    pub path: PathBuf,
    pub extensions: ExtensionSet,
}

impl SourceRoot {
    pub fn new(path: impl Into<PathBuf>, extensions: ExtensionSet) -> Self {
        Self { path: path.into(), extensions }
    }

    fn validate(&self) -> Result<(), PackError> {
        if !self.path.exists() {
            return Err(PackError::RootMissing(self.path.clone()));
        }
        if !self.path.is_dir() {
            return Err(PackError::NotADirectory(self.path.clone()));
        }
        Ok(())
    }
}

/// Walk controls shared by every root in one packaging run.
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub exclusions: DirExclusions,
    pub ignore_patterns: Vec<String>,
    pub respect_gitignore: bool,
    pub include_hidden: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            exclusions: DirExclusions::default(),
            ignore_patterns: Vec::new(),
            respect_gitignore: false,
            include_hidden: true,
        }
    }
}

impl PackOptions {
    pub(crate) fn walker(&self) -> Result<FileWalker, PackError> {
        Ok(FileWalker::new(self.exclusions.clone(), &self.ignore_patterns)?
            .with_gitignore(self.respect_gitignore)
            .with_include_hidden(self.include_hidden))
    }
}

/// One packaged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    /// Index into the roots slice this file came from
    pub root: usize,
    /// Root-relative path with `/` separators
    pub path: String,
    pub content: String,
}

/// The serialized codebase. Immutable once built.
#[derive(Debug, Clone)]
pub struct ContextDocument {
    entries: Vec<ContextEntry>,
    text: String,
}

impl ContextDocument {
    fn build(entries: Vec<ContextEntry>) -> Self {
        let body: usize = entries
            .iter()
            .map(|e| e.path.len() + e.content.len() + 32)
            .sum();
        let mut text = String::with_capacity(body + DOCUMENT_OPEN.len() + DOCUMENT_CLOSE.len());

        text.push_str(DOCUMENT_OPEN);
        for e in &entries {
            tags::render_block(&mut text, &e.path, &e.content);
        }
        text.push_str(DOCUMENT_CLOSE);

        Self { entries, text }
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Something packaging skipped without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackWarning {
    Unreadable { path: PathBuf, reason: String },
    NotText { path: PathBuf, reason: NotTextReason },
    NonUtf8Path { path: PathBuf },
    DuplicatePath { path: String, root: PathBuf },
}

impl std::fmt::Display for PackWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackWarning::Unreadable { path, reason } => {
                write!(f, "{}: unreadable ({reason})", path.display())
            }
            PackWarning::NotText { path, reason } => {
                write!(f, "{}: skipped ({reason})", path.display())
            }
            PackWarning::NonUtf8Path { path } => {
                write!(f, "{}: skipped (path is not valid UTF-8)", path.display())
            }
            PackWarning::DuplicatePath { path, root } => write!(
                f,
                "{path}: already packaged from an earlier root, skipped copy in {}",
                root.display()
            ),
        }
    }
}

/// Result of a packaging run.
#[derive(Debug)]
pub struct Packed {
    pub document: ContextDocument,
    pub warnings: Vec<PackWarning>,
}

/// Root-relative path as a `/`-joined string, or None if any component is
/// not UTF-8.
pub(crate) fn slash_path(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(os) => parts.push(os.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Package `roots` into one context document.
///
/// Every root is validated before anything is read, so a missing root
/// never yields a partial document.
#[instrument(skip_all, fields(roots = roots.len()))]
pub fn package(roots: &[SourceRoot], opts: &PackOptions) -> Result<Packed, PackError> {
    for root in roots {
        root.validate()?;
    }

    let walker = opts.walker()?;
    let mut warnings = Vec::new();
    let mut owned: IndexMap<String, ContextEntry> = IndexMap::new();

    for (idx, root) in roots.iter().enumerate() {
        let outcome = walker.walk_with_filter(&root.path, |p| matcher::accepts(p, &root.extensions));

        warnings.extend(outcome.skipped.into_iter().map(|s| PackWarning::Unreadable {
            path: s.path,
            reason: s.reason,
        }));

        // Lexicographic by the slash form, which is what ends up in the tag
        let mut candidates: Vec<(String, PathBuf)> = Vec::with_capacity(outcome.files.len());
        for rel in outcome.files {
            match slash_path(&rel) {
                Some(s) => candidates.push((s, rel)),
                None => warnings.push(PackWarning::NonUtf8Path { path: root.path.join(rel) }),
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        // Read in parallel; collect keeps candidate order
        let reads: Vec<(String, PathBuf, Result<TextRead>)> = candidates
            .into_par_iter()
            .map(|(slash, rel)| {
                let abs = root.path.join(&rel);
                let read = read_text(&abs);
                (slash, abs, read)
            })
            .collect();

        for (slash, abs, read) in reads {
            match read {
                Ok(TextRead::Text(content)) => {
                    if owned.contains_key(&slash) {
                        debug!(path = %slash, "duplicate path across roots");
                        warnings.push(PackWarning::DuplicatePath {
                            path: slash,
                            root: root.path.clone(),
                        });
                        continue;
                    }
                    debug!(path = %slash, bytes = content.len(), "packaged");
                    owned.insert(
                        slash.clone(),
                        ContextEntry { root: idx, path: slash, content },
                    );
                }
                Ok(TextRead::NotText(reason)) => {
                    debug!(path = %abs.display(), %reason, "skipping non-text file");
                    warnings.push(PackWarning::NotText { path: abs, reason });
                }
                Err(e) => {
                    debug!(path = %abs.display(), error = %e, "skipping unreadable file");
                    warnings.push(PackWarning::Unreadable {
                        path: abs,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
    }

    let document = ContextDocument::build(owned.into_values().collect());
    Ok(Packed { document, warnings })
}

/// Count tokens with the o200k_base encoding.
pub fn count_tokens(text: &str) -> Result<usize> {
    let bpe = tiktoken_rs::o200k_base().context("load o200k_base encoding")?;
    Ok(bpe
        .encode_with_special_tokens(text)
        .len())
}

/// Build the source roots for a run from CLI paths and the merged config.
pub fn roots_from(paths: &[PathBuf], cfg: &PipelineConfig) -> Vec<SourceRoot> {
    paths
        .iter()
        .map(|p| SourceRoot::new(p.clone(), cfg.extensions.clone()))
        .collect()
}

/// Print the loaded-files summary to stderr.
pub fn print_summary(packed: &Packed, ctx: &AppContext) {
    if ctx.quiet {
        return;
    }

    let files = packed.document.entries().len();
    if files == 0 {
        eprintln!("{}", tint("No matching files found.", Tint::Yellow, ctx));
    } else {
        eprintln!("Loaded {} files from codebase.", tint(&files.to_string(), Tint::Green, ctx));
    }
    eprintln!(
        "Codebase size: {}",
        tint(&format_kb(packed.document.len()), Tint::Green, ctx)
    );

    for w in &packed.warnings {
        eprintln!("  {} {}", tint("warning:", Tint::Yellow, ctx), w);
    }
}

/// Spinner shown while walking and reading.
pub(crate) fn spinner(ctx: &AppContext, msg: &'static str) -> ProgressBar {
    if ctx.quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// `relay pack`
pub fn run(args: PackArgs, ctx: &AppContext) -> Result<()> {
    let cfg = PipelineConfig::resolve(&load_config()?, &args.selection, None)?;
    let roots = roots_from(&args.roots, &cfg);

    if ctx.dry_run {
        if !ctx.quiet {
            println!("{}", tint("DRY RUN: Would package:", Tint::Yellow, ctx));
            for r in &roots {
                println!("  Root: {}", r.path.display());
            }
            println!(
                "  Extensions: {}",
                cfg.extensions.iter().collect::<Vec<_>>().join(",")
            );
        }
        return Ok(());
    }

    let pb = spinner(ctx, "Packaging codebase...");
    let packed = package(&roots, &cfg.pack);
    pb.finish_and_clear();
    let packed = packed?;

    print_summary(&packed, ctx);

    if args.count_tokens && !ctx.quiet {
        let n = count_tokens(packed.document.as_str())?;
        eprintln!("Estimated tokens (o200k_base): {}", tint(&n.to_string(), Tint::Green, ctx));
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, packed.document.as_str())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            if !ctx.quiet {
                eprintln!("{} Wrote context to {}", tint("✓", Tint::Green, ctx), path.display());
            }
        }
        None if !args.clipboard => print!("{}", packed.document.as_str()),
        None => {}
    }

    if args.clipboard {
        copy_to_clipboard(packed.document.as_str())?;
        if !ctx.quiet {
            eprintln!("{} Copied context to clipboard", tint("✓", Tint::Green, ctx));
        }
    }

    if let Some(snap_path) = &args.snapshot {
        let snapshot = Snapshot::capture(&roots, &cfg.pack)?;
        snapshot.save(snap_path)?;
        if !ctx.quiet {
            eprintln!("{} Saved snapshot to {}", tint("✓", Tint::Green, ctx), snap_path.display());
        }
    }

    Ok(())
}
