//! Codebase snapshots for change detection between packaging runs.
//!
//! A snapshot records, per source root, every selected file with its
//! modification time and an xxh64 content hash. `changes` re-walks the
//! roots with the same selection rules and reports what was added,
//! deleted or updated since.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::{AppContext, ChangesArgs};
use crate::core::matcher;
use crate::core::pack::{PackOptions, SourceRoot, roots_from, slash_path};
use crate::core::report::{Tint, tint};
use crate::infra::config::{PipelineConfig, load_config};
use crate::infra::fs::write_atomic;

/// Per-file stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    pub modified: u64, // secs since UNIX_EPOCH
    pub hash: String,  // xxh64 hex
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSnapshot {
    pub root: PathBuf,
    pub files: BTreeMap<String, FileStamp>,
    /// Entries the walk listed or hit but could not stamp: relative path
    /// (a directory when a whole subtree failed) to the reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unreadable: BTreeMap<String, String>,
}

impl RootSnapshot {
    /// `path` is itself unreadable or sits under an unreadable directory.
    fn is_unknown(&self, path: &str) -> bool {
        self.unreadable.keys().any(|u| {
            path == u || (path.starts_with(u.as_str()) && path.as_bytes().get(u.len()) == Some(&b'/'))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created: String, // RFC3339
    pub roots: Vec<RootSnapshot>,
}

/// Differences for one root. Each list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub root: PathBuf,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub updated: Vec<String>,
    /// Could not be read this time; never reported as deleted
    pub unreadable: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }
}

fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh64::xxh64(bytes, 0))
}

fn stamp(path: &Path) -> Result<FileStamp> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(FileStamp { modified, hash: content_hash(&bytes) })
}

/// Key for a path under `root`: the slash form when possible.
fn rel_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    slash_path(rel).unwrap_or_else(|| rel.to_string_lossy().into_owned())
}

fn capture_root<S>(root: &SourceRoot, opts: &PackOptions, stamp: S) -> Result<RootSnapshot>
where
    S: Fn(&Path) -> Result<FileStamp>,
{
    let walker = opts.walker()?;
    let outcome = walker.walk_with_filter(&root.path, |p| matcher::accepts(p, &root.extensions));

    let mut files = BTreeMap::new();
    let mut unreadable = BTreeMap::new();
    for entry in outcome.skipped {
        unreadable.insert(rel_key(&root.path, &entry.path), entry.reason);
    }
    for rel in outcome.files {
        let Some(key) = slash_path(&rel) else {
            unreadable.insert(rel_key(&root.path, &rel), "path is not valid UTF-8".to_string());
            continue;
        };
        match stamp(&root.path.join(&rel)) {
            Ok(s) => {
                files.insert(key, s);
            }
            Err(e) => {
                debug!(path = %key, error = %e, "could not stamp file");
                unreadable.insert(key, format!("{e:#}"));
            }
        }
    }
    Ok(RootSnapshot { root: root.path.clone(), files, unreadable })
}

impl Snapshot {
    pub fn capture(roots: &[SourceRoot], opts: &PackOptions) -> Result<Self> {
        Self::capture_with(roots, opts, stamp)
    }

    fn capture_with<S>(roots: &[SourceRoot], opts: &PackOptions, stamp: S) -> Result<Self>
    where
        S: Fn(&Path) -> Result<FileStamp>,
    {
        let roots = roots
            .iter()
            .map(|r| capture_root(r, opts, &stamp))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { created: chrono::Utc::now().to_rfc3339(), roots })
    }

    /// One line per entry that could not be stamped, for `warning:` output.
    pub fn warnings(&self) -> Vec<String> {
        self.roots
            .iter()
            .flat_map(|r| {
                r.unreadable
                    .iter()
                    .map(move |(path, reason)| format!("{}: unreadable ({reason})", r.root.join(path).display()))
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize snapshot")?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("write snapshot {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse snapshot {}", path.display()))
    }

    /// Compare against `current`, root by root. Both must list the same
    /// roots in the same order.
    pub fn diff(&self, current: &Snapshot) -> Result<Vec<ChangeSet>> {
        if self.roots.len() != current.roots.len()
            || self
                .roots
                .iter()
                .zip(&current.roots)
                .any(|(a, b)| a.root != b.root)
        {
            bail!("snapshot was taken for different source roots");
        }

        Ok(self
            .roots
            .iter()
            .zip(&current.roots)
            .map(|(old, new)| diff_root(old, new))
            .collect())
    }
}

fn diff_root(old: &RootSnapshot, new: &RootSnapshot) -> ChangeSet {
    let mut set = ChangeSet { root: new.root.clone(), ..Default::default() };

    for (path, stamp) in &new.files {
        match old.files.get(path) {
            None => set.added.push(path.clone()),
            Some(prev) if prev.hash != stamp.hash => set.updated.push(path.clone()),
            Some(_) => {}
        }
    }
    set.deleted = old
        .files
        .keys()
        .filter(|p| !new.files.contains_key(*p) && !new.is_unknown(p))
        .cloned()
        .collect();
    set.unreadable = new.unreadable.keys().cloned().collect();

    set
}

/// `relay changes`
pub fn run(args: ChangesArgs, ctx: &AppContext) -> Result<()> {
    let cfg = PipelineConfig::resolve(&load_config()?, &args.selection, None)?;
    let roots = roots_from(&args.roots, &cfg);

    let previous = Snapshot::load(&args.snapshot)?;
    let current = Snapshot::capture(&roots, &cfg.pack)?;
    let changes = previous.diff(&current)?;

    if !ctx.quiet {
        for w in current.warnings() {
            eprintln!("{} {w}", tint("warning:", Tint::Yellow, ctx));
        }
    }

    if args.json {
        println!("{}", serde_json::to_string(&changes)?);
    } else if !ctx.quiet {
        for set in &changes {
            println!("Codebase: {}", set.root.display());
            if set.is_empty() {
                println!("  no changes");
            }
            for p in &set.added {
                println!("  {} {}", tint("added", Tint::Green, ctx), p);
            }
            for p in &set.deleted {
                println!("  {} {}", tint("deleted", Tint::Red, ctx), p);
            }
            for p in &set.updated {
                println!("  {} {}", tint("updated", Tint::Yellow, ctx), p);
            }
        }
    }

    if args.update && !ctx.dry_run {
        current.save(&args.snapshot)?;
    }

    Ok(())
}
