//! Filepath: src/core/materialize.rs
//! Turns parsed reply blocks into files under an output root.
//!
//! Per block, in reply order: reject unsafe paths, honour the overwrite
//! policy, create parents, write atomically. One failure never stops the
//! rest of the batch; every block gets exactly one result.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::reply::{ParsedFile, PathStatus};
use crate::core::tags::unescape_xml;
use crate::infra::fs::FsBackend;

/// Fixed name of the raw reply artifact inside the output root.
pub const RAW_ARTIFACT: &str = "concatenated_output.txt";

/// Write policy, resolved from config and flags before a turn starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeOptions {
    /// Replace files that already exist
    pub overwrite: bool,
    /// Unescape `&lt; &gt; &amp; &quot; &apos;` in content before writing
    pub unescape_xml: bool,
    /// Write every file directly under the root by its base name
    pub flatten: bool,
}

/// Errors that abort a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("output root {path} could not be created: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("output root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("could not save raw reply to {path}: {source}")]
    RawArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What happened to one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    Written { path: PathBuf },
    SkippedExists { path: PathBuf },
    SkippedInvalidPath { reason: String },
    FailedIo { path: PathBuf, error: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Written { .. } => "written",
            Outcome::SkippedExists { .. } => "skipped-exists",
            Outcome::SkippedInvalidPath { .. } => "skipped-invalid-path",
            Outcome::FailedIo { .. } => "failed-io",
        }
    }
}

/// Result for one block, in the same order as the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializationResult {
    /// Path as the reply asserted it
    pub asserted: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Index of an earlier block in the same reply with the same target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<usize>,
}

impl MaterializationResult {
    pub fn is_written(&self) -> bool {
        matches!(self.outcome, Outcome::Written { .. })
    }
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub written: usize,
    pub skipped_exists: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
}

impl Tally {
    pub fn of(results: &[MaterializationResult]) -> Self {
        let mut t = Self::default();
        for r in results {
            match r.outcome {
                Outcome::Written { .. } => t.written += 1,
                Outcome::SkippedExists { .. } => t.skipped_exists += 1,
                Outcome::SkippedInvalidPath { .. } => t.skipped_invalid += 1,
                Outcome::FailedIo { .. } => t.failed += 1,
            }
        }
        t
    }

    pub fn all_written(&self) -> bool {
        self.skipped_exists + self.skipped_invalid + self.failed == 0
    }
}

/// Create the output root if needed and return its canonical form.
pub fn prepare_output_root<F: FsBackend>(fs: &F, root: &Path) -> Result<PathBuf, MaterializeError> {
    let abs = std::path::absolute(root).map_err(|source| MaterializeError::CreateRoot {
        path: root.to_path_buf(),
        source,
    })?;

    if fs.exists(&abs) && !fs.is_dir(&abs) {
        return Err(MaterializeError::NotADirectory(abs));
    }
    fs.create_dir_all(&abs)
        .map_err(|source| MaterializeError::CreateRoot { path: abs.clone(), source })?;
    fs.canonicalize(&abs)
        .map_err(|source| MaterializeError::CreateRoot { path: abs, source })
}

/// Save the unparsed reply. Always replaces the previous artifact.
pub fn write_raw_artifact<F: FsBackend>(
    fs: &F,
    output_root: &Path,
    reply: &str,
) -> Result<PathBuf, MaterializeError> {
    let path = output_root.join(RAW_ARTIFACT);
    fs.write_atomic(&path, reply.as_bytes())
        .map_err(|source| MaterializeError::RawArtifact { path: path.clone(), source })?;
    debug!(path = %path.display(), bytes = reply.len(), "saved raw reply");
    Ok(path)
}

/// Resolve `rel` under the canonical root, following whatever part of it
/// already exists, and refuse anything that lands outside the root.
fn resolve_within<F: FsBackend>(fs: &F, root: &Path, rel: &str) -> Result<PathBuf, Outcome> {
    let joined = rel
        .split('/')
        .fold(root.to_path_buf(), |acc, seg| acc.join(seg));

    let Some(existing) = joined.ancestors().find(|a| fs.exists(a)) else {
        return Err(Outcome::FailedIo {
            path: joined.clone(),
            error: "no existing ancestor".to_string(),
        });
    };

    let canonical = fs.canonicalize(existing).map_err(|e| Outcome::FailedIo {
        path: joined.clone(),
        error: e.to_string(),
    })?;
    if !canonical.starts_with(root) {
        return Err(Outcome::SkippedInvalidPath {
            reason: format!("resolves outside the output root via {}", existing.display()),
        });
    }

    match joined.strip_prefix(existing) {
        Ok(rest) if rest.as_os_str().is_empty() => Ok(canonical),
        Ok(rest) => Ok(canonical.join(rest)),
        Err(_) => Ok(canonical),
    }
}

fn base_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

/// Write `files` under `output_root` (already canonical, see
/// [`prepare_output_root`]).
///
/// Two blocks with the same target: the later one wins and records the
/// earlier one's index in `duplicate_of`. A target first created by this
/// batch is not "existing" for the overwrite check.
#[instrument(skip_all, fields(files = files.len(), root = %output_root.display()))]
pub fn materialize<F: FsBackend>(
    fs: &F,
    files: &[ParsedFile],
    output_root: &Path,
    opts: &MaterializeOptions,
) -> Vec<MaterializationResult> {
    let mut seen: HashMap<PathBuf, usize> = HashMap::new();
    let mut written: HashSet<PathBuf> = HashSet::new();
    let mut results = Vec::with_capacity(files.len());

    for (idx, file) in files.iter().enumerate() {
        let mut duplicate_of = None;

        let outcome = match &file.status {
            PathStatus::Invalid(issue) => {
                debug!(path = %file.path, %issue, "rejecting block");
                Outcome::SkippedInvalidPath { reason: issue.to_string() }
            }
            PathStatus::Valid(rel) => {
                let rel = if opts.flatten { base_name(rel) } else { rel.as_str() };

                match resolve_within(fs, output_root, rel) {
                    Err(outcome) => outcome,
                    Ok(target) if target == output_root.join(RAW_ARTIFACT) => {
                        debug!(path = %file.path, "block targets the raw reply artifact");
                        Outcome::SkippedInvalidPath { reason: format!("{RAW_ARTIFACT} is reserved for the raw reply") }
                    }
                    Ok(target) => {
                        duplicate_of = seen.insert(target.clone(), idx);
                        write_one(fs, file, target, opts, &mut written)
                    }
                }
            }
        };

        debug!(path = %file.path, outcome = outcome.label(), "materialized");
        results.push(MaterializationResult {
            asserted: file.path.clone(),
            outcome,
            duplicate_of,
        });
    }

    results
}

fn write_one<F: FsBackend>(
    fs: &F,
    file: &ParsedFile,
    target: PathBuf,
    opts: &MaterializeOptions,
    written: &mut HashSet<PathBuf>,
) -> Outcome {
    if !opts.overwrite && fs.exists(&target) && !written.contains(&target) {
        return Outcome::SkippedExists { path: target };
    }

    if let Some(parent) = target.parent() {
        if let Err(e) = fs.create_dir_all(parent) {
            debug!(path = %target.display(), error = %e, "could not create parent directories");
            return Outcome::FailedIo { path: target, error: e.to_string() };
        }
    }

    let data = if opts.unescape_xml {
        unescape_xml(&file.content)
    } else {
        file.content.clone()
    };

    match fs.write_atomic(&target, data.as_bytes()) {
        Ok(()) => {
            written.insert(target.clone());
            Outcome::Written { path: target }
        }
        Err(e) => {
            debug!(path = %target.display(), error = %e, "write failed");
            Outcome::FailedIo { path: target, error: e.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reply::parse;
    use crate::infra::fs::{DryRunFs, MemoryFs, RealFs};

    fn run(fs: &MemoryFs, reply: &str, opts: MaterializeOptions) -> Vec<MaterializationResult> {
        let root = prepare_output_root(fs, Path::new("/out")).unwrap();
        materialize(fs, &parse(reply).files, &root, &opts)
    }

    #[test]
    fn test_writes_nested_files_in_reply_order() {
        let fs = MemoryFs::new();
        let results = run(
            &fs,
            "<file path=\"b.py\">\nB</file>\n<file path=\"pkg/a.py\">\nA</file>",
            MaterializeOptions::default(),
        );

        let asserted: Vec<_> = results.iter().map(|r| r.asserted.as_str()).collect();
        assert_eq!(asserted, vec!["b.py", "pkg/a.py"]);
        assert!(results.iter().all(|r| r.is_written()));
        assert_eq!(fs.read_string("/out/b.py").as_deref(), Some("B"));
        assert_eq!(fs.read_string("/out/pkg/a.py").as_deref(), Some("A"));
    }

    #[test]
    fn test_existing_file_respects_overwrite_flag() {
        let fs = MemoryFs::new().with_file("/out/a.py", "old");
        let reply = "<file path=\"a.py\">\nnew</file>";

        let results = run(&fs, reply, MaterializeOptions::default());
        assert_eq!(
            results[0].outcome,
            Outcome::SkippedExists { path: PathBuf::from("/out/a.py") }
        );
        assert_eq!(fs.read_string("/out/a.py").as_deref(), Some("old"));

        let opts = MaterializeOptions { overwrite: true, ..Default::default() };
        let results = run(&fs, reply, opts);
        assert!(results[0].is_written());
        assert_eq!(fs.read_string("/out/a.py").as_deref(), Some("new"));
    }

    #[test]
    fn test_escaping_paths_never_written() {
        let fs = MemoryFs::new().with_dir("/etc");
        let results = run(
            &fs,
            "<file path=\"../../etc/passwd\">\nroot</file><file path=\"/abs.txt\">\nx</file>",
            MaterializeOptions { overwrite: true, ..Default::default() },
        );

        assert!(results
            .iter()
            .all(|r| matches!(r.outcome, Outcome::SkippedInvalidPath { .. })));
        assert_eq!(fs.file_paths(), Vec::<PathBuf>::new());
    }

    #[test]
    fn test_io_failure_does_not_stop_batch() {
        let fs = MemoryFs::new().fail_writes_to("/out/bad.py");
        let results = run(
            &fs,
            "<file path=\"bad.py\">\nx</file><file path=\"good.py\">\ny</file>",
            MaterializeOptions::default(),
        );

        assert!(matches!(results[0].outcome, Outcome::FailedIo { .. }));
        assert!(results[1].is_written());
        assert!(fs.read("/out/bad.py").is_none());

        let tally = Tally::of(&results);
        assert_eq!(tally.failed, 1);
        assert!(!tally.all_written());
    }

    #[test]
    fn test_duplicate_target_last_wins() {
        let fs = MemoryFs::new();
        let results = run(
            &fs,
            "<file path=\"a.py\">\none</file><file path=\"./a.py\">\ntwo</file>",
            MaterializeOptions::default(),
        );

        assert!(results[0].is_written());
        assert!(results[1].is_written());
        assert_eq!(results[1].duplicate_of, Some(0));
        assert_eq!(fs.read_string("/out/a.py").as_deref(), Some("two"));
    }

    #[test]
    fn test_directory_in_the_way_is_io_failure() {
        let fs = MemoryFs::new().with_dir("/out/a.py");
        let results = run(
            &fs,
            "<file path=\"a.py\">\nx</file>",
            MaterializeOptions { overwrite: true, ..Default::default() },
        );
        assert!(matches!(results[0].outcome, Outcome::FailedIo { .. }));
    }

    #[test]
    fn test_flatten_and_unescape() {
        let fs = MemoryFs::new();
        let opts = MaterializeOptions { flatten: true, unescape_xml: true, ..Default::default() };
        let results = run(&fs, "<file path=\"deep/dir/x.html\">\n&lt;p&gt;</file>", opts);

        assert_eq!(results[0].outcome, Outcome::Written { path: PathBuf::from("/out/x.html") });
        assert_eq!(fs.read_string("/out/x.html").as_deref(), Some("<p>"));
    }

    #[test]
    fn test_root_that_is_a_file_is_fatal() {
        let fs = MemoryFs::new().with_file("/out", "not a dir");
        let err = prepare_output_root(&fs, Path::new("/out")).unwrap_err();
        assert!(matches!(err, MaterializeError::NotADirectory(_)));
    }

    #[test]
    fn test_raw_artifact_always_replaced() {
        let fs = MemoryFs::new().with_file("/out/concatenated_output.txt", "previous");
        let root = prepare_output_root(&fs, Path::new("/out")).unwrap();

        let path = write_raw_artifact(&fs, &root, "no blocks at all").unwrap();
        assert_eq!(path, PathBuf::from("/out/concatenated_output.txt"));
        assert_eq!(fs.read_string(&path).as_deref(), Some("no blocks at all"));
    }

    #[test]
    fn test_block_cannot_replace_raw_artifact() {
        let reply = "Intro.\n<file path=\"concatenated_output.txt\">\nx</file>\n\
                     <file path=\"deep/dir/concatenated_output.txt\">\ny</file>\nbye";

        for opts in [
            MaterializeOptions { overwrite: true, ..Default::default() },
            MaterializeOptions { flatten: true, ..Default::default() },
        ] {
            let fs = MemoryFs::new();
            let root = prepare_output_root(&fs, Path::new("/out")).unwrap();
            let raw = write_raw_artifact(&fs, &root, reply).unwrap();
            let results = materialize(&fs, &parse(reply).files, &root, &opts);

            assert!(matches!(results[0].outcome, Outcome::SkippedInvalidPath { .. }));
            assert_eq!(fs.read_string(&raw).as_deref(), Some(reply));
            if opts.flatten {
                assert!(matches!(results[1].outcome, Outcome::SkippedInvalidPath { .. }));
            } else {
                assert!(results[1].is_written());
                assert_eq!(fs.read_string("/out/deep/dir/concatenated_output.txt").as_deref(), Some("y"));
            }
        }
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let mem = MemoryFs::new().with_file("/out/keep.py", "k");
        let dry = DryRunFs::new(&mem);
        let root = prepare_output_root(&dry, Path::new("/out")).unwrap();
        let parsed = parse("<file path=\"keep.py\">\nx</file><file path=\"new/n.py\">\ny</file>");

        let results = materialize(&dry, &parsed.files, &root, &MaterializeOptions::default());
        assert!(matches!(results[0].outcome, Outcome::SkippedExists { .. }));
        assert!(results[1].is_written());
        assert!(mem.read("/out/new/n.py").is_none());
        assert_eq!(dry.planned_writes(), vec![PathBuf::from("/out/new/n.py")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_is_rejected() {
        let outside = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), out.path().join("link")).unwrap();

        let root = prepare_output_root(&RealFs, out.path()).unwrap();
        let parsed = parse("<file path=\"link/evil.py\">\nx</file>");
        let results = materialize(&RealFs, &parsed.files, &root, &MaterializeOptions::default());

        assert!(matches!(results[0].outcome, Outcome::SkippedInvalidPath { .. }));
        assert!(!outside.path().join("evil.py").exists());
    }
}
