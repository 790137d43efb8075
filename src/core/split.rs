//! Filepath: src/core/split.rs
//! Reply-to-files pipeline shared by `relay split` and code turns:
//! save the raw reply, scan it, materialize the blocks.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, instrument};

use crate::cli::{AppContext, SelectionArgs, SplitArgs};
use crate::core::exit::IncompleteWrite;
use crate::core::materialize::{
    MaterializationResult, MaterializeError, MaterializeOptions, Tally, materialize,
    prepare_output_root, write_raw_artifact,
};
use crate::core::reply::{ParsedReply, parse};
use crate::core::report::{self, TurnReport};
use crate::infra::config::{PipelineConfig, load_config};
use crate::infra::fs::{DryRunFs, FsBackend, RealFs};
use crate::infra::utils::read_input;

/// Everything one processed reply produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub output_root: PathBuf,
    pub raw_artifact: PathBuf,
    pub parsed: ParsedReply,
    pub results: Vec<MaterializationResult>,
}

impl TurnOutcome {
    pub fn report(&self, dry_run: bool) -> TurnReport<'_> {
        TurnReport::new(&self.output_root, &self.raw_artifact, &self.parsed, &self.results, dry_run)
    }

    /// Err when any block was skipped or failed.
    pub fn ensure_complete(&self) -> Result<(), IncompleteWrite> {
        let tally = Tally::of(&self.results);
        if tally.all_written() {
            Ok(())
        } else {
            Err(IncompleteWrite {
                unwritten: self.results.len() - tally.written,
                total: self.results.len(),
            })
        }
    }
}

/// Raw artifact first, then parse, then write. Only the output root and
/// the raw artifact can fail the whole call.
#[instrument(skip_all, fields(bytes = reply.len()))]
pub fn process_reply<F: FsBackend>(
    fs: &F,
    reply: &str,
    output_dir: &Path,
    opts: &MaterializeOptions,
) -> Result<TurnOutcome, MaterializeError> {
    let output_root = prepare_output_root(fs, output_dir)?;
    let raw_artifact = write_raw_artifact(fs, &output_root, reply)?;

    let parsed = parse(reply);
    let results = materialize(fs, &parsed.files, &output_root, opts);

    info!(
        files = parsed.files.len(),
        written = results.iter().filter(|r| r.is_written()).count(),
        "reply processed"
    );
    Ok(TurnOutcome { output_root, raw_artifact, parsed, results })
}

/// Same as [`process_reply`] against the real disk, or a recording
/// stand-in under `--dry-run`.
pub fn process_with_context(
    reply: &str,
    output_dir: &Path,
    opts: &MaterializeOptions,
    ctx: &AppContext,
) -> Result<TurnOutcome, MaterializeError> {
    let real = RealFs;
    if ctx.dry_run {
        process_reply(&DryRunFs::new(&real), reply, output_dir, opts)
    } else {
        process_reply(&real, reply, output_dir, opts)
    }
}

/// `relay split`
pub fn run(args: SplitArgs, ctx: &AppContext) -> Result<()> {
    let cfg = PipelineConfig::resolve(&load_config()?, &SelectionArgs::default(), Some(&args.output))?;
    let reply = read_input(args.input.reply.as_deref(), args.input.stdin, args.input.from_clipboard)?;

    let outcome = process_with_context(&reply, &cfg.output_dir, &cfg.materialize, ctx)?;
    report::print(&outcome.report(ctx.dry_run), ctx, args.json)?;
    outcome.ensure_complete()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::materialize::{Outcome, RAW_ARTIFACT};
    use crate::infra::fs::MemoryFs;

    #[test]
    fn raw_artifact_written_even_when_nothing_parses() {
        let fs = MemoryFs::new();
        let reply = "Sorry, I cannot help with that.";
        let outcome =
            process_reply(&fs, reply, Path::new("/out"), &MaterializeOptions::default()).unwrap();

        assert!(outcome.results.is_empty());
        assert!(outcome.parsed.is_ambiguous());
        assert_eq!(fs.read_string(format!("/out/{RAW_ARTIFACT}")).as_deref(), Some(reply));
        assert!(outcome.ensure_complete().is_ok());
    }

    #[test]
    fn incomplete_when_a_block_is_skipped() {
        let fs = MemoryFs::new().with_file("/out/a.py", "keep");
        let reply = "<file path=\"a.py\">\nnew</file>\n<file path=\"b.py\">\nb</file>\n";
        let outcome =
            process_reply(&fs, reply, Path::new("/out"), &MaterializeOptions::default()).unwrap();

        assert!(matches!(outcome.results[0].outcome, Outcome::SkippedExists { .. }));
        assert!(outcome.results[1].is_written());
        let err = outcome.ensure_complete().unwrap_err();
        assert_eq!((err.unwritten, err.total), (1, 2));
    }

    #[test]
    fn raw_artifact_keeps_full_reply_when_a_block_claims_its_name() {
        let fs = MemoryFs::new();
        let reply = "Intro prose.\n<file path=\"concatenated_output.txt\">\nx</file>\ntrailing prose";
        let opts = MaterializeOptions { overwrite: true, ..Default::default() };
        let outcome = process_reply(&fs, reply, Path::new("/out"), &opts).unwrap();

        assert!(matches!(outcome.results[0].outcome, Outcome::SkippedInvalidPath { .. }));
        assert_eq!(fs.read_string(format!("/out/{RAW_ARTIFACT}")).as_deref(), Some(reply));
        assert!(outcome.ensure_complete().is_err());
    }

    #[test]
    fn uncreatable_root_is_fatal() {
        let fs = MemoryFs::new().with_file("/out", "a file");
        let err = process_reply(&fs, "x", Path::new("/out/sub"), &MaterializeOptions::default())
            .unwrap_err();
        assert!(matches!(err, MaterializeError::CreateRoot { .. }));
    }
}
