//! `relay completions`: shell scripts generated from the clap tree.

use std::io;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{generate, generate_to};

use crate::cli::{AppContext, Cli, CompletionsArgs};

pub const BIN_NAME: &str = "relay";

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    let mut cmd = Cli::command();

    let Some(dir) = args.out_dir else {
        generate(args.shell, &mut cmd, BIN_NAME, &mut io::stdout());
        return Ok(());
    };

    if ctx.dry_run {
        if !ctx.quiet {
            eprintln!("DRY RUN: {} completions for {BIN_NAME} would go to {}", args.shell, dir.display());
        }
        return Ok(());
    }

    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let written = generate_to(args.shell, &mut cmd, BIN_NAME, &dir)
        .with_context(|| format!("write {} completions", args.shell))?;
    if !ctx.quiet {
        eprintln!("Completions written to {}", written.display());
    }
    Ok(())
}
