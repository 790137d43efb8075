//! Filepath: src/core/chat.rs
//! Conversation driver for `relay ask` and `relay chat`.
//!
//! A code turn is: prompt (context on the first turn only) -> model ->
//! raw artifact -> parse -> materialize -> transcript -> report. A general
//! turn prints the reply. The model is stateless from our side, so every
//! request carries the conversation so far.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::{AppContext, AskArgs, ChatArgs, SessionArgs};
use crate::core::exit::IncompleteWrite;
use crate::core::model::{CommandModel, ModelError, ModelRequest, ModelService};
use crate::core::pack::{package, print_summary, roots_from, spinner};
use crate::core::report::{self, Tint, tint};
use crate::core::split::{TurnOutcome, process_with_context};
use crate::core::transcript::{Role, Transcript, TranscriptEntry, render_conversation};
use crate::infra::config::{Config, ModelConfig, PipelineConfig, load_config};
use crate::infra::utils::expand_path;

/// Per-invocation conversation state.
pub struct Session<'a, M: ModelService> {
    model: &'a M,
    model_name: Option<String>,
    coder_prompt: Option<String>,
    general_prompt: Option<String>,
    /// Packaged codebase, sent with the next successful request only
    pending_context: Option<String>,
    history: Vec<TranscriptEntry>,
    transcript: Option<Transcript>,
}

impl<'a, M: ModelService> Session<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            model_name: None,
            coder_prompt: None,
            general_prompt: None,
            pending_context: None,
            history: Vec::new(),
            transcript: None,
        }
    }

    pub fn with_model_name(mut self, name: Option<String>) -> Self {
        self.model_name = name;
        self
    }

    pub fn with_system_prompts(mut self, coder: Option<String>, general: Option<String>) -> Self {
        self.coder_prompt = coder;
        self.general_prompt = general;
        self
    }

    pub fn with_context(mut self, document: Option<String>) -> Self {
        self.pending_context = document;
        self
    }

    /// Record into `transcript`, continuing after `history`.
    pub fn with_transcript(mut self, transcript: Transcript, history: Vec<TranscriptEntry>) -> Self {
        self.transcript = Some(transcript);
        self.history = history;
        self
    }

    pub fn history(&self) -> &[TranscriptEntry] {
        &self.history
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// One request. History is untouched until [`Self::commit`].
    fn exchange(&self, message: &str, system: Option<&str>) -> Result<(String, String), ModelError> {
        let user = match &self.pending_context {
            Some(doc) => format!("{doc}\n{message}"),
            None => message.to_string(),
        };
        let request = ModelRequest {
            model: self.model_name.clone(),
            system: system.map(str::to_string),
            prompt: format!("{}{}", render_conversation(&self.history), user),
        };
        let reply = self.model.complete(&request)?;
        Ok((user, reply))
    }

    fn commit(&mut self, user: String, reply: String) -> Result<()> {
        self.pending_context = None;
        for entry in [TranscriptEntry::now(Role::User, user), TranscriptEntry::now(Role::Assistant, reply)] {
            if let Some(t) = &self.transcript {
                t.append(&entry)?;
            }
            self.history.push(entry);
        }
        Ok(())
    }

    /// Ask a general question and return the reply.
    pub fn general_turn(&mut self, message: &str) -> Result<String> {
        let (user, reply) = self.exchange(message, self.general_prompt.as_deref())?;
        self.commit(user, reply.clone())?;
        Ok(reply)
    }

    /// Ask for code and write the reply's files via `process`.
    ///
    /// The exchange is recorded even when processing fails, so nothing
    /// the model said is lost.
    pub fn code_turn<P>(&mut self, instruction: &str, process: P) -> Result<TurnOutcome>
    where
        P: FnOnce(&str) -> Result<TurnOutcome>,
    {
        let (user, reply) = self.exchange(instruction, self.coder_prompt.as_deref())?;
        let outcome = process(&reply);
        self.commit(user, reply)?;
        outcome
    }
}

/// Pack `-s` roots, if any, for the first turn.
fn load_context(paths: &[PathBuf], pipeline: &PipelineConfig, ctx: &AppContext) -> Result<Option<String>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let roots = roots_from(paths, pipeline);
    let pb = spinner(ctx, "Packaging codebase...");
    let packed = package(&roots, &pipeline.pack);
    pb.finish_and_clear();
    let packed = packed?;
    print_summary(&packed, ctx);
    Ok(Some(packed.document.as_str().to_string()))
}

/// Open the transcript to write into: continue one, start one, or none.
fn open_transcript(cfg: &Config, args: &SessionArgs, ctx: &AppContext) -> Result<Option<(Transcript, Vec<TranscriptEntry>)>> {
    if args.no_transcript || ctx.dry_run {
        return Ok(None);
    }
    let dir = expand_path(&cfg.transcript_dir)?;
    match &args.session {
        Some(id) => {
            let t = Transcript::resolve(&dir, id)?;
            let history = t.load()?;
            info!(path = %t.path().display(), turns = history.len(), "continuing session");
            Ok(Some((t, history)))
        }
        None => Ok(Some((Transcript::create(&dir)?, Vec::new()))),
    }
}

fn build_session<'a>(
    cfg: &Config,
    pipeline: &PipelineConfig,
    model: &'a CommandModel,
    args: &SessionArgs,
    ctx: &AppContext,
) -> Result<Session<'a, CommandModel>> {
    let context = load_context(&args.sources, pipeline, ctx)?;
    let coder = ModelConfig::read_prompt(&cfg.model.coder_system_prompt)?;
    let general = ModelConfig::read_prompt(&cfg.model.general_system_prompt)?;

    let mut session = Session::new(model)
        .with_model_name(args.model.clone().or_else(|| cfg.model.name.clone()))
        .with_system_prompts(coder, general)
        .with_context(context);
    if let Some((t, history)) = open_transcript(cfg, args, ctx)? {
        session = session.with_transcript(t, history);
    }
    Ok(session)
}

fn code_turn(
    session: &mut Session<'_, CommandModel>,
    instruction: &str,
    pipeline: &PipelineConfig,
    ctx: &AppContext,
    json: bool,
) -> Result<TurnOutcome> {
    let pb = spinner(ctx, "Waiting for the model...");
    let outcome = session.code_turn(instruction, |reply| {
        pb.finish_and_clear();
        Ok(process_with_context(reply, &pipeline.output_dir, &pipeline.materialize, ctx)?)
    });
    pb.finish_and_clear();
    let outcome = outcome?;
    report::print(&outcome.report(ctx.dry_run), ctx, json)?;
    Ok(outcome)
}

fn general_turn(session: &mut Session<'_, CommandModel>, message: &str, ctx: &AppContext) -> Result<()> {
    let pb = spinner(ctx, "Waiting for the model...");
    let reply = session.general_turn(message);
    pb.finish_and_clear();
    let reply = reply?;
    println!("{}", reply.trim_end());
    Ok(())
}

/// `relay ask`
pub fn ask_run(args: AskArgs, ctx: &AppContext) -> Result<()> {
    let cfg = load_config()?;
    let pipeline = PipelineConfig::resolve(&cfg, &args.session.selection, Some(&args.output))?;
    let model = CommandModel::new(&cfg.model.command)?;
    let mut session = build_session(&cfg, &pipeline, &model, &args.session, ctx)?;

    if args.write {
        let outcome = code_turn(&mut session, &args.instruction, &pipeline, ctx, args.json)?;
        outcome.ensure_complete()?;
    } else {
        general_turn(&mut session, &args.instruction, ctx)?;
    }

    if let Some(t) = session.transcript() {
        if !ctx.quiet {
            eprintln!("Session saved to {}", t.path().display());
        }
    }
    Ok(())
}

/// One line of chat input.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Quit,
    Code(&'a str),
    General(&'a str),
    Empty,
}

pub fn parse_chat_line(line: &str) -> ChatCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    if line == "/q" {
        return ChatCommand::Quit;
    }
    if line == "/o" {
        return ChatCommand::Code("");
    }
    if let Some(rest) = line.strip_prefix("/o ") {
        return ChatCommand::Code(rest.trim());
    }
    ChatCommand::General(line)
}

/// `relay chat`
pub fn chat_run(args: ChatArgs, ctx: &AppContext) -> Result<()> {
    let cfg = load_config()?;
    let pipeline = PipelineConfig::resolve(&cfg, &args.session.selection, Some(&args.output))?;
    let model = CommandModel::new(&cfg.model.command)?;
    let mut session = build_session(&cfg, &pipeline, &model, &args.session, ctx)?;

    if !ctx.quiet {
        eprintln!("relay chat: '/q' quits, '/o <instructions>' writes code to {}", pipeline.output_dir.display());
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut unwritten = 0usize;
    let mut total = 0usize;

    loop {
        if !ctx.quiet {
            eprint!("> ");
            std::io::stderr().flush().ok();
        }
        let Some(line) = lines.next() else { break };
        let line = line.context("Failed to read from stdin")?;

        let result = match parse_chat_line(&line) {
            ChatCommand::Quit => break,
            ChatCommand::Empty => continue,
            ChatCommand::Code("") => {
                eprintln!("{} /o needs instructions", tint("error:", Tint::Red, ctx));
                continue;
            }
            ChatCommand::Code(instruction) => {
                code_turn(&mut session, instruction, &pipeline, ctx, false).map(|o| {
                    total += o.results.len();
                    if let Err(e) = o.ensure_complete() {
                        unwritten += e.unwritten;
                    }
                })
            }
            ChatCommand::General(message) => general_turn(&mut session, message, ctx),
        };

        if let Err(e) = result {
            // An interrupted model call ends the whole chat
            if e.chain().any(|c| matches!(c.downcast_ref::<ModelError>(), Some(ModelError::Interrupted))) {
                return Err(e);
            }
            debug!(error = %e, "turn failed");
            eprintln!("{} {e:#}", tint("error:", Tint::Red, ctx));
        }
    }

    if let Some(t) = session.transcript() {
        if !ctx.quiet {
            eprintln!("Session saved to {}", t.path().display());
        }
    }
    if unwritten > 0 {
        return Err(IncompleteWrite { unwritten, total }.into());
    }
    Ok(())
}
