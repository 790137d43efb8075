use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "relay")]
#[command(
    about = "Pack a codebase into LLM context and split the model's reply back into files"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress spinners and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging on stderr (RELAY_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package source roots into one tagged context document
    Pack(PackArgs),

    /// Split a model reply into files under the output directory
    Split(SplitArgs),

    /// Parse a reply and show its file blocks without writing
    Check(CheckArgs),

    /// Send one instruction to the model
    Ask(AskArgs),

    /// Interactive session: '/q' quits, '/o <instructions>' writes code
    Chat(ChatArgs),

    /// Show files added, deleted or updated since a snapshot
    Changes(ChangesArgs),

    /// Initialize a relay.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Which files under the roots are packaged.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Accepted extensions, comma separated (e.g. py,rs,md)
    #[arg(short, long)]
    pub extensions: Option<String>,

    /// Extra glob to ignore, relative to each root (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Honor .gitignore files
    #[arg(long)]
    pub gitignore: bool,

    /// Skip hidden files and directories
    #[arg(long)]
    pub no_hidden: bool,
}

/// Where and how reply files are written.
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output directory (defaults to config output_dir)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,

    /// Unescape XML entities in file content before writing
    #[arg(long)]
    pub unescape_xml: bool,

    /// Write every file directly in the output directory by base name
    #[arg(long)]
    pub flatten: bool,
}

/// Where a reply is read from.
#[derive(Args, Debug, Clone, Default)]
pub struct ReplyInputArgs {
    /// File holding the reply ('-' for stdin)
    pub reply: Option<PathBuf>,

    /// Read the reply from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Read the reply from the clipboard
    #[arg(long)]
    pub from_clipboard: bool,
}

#[derive(Parser)]
pub struct PackArgs {
    /// Source roots, packaged in the order given
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Copy the document to the clipboard
    #[arg(long)]
    pub clipboard: bool,

    /// Print an o200k_base token estimate
    #[arg(long)]
    pub count_tokens: bool,

    /// Also save a change-detection snapshot to this file
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

#[derive(Parser)]
pub struct SplitArgs {
    #[command(flatten)]
    pub input: ReplyInputArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: ReplyInputArgs,

    /// Print the parse result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Options shared by model-backed commands.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Codebase to send as context (repeatable; sent once, on the first turn)
    #[arg(short = 's', long = "source", value_name = "DIR")]
    pub sources: Vec<PathBuf>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Continue a saved session (timestamp prefix or 'last')
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Model name passed to the model command
    #[arg(short, long)]
    pub model: Option<String>,

    /// Do not record a session transcript
    #[arg(long)]
    pub no_transcript: bool,
}

#[derive(Parser)]
pub struct AskArgs {
    /// What to ask
    pub instruction: String,

    /// Treat the reply as code output and write its files
    #[arg(short, long)]
    pub write: bool,

    /// Print the file report as JSON (with --write)
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub session: SessionArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser)]
pub struct ChatArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser)]
pub struct ChangesArgs {
    /// Source roots, in the same order as when the snapshot was taken
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Snapshot saved by `pack --snapshot`
    #[arg(long, value_name = "PATH")]
    pub snapshot: PathBuf,

    /// Print changes as JSON
    #[arg(long)]
    pub json: bool,

    /// Replace the snapshot with the current state afterwards
    #[arg(long)]
    pub update: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,

    /// Write `relay.<ext>` into this directory instead of stdout
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}
