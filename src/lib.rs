//! **coderelay** - Pack a codebase into LLM context, split replies back into files
//!
//! The packaging side walks source roots and frames every selected file in a
//! `<file path="...">` block; the reply side scans model output for the same
//! blocks and writes them safely under an output directory.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core pipeline - selection, packaging, reply scanning, materialization
pub mod core {
    /// Extension allow-list and directory pruning rules
    pub mod matcher;
    pub use matcher::{DirExclusions, ExtensionSet, accepts};

    /// Shared wire format: block framing and XML escaping
    pub mod tags;

    /// Codebase-to-context packaging
    pub mod pack;
    pub use pack::{ContextDocument, PackError, SourceRoot, package, run as pack_run};

    /// Three-state reply scanner
    pub mod reply;
    pub use reply::{ParsedFile, ParsedReply, UnattributedFragment, check_run, parse};

    /// Conflict policy and atomic writes for parsed files
    pub mod materialize;
    pub use materialize::{MaterializationResult, MaterializeOptions, Outcome, materialize};

    /// Reply processing shared by split and code turns
    pub mod split;
    pub use split::{process_reply, run as split_run};

    /// Per-file report rendering
    pub mod report;

    /// Model adapter trait and the command-backed implementation
    pub mod model;
    pub use model::{CommandModel, ModelError, ModelService};

    /// JSONL session transcripts
    pub mod transcript;

    /// ask / chat turn driver
    pub mod chat;
    pub use chat::{ask_run, chat_run};

    /// Snapshot-based change detection
    pub mod snapshot;
    pub use snapshot::run as changes_run;

    /// Error-to-exit-code mapping
    pub mod exit;
}

/// Infrastructure - Configuration, I/O, and utilities
pub mod infra {
    /// Layered configuration (file + RELAY_ env) and the merged pipeline config
    pub mod config;
    pub use config::{Config, PipelineConfig, init as config_init, load_config};

    /// Filesystem capability trait with real, in-memory and dry-run backends
    pub mod fs;
    pub use fs::{DryRunFs, FsBackend, MemoryFs, RealFs};

    /// Text reads with memory mapping for large files
    pub mod io;

    /// Directory walking with exclusions and ignore globs
    pub mod walk;
    pub use walk::FileWalker;

    /// tracing-subscriber setup
    pub mod logging;

    /// Path expansion, clipboard and reply input helpers
    pub mod utils;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, FileWalker, load_config};
