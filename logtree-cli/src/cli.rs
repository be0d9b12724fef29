//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// logtree -- classify log lines against a hierarchical pattern tree.
///
/// Use `logtree <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logtree", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logtree.toml configuration file.
    ///
    /// When omitted, `logtree.toml` in the current directory is used if present,
    /// otherwise defaults plus environment overrides.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format for reports.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify log lines from a file or stdin.
    Classify(ClassifyArgs),

    /// Print the compiled pattern hierarchy.
    Tree(TreeArgs),

    /// Manage pattern files.
    Patterns(PatternsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Pattern source options shared by `classify` and `tree`.
#[derive(Args, Debug, Default)]
pub struct PatternOpts {
    /// Additional YAML pattern file or directory (repeatable).
    #[arg(short, long = "patterns")]
    pub patterns: Vec<PathBuf>,

    /// Additional grok-style fragment file (repeatable).
    #[arg(long = "fragments")]
    pub fragments: Vec<PathBuf>,

    /// Keep only these event types and their ancestors (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub only_types: Vec<String>,

    /// Do not load the built-in pattern set.
    #[arg(long)]
    pub no_builtins: bool,
}

// ---- classify ----

/// Classify input lines and hand each record to a sink.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Input file (default: stdin).
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub patterns: PatternOpts,

    /// Sink type (stdout, file, noop). Overrides `[output] sink`.
    #[arg(long)]
    pub sink: Option<String>,

    /// Target path for the file sink. Overrides `[output] path`.
    #[arg(long)]
    pub sink_path: Option<PathBuf>,

    /// Collect per-pattern stats and print them to stderr at the end.
    #[arg(long)]
    pub stats: bool,
}

// ---- tree ----

/// Print the compiled pattern tree.
#[derive(Args, Debug)]
pub struct TreeArgs {
    #[command(flatten)]
    pub patterns: PatternOpts,

    /// List field names next to each pattern.
    #[arg(long)]
    pub fields: bool,
}

// ---- patterns ----

/// Manage pattern files.
#[derive(Args, Debug)]
pub struct PatternsArgs {
    #[command(subcommand)]
    pub action: PatternsAction,
}

#[derive(Subcommand, Debug)]
pub enum PatternsAction {
    /// Parse and compile pattern files without classifying anything.
    Validate {
        /// YAML pattern files or directories.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

// ---- config ----

/// Manage logtree configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, patterns, output).
        #[arg(long)]
        section: Option<String>,
    },
}
