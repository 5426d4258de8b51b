use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::storage::{CleanMode, StorageMode};

#[derive(Parser)]
#[command(
    name = "ripple",
    about = "Package dependency manager for .NET solutions",
    long_about = "Restore, validate and publish NuGet dependencies across one or more solutions.\n\nA solution is a directory holding a ripple.toml file. Commands operate on the\nsolution containing the current directory unless --solution or --all is given.",
    version,
    after_help = "For detailed command help, run: ripple <COMMAND> --help"
)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short = 'V', long, help = "Print version information")]
    pub version: bool,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which solutions a command applies to.
#[derive(Args, Clone, Debug, Default)]
pub struct SelectionArgs {
    #[arg(
        short = 's',
        long = "solution",
        value_name = "NAME",
        global = true,
        help = "Operate on this solution (repeatable)"
    )]
    pub solutions: Vec<String>,

    #[arg(long, global = true, help = "Operate on every solution in the workspace")]
    pub all: bool,

    #[arg(
        long,
        value_name = "DIR",
        global = true,
        help = "Use this package cache directory"
    )]
    pub cache: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        global = true,
        help = "Look for solutions here instead of around the current directory"
    )]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Fetch missing and outdated packages",
        long_about = "Fetch every declared package that is missing locally or older than declared.\n\nFloat dependencies take the newest version their constraint allows; fixed\ndependencies take the oldest. Packages already in the cache are not\ndownloaded again unless forced."
    )]
    Restore(RestoreArgs),

    #[command(about = "Check that every dependency is installed at a sufficient version")]
    Validate,

    #[command(about = "List declared dependencies with no local copy")]
    Missing,

    #[command(about = "Remove build output and/or installed packages")]
    Clean(CleanArgs),

    #[command(about = "Switch a solution to another storage layout")]
    Convert(ConvertArgs),

    #[command(
        about = "Show the order in which solutions must be published",
        long_about = "Show the order in which solutions must be published.\n\nA solution that consumes a package another selected solution publishes is\nordered after it. Cycles are reported as errors."
    )]
    Plan(PlanArgs),

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum, help = "Shell type to generate completions for")]
        shell: clap_complete::Shell,
    },

    #[command(about = "Print version information")]
    Version,
}

#[derive(Args)]
pub struct RestoreArgs {
    #[arg(short, long, help = "Re-fetch every package, even those already installed")]
    pub force: bool,

    #[arg(
        short,
        long = "nuget",
        value_name = "NAME",
        help = "Re-fetch this package (repeatable)"
    )]
    pub nugets: Vec<String>,
}

#[derive(Args)]
pub struct CleanArgs {
    #[arg(short, long, value_enum, default_value = "all", help = "What to remove")]
    pub mode: CleanTarget,
}

#[derive(Args)]
pub struct ConvertArgs {
    #[arg(short, long, value_enum, help = "The storage layout to convert to")]
    pub mode: StorageLayout,
}

#[derive(Args)]
pub struct PlanArgs {
    #[arg(short, long, value_enum, default_value = "text", help = "Output format (text, json)")]
    pub format: PlanOutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CleanTarget {
    #[value(help = "bin/ and obj/ folders of every project")]
    Projects,
    #[value(help = "The solution's package folder")]
    Packages,
    #[value(help = "Both")]
    All,
}

impl From<CleanTarget> for CleanMode {
    fn from(target: CleanTarget) -> Self {
        match target {
            CleanTarget::Projects => CleanMode::Projects,
            CleanTarget::Packages => CleanMode::Packages,
            CleanTarget::All => CleanMode::All,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StorageLayout {
    #[value(help = "One folder per package, ripple.dependencies.config per project")]
    Ripple,
    #[value(help = "Versioned package folders, packages.config per project")]
    Classic,
}

impl From<StorageLayout> for StorageMode {
    fn from(layout: StorageLayout) -> Self {
        match layout {
            StorageLayout::Ripple => StorageMode::Ripple,
            StorageLayout::Classic => StorageMode::Classic,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PlanOutputFormat {
    #[value(help = "Plain text output")]
    Text,
    #[value(help = "JSON output")]
    Json,
}
