use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::flatten::VisitPolicy;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "texweave")]
#[command(
    about = "Turn successive LaTeX revisions of a paper into one deduplicated content hierarchy"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log pipeline progress at info level (overridden by TEXWEAVE_LOG / RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build hierarchy.json for every paper under the input directory
    Process(ProcessArgs),

    /// Pick the root .tex file of one revision folder
    Root(RootArgs),

    /// Inline all \input / \include / \subfile targets of a document
    Flatten(FlattenArgs),

    /// Show the segmented node tree of one revision
    Tree(TreeArgs),

    /// Initialize a texweave.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct ProcessArgs {
    /// Directory holding <paper_id>/tex/<version>/ folders [default: from config]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory receiving <paper_id>/hierarchy.json [default: from config]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker threads for the paper pool (default: one per CPU)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Only process these paper ids (repeatable)
    #[arg(long = "paper", value_name = "PAPER_ID")]
    pub papers: Vec<String>,

    /// How re-included files are treated while flattening
    #[arg(long, value_enum)]
    pub visit_policy: Option<VisitPolicy>,
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Revision folder to search
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Print the scored candidate table
    #[arg(long)]
    pub explain: bool,
}

#[derive(Debug, Parser)]
pub struct FlattenArgs {
    /// Root .tex file, or a revision folder to resolve the root in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep \bibliography{..} and thebibliography environments
    #[arg(long)]
    pub keep_bibliography: bool,

    /// How re-included files are treated
    #[arg(long, value_enum)]
    pub visit_policy: Option<VisitPolicy>,

    /// Emit the full flatten result (file lists included) as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct TreeArgs {
    /// Root .tex file, or a revision folder to resolve the root in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Paper id used when minting node ids
    #[arg(long, default_value = "paper")]
    pub paper_id: String,

    /// Version label used when minting node ids
    #[arg(long, default_value = "v1")]
    pub version: String,

    /// Maximum depth to expand
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Print the tree as JSON
    #[arg(long, group = "format")]
    pub json: bool,

    /// Render the tree as Markdown
    #[arg(long, group = "format")]
    pub markdown: bool,

    /// Render the tree as a standalone HTML page
    #[arg(long, group = "format")]
    pub html: bool,

    /// Print cleaned LaTeX without comments or include markers
    #[arg(long, group = "format")]
    pub cleaned: bool,

    /// How re-included files are treated
    #[arg(long, value_enum)]
    pub visit_policy: Option<VisitPolicy>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; required unless --stdout is set
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
