use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "jt", about = concat!("jt v", env!("CARGO_PKG_VERSION"), " - reorder job task trees"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Print diagnostic events (drift, rollback) to stderr as JSON lines
    #[arg(long, global = true)]
    pub events: bool,

    /// Run against a different workspace directory
    #[arg(short = 'C', long = "workspace-dir", global = true)]
    pub workspace_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a workspace in the current directory
    Init(InitArgs),
    /// Job management
    Job(JobCmd),
    /// Show a job's task tree
    List(ListArgs),
    /// Expand tasks in the listing
    Expand(ExpansionArgs),
    /// Collapse tasks in the listing
    Collapse(ExpansionArgs),
    /// Apply a drag-and-drop onto the current listing
    Drop(DropArgs),
    /// Move a task next to another, or to either end of a scope
    Mv(MvArgs),
    /// Move a task above its previous sibling
    Up(TaskRef),
    /// Move a task below its next sibling
    Down(TaskRef),
    /// Make a task the last child of its previous sibling
    Indent(TaskRef),
    /// Move a task out of its parent, right after it
    Outdent(TaskRef),
    /// Validate position density and hierarchy of a job
    Check(JobRef),
}

// ---------------------------------------------------------------------------
// Workspace args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Workspace name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Drop boundary policy
    #[arg(long, value_enum, default_value_t = BoundaryArg::Sibling)]
    pub boundary: BoundaryArg,
    /// Reinitialize even if .jobtasks/ already exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BoundaryArg {
    Sibling,
    FirstChild,
}

#[derive(Args)]
pub struct JobCmd {
    #[command(subcommand)]
    pub action: JobAction,
}

#[derive(Subcommand)]
pub enum JobAction {
    /// Register a job in the workspace
    Add(JobAddArgs),
    /// List registered jobs
    List,
}

#[derive(Args)]
pub struct JobAddArgs {
    /// Job id
    pub id: String,
    /// Display name
    pub name: String,
    /// Import tasks from a JSON file (a task array or a full job file)
    #[arg(long)]
    pub from: Option<String>,
}

// ---------------------------------------------------------------------------
// Read args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct JobRef {
    /// Job id
    pub job: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Job id
    pub job: String,
    /// Ignore collapse state and show every task
    #[arg(long)]
    pub all: bool,
    /// Show only these statuses (repeatable)
    #[arg(long)]
    pub status: Vec<String>,
    /// Show only tasks whose title matches this regex
    #[arg(long = "match")]
    pub pattern: Option<String>,
}

#[derive(Args)]
pub struct ExpansionArgs {
    /// Job id
    pub job: String,
    /// Task ids
    pub ids: Vec<String>,
    /// Every task with children
    #[arg(long)]
    pub all: bool,
}

// ---------------------------------------------------------------------------
// Reorder args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TaskRef {
    /// Job id
    pub job: String,
    /// Task id
    pub id: String,
}

#[derive(Args)]
pub struct DropArgs {
    /// Job id
    pub job: String,
    /// Dragged task ids
    #[arg(required_unless_present = "event")]
    pub ids: Vec<String>,
    /// Row the pointer was released on
    #[arg(long, conflicts_with = "event")]
    pub target: Option<String>,
    /// Reorder between rows, or nest under the target
    #[arg(long, value_enum, default_value_t = ModeArg::Reorder)]
    pub mode: ModeArg,
    /// Which edge of the target row (reorder mode)
    #[arg(long, value_enum)]
    pub edge: Option<EdgeArg>,
    /// Explicit insertion index into the listing
    #[arg(long)]
    pub index: Option<usize>,
    /// Read a drop event as JSON from this file ("-" for stdin)
    #[arg(long)]
    pub event: Option<String>,
    /// Print the result without saving
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Reorder,
    Nest,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EdgeArg {
    Above,
    Below,
}

#[derive(Args)]
pub struct MvArgs {
    /// Job id
    pub job: String,
    /// Task id
    pub id: String,
    /// New parent (default: keep the current one)
    #[arg(long, conflicts_with = "root")]
    pub parent: Option<String>,
    /// Move to the root scope
    #[arg(long)]
    pub root: bool,
    /// Place right after this sibling
    #[arg(long, group = "anchor")]
    pub after: Option<String>,
    /// Place right before this sibling
    #[arg(long, group = "anchor")]
    pub before: Option<String>,
    /// Place first in the scope
    #[arg(long, group = "anchor")]
    pub first: bool,
    /// Place last in the scope
    #[arg(long, group = "anchor")]
    pub last: bool,
}
