mod init;
pub use init::cmd_init;

use std::fs;
use std::path::PathBuf;

use regex::Regex;
use serde::Deserialize;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::job_io::{self, FileAuthority};
use crate::io::lock::WorkspaceLock;
use crate::io::state::{self, ViewState};
use crate::model::config::JobConfig;
use crate::model::task::{Task, TaskSet, TaskStatus};
use crate::model::update::{
    Anchor, DropEvent, DropMode, DropZoneDescriptor, Edge, RelativePositionUpdate,
};
use crate::model::workspace::Workspace;
use crate::ops::hierarchy::{self, ExpansionState, FlatRow};
use crate::ops::keyboard::{self, KeyMove};
use crate::ops::positioning::{self, EngineError, Placement};
use crate::ops::{check, drag};
use crate::sync::diagnostics::{DiagnosticSink, JsonLinesSink, NullSink};
use crate::sync::reconcile::{Drift, Reconciler};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Global flags every handler needs
pub struct Context {
    /// Directory discovery starts from
    pub start: PathBuf,
    pub json: bool,
    pub events: bool,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let start = match &cli.workspace_dir {
        Some(dir) => fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };
    let ctx = Context {
        start,
        json: cli.json,
        events: cli.events,
    };

    match cli.command {
        Commands::Init(args) => cmd_init(args, &ctx.start),
        Commands::Job(cmd) => match cmd.action {
            JobAction::Add(args) => cmd_job_add(&ctx, args),
            JobAction::List => cmd_job_list(&ctx),
        },

        // Read commands
        Commands::List(args) => cmd_list(&ctx, args),
        Commands::Check(args) => cmd_check(&ctx, args),
        Commands::Expand(args) => cmd_expansion(&ctx, args, true),
        Commands::Collapse(args) => cmd_expansion(&ctx, args, false),

        // Reorder commands
        Commands::Drop(args) => cmd_drop(&ctx, args),
        Commands::Mv(args) => cmd_mv(&ctx, args),
        Commands::Up(args) => cmd_key(&ctx, args, KeyMove::Up),
        Commands::Down(args) => cmd_key(&ctx, args, KeyMove::Down),
        Commands::Indent(args) => cmd_key(&ctx, args, KeyMove::Indent),
        Commands::Outdent(args) => cmd_key(&ctx, args, KeyMove::Outdent),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_workspace(ctx: &Context) -> Result<Workspace, job_io::WorkspaceError> {
    let root = job_io::discover_workspace(&ctx.start)?;
    job_io::load_workspace(&root)
}

fn open_job(ctx: &Context, job_id: &str) -> Result<(Workspace, TaskSet), Box<dyn std::error::Error>> {
    let ws = load_workspace(ctx)?;
    let tasks = job_io::load_job(&ws, job_id)?;
    Ok((ws, tasks))
}

/// Load the job's expansion state, running the one-time auto-expand and
/// dropping ids that no longer exist. Persists only when something changed.
fn load_expansion(ws: &Workspace, tasks: &TaskSet) -> Result<ExpansionState, std::io::Error> {
    let mut view = state::read_view_state(&ws.data_dir);
    let expansion = view.job_mut(&tasks.job_id);
    let before = expansion.clone();
    if ws.config.hierarchy.auto_expand {
        expansion.auto_expand_once(tasks);
    }
    expansion.retain_existing(tasks);
    let result = expansion.clone();
    if result != before {
        state::write_view_state(&ws.data_dir, &view)?;
    }
    Ok(result)
}

fn save_expansion(ws: &Workspace, job_id: &str, expansion: ExpansionState) -> Result<(), std::io::Error> {
    let mut view: ViewState = state::read_view_state(&ws.data_dir);
    view.jobs.insert(job_id.to_string(), expansion);
    state::write_view_state(&ws.data_dir, &view)
}

fn hidden_by_config(ws: &Workspace, task: &Task) -> bool {
    ws.config.hierarchy.hide_statuses.contains(&task.status)
}

/// The rows a user sees, and drags over, for this job
fn visible_rows<'a>(ws: &Workspace, tasks: &'a TaskSet, expansion: &ExpansionState) -> Vec<FlatRow<'a>> {
    let tree = hierarchy::organize_with(
        tasks,
        |t| !hidden_by_config(ws, t),
        ws.config.hierarchy.promote_orphans,
    );
    hierarchy::flatten(&tree, expansion)
}

fn job_header(ws: &Workspace, job_id: &str) -> String {
    let name = ws.config.job(job_id).map(|j| j.name.as_str()).unwrap_or(job_id);
    format!("== {} ({}) ==", name, job_id)
}

fn validate_job_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("job id cannot be empty".to_string());
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!(
            "invalid job id \"{}\": use letters, digits, '-' or '_' (e.g. \"J-100\")",
            id
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job commands
// ---------------------------------------------------------------------------

/// A job import: either a bare task array or a whole job file
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Job(TaskSet),
    Tasks(Vec<Task>),
}

fn cmd_job_add(ctx: &Context, args: JobAddArgs) -> CmdResult {
    validate_job_id(&args.id)?;
    let mut ws = load_workspace(ctx)?;
    let _lock = WorkspaceLock::acquire_default(&ws.data_dir)?;

    if ws.config.job(&args.id).is_some() {
        return Err(format!("job already exists: {}", args.id).into());
    }

    let tasks = match &args.from {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("could not read {}: {}", path, e))?;
            let tasks = match serde_json::from_str::<ImportFile>(&text)
                .map_err(|e| format!("could not parse {}: {}", path, e))?
            {
                ImportFile::Job(set) => set.tasks.into_values().collect(),
                ImportFile::Tasks(tasks) => tasks,
            };
            TaskSet::try_new(args.id.clone(), tasks)
                .map_err(|id| format!("could not import {}: duplicate task id {}", path, id))?
        }
        None => TaskSet::new(args.id.clone(), Vec::new()),
    };

    let job = JobConfig {
        id: args.id.clone(),
        name: args.name.clone(),
        file: format!("jobs/{}.json", args.id),
    };
    let (_, mut doc) = config_io::read_config(&ws.data_dir)?;
    config_io::add_job_to_config(&mut doc, &job);
    ws.config.jobs.push(job);
    job_io::save_job(&ws, &tasks)?;
    config_io::write_config(&ws.data_dir, &doc)?;

    let result = check::check_tasks(&tasks);
    if !result.valid {
        eprintln!(
            "warning: imported tasks have {} problem(s); run `jt check {}`",
            result.errors.len(),
            args.id
        );
    }
    println!("{} ({} tasks)", args.id, tasks.len());
    Ok(())
}

fn cmd_job_list(ctx: &Context) -> CmdResult {
    let ws = load_workspace(ctx)?;
    if ctx.json {
        let jobs: Vec<JobInfoJson> = ws
            .config
            .jobs
            .iter()
            .map(|j| JobInfoJson {
                id: &j.id,
                name: &j.name,
                file: &j.file,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    for job in &ws.config.jobs {
        let count = job_io::load_job(&ws, &job.id)?.len();
        println!("  {} ({})  {} tasks", job.name, job.id, count);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(ctx: &Context, args: ListArgs) -> CmdResult {
    let (ws, tasks) = open_job(ctx, &args.job)?;
    let statuses: Vec<TaskStatus> = args
        .status
        .iter()
        .map(|s| parse_status(s))
        .collect::<Result<_, _>>()?;
    let pattern = match &args.pattern {
        Some(p) => Some(Regex::new(p).map_err(|e| format!("invalid --match regex: {}", e))?),
        None => None,
    };
    let filtered = !statuses.is_empty() || pattern.is_some();

    let expansion = load_expansion(&ws, &tasks)?;
    let tree = hierarchy::organize_with(
        &tasks,
        |t| {
            !hidden_by_config(&ws, t)
                && (statuses.is_empty() || statuses.contains(&t.status))
                && pattern.as_ref().is_none_or(|re| re.is_match(&t.title))
        },
        // a filtered listing keeps matching subtasks even when the parent is filtered out
        ws.config.hierarchy.promote_orphans || filtered,
    );
    let rows = if args.all {
        hierarchy::flatten_all(&tree)
    } else {
        hierarchy::flatten(&tree, &expansion)
    };

    if ctx.json {
        let out = ListJson {
            job: &tasks.job_id,
            rows: rows.iter().map(row_to_json).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for line in format_listing(&job_header(&ws, &args.job), &rows) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_check(ctx: &Context, args: JobRef) -> CmdResult {
    let (_ws, tasks) = open_job(ctx, &args.job)?;
    let result = check::check_tasks(&tasks);
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_check(&result) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_expansion(ctx: &Context, args: ExpansionArgs, expand: bool) -> CmdResult {
    let (ws, tasks) = open_job(ctx, &args.job)?;
    let mut expansion = load_expansion(&ws, &tasks)?;

    if args.all {
        if expand {
            for task in tasks.iter().filter(|t| tasks.has_children(&t.id)) {
                expansion.expand(&task.id);
            }
        } else {
            expansion.expanded.clear();
        }
    } else if args.ids.is_empty() {
        return Err("give task ids or --all".into());
    }

    for id in &args.ids {
        if !tasks.contains(id) {
            return Err(EngineError::UnknownTask(id.clone()).into());
        }
        if expand {
            expansion.expand(id);
        } else {
            expansion.collapse(id);
        }
    }
    save_expansion(&ws, &args.job, expansion)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reorder commands
// ---------------------------------------------------------------------------

fn read_drop_event(source: &str) -> Result<DropEvent, Box<dyn std::error::Error>> {
    let text = if source == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        fs::read_to_string(source).map_err(|e| format!("could not read {}: {}", source, e))?
    };
    Ok(serde_json::from_str(&text).map_err(|e| format!("invalid drop event: {}", e))?)
}

fn cmd_drop(ctx: &Context, args: DropArgs) -> CmdResult {
    let (ws, tasks) = open_job(ctx, &args.job)?;
    let event = match &args.event {
        Some(source) => read_drop_event(source)?,
        None => DropEvent {
            zone: args.target.clone().map(|target| DropZoneDescriptor {
                mode: match args.mode {
                    ModeArg::Reorder => DropMode::Reorder,
                    ModeArg::Nest => DropMode::Nest,
                },
                target_task_id: target,
                edge: args.edge.map(|e| match e {
                    EdgeArg::Above => Edge::Above,
                    EdgeArg::Below => Edge::Below,
                }),
            }),
            dragged_ids: args.ids.clone(),
            drop_index: args.index,
        },
    };

    let mut expansion = load_expansion(&ws, &tasks)?;
    let planned = {
        let rows = visible_rows(&ws, &tasks, &expansion);
        drag::plan_drop(&event, &rows, &tasks, ws.config.drop.boundary)?
    };
    let Some(updates) = planned else {
        if ctx.json {
            println!("{}", serde_json::json!({ "job": args.job, "applied": false }));
        } else {
            println!("drop cancelled: nothing to move");
        }
        return Ok(());
    };

    if args.dry_run {
        let outcome = positioning::apply(&tasks, &updates)?;
        return print_reorder(ctx, &outcome.tasks, &outcome.operations, &[], false);
    }

    let applied = run_reorder(ctx, &ws, tasks, updates)?;

    // keep nested tasks visible under their new parent
    if let Some(zone) = &event.zone
        && zone.mode == DropMode::Nest
        && expansion.expand(&zone.target_task_id)
    {
        expansion.retain_existing(&applied);
        save_expansion(&ws, &args.job, expansion)?;
    }
    Ok(())
}

fn cmd_mv(ctx: &Context, args: MvArgs) -> CmdResult {
    let (ws, tasks) = open_job(ctx, &args.job)?;
    let task = tasks
        .get(&args.id)
        .ok_or_else(|| EngineError::UnknownTask(args.id.clone()))?;

    let parent = if args.root {
        None
    } else if let Some(p) = &args.parent {
        Some(p.clone())
    } else {
        tasks.effective_parent(task).map(str::to_string)
    };
    let anchor = if let Some(after) = args.after {
        Anchor::AfterTaskId(after)
    } else if let Some(before) = args.before {
        Anchor::BeforeTaskId(before)
    } else if args.first {
        Anchor::First
    } else {
        Anchor::Last
    };

    let update = RelativePositionUpdate::new(&args.id, parent.as_deref(), anchor);
    run_reorder(ctx, &ws, tasks, vec![update])?;
    Ok(())
}

fn cmd_key(ctx: &Context, args: TaskRef, key_move: KeyMove) -> CmdResult {
    let (ws, tasks) = open_job(ctx, &args.job)?;
    if !tasks.contains(&args.id) {
        return Err(EngineError::UnknownTask(args.id).into());
    }
    let Some(update) = keyboard::plan(&tasks, &args.id, key_move) else {
        let verb = match key_move {
            KeyMove::Up => "move up",
            KeyMove::Down => "move down",
            KeyMove::Indent => "be indented",
            KeyMove::Outdent => "be outdented",
        };
        return Err(format!("{} cannot {} from here", args.id, verb).into());
    };
    run_reorder(ctx, &ws, tasks, vec![update])?;
    Ok(())
}

/// Predict, submit and report one reorder. Returns the resulting job.
fn run_reorder(
    ctx: &Context,
    ws: &Workspace,
    tasks: TaskSet,
    updates: Vec<RelativePositionUpdate>,
) -> Result<TaskSet, Box<dyn std::error::Error>> {
    for update in &updates {
        tracing::debug!(%update, "planned update");
    }
    let sink: Box<dyn DiagnosticSink> = if ctx.events {
        Box::new(JsonLinesSink::new(std::io::stderr()))
    } else {
        Box::new(NullSink)
    };
    let mut reconciler = Reconciler::new(FileAuthority::new(ws), sink, tasks, &ws.config.sync);
    let report = reconciler.submit(updates).map_err(|e| e.user_message())?;
    print_reorder(ctx, reconciler.tasks(), &report.operations, &report.drift, true)?;
    Ok(reconciler.into_tasks())
}

fn print_reorder(
    ctx: &Context,
    tasks: &TaskSet,
    operations: &[Placement],
    drift: &[Drift],
    applied: bool,
) -> CmdResult {
    if ctx.json {
        let out = ReorderJson {
            job: &tasks.job_id,
            applied,
            operations,
            drift,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    for placement in operations {
        println!("{}", format_placement(tasks, placement));
    }
    for d in drift {
        eprintln!("warning: {}", format_drift(d));
    }
    Ok(())
}
