use std::fs;
use std::path::Path;

use crate::cli::commands::{BoundaryArg, InitArgs};
use crate::io::config_io;
use crate::io::job_io::{self, DATA_DIR};
use crate::model::config::BoundaryPolicy;

const CONFIG_TEMPLATE: &str = r##"[workspace]
name = "{name}"

[hierarchy]
# expand every parent the first time a job is listed
auto_expand = true
# show visible subtasks of hidden parents at the root instead of hiding them
promote_orphans = false
hide_statuses = ["cancelled"]

[drop]
# "sibling": a drop between a parent and its first child lands next to the parent
# "first_child": the same drop lands as the parent's first child
boundary = "sibling"

[sync]
# re-read positions after each reorder and report drift
verify_positions = false
timeout_ms = 10000

# --- Jobs ---
# Add jobs with: jt job add <id> "name" [--from tasks.json]
"##;

/// Infer a workspace name from a directory name: hyphens to spaces, title-case
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + chars.as_str()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_config(name: &str, boundary: BoundaryPolicy) -> Result<String, toml_edit::TomlError> {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    let mut doc: toml_edit::DocumentMut = CONFIG_TEMPLATE.replace("{name}", &escaped).parse()?;
    if boundary != BoundaryPolicy::default() {
        config_io::set_boundary_policy(&mut doc, boundary);
    }
    Ok(doc.to_string())
}

pub fn cmd_init(args: InitArgs, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = dir.join(DATA_DIR);

    if data_dir.join("config.toml").exists() && !args.force {
        return Err(format!("workspace already exists in ./{}/", DATA_DIR).into());
    }

    if let Some(parent) = dir.parent()
        && let Ok(parent_root) = job_io::discover_workspace(parent)
    {
        eprintln!("Note: parent workspace found at {}/", parent_root.display());
        eprintln!("Creating new workspace in ./{}/", DATA_DIR);
    }

    let name = args.name.unwrap_or_else(|| {
        dir.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .unwrap_or_else(|| "Untitled".to_string())
    });
    let boundary = match args.boundary {
        BoundaryArg::Sibling => BoundaryPolicy::Sibling,
        BoundaryArg::FirstChild => BoundaryPolicy::FirstChild,
    };

    fs::create_dir_all(data_dir.join("jobs"))?;
    fs::write(data_dir.join("config.toml"), render_config(&name, boundary)?)?;

    println!("Initialized workspace: {}", name);
    Ok(())
}
