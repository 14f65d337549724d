use std::fs;
use std::path::Path;

use crate::io::job_io::WorkspaceError;
use crate::model::config::{BoundaryPolicy, JobConfig, WorkspaceConfig};

/// Read config.toml as both the parsed config and an editable document
pub fn read_config(
    data_dir: &Path,
) -> Result<(WorkspaceConfig, toml_edit::DocumentMut), WorkspaceError> {
    let config_path = data_dir.join("config.toml");
    let text = fs::read_to_string(&config_path).map_err(|e| WorkspaceError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: WorkspaceConfig = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok((config, doc))
}

/// Write the document back, keeping comments and layout
pub fn write_config(data_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), WorkspaceError> {
    let config_path = data_dir.join("config.toml");
    crate::io::job_io::atomic_write(&config_path, doc.to_string().as_bytes()).map_err(|e| {
        WorkspaceError::WriteError {
            path: config_path,
            source: e,
        }
    })
}

pub fn add_job_to_config(doc: &mut toml_edit::DocumentMut, job: &JobConfig) {
    if !doc.contains_key("jobs") {
        doc["jobs"] = toml_edit::Item::ArrayOfTables(toml_edit::ArrayOfTables::new());
    }

    if let Some(jobs) = doc["jobs"].as_array_of_tables_mut() {
        let mut table = toml_edit::Table::new();
        table["id"] = toml_edit::value(&job.id);
        table["name"] = toml_edit::value(&job.name);
        table["file"] = toml_edit::value(&job.file);
        jobs.push(table);
    }
}

pub fn set_boundary_policy(doc: &mut toml_edit::DocumentMut, policy: BoundaryPolicy) {
    if !doc.contains_key("drop") {
        doc["drop"] = toml_edit::table();
    }
    let name = match policy {
        BoundaryPolicy::Sibling => "sibling",
        BoundaryPolicy::FirstChild => "first_child",
    };
    doc["drop"]["boundary"] = toml_edit::value(name);
}
