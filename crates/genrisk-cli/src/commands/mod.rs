//! CLI command implementations.

pub mod inspect;
pub mod record;
pub mod runs;
pub mod validate;

use std::fmt::Write as _;

use anyhow::Result;
use genrisk_artifact::{record::format_timestamp, ColumnSpec, ModelRunRecord, RunStore};
use genrisk_config::Config;

pub(crate) fn open_store(config: &Config) -> RunStore {
    RunStore::new(&config.tracking.root, &config.tracking.experiment_id)
}

pub(crate) fn to_json(record: &ModelRunRecord) -> Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

/// Human-readable description of a record.
pub(crate) fn summary(record: &ModelRunRecord) -> String {
    let mut out = String::new();
    let created = record
        .utc_time_created
        .as_ref()
        .map(|ts| format!("{} UTC", format_timestamp(ts)))
        .unwrap_or_else(|| "unknown".to_string());

    let _ = writeln!(out, "run_id:        {}", record.run_id());
    let _ = writeln!(out, "artifact_path: {}", record.artifact_path);
    let _ = writeln!(out, "created:       {created}");

    let _ = writeln!(out, "flavors ({}):", record.flavors.len());
    for (name, flavor) in &record.flavors {
        let mut notes = Vec::new();
        if let Some(loader) = &flavor.loader_module {
            notes.push(loader.clone());
        }
        if let Some(v) = &flavor.library_version {
            notes.push(format!("{} {}", v.key, v.version));
        }
        let model = flavor.model_path.as_deref().unwrap_or("<no model path>");
        if notes.is_empty() {
            let _ = writeln!(out, "  {name:<18} {model}");
        } else {
            let _ = writeln!(out, "  {name:<18} {model}  ({})", notes.join(", "));
        }
    }

    match &record.signature {
        Some(signature) => {
            write_columns(&mut out, "inputs", &signature.inputs);
            match &signature.outputs {
                Some(outputs) => write_columns(&mut out, "outputs", outputs),
                None => {
                    let _ = writeln!(out, "outputs:       none");
                }
            }
        }
        None => {
            let _ = writeln!(out, "signature:     none");
        }
    }

    if let Some(info) = &record.saved_input_example_info {
        let shape = [info.pandas_orient.as_deref(), info.container_type.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "input example: {} ({shape})", info.artifact_path);
    }
    out
}

fn write_columns(out: &mut String, label: &str, columns: &[ColumnSpec]) {
    let _ = writeln!(out, "{label} ({}):", columns.len());
    let width = columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for column in columns {
        let optional = if column.is_optional() { "  optional" } else { "" };
        let _ = writeln!(out, "  {:<width$}  {}{optional}", column.name, column.column_type);
    }
}
