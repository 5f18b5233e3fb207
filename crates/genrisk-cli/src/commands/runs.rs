//! Runs commands - browse the run store.

use anyhow::Result;
use genrisk_artifact::record::format_timestamp;
use genrisk_config::Config;
use tracing::info;

use super::open_store;

pub fn list(config: &Config) -> Result<()> {
    let store = open_store(config);
    let runs = store.list()?;
    if runs.is_empty() {
        info!(dir = %store.experiment_dir().display(), "No runs recorded");
        return Ok(());
    }
    for run in &runs {
        let record = &run.record;
        let created = record
            .utc_time_created
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        let inputs = record.signature.as_ref().map_or(0, |s| s.inputs.len());
        println!(
            "{created:<26}  {}  {:<12}  {inputs} inputs",
            record.run_id(),
            record.artifact_path
        );
    }
    Ok(())
}

pub fn latest(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config);
    match store.latest()? {
        Some(run) if json => println!("{}", super::to_json(&run.record)?),
        Some(run) => {
            print!("{}", super::summary(&run.record));
            println!("location:      {}", run.path.display());
        }
        None => info!(dir = %store.experiment_dir().display(), "No runs recorded"),
    }
    Ok(())
}
