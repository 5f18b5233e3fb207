//! Inspect command - prints a model-run record.

use std::path::Path;

use anyhow::{Context, Result};
use genrisk_artifact::read_file;

pub fn run(path: &Path, json: bool) -> Result<()> {
    let record = read_file(path)
        .with_context(|| format!("reading model-run record at {}", path.display()))?;
    if json {
        println!("{}", super::to_json(&record)?);
    } else {
        print!("{}", super::summary(&record));
    }
    Ok(())
}
