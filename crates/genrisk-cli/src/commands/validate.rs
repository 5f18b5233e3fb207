//! Validate command - checks a record against the files around it.

use std::path::Path;

use anyhow::{bail, Context, Result};
use genrisk_artifact::{document::document_path, read_file, InputExample, ModelRunRecord};
use tracing::{debug, warn};

pub fn run(path: &Path) -> Result<()> {
    let record = read_file(path)
        .with_context(|| format!("reading model-run record at {}", path.display()))?;
    let mlmodel = document_path(path);
    let model_dir = mlmodel.parent().unwrap_or(Path::new("."));

    let problems = problems(&record, model_dir);
    if problems.is_empty() {
        println!("{}: ok (run {})", mlmodel.display(), record.run_id());
        return Ok(());
    }
    for problem in &problems {
        warn!("{problem}");
        println!("{}: {problem}", mlmodel.display());
    }
    bail!("{} problem(s) found in {}", problems.len(), mlmodel.display())
}

/// Everything wrong with `record` as stored in `model_dir`.
pub(crate) fn problems(record: &ModelRunRecord, model_dir: &Path) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = record.validate() {
        problems.push(e.to_string());
    }
    for (flavor, file) in record.missing_model_files(model_dir) {
        problems.push(format!("flavor `{flavor}` model file {} does not exist", file.display()));
    }

    match (&record.saved_input_example_info, &record.signature) {
        (Some(info), Some(signature)) => {
            match InputExample::load(model_dir, info) {
                Ok(example) => {
                    if let Err(e) = example.check(signature) {
                        problems.push(e.to_string());
                    }
                }
                Err(e) => problems.push(format!("input example {}: {e}", info.artifact_path)),
            }
        }
        (Some(_), None) => debug!("record has an input example but no signature to check it against"),
        (None, _) => debug!("record has no input example"),
    }
    problems
}
