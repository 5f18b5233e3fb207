//! File-system run store in the tracker's directory layout:
//! `<root>/<experiment_id>/<run_id>/artifacts/<artifact_path>/MLmodel`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use genrisk_common::{GenriskError, Result};
use tracing::{debug, info, warn};

use crate::document::{self, MLMODEL_FILE};
use crate::flavor::is_contained_relative;
use crate::record::ModelRunRecord;

const ARTIFACTS_DIR: &str = "artifacts";

/// A record together with the file it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub record: ModelRunRecord,
    pub path: PathBuf,
}

impl StoredRun {
    /// Directory holding the serialized model and the `MLmodel` file.
    pub fn model_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }
}

#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
    experiment_id: String,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>, experiment_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            experiment_id: experiment_id.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.experiment_id)
    }

    /// Directory of one run. The run id must be a single plain path segment.
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(run_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.experiment_dir().join(run_id)),
            _ => Err(GenriskError::malformed(format!(
                "run id `{run_id}` is not a plain directory name"
            ))),
        }
    }

    pub fn model_dir(&self, record: &ModelRunRecord) -> Result<PathBuf> {
        Ok(self
            .run_dir(record.run_id())?
            .join(ARTIFACTS_DIR)
            .join(&record.artifact_path))
    }

    /// Write a new record. A run's record is written once; saving again under
    /// the same run id fails.
    pub fn save(&self, record: &ModelRunRecord) -> Result<PathBuf> {
        self.save_with(record, &[])
    }

    /// Write a new record together with files that belong in its model
    /// directory, given as `(relative path, contents)`. The files are in
    /// place before the record that references them.
    pub fn save_with(&self, record: &ModelRunRecord, files: &[(&str, &str)]) -> Result<PathBuf> {
        record.validate()?;
        let run_dir = self.run_dir(record.run_id())?;
        if find_record_file(&run_dir.join(ARTIFACTS_DIR))?.is_some() {
            return Err(GenriskError::AlreadyExists(format!(
                "run {} already has a model-run record",
                record.run_id()
            )));
        }
        if let Some((name, _)) = files.iter().find(|(name, _)| !is_contained_relative(name)) {
            return Err(GenriskError::serialization(format!(
                "model file `{name}` is not inside the model directory"
            )));
        }

        let model_dir = self.model_dir(record)?;
        for (name, contents) in files {
            let file = model_dir.join(name);
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&file, contents)?;
            debug!(run_id = record.run_id(), file = %file.display(), "wrote model file");
        }

        let path = model_dir.join(MLMODEL_FILE);
        document::write_file(record, &path)?;
        info!(run_id = record.run_id(), path = %path.display(), "saved model-run record");
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<StoredRun> {
        let run_dir = self.run_dir(run_id)?;
        if !run_dir.is_dir() {
            return Err(GenriskError::NotFound(format!("run {run_id}")));
        }
        let path = find_record_file(&run_dir.join(ARTIFACTS_DIR))?
            .ok_or_else(|| GenriskError::NotFound(format!("model-run record for run {run_id}")))?;
        let record = document::read_file(&path)?;
        if record.run_id() != run_id {
            return Err(GenriskError::malformed(format!(
                "record under run {run_id} declares run id {}",
                record.run_id()
            )));
        }
        Ok(StoredRun { record, path })
    }

    /// Every readable record of the experiment, oldest first.
    pub fn list(&self) -> Result<Vec<StoredRun>> {
        let experiment_dir = self.experiment_dir();
        if !experiment_dir.is_dir() {
            debug!(dir = %experiment_dir.display(), "experiment directory does not exist");
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for run_dir in sorted_subdirs(&experiment_dir)? {
            let Some(run_id) = run_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match self.load(run_id) {
                Ok(run) => runs.push(run),
                Err(GenriskError::NotFound(_)) => {
                    debug!(run_id, "run has no model-run record");
                }
                Err(e) => warn!(run_id, error = %e, "skipping unreadable model-run record"),
            }
        }
        runs.sort_by(|a, b| {
            a.record
                .utc_time_created
                .cmp(&b.record.utc_time_created)
                .then_with(|| a.record.run_id().cmp(b.record.run_id()))
        });
        Ok(runs)
    }

    /// The newest record, which supersedes every earlier one.
    pub fn latest(&self) -> Result<Option<StoredRun>> {
        Ok(self.list()?.pop())
    }

    /// Flavor model files of `record` missing from its model directory.
    pub fn verify(&self, record: &ModelRunRecord) -> Result<Vec<(String, PathBuf)>> {
        let missing = record.missing_model_files(&self.model_dir(record)?);
        if !missing.is_empty() {
            warn!(run_id = record.run_id(), missing = missing.len(), "model files missing");
        }
        Ok(missing)
    }
}

/// Depth-first search for an `MLmodel` file, entries visited in name order.
fn find_record_file(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let candidate = dir.join(MLMODEL_FILE);
    if candidate.is_file() {
        return Ok(Some(candidate));
    }
    for sub in sorted_subdirs(dir)? {
        if let Some(found) = find_record_file(&sub)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Subdirectories of `dir` by name, skipping hidden ones such as `.trash`.
fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::FlavorDescriptor;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn record_at(hour: u32) -> ModelRunRecord {
        ModelRunRecord::builder("model")
            .flavor("python_function", FlavorDescriptor::new("model.pkl"))
            .created_at(Utc.with_ymd_and_hms(2021, 6, 3, hour, 0, 0).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_save_uses_tracker_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        let record = record_at(10);
        let path = store.save(&record).unwrap();
        assert_eq!(
            path,
            dir.path()
                .join("0")
                .join(record.run_id())
                .join("artifacts/model/MLmodel")
        );
        assert_eq!(store.load(record.run_id()).unwrap().record, record);
    }

    #[test]
    fn test_save_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        let record = record_at(10);
        store.save(&record).unwrap();
        assert!(matches!(store.save(&record), Err(GenriskError::AlreadyExists(_))));
    }

    #[test]
    fn test_load_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        assert!(matches!(store.load("deadbeef"), Err(GenriskError::NotFound(_))));
    }

    #[test]
    fn test_list_orders_by_creation_and_latest_supersedes() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        let late = record_at(12);
        let early = record_at(8);
        store.save(&late).unwrap();
        store.save(&early).unwrap();
        fs::create_dir_all(dir.path().join("0/.trash")).unwrap();
        fs::create_dir_all(dir.path().join("0/emptyrun")).unwrap();

        let runs = store.list().unwrap();
        let ids: Vec<&str> = runs.iter().map(|r| r.record.run_id()).collect();
        assert_eq!(ids, vec![early.run_id(), late.run_id()]);
        assert_eq!(store.latest().unwrap().unwrap().record, late);
    }

    #[test]
    fn test_list_skips_unreadable_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        store.save(&record_at(9)).unwrap();
        let broken = dir.path().join("0/ffff/artifacts/model");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(MLMODEL_FILE), "artifact_path: model\n").unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_verify_reports_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        let record = record_at(10);
        store.save(&record).unwrap();

        let missing = store.verify(&record).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, "python_function");

        fs::write(store.model_dir(&record).unwrap().join("model.pkl"), b"pickle").unwrap();
        assert!(store.verify(&record).unwrap().is_empty());
    }

    #[test]
    fn test_run_id_must_stay_inside_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let store = RunStore::new(&root, "0");
        let doc = "artifact_path: model\nflavors:\n  python_function:\n    model_path: model.pkl\nrun_id: ../../escaped\n";
        let record = document::read(doc).unwrap();

        assert!(matches!(store.save(&record), Err(GenriskError::MalformedRecord(_))));
        assert!(!dir.path().join("escaped").exists());
        for run_id in ["../x", "a/b", ".", "/abs"] {
            assert!(store.run_dir(run_id).is_err(), "{run_id}");
            assert!(matches!(store.load(run_id), Err(GenriskError::MalformedRecord(_))));
        }
        assert!(store.run_dir("abc123").is_ok());
    }

    #[test]
    fn test_save_with_writes_files_before_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        let record = record_at(10);
        let path = store
            .save_with(&record, &[("input_example.json", r#"{"columns": [], "data": []}"#)])
            .unwrap();
        assert!(path.parent().unwrap().join("input_example.json").is_file());

        let other = record_at(11);
        let err = store.save_with(&other, &[("../leak.json", "{}")]).unwrap_err();
        assert!(matches!(err, GenriskError::Serialization(_)));
        assert!(!store.run_dir(other.run_id()).unwrap().exists());
    }

    #[test]
    fn test_save_with_does_not_touch_existing_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "0");
        let record = record_at(10);
        store.save_with(&record, &[("input_example.json", "first")]).unwrap();
        assert!(store.save_with(&record, &[("input_example.json", "second")]).is_err());
        let kept = fs::read_to_string(store.model_dir(&record).unwrap().join("input_example.json")).unwrap();
        assert_eq!(kept, "first");
    }

    #[test]
    fn test_list_missing_experiment_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("nowhere"), "0");
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.latest().unwrap(), None);
    }
}
