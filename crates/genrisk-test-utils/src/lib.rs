//! Shared fixtures for genrisk tests: realistic `MLmodel` documents and
//! model directories laid out on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

pub const SAMPLE_RUN_ID: &str = "2d5b6e8f1c4a4f0e9b7d3a1c5e8f2b64";

/// A scikit-learn classifier record as the tracker writes it after a
/// `create-model` run on gene burden scores plus covariates.
pub const SAMPLE_MLMODEL: &str = r#"artifact_path: model
flavors:
  python_function:
    env: conda.yaml
    loader_module: mlflow.sklearn
    model_path: model.pkl
    python_version: 3.8.10
  sklearn:
    code: null
    pickled_model: model.pkl
    serialization_format: cloudpickle
    sklearn_version: 0.23.2
run_id: 2d5b6e8f1c4a4f0e9b7d3a1c5e8f2b64
saved_input_example_info:
  artifact_path: input_example.json
  pandas_orient: split
  type: dataframe
signature:
  inputs: '[{"name": "BRCA1", "type": "double"}, {"name": "BRCA2", "type": "double"},
    {"name": "PC1", "type": "double"}, {"name": "PC2", "type": "double"}, {"name": "sex",
    "type": "long"}]'
  outputs: null
utc_time_created: '2021-06-03 10:25:22.918282'
"#;

/// Input example matching [`SAMPLE_MLMODEL`]'s signature.
pub const SAMPLE_INPUT_EXAMPLE: &str = r#"{"columns": ["BRCA1", "BRCA2", "PC1", "PC2", "sex"], "data": [[0.0, 1.25, -0.013, 0.021, 1], [2.5, 0.0, 0.004, -0.017, 2]]}"#;

/// Minimal record document with one `python_function` flavor and one input.
pub fn minimal_mlmodel(run_id: &str, created: DateTime<Utc>) -> String {
    format!(
        "artifact_path: model\n\
         flavors:\n  python_function:\n    model_path: model.pkl\n\
         run_id: '{run_id}'\n\
         signature:\n  inputs: '[{{\"name\": \"gene1\", \"type\": \"double\"}}]'\n  outputs: null\n\
         utc_time_created: '{}'\n",
        created.format("%Y-%m-%d %H:%M:%S%.6f")
    )
}

pub fn fresh_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A model directory on disk: `MLmodel`, the pickled model and the input example.
pub struct ModelDir {
    dir: TempDir,
}

impl ModelDir {
    /// Lay out [`SAMPLE_MLMODEL`] with all the files it references.
    pub fn sample() -> io::Result<Self> {
        let model = Self::empty()?;
        model.write("MLmodel", SAMPLE_MLMODEL)?;
        model.write("model.pkl", "\u{80}\u{4}pickled")?;
        model.write("input_example.json", SAMPLE_INPUT_EXAMPLE)?;
        model.write("conda.yaml", "name: genrisk-env\n")?;
        Ok(model)
    }

    pub fn empty() -> io::Result<Self> {
        Ok(Self { dir: tempfile::tempdir()? })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn mlmodel_path(&self) -> PathBuf {
        self.dir.path().join("MLmodel")
    }

    pub fn write(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.dir.path().join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_example_is_split_json() {
        let value: serde_json::Value = serde_json::from_str(SAMPLE_INPUT_EXAMPLE).unwrap();
        assert_eq!(value["columns"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_sample_dir_has_referenced_files() {
        let dir = ModelDir::sample().unwrap();
        assert!(dir.mlmodel_path().is_file());
        assert!(dir.path().join("model.pkl").is_file());
        assert!(dir.path().join("input_example.json").is_file());
    }

    #[test]
    fn test_minimal_mlmodel_mentions_run() {
        let run_id = fresh_run_id();
        let doc = minimal_mlmodel(&run_id, Utc::now());
        assert!(doc.contains(&run_id));
        assert!(doc.contains("python_function"));
    }
}
