//! The model-run record and its construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use genrisk_common::{GenriskError, Result};
use serde::Serialize;
use serde_yaml::Value;
use uuid::Uuid;

use crate::document::{EXAMPLE_INFO_KEYS, RECORD_KEYS, SIGNATURE_KEYS};
use crate::flavor::{is_contained_relative, FlavorDescriptor};
use crate::signature::ModelSignature;

const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Reference to the saved example input payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputExampleInfo {
    /// Example file, relative to the model directory.
    pub artifact_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pandas_orient: Option<String>,
    /// Container type, e.g. `dataframe`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub container_type: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl InputExampleInfo {
    /// A dataframe example saved in `split` orient.
    pub fn dataframe(artifact_path: impl Into<String>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            pandas_orient: Some("split".to_string()),
            container_type: Some("dataframe".to_string()),
            extra: BTreeMap::new(),
        }
    }
}

/// One completed training run, as recorded next to its serialized model.
///
/// The run id cannot change after construction: a newer run gets a new
/// record rather than an edit of this one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRunRecord {
    pub artifact_path: String,
    pub flavors: BTreeMap<String, FlavorDescriptor>,
    run_id: String,
    pub saved_input_example_info: Option<InputExampleInfo>,
    pub signature: Option<ModelSignature>,
    pub utc_time_created: Option<DateTime<Utc>>,
    /// Unrecognized top-level keys (`mlflow_version`, `model_uuid`, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ModelRunRecord {
    pub fn builder(artifact_path: impl Into<String>) -> ModelRunRecordBuilder {
        ModelRunRecordBuilder::new(artifact_path)
    }

    pub(crate) fn from_parts(
        artifact_path: String,
        flavors: BTreeMap<String, FlavorDescriptor>,
        run_id: String,
    ) -> Self {
        Self {
            artifact_path,
            flavors,
            run_id,
            saved_input_example_info: None,
            signature: None,
            utc_time_created: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn flavor(&self, name: &str) -> Option<&FlavorDescriptor> {
        self.flavors.get(name)
    }

    /// Model files of every flavor, relative to the model directory.
    pub fn model_files(&self) -> Vec<(&str, &str)> {
        self.flavors
            .iter()
            .filter_map(|(name, f)| f.model_path.as_deref().map(|p| (name.as_str(), p)))
            .collect()
    }

    /// Model files of every flavor that are absent under `model_dir`.
    pub fn missing_model_files(&self, model_dir: &Path) -> Vec<(String, PathBuf)> {
        self.model_files()
            .into_iter()
            .map(|(name, file)| (name.to_string(), model_dir.join(file)))
            .filter(|(_, path)| !path.exists())
            .collect()
    }

    /// Checks every invariant a record must satisfy before it is written.
    pub fn validate(&self) -> Result<()> {
        if !is_contained_relative(&self.artifact_path) {
            return Err(GenriskError::serialization(format!(
                "artifact path `{}` must be a relative path",
                self.artifact_path
            )));
        }
        if self.run_id.trim().is_empty() {
            return Err(GenriskError::serialization("run id is empty"));
        }
        if self.flavors.is_empty() {
            return Err(GenriskError::serialization("record has no flavors"));
        }
        for (name, flavor) in &self.flavors {
            flavor.checked_model_path(name)?;
            flavor.check_extra(name)?;
        }
        if let Some(signature) = &self.signature {
            if let Some((side, name)) = signature.first_duplicate() {
                return Err(GenriskError::serialization(format!(
                    "signature {side} declare feature `{name}` more than once"
                )));
            }
            check_reserved("signature", &signature.extra, &SIGNATURE_KEYS)?;
        }
        if let Some(info) = &self.saved_input_example_info {
            check_reserved("saved_input_example_info", &info.extra, &EXAMPLE_INFO_KEYS)?;
        }
        check_reserved("record", &self.extra, &RECORD_KEYS)?;
        if let Some(ts) = &self.utc_time_created {
            if ts.timestamp_subsec_nanos() % 1_000 != 0 {
                return Err(GenriskError::serialization(format!(
                    "creation time {ts} is finer than the microseconds a document holds"
                )));
            }
        }
        Ok(())
    }
}

/// Assembles a fresh record at the end of a training run.
#[derive(Debug, Clone)]
pub struct ModelRunRecordBuilder {
    artifact_path: String,
    run_id: Option<String>,
    flavors: BTreeMap<String, FlavorDescriptor>,
    signature: Option<ModelSignature>,
    input_example: Option<InputExampleInfo>,
    created_at: Option<DateTime<Utc>>,
    extra: BTreeMap<String, Value>,
}

impl ModelRunRecordBuilder {
    fn new(artifact_path: impl Into<String>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            run_id: None,
            flavors: BTreeMap::new(),
            signature: None,
            input_example: None,
            created_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// Use an existing run id instead of generating one.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn flavor(mut self, name: impl Into<String>, flavor: FlavorDescriptor) -> Self {
        self.flavors.insert(name.into(), flavor);
        self
    }

    pub fn signature(mut self, signature: ModelSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn input_example(mut self, info: InputExampleInfo) -> Self {
        self.input_example = Some(info);
        self
    }

    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<ModelRunRecord> {
        let run_id = match self.run_id {
            Some(id) if is_hex_id(&id) => id,
            Some(id) => {
                return Err(GenriskError::malformed(format!(
                    "run id `{id}` is not a lowercase hex string"
                )))
            }
            None => new_run_id(),
        };
        // Documents carry microsecond precision.
        let created = self.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6);

        let mut record = ModelRunRecord::from_parts(self.artifact_path, self.flavors, run_id);
        record.signature = self.signature;
        record.saved_input_example_info = self.input_example;
        record.utc_time_created = Some(created);
        record.extra = self.extra;
        record.validate()?;
        Ok(record)
    }
}

fn check_reserved(scope: &str, extra: &BTreeMap<String, Value>, reserved: &[&str]) -> Result<()> {
    match reserved.iter().find(|key| extra.contains_key(**key)) {
        Some(key) => Err(GenriskError::serialization(format!(
            "{scope} extra key `{key}` clashes with a typed field"
        ))),
        None => Ok(()),
    }
}

pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn is_hex_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// `YYYY-MM-DD HH:MM:SS[.ffffff]`, the tracker's rendering of a naive UTC time.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    if ts.timestamp_subsec_nanos() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Accepts the tracker format and RFC 3339; truncated to microseconds.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)))
        .ok()
        .map(|ts| ts.trunc_subsecs(6))
}
