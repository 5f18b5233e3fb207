//! Reading and writing the `MLmodel` document.
//!
//! The outer document is YAML. `signature.inputs` and `signature.outputs`
//! are JSON strings inside it and are parsed as documents of their own.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use genrisk_common::{GenriskError, Result};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::flavor::FlavorDescriptor;
use crate::record::{format_timestamp, parse_timestamp, InputExampleInfo, ModelRunRecord};
use crate::signature::{decode_columns, encode_columns, ModelSignature};

pub const MLMODEL_FILE: &str = "MLmodel";

const ARTIFACT_PATH: &str = "artifact_path";
const FLAVORS: &str = "flavors";
const RUN_ID: &str = "run_id";
const INPUT_EXAMPLE_INFO: &str = "saved_input_example_info";
const SIGNATURE: &str = "signature";
const TIME_CREATED: &str = "utc_time_created";

/// Keys owned by typed fields; `extra` maps may not use them.
pub(crate) const RECORD_KEYS: [&str; 6] =
    [ARTIFACT_PATH, FLAVORS, RUN_ID, INPUT_EXAMPLE_INFO, SIGNATURE, TIME_CREATED];
pub(crate) const EXAMPLE_INFO_KEYS: [&str; 3] = [ARTIFACT_PATH, "pandas_orient", "type"];
pub(crate) const SIGNATURE_KEYS: [&str; 2] = ["inputs", "outputs"];

/// Serialize a record to its YAML document.
pub fn write(record: &ModelRunRecord) -> Result<String> {
    Ok(serde_yaml::to_string(&to_value(record)?)?)
}

/// Parse a YAML document into a record.
pub fn read(document: &str) -> Result<ModelRunRecord> {
    let value: Value = serde_yaml::from_str(document)
        .map_err(|e| GenriskError::malformed(format!("not a YAML document: {e}")))?;
    from_value(value)
}

/// Read `path`, or `path/MLmodel` when `path` is a model directory.
pub fn read_file(path: &Path) -> Result<ModelRunRecord> {
    let path = document_path(path);
    let text = fs::read_to_string(&path)?;
    let record = read(&text)?;
    debug!(run_id = record.run_id(), path = %path.display(), "read model-run record");
    Ok(record)
}

/// Write the document to `path` in one step: a sibling temp file renamed into place.
pub fn write_file(record: &ModelRunRecord, path: &Path) -> Result<()> {
    let text = write(record)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("partial");
    if let Err(e) = fs::write(&tmp_path, text).and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    debug!(run_id = record.run_id(), path = %path.display(), "wrote model-run record");
    Ok(())
}

pub fn document_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MLMODEL_FILE)
    } else {
        path.to_path_buf()
    }
}

/// The document as a YAML value, keys in sorted order.
pub fn to_value(record: &ModelRunRecord) -> Result<Value> {
    record.validate()?;

    // Known keys are inserted last so an `extra` entry can never shadow them.
    let mut doc: BTreeMap<String, Value> = record.extra.clone();
    doc.insert(ARTIFACT_PATH.to_string(), Value::String(record.artifact_path.clone()));

    let flavors: Mapping = record
        .flavors
        .iter()
        .map(|(name, flavor)| (Value::String(name.clone()), Value::Mapping(flavor.to_mapping())))
        .collect();
    doc.insert(FLAVORS.to_string(), Value::Mapping(flavors));
    doc.insert(RUN_ID.to_string(), Value::String(record.run_id().to_string()));

    if let Some(info) = &record.saved_input_example_info {
        doc.insert(INPUT_EXAMPLE_INFO.to_string(), Value::Mapping(example_info_mapping(info)));
    }
    if let Some(signature) = &record.signature {
        doc.insert(SIGNATURE.to_string(), Value::Mapping(signature_mapping(signature)?));
    }
    if let Some(ts) = &record.utc_time_created {
        doc.insert(TIME_CREATED.to_string(), Value::String(format_timestamp(ts)));
    }

    Ok(Value::Mapping(sorted_mapping(doc)))
}

/// Build a record from an already-parsed YAML value.
pub fn from_value(value: Value) -> Result<ModelRunRecord> {
    let Value::Mapping(mapping) = value else {
        return Err(GenriskError::malformed("document is not a mapping"));
    };
    let mut doc = string_keyed(mapping, "document")?;

    let run_id = take_scalar(&mut doc, RUN_ID)?
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| GenriskError::malformed(format!("missing `{RUN_ID}`")))?;
    let artifact_path = take_scalar(&mut doc, ARTIFACT_PATH)?
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| GenriskError::malformed(format!("missing `{ARTIFACT_PATH}`")))?;
    let flavors = read_flavors(doc.remove(FLAVORS))?;

    let mut record = ModelRunRecord::from_parts(artifact_path, flavors, run_id);

    record.saved_input_example_info = match doc.remove(INPUT_EXAMPLE_INFO) {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(m)) => Some(read_example_info(m)?),
        Some(_) => {
            return Err(GenriskError::malformed(format!("`{INPUT_EXAMPLE_INFO}` is not a mapping")))
        }
    };

    record.signature = match doc.remove(SIGNATURE) {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(m)) => Some(read_signature(m)?),
        Some(_) => return Err(GenriskError::malformed(format!("`{SIGNATURE}` is not a mapping"))),
    };

    record.utc_time_created = match take_scalar(&mut doc, TIME_CREATED)? {
        None => None,
        Some(text) => Some(parse_timestamp(&text).ok_or_else(|| {
            GenriskError::malformed(format!("`{TIME_CREATED}` is not a timestamp: `{text}`"))
        })?),
    };

    record.extra = doc;
    Ok(record)
}

fn read_flavors(value: Option<Value>) -> Result<BTreeMap<String, FlavorDescriptor>> {
    let mapping = match value {
        Some(Value::Mapping(m)) if !m.is_empty() => m,
        None | Some(Value::Null) | Some(Value::Mapping(_)) => {
            return Err(GenriskError::malformed("record has no flavors"))
        }
        Some(_) => return Err(GenriskError::malformed(format!("`{FLAVORS}` is not a mapping"))),
    };

    let mut flavors = BTreeMap::new();
    for (name, body) in string_keyed(mapping, FLAVORS)? {
        let body = match body {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            _ => {
                return Err(GenriskError::malformed(format!("flavor `{name}` is not a mapping")))
            }
        };
        let flavor = FlavorDescriptor::from_fields(string_keyed(body, &name)?);
        flavors.insert(name, flavor);
    }
    Ok(flavors)
}

fn read_example_info(mapping: Mapping) -> Result<InputExampleInfo> {
    let mut fields = string_keyed(mapping, INPUT_EXAMPLE_INFO)?;
    let artifact_path = take_scalar(&mut fields, ARTIFACT_PATH)?.ok_or_else(|| {
        GenriskError::malformed(format!("`{INPUT_EXAMPLE_INFO}` has no `{ARTIFACT_PATH}`"))
    })?;
    Ok(InputExampleInfo {
        artifact_path,
        pandas_orient: take_scalar(&mut fields, "pandas_orient")?,
        container_type: take_scalar(&mut fields, "type")?,
        extra: fields,
    })
}

fn example_info_mapping(info: &InputExampleInfo) -> Mapping {
    let mut fields = info.extra.clone();
    fields.insert(ARTIFACT_PATH.to_string(), Value::String(info.artifact_path.clone()));
    if let Some(orient) = &info.pandas_orient {
        fields.insert("pandas_orient".to_string(), Value::String(orient.clone()));
    }
    if let Some(kind) = &info.container_type {
        fields.insert("type".to_string(), Value::String(kind.clone()));
    }
    sorted_mapping(fields)
}

fn read_signature(mapping: Mapping) -> Result<ModelSignature> {
    let mut fields = string_keyed(mapping, SIGNATURE)?;
    let inputs = match fields.remove("inputs") {
        Some(Value::String(text)) => decode_columns("inputs", &text)?,
        None | Some(Value::Null) => return Err(GenriskError::schema("signature has no inputs")),
        Some(_) => return Err(GenriskError::schema("signature inputs is not a JSON string")),
    };
    let outputs = match fields.remove("outputs") {
        Some(Value::String(text)) => Some(decode_columns("outputs", &text)?),
        None | Some(Value::Null) => None,
        Some(_) => return Err(GenriskError::schema("signature outputs is not a JSON string")),
    };

    let signature = ModelSignature { inputs, outputs, extra: fields };
    if let Some((side, name)) = signature.first_duplicate() {
        return Err(GenriskError::schema(format!(
            "signature {side} declare feature `{name}` more than once"
        )));
    }
    Ok(signature)
}

fn signature_mapping(signature: &ModelSignature) -> Result<Mapping> {
    let mut fields = signature.extra.clone();
    fields.insert("inputs".to_string(), Value::String(encode_columns(&signature.inputs)?));
    let outputs = match &signature.outputs {
        Some(columns) => Value::String(encode_columns(columns)?),
        None => Value::Null,
    };
    fields.insert("outputs".to_string(), outputs);
    Ok(sorted_mapping(fields))
}

fn string_keyed(mapping: Mapping, context: &str) -> Result<BTreeMap<String, Value>> {
    let mut fields = BTreeMap::new();
    for (key, value) in mapping {
        match key {
            Value::String(key) => {
                fields.insert(key, value);
            }
            other => {
                return Err(GenriskError::malformed(format!(
                    "`{context}` has a non-string key {other:?}"
                )))
            }
        }
    }
    Ok(fields)
}

/// Remove a scalar field as text. Numbers and booleans are accepted because
/// YAML turns unquoted ids like `20210603` into integers.
fn take_scalar(fields: &mut BTreeMap<String, Value>, key: &str) -> Result<Option<String>> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(GenriskError::malformed(format!("`{key}` is not a scalar"))),
    }
}

fn sorted_mapping(fields: BTreeMap<String, Value>) -> Mapping {
    fields
        .into_iter()
        .map(|(k, v)| (Value::String(k), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{ColumnSpec, ColumnType};
    use pretty_assertions::assert_eq;

    const SCENARIO: &str = r#"
artifact_path: model
flavors:
  python_function:
    model_path: model.pkl
run_id: abc123
signature:
  inputs: '[{"name": "gene1", "type": "double"}]'
  outputs: null
"#;

    fn top_level_keys(document: &str) -> Vec<String> {
        let value: Value = serde_yaml::from_str(document).unwrap();
        value
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_scenario_reads_single_double_input() {
        let record = read(SCENARIO).unwrap();
        assert_eq!(record.run_id(), "abc123");
        assert_eq!(record.artifact_path, "model");
        let signature = record.signature.as_ref().unwrap();
        assert_eq!(signature.inputs, vec![ColumnSpec::new("gene1", ColumnType::Double)]);
        assert_eq!(signature.outputs, None);
        assert_eq!(record.utc_time_created, None);
    }

    #[test]
    fn test_scenario_rewrite_keeps_key_set() {
        let record = read(SCENARIO).unwrap();
        let rewritten = write(&record).unwrap();
        assert_eq!(top_level_keys(&rewritten), top_level_keys(SCENARIO));
        assert_eq!(read(&rewritten).unwrap(), record);
    }

    #[test]
    fn test_inputs_stay_a_json_string() {
        let record = read(SCENARIO).unwrap();
        let value = to_value(&record).unwrap();
        let inputs = &value["signature"]["inputs"];
        assert_eq!(
            inputs.as_str(),
            Some(r#"[{"name": "gene1", "type": "double"}]"#)
        );
    }

    #[test]
    fn test_missing_required_fields() {
        for key in [RUN_ID, ARTIFACT_PATH, FLAVORS] {
            let mut value: Value = serde_yaml::from_str(SCENARIO).unwrap();
            value.as_mapping_mut().unwrap().remove(key);
            let err = from_value(value).unwrap_err();
            assert!(
                matches!(err, GenriskError::MalformedRecord(ref m) if m.contains(key) || m.contains("flavors")),
                "removing {key} gave {err}"
            );
        }
    }

    #[test]
    fn test_empty_flavors_is_malformed() {
        let doc = "artifact_path: model\nflavors: {}\nrun_id: abc123\n";
        assert!(matches!(read(doc), Err(GenriskError::MalformedRecord(_))));
    }

    #[test]
    fn test_not_a_mapping() {
        assert!(matches!(read("- a\n- b\n"), Err(GenriskError::MalformedRecord(_))));
        assert!(matches!(read("key: [unclosed"), Err(GenriskError::MalformedRecord(_))));
    }

    #[test]
    fn test_numeric_run_id_is_text() {
        let doc = "artifact_path: model\nflavors:\n  python_function:\n    model_path: model.pkl\nrun_id: 20210603\n";
        let record = read(doc).unwrap();
        assert_eq!(record.run_id(), "20210603");
        // Written back quoted so it stays a string.
        let again = read(&write(&record).unwrap()).unwrap();
        assert_eq!(again.run_id(), "20210603");
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let doc = format!("{SCENARIO}utc_time_created: 'last tuesday'\n");
        assert!(matches!(read(&doc), Err(GenriskError::MalformedRecord(_))));
    }

    #[test]
    fn test_unknown_type_tag_is_schema_error() {
        let doc = SCENARIO.replace("double", "unsigned128");
        assert!(matches!(read(&doc), Err(GenriskError::Schema(_))));
    }

    #[test]
    fn test_duplicate_inputs_rejected_on_read() {
        let doc = SCENARIO.replace(
            r#"[{"name": "gene1", "type": "double"}]"#,
            r#"[{"name": "gene1", "type": "double"}, {"name": "gene1", "type": "long"}]"#,
        );
        assert!(matches!(read(&doc), Err(GenriskError::Schema(_))));
    }

    #[test]
    fn test_write_rejects_flavor_without_model_path() {
        let doc = "artifact_path: model\nflavors:\n  custom:\n    loader_module: my.loader\nrun_id: abc123\n";
        let record = read(doc).unwrap();
        assert!(matches!(write(&record), Err(GenriskError::Serialization(_))));
    }

    #[test]
    fn test_extra_keys_survive() {
        let doc = format!("{SCENARIO}mlflow_version: 1.17.0\nmodel_uuid: 5f1c\n");
        let record = read(&doc).unwrap();
        assert_eq!(record.extra.len(), 2);
        let keys = top_level_keys(&write(&record).unwrap());
        assert!(keys.contains(&"mlflow_version".to_string()));
        assert!(keys.contains(&"model_uuid".to_string()));
    }

    #[test]
    fn test_keys_written_sorted() {
        let doc = format!("{SCENARIO}utc_time_created: '2021-06-03 10:25:22.918282'\n");
        let keys = top_level_keys(&write(&read(&doc).unwrap()).unwrap());
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let record = read(SCENARIO).unwrap();
        // A non-empty directory where the document should go cannot be replaced.
        let path = dir.path().join(MLMODEL_FILE);
        fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(matches!(write_file(&record, &path), Err(GenriskError::Io(_))));
        assert!(!path.with_extension("partial").exists());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let record = read(SCENARIO).unwrap();
        let path = dir.path().join("model").join(MLMODEL_FILE);
        write_file(&record, &path).unwrap();
        assert!(!path.with_extension("partial").exists());
        // A model directory resolves to its MLmodel.
        assert_eq!(read_file(&dir.path().join("model")).unwrap(), record);
    }
}
