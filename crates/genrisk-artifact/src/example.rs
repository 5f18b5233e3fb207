//! The saved input example and its check against the signature.

use std::fs;
use std::path::Path;

use genrisk_common::{GenriskError, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::record::InputExampleInfo;
use crate::signature::{ColumnType, ModelSignature};

pub const SPLIT_ORIENT: &str = "split";
pub const RECORDS_ORIENT: &str = "records";

/// A small table of example model inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct InputExample {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct SplitFrame {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

impl InputExample {
    /// Load the example referenced by `info` from the model directory.
    pub fn load(model_dir: &Path, info: &InputExampleInfo) -> Result<Self> {
        let path = model_dir.join(&info.artifact_path);
        let text = fs::read_to_string(&path)?;
        let example = Self::from_json(&text, info.pandas_orient.as_deref())?;
        debug!(
            path = %path.display(),
            columns = example.columns.len(),
            rows = example.rows.len(),
            "loaded input example"
        );
        Ok(example)
    }

    /// Parse `split` (`{"columns": [...], "data": [[...]]}`) or `records`
    /// (`[{...}, ...]`) orient. Without an orient the shape decides.
    pub fn from_json(text: &str, orient: Option<&str>) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let orient = match orient {
            Some(o) => o,
            None if value.is_array() => RECORDS_ORIENT,
            None => SPLIT_ORIENT,
        };
        match orient {
            SPLIT_ORIENT => Self::from_split(value),
            RECORDS_ORIENT => Self::from_records(value),
            other => Err(GenriskError::schema(format!(
                "unsupported input example orient `{other}`"
            ))),
        }
    }

    fn from_split(value: Value) -> Result<Self> {
        let frame: SplitFrame = serde_json::from_value(value).map_err(|e| {
            GenriskError::schema(format!("input example is not a split-orient frame: {e}"))
        })?;
        if let Some((i, row)) = frame
            .data
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != frame.columns.len())
        {
            return Err(GenriskError::schema(format!(
                "input example row {i} has {} values for {} columns",
                row.len(),
                frame.columns.len()
            )));
        }
        Ok(Self {
            columns: frame.columns,
            rows: frame.data,
        })
    }

    fn from_records(value: Value) -> Result<Self> {
        let records: Vec<serde_json::Map<String, Value>> = serde_json::from_value(value)
            .map_err(|e| GenriskError::schema(format!("input example is not a list of records: {e}")))?;

        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Every required signature input must be a column whose values all fit
    /// the declared type. Optional inputs may be absent or null.
    pub fn check(&self, signature: &ModelSignature) -> Result<()> {
        let mut problems = Vec::new();
        for spec in &signature.inputs {
            let Some(values) = self.column(&spec.name) else {
                if !spec.is_optional() {
                    problems.push(format!("missing column `{}`", spec.name));
                }
                continue;
            };
            let bad = values
                .enumerate()
                .find(|(_, v)| !(v.is_null() && spec.is_optional()) && !accepts(spec.column_type, v));
            if let Some((row, value)) = bad {
                problems.push(format!(
                    "column `{}` row {row}: {value} is not {}",
                    spec.name, spec.column_type
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GenriskError::schema(format!(
                "input example does not match signature: {}",
                problems.join("; ")
            )))
        }
    }
}

fn accepts(column_type: ColumnType, value: &Value) -> bool {
    match column_type {
        ColumnType::Double | ColumnType::Float => value.is_number(),
        ColumnType::Long | ColumnType::Integer => value.is_i64() || value.is_u64(),
        ColumnType::Boolean => value.is_boolean(),
        ColumnType::String | ColumnType::Binary | ColumnType::Datetime => value.is_string(),
    }
}
