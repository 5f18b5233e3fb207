//! Model signature: the declared input (and optional output) feature schema.
//!
//! In the document each side of the signature is a JSON list of
//! `{"name": ..., "type": ...}` objects stored inside a YAML string, written
//! with the tracker's `", "` / `": "` separators.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::str::FromStr;

use genrisk_common::{GenriskError, Result};
use serde::{Deserialize, Serialize};

/// Primitive column type tags understood by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    String,
    Binary,
    Datetime,
}

impl ColumnType {
    pub const ALL: [ColumnType; 8] = [
        ColumnType::Boolean,
        ColumnType::Integer,
        ColumnType::Long,
        ColumnType::Float,
        ColumnType::Double,
        ColumnType::String,
        ColumnType::Binary,
        ColumnType::Datetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean  => "boolean",
            ColumnType::Integer  => "integer",
            ColumnType::Long     => "long",
            ColumnType::Float    => "float",
            ColumnType::Double   => "double",
            ColumnType::String   => "string",
            ColumnType::Binary   => "binary",
            ColumnType::Datetime => "datetime",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = GenriskError;

    fn from_str(tag: &str) -> Result<Self> {
        ColumnType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| GenriskError::schema(format!("unrecognized column type tag `{tag}`")))
    }
}

/// One named, typed feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            optional: None,
        }
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }
}

/// Parses the `NAME:TYPE` form used on the command line.
impl FromStr for ColumnSpec {
    type Err = GenriskError;

    fn from_str(spec: &str) -> Result<Self> {
        let (name, tag) = spec
            .rsplit_once(':')
            .ok_or_else(|| GenriskError::schema(format!("expected NAME:TYPE, got `{spec}`")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(GenriskError::schema(format!("column without a name in `{spec}`")));
        }
        Ok(Self::new(name, tag.trim().parse()?))
    }
}

/// Wire shape of a column spec inside the embedded JSON, before tag validation.
#[derive(Deserialize)]
struct RawColumnSpec {
    name: Option<String>,
    #[serde(rename = "type")]
    column_type: String,
    #[serde(default)]
    optional: Option<bool>,
}

impl TryFrom<RawColumnSpec> for ColumnSpec {
    type Error = GenriskError;

    fn try_from(raw: RawColumnSpec) -> Result<Self> {
        let name = raw
            .name
            .ok_or_else(|| GenriskError::schema("signature column without a name"))?;
        let column_type = raw
            .column_type
            .parse()
            .map_err(|_| {
                GenriskError::schema(format!(
                    "column `{name}` has unrecognized type tag `{}`",
                    raw.column_type
                ))
            })?;
        Ok(Self {
            name,
            column_type,
            optional: raw.optional,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColumnSpec>,
    pub outputs: Option<Vec<ColumnSpec>>,
    /// Other signature keys (e.g. `params`), kept verbatim.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ModelSignature {
    pub fn new(inputs: Vec<ColumnSpec>) -> Self {
        Self {
            inputs,
            outputs: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<ColumnSpec>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn input(&self, name: &str) -> Option<&ColumnSpec> {
        self.inputs.iter().find(|c| c.name == name)
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|c| c.name.as_str())
    }

    /// Name of the first feature that appears twice, inputs checked before outputs.
    pub fn first_duplicate(&self) -> Option<(&'static str, &str)> {
        if let Some(name) = first_duplicate(&self.inputs) {
            return Some(("inputs", name));
        }
        self.outputs
            .as_deref()
            .and_then(first_duplicate)
            .map(|name| ("outputs", name))
    }
}

fn first_duplicate(columns: &[ColumnSpec]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(columns.len());
    columns
        .iter()
        .map(|c| c.name.as_str())
        .find(|name| !seen.insert(*name))
}

/// Encode columns as the JSON text stored in `signature.inputs` / `signature.outputs`.
pub(crate) fn encode_columns(columns: &[ColumnSpec]) -> Result<String> {
    let mut buf = Vec::with_capacity(32 * columns.len() + 2);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, TrackerFormatter);
    columns.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| GenriskError::serialization(e.to_string()))
}

/// Decode the JSON text of one side of the signature.
pub(crate) fn decode_columns(field: &str, text: &str) -> Result<Vec<ColumnSpec>> {
    let raw: Vec<RawColumnSpec> = serde_json::from_str(text).map_err(|e| {
        GenriskError::schema(format!(
            "signature {field} is not a JSON list of column specs: {e}"
        ))
    })?;
    raw.into_iter().map(ColumnSpec::try_from).collect()
}

/// Compact JSON with a space after `,` and `:`.
struct TrackerFormatter;

impl serde_json::ser::Formatter for TrackerFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
