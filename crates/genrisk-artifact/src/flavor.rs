//! Flavor descriptors: the named ways of loading the same model artifact.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use genrisk_common::{GenriskError, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// The generic function-callable flavor every trained model carries.
pub const PYTHON_FUNCTION: &str = "python_function";

/// Which key a flavor stores its model file under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPathKey {
    #[default]
    ModelPath,
    /// Used by the scikit-learn flavor.
    PickledModel,
}

impl ModelPathKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPathKey::ModelPath => "model_path",
            ModelPathKey::PickledModel => "pickled_model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryVersion {
    /// Document key, e.g. `python_version` or `sklearn_version`.
    pub key: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FlavorDescriptor {
    /// Environment file reference (`conda.yaml`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader_module: Option<String>,
    /// Model file, relative to the record's `artifact_path`.
    pub model_path: Option<String>,
    pub model_path_key: ModelPathKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_version: Option<LibraryVersion>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl FlavorDescriptor {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: Some(model_path.into()),
            ..Self::default()
        }
    }

    pub fn with_model_path_key(mut self, key: ModelPathKey) -> Self {
        self.model_path_key = key;
        self
    }

    pub fn with_loader_module(mut self, loader_module: impl Into<String>) -> Self {
        self.loader_module = Some(loader_module.into());
        self
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_library_version(mut self, key: impl Into<String>, version: impl Into<String>) -> Self {
        self.library_version = Some(LibraryVersion {
            key: key.into(),
            version: version.into(),
        });
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Build a descriptor from the flavor's fields in the document.
    /// Typed fields are only lifted out when they hold strings; anything
    /// else stays in `extra` untouched.
    pub(crate) fn from_fields(mut fields: BTreeMap<String, Value>) -> Self {
        let (model_path, model_path_key) =
            match take_string(&mut fields, ModelPathKey::ModelPath.as_str()) {
                Some(path) => (Some(path), ModelPathKey::ModelPath),
                None => match take_string(&mut fields, ModelPathKey::PickledModel.as_str()) {
                    Some(path) => (Some(path), ModelPathKey::PickledModel),
                    None => (None, ModelPathKey::ModelPath),
                },
            };

        let version_key = fields
            .iter()
            .find(|(k, v)| k.ends_with("_version") && v.is_string())
            .map(|(k, _)| k.clone());
        let library_version = version_key.and_then(|key| {
            take_string(&mut fields, &key).map(|version| LibraryVersion { key, version })
        });

        Self {
            env: take_string(&mut fields, "env"),
            loader_module: take_string(&mut fields, "loader_module"),
            model_path,
            model_path_key,
            library_version,
            extra: fields,
        }
    }

    /// Document mapping, keys sorted.
    pub(crate) fn to_mapping(&self) -> Mapping {
        self.fields()
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect()
    }

    /// Extra keys must not be written over by, or read back into, a typed field.
    pub fn check_extra(&self, name: &str) -> Result<()> {
        if Self::from_fields(self.fields()) != *self {
            return Err(GenriskError::serialization(format!(
                "flavor `{name}` has extra keys that clash with its typed fields"
            )));
        }
        Ok(())
    }

    fn fields(&self) -> BTreeMap<String, Value> {
        let mut fields = self.extra.clone();
        if let Some(env) = &self.env {
            fields.insert("env".to_string(), Value::String(env.clone()));
        }
        if let Some(loader) = &self.loader_module {
            fields.insert("loader_module".to_string(), Value::String(loader.clone()));
        }
        if let Some(path) = &self.model_path {
            fields.insert(self.model_path_key.as_str().to_string(), Value::String(path.clone()));
        }
        if let Some(v) = &self.library_version {
            fields.insert(v.key.clone(), Value::String(v.version.clone()));
        }
        fields
    }

    /// The model file, checked to stay inside the model directory.
    pub fn checked_model_path(&self, name: &str) -> Result<&str> {
        let path = self.model_path.as_deref().ok_or_else(|| {
            GenriskError::serialization(format!("flavor `{name}` lacks a model path"))
        })?;
        if !is_contained_relative(path) {
            return Err(GenriskError::serialization(format!(
                "flavor `{name}` model path `{path}` is not reachable from the artifact path"
            )));
        }
        Ok(path)
    }
}

fn take_string(fields: &mut BTreeMap<String, Value>, key: &str) -> Option<String> {
    if !fields.get(key).is_some_and(Value::is_string) {
        return None;
    }
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// True for a non-empty relative path that never climbs above its starting directory.
pub(crate) fn is_contained_relative(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    let mut depth: usize = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(yaml: &str) -> BTreeMap<String, Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_python_function_flavor() {
        let flavor = FlavorDescriptor::from_fields(fields(
            "env: conda.yaml\nloader_module: mlflow.sklearn\nmodel_path: model.pkl\npython_version: 3.8.10\n",
        ));
        assert_eq!(flavor.env.as_deref(), Some("conda.yaml"));
        assert_eq!(flavor.loader_module.as_deref(), Some("mlflow.sklearn"));
        assert_eq!(flavor.model_path.as_deref(), Some("model.pkl"));
        assert_eq!(flavor.model_path_key, ModelPathKey::ModelPath);
        assert_eq!(
            flavor.library_version,
            Some(LibraryVersion { key: "python_version".into(), version: "3.8.10".into() })
        );
        assert!(flavor.extra.is_empty());
    }

    #[test]
    fn test_sklearn_flavor_keeps_pickled_model_key() {
        let source =
            "code: null\npickled_model: model.pkl\nserialization_format: cloudpickle\nsklearn_version: 0.23.2\n";
        let flavor = FlavorDescriptor::from_fields(fields(source));
        assert_eq!(flavor.model_path_key, ModelPathKey::PickledModel);
        assert_eq!(flavor.extra.len(), 2);
        assert_eq!(flavor.extra["code"], Value::Null);
        let expected: Mapping = serde_yaml::from_str(source).unwrap();
        assert_eq!(flavor.to_mapping(), expected);
    }

    #[test]
    fn test_non_string_env_stays_in_extra() {
        let flavor = FlavorDescriptor::from_fields(fields(
            "env:\n  conda: conda.yaml\n  virtualenv: python_env.yaml\nmodel_path: model.pkl\n",
        ));
        assert_eq!(flavor.env, None);
        assert!(flavor.extra["env"].is_mapping());
    }

    #[test]
    fn test_extra_clashing_with_typed_fields() {
        let base = FlavorDescriptor::new("model.pkl").with_library_version("sklearn_version", "0.23.2");
        base.check_extra("sklearn").unwrap();
        base.clone()
            .with_extra("env", Value::Mapping(Mapping::new()))
            .check_extra("sklearn")
            .unwrap();
        base.clone()
            .with_extra("zlib_version", "1.2".into())
            .check_extra("sklearn")
            .unwrap();

        for (key, value) in [
            ("env", Value::from("conda.yaml")),
            ("model_path", Value::from("other.pkl")),
            ("sklearn_version", Value::from("1.0")),
            ("numpy_version", Value::from("1.19")),
        ] {
            let err = base.clone().with_extra(key, value).check_extra("sklearn").unwrap_err();
            assert!(matches!(err, GenriskError::Serialization(_)), "{key}");
        }

        let pickled = FlavorDescriptor::new("model.pkl")
            .with_model_path_key(ModelPathKey::PickledModel)
            .with_extra("model_path", "other.pkl".into());
        assert!(pickled.check_extra("sklearn").is_err());
    }

    #[test]
    fn test_missing_model_path() {
        let flavor = FlavorDescriptor::default();
        let err = flavor.checked_model_path("sklearn").unwrap_err();
        assert!(matches!(err, GenriskError::Serialization(_)));
    }

    #[test]
    fn test_model_path_must_stay_inside() {
        assert!(FlavorDescriptor::new("model.pkl").checked_model_path("f").is_ok());
        assert!(FlavorDescriptor::new("data/../model.pkl").checked_model_path("f").is_ok());
        assert!(FlavorDescriptor::new("../model.pkl").checked_model_path("f").is_err());
        assert!(FlavorDescriptor::new("/tmp/model.pkl").checked_model_path("f").is_err());
        assert!(FlavorDescriptor::new("").checked_model_path("f").is_err());
        assert!(FlavorDescriptor::new(".").checked_model_path("f").is_err());
    }
}
