//! Record command - writes the model-run record for a finished training run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use genrisk_artifact::{
    example::{RECORDS_ORIENT, SPLIT_ORIENT},
    flavor::PYTHON_FUNCTION,
    ColumnSpec, FlavorDescriptor, InputExample, InputExampleInfo, ModelPathKey, ModelRunRecord,
    ModelSignature,
};
use genrisk_config::Config;
use tracing::{info, warn};

use super::open_store;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Model directory name inside the run's artifacts (default from genrisk.toml)
    #[arg(long)]
    pub artifact_path: Option<String>,

    /// Reuse an existing run id instead of generating one
    #[arg(long)]
    pub run_id: Option<String>,

    /// Flavor and its model file, as NAME=MODEL_FILE (repeatable)
    #[arg(long = "flavor", value_name = "NAME=MODEL_FILE", required = true)]
    pub flavors: Vec<String>,

    /// Loader module for the python_function flavor
    #[arg(long)]
    pub loader_module: Option<String>,

    /// Environment file for the python_function flavor
    #[arg(long)]
    pub env: Option<String>,

    /// Input feature, as NAME:TYPE (repeatable, in model input order)
    #[arg(long = "feature", value_name = "NAME:TYPE")]
    pub features: Vec<String>,

    /// Output column, as NAME:TYPE (repeatable)
    #[arg(long = "output", value_name = "NAME:TYPE")]
    pub outputs: Vec<String>,

    /// JSON input example (split or records orient) to store with the model
    #[arg(long)]
    pub input_example: Option<PathBuf>,
}

pub fn run(config: &Config, args: RecordArgs) -> Result<()> {
    let example = args.input_example.as_deref().map(ExampleFile::read).transpose()?;
    let record = build_record(config, &args, example.as_ref())?;

    if let (Some(example), Some(signature)) = (&example, &record.signature) {
        example.table.check(signature)?;
    }
    let files: Vec<(&str, &str)> = match (&example, &record.saved_input_example_info) {
        (Some(example), Some(info)) => vec![(info.artifact_path.as_str(), example.text.as_str())],
        _ => Vec::new(),
    };

    let store = open_store(config);
    let path = store.save_with(&record, &files)?;

    for (flavor, file) in store.verify(&record)? {
        warn!(flavor = %flavor, file = %file.display(), "Model file not in the model directory yet");
    }

    info!(run_id = record.run_id(), path = %path.display(), "Run recorded");
    println!("{}", record.run_id());
    Ok(())
}

/// An input example file, read once and parsed in its detected orient.
pub(crate) struct ExampleFile {
    text: String,
    orient: &'static str,
    table: InputExample,
}

impl ExampleFile {
    fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading input example {}", path.display()))?;
        let orient = if text.trim_start().starts_with('[') { RECORDS_ORIENT } else { SPLIT_ORIENT };
        let table = InputExample::from_json(&text, Some(orient))
            .with_context(|| format!("parsing input example {}", path.display()))?;
        Ok(Self { text, orient, table })
    }
}

pub(crate) fn build_record(
    config: &Config,
    args: &RecordArgs,
    example: Option<&ExampleFile>,
) -> Result<ModelRunRecord> {
    let artifact_path = args
        .artifact_path
        .clone()
        .unwrap_or_else(|| config.record.artifact_path.clone());
    let mut builder = ModelRunRecord::builder(artifact_path);
    if let Some(run_id) = &args.run_id {
        builder = builder.run_id(run_id.clone());
    }

    for spec in &args.flavors {
        let (name, model_file) = parse_flavor(spec)?;
        let mut flavor = FlavorDescriptor::new(model_file);
        if name == "sklearn" {
            flavor = flavor.with_model_path_key(ModelPathKey::PickledModel);
        }
        if name == PYTHON_FUNCTION {
            if let Some(loader) = &args.loader_module {
                flavor = flavor.with_loader_module(loader.clone());
            }
            if let Some(env) = &args.env {
                flavor = flavor.with_env(env.clone());
            }
        }
        builder = builder.flavor(name, flavor);
    }

    if !args.features.is_empty() {
        let inputs = parse_columns(&args.features)?;
        let mut signature = ModelSignature::new(inputs);
        if !args.outputs.is_empty() {
            signature = signature.with_outputs(parse_columns(&args.outputs)?);
        }
        builder = builder.signature(signature);
    } else if !args.outputs.is_empty() {
        bail!("--output needs at least one --feature");
    }

    if let Some(example) = example {
        let mut info = InputExampleInfo::dataframe(config.record.input_example_file.clone());
        info.pandas_orient = Some(example.orient.to_string());
        builder = builder.input_example(info);
    }

    Ok(builder.build()?)
}

fn parse_flavor(spec: &str) -> Result<(&str, &str)> {
    match spec.split_once('=') {
        Some((name, file)) if !name.trim().is_empty() && !file.trim().is_empty() => {
            Ok((name.trim(), file.trim()))
        }
        _ => bail!("expected NAME=MODEL_FILE, got `{spec}`"),
    }
}

fn parse_columns(specs: &[String]) -> Result<Vec<ColumnSpec>> {
    specs
        .iter()
        .map(|s| s.parse::<ColumnSpec>().with_context(|| format!("invalid column `{s}`")))
        .collect()
}
