//! genrisk-artifact - The model-run record left behind by a training run.
//!
//! A record is stored as an `MLmodel` YAML document next to the serialized
//! model. Its `signature.inputs` field is itself a JSON document embedded in
//! a YAML string, so reading is a two-stage parse.

pub mod document;
pub mod example;
pub mod flavor;
pub mod record;
pub mod signature;
pub mod store;

pub use document::{read, read_file, write, write_file, MLMODEL_FILE};
pub use example::InputExample;
pub use flavor::{FlavorDescriptor, LibraryVersion, ModelPathKey};
pub use record::{InputExampleInfo, ModelRunRecord, ModelRunRecordBuilder};
pub use signature::{ColumnSpec, ColumnType, ModelSignature};
pub use store::{RunStore, StoredRun};
