//! Model artefact persistence.
//!
//! An artefact is a `bincode` header carrying [`MODEL_MAGIC`] and
//! [`MODEL_FORMAT_VERSION`], followed by the model parameters. The header is
//! checked before the parameters are decoded, so foreign files and future
//! formats are reported distinctly from corrupt ones.
#![forbid(unsafe_code)]

use std::io::BufReader;

use bincode::Options;
use camino::Utf8Path;
use log::info;
use nuisance_core::RiskModel;
use nuisance_fs::{open_utf8_file, write_atomic};
use serde::{Deserialize, Serialize};

use crate::error::{ModelLoadError, ModelSaveError};
use crate::logistic::LogisticModel;

/// Leading bytes of every model artefact.
pub const MODEL_MAGIC: [u8; 4] = *b"NRMD";
/// Artefact layout version written by [`save_model`].
pub const MODEL_FORMAT_VERSION: u16 = 1;

const MAX_ARTEFACT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct ArtefactHeader {
    magic: [u8; 4],
    format_version: u16,
}

/// Bincode options used for model artefacts.
fn bincode_options() -> impl Options + Copy {
    bincode::DefaultOptions::new().with_limit(MAX_ARTEFACT_BYTES)
}

/// Write `model` to `path`, replacing any existing file atomically.
///
/// The parent directory is created when missing.
///
/// # Errors
/// Returns [`ModelSaveError`] when serialisation or the write fails.
pub fn save_model(model: &LogisticModel, path: &Utf8Path) -> Result<(), ModelSaveError> {
    let header = ArtefactHeader {
        magic: MODEL_MAGIC,
        format_version: MODEL_FORMAT_VERSION,
    };
    let options = bincode_options();
    let mut bytes = Vec::new();
    options
        .serialize_into(&mut bytes, &header)
        .and_then(|()| options.serialize_into(&mut bytes, model))
        .map_err(|source| ModelSaveError::Serialise {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, &bytes).map_err(|source| ModelSaveError::WriteFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!("saved model {} to {path}", model.model_version());
    Ok(())
}

/// Read a model written by [`save_model`].
///
/// # Errors
/// Returns [`ModelLoadError`] when the file cannot be opened, is not a model
/// artefact, has an unsupported format version, or holds parameters that
/// fail to decode or validate.
pub fn load_model(path: &Utf8Path) -> Result<LogisticModel, ModelLoadError> {
    let file = open_utf8_file(path).map_err(|source| ModelLoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let options = bincode_options();
    let header: ArtefactHeader =
        options
            .deserialize_from(&mut reader)
            .map_err(|_| ModelLoadError::BadMagic {
                path: path.to_path_buf(),
            })?;
    if header.magic != MODEL_MAGIC {
        return Err(ModelLoadError::BadMagic {
            path: path.to_path_buf(),
        });
    }
    if header.format_version != MODEL_FORMAT_VERSION {
        return Err(ModelLoadError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: header.format_version,
            supported: MODEL_FORMAT_VERSION,
        });
    }
    let model: LogisticModel =
        options
            .deserialize_from(&mut reader)
            .map_err(|source| ModelLoadError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
    info!("loaded model {} from {path}", model.model_version());
    Ok(model)
}
