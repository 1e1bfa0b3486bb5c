//! Test helpers for writing synthetic cities and layering overrides.

use super::*;
use crate::score::ScoreConfig;
use nuisance_data::{SyntheticConfig, write_synthetic_city};
use tempfile::TempDir;

/// Properties generated for CLI tests; enough for both outcome classes.
pub(super) const TEST_PROPERTIES: usize = 120;

/// A synthetic city written into a private temporary directory.
#[derive(Debug)]
pub(super) struct CityWorkspace {
    _dir: TempDir,
    root: Utf8PathBuf,
    city: Utf8PathBuf,
}

impl CityWorkspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        let config = SyntheticConfig {
            properties: TEST_PROPERTIES,
            ..SyntheticConfig::default()
        };
        let city = write_synthetic_city(&root.join("city"), &config).expect("write city");
        Self {
            _dir: dir,
            root,
            city,
        }
    }

    pub(super) fn city(&self) -> &Utf8Path {
        &self.city
    }

    pub(super) fn artefacts(&self) -> Utf8PathBuf {
        self.root.join("artefacts")
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

/// Values supplied by a configuration file or the environment.
#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) city: Option<Utf8PathBuf>,
    pub(super) epoch: Option<String>,
}

/// Fill unset CLI values from the environment layer, then the file layer.
pub(super) fn merge_layers(
    mut cli_args: score::ScoreArgs,
    file_layer: Option<LayerOverrides>,
    env_layer: Option<LayerOverrides>,
) -> Result<ScoreConfig, CliError> {
    merge_field(
        &mut cli_args.city,
        extract_field(env_layer.as_ref(), |layer| &layer.city),
        extract_field(file_layer.as_ref(), |layer| &layer.city),
    );
    merge_field(
        &mut cli_args.epoch,
        extract_field(env_layer.as_ref(), |layer| &layer.epoch),
        extract_field(file_layer.as_ref(), |layer| &layer.epoch),
    );
    ScoreConfig::try_from(cli_args)
}

fn merge_field<T: Clone>(target: &mut Option<T>, env_value: Option<T>, file_value: Option<T>) {
    if target.is_none()
        && let Some(value) = env_value.or(file_value)
    {
        *target = Some(value);
    }
}

fn extract_field<T: Clone>(
    layer: Option<&LayerOverrides>,
    accessor: fn(&LayerOverrides) -> &Option<T>,
) -> Option<T> {
    layer.and_then(|entry| accessor(entry).clone())
}
