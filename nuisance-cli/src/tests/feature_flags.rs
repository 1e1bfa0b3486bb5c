//! Unit tests covering feature-flag behaviour.

#![cfg(not(feature = "store-sqlite"))]

use super::helpers::CityWorkspace;
use super::*;
use crate::score::{ScoreConfig, score_with_model};
use nuisance_core::FeatureBuilder;
use nuisance_core::test_support::FixedModel;
use nuisance_data::CityConfig;
use rstest::rstest;

#[rstest]
fn scoring_requires_store_sqlite() {
    let workspace = CityWorkspace::new();
    let city = CityConfig::load(workspace.city()).expect("city loads");
    let schema = FeatureBuilder::new(city.features.clone())
        .expect("feature config")
        .schema()
        .clone();
    let config = ScoreConfig::from_parts(
        workspace.city().to_path_buf(),
        "2024-06".to_owned(),
        None,
        ArtefactPaths::resolve(Some(workspace.artefacts()), None, None, None),
    );

    let err = score_with_model(&city, &FixedModel::new(schema), &config)
        .expect_err("missing feature should error");
    match err {
        CliError::MissingFeature { feature, action } => {
            assert_eq!(feature, "store-sqlite");
            assert_eq!(action, "score");
        }
        other => panic!("expected MissingFeature, found {other:?}"),
    }
}
