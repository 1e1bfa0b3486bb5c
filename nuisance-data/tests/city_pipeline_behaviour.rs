//! Behavioural tests for loading, scoring and exporting a city on disk.

use std::cell::RefCell;

use camino::Utf8PathBuf;
use nuisance_core::test_support::FixedModel;
use nuisance_core::{
    CancellationToken, ChangeMonitor, Epoch, EpochRequest, FeatureBuilder, MemoryStateStore,
    Orchestrator, ScoringEngine, ScoringInputs,
};
use nuisance_data::{
    CityConfig, DatasetError, FileRecordProvider, SyntheticConfig, export_epoch,
    write_synthetic_city,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

/// Shared state for city pipeline scenarios.
struct CityWorld {
    temp_dir: TempDir,
    config_path: RefCell<Option<Utf8PathBuf>>,
    model: RefCell<Option<FixedModel>>,
    store: RefCell<MemoryStateStore>,
    load_error: RefCell<Option<DatasetError>>,
}

#[fixture]
fn world() -> CityWorld {
    CityWorld {
        temp_dir: TempDir::new().unwrap_or_else(|err| panic!("create temp dir: {err}")),
        config_path: RefCell::new(None),
        model: RefCell::new(None),
        store: RefCell::new(MemoryStateStore::default()),
        load_error: RefCell::new(None),
    }
}

impl CityWorld {
    fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.temp_dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non UTF-8 path: {}", path.display()))
    }

    fn output_dir(&self) -> Utf8PathBuf {
        self.root().join("out")
    }

    fn config(&self) -> CityConfig {
        let path = self
            .config_path
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("no city was written"));
        CityConfig::load(&path).unwrap_or_else(|err| panic!("load city: {err}"))
    }

    fn read_output(&self, name: &str) -> String {
        let path = self.output_dir().join(name);
        std::fs::read_to_string(path.as_std_path())
            .unwrap_or_else(|err| panic!("read {path}: {err}"))
    }
}

#[given("a synthetic city of {count} properties on disk")]
fn given_city(world: &CityWorld, count: usize) {
    let config = SyntheticConfig {
        properties: count,
        ..SyntheticConfig::default()
    };
    let path = write_synthetic_city(&world.root(), &config)
        .unwrap_or_else(|err| panic!("write synthetic city: {err}"));
    world.config_path.replace(Some(path));
}

#[given("the complaints dataset has been deleted")]
fn given_deleted(world: &CityWorld) {
    let path = world.root().join("complaints.jsonl");
    if let Err(err) = std::fs::remove_file(path.as_std_path()) {
        panic!("delete {path}: {err}");
    }
}

#[when("epoch {epoch} is scored with {id} at {score}")]
fn when_scored(world: &CityWorld, epoch: String, id: String, score: f64) {
    let config = world.config();
    let provider = FileRecordProvider::from_config(&config)
        .unwrap_or_else(|err| panic!("load datasets: {err}"));
    let features = FeatureBuilder::new(config.features.clone())
        .unwrap_or_else(|err| panic!("feature config: {err}"));
    let mut model_slot = world.model.borrow_mut();
    let model =
        model_slot.get_or_insert_with(|| FixedModel::new(features.schema().clone()));
    model.set_score(&id, score);

    let schema_map = config.schema_map();
    let monitor = ChangeMonitor::new(config.monitor);
    let inputs = ScoringInputs {
        provider: &provider,
        schema_map: &schema_map,
        features: &features,
        model: &*model,
        thresholds: &config.thresholds,
        monitor: &monitor,
    };
    let request = EpochRequest {
        epoch: Epoch::new(epoch),
        as_of: SyntheticConfig::default().as_of,
        property_ids: provider.property_ids(),
    };
    let orchestrator = Orchestrator::new(config.orchestrator)
        .unwrap_or_else(|err| panic!("orchestrator config: {err}"));
    let outcome = ScoringEngine::new(orchestrator)
        .run_and_commit(
            &mut *world.store.borrow_mut(),
            &request,
            &inputs,
            &CancellationToken::new(),
        )
        .unwrap_or_else(|err| panic!("score epoch: {err}"));
    export_epoch(
        &world.output_dir(),
        &config.city_name,
        &outcome,
        &config.thresholds,
    )
    .unwrap_or_else(|err| panic!("export epoch: {err}"));
}

#[when("the datasets are loaded")]
fn when_loaded(world: &CityWorld) {
    if let Err(err) = FileRecordProvider::from_config(&world.config()) {
        world.load_error.replace(Some(err));
    }
}

#[then("{count} scores are exported for epoch {epoch}")]
fn then_scores(world: &CityWorld, count: usize, epoch: String) {
    let scores = world.read_output(&format!("scores_{epoch}.jsonl"));
    assert_eq!(scores.lines().count(), count);
}

#[then("{count} property is exported as high risk for epoch {epoch}")]
fn then_high_risk(world: &CityWorld, count: usize, epoch: String) {
    let high_risk = world.read_output(&format!("high_risk_{epoch}.jsonl"));
    assert_eq!(high_risk.lines().count(), count);
}

#[then("the summary for epoch {epoch} counts low {low}, medium {medium}, high {high}")]
fn then_summary(world: &CityWorld, epoch: String, low: u64, medium: u64, high: u64) {
    let summary: serde_json::Value =
        serde_json::from_str(&world.read_output(&format!("report_{epoch}.json")))
            .unwrap_or_else(|err| panic!("summary is not JSON: {err}"));
    let counts: Vec<(String, u64)> = summary["categories"]
        .as_array()
        .unwrap_or_else(|| panic!("categories missing from {summary}"))
        .iter()
        .map(|entry| {
            (
                entry["category"].as_str().unwrap_or_default().to_owned(),
                entry["properties"].as_u64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        counts,
        vec![
            ("low".to_owned(), low),
            ("medium".to_owned(), medium),
            ("high".to_owned(), high),
        ]
    );
}

#[then("epoch {epoch} exported {count} alerts")]
fn then_alerts(world: &CityWorld, epoch: String, count: usize) {
    let alerts = world.read_output(&format!("alerts_{epoch}.jsonl"));
    assert_eq!(alerts.lines().count(), count);
}

#[then("loading fails because a dataset cannot be opened")]
fn then_open_failure(world: &CityWorld) {
    assert!(matches!(
        world.load_error.borrow().as_ref(),
        Some(DatasetError::Open { .. })
    ));
}

#[scenario(path = "tests/features/city_pipeline.feature", index = 0)]
fn scoring_exports_every_score(world: CityWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/city_pipeline.feature", index = 1)]
fn unchanged_city_raises_no_alerts(world: CityWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/city_pipeline.feature", index = 2)]
fn escalations_are_exported(world: CityWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/city_pipeline.feature", index = 3)]
fn missing_dataset_is_fatal(world: CityWorld) {
    let _ = world;
}
