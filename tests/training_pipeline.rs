mod support;

use irisml::app_dirs;
use irisml::artifacts::ArtifactStore;
use irisml::config::{Params, ServeConfig};
use irisml::dataset::load_iris;
use irisml::ml::classifier::{Classifier, LoadedModel};
use irisml::training::run_training;
use support::irisml_env::IrismlHomeGuard;
use tempfile::tempdir;

#[test]
fn same_params_give_identical_evaluation() {
    let dir = tempdir().unwrap();
    let iris = load_iris().unwrap();
    let params = Params::default();

    let first_store = ArtifactStore::new(dir.path().join("first"));
    let second_store = ArtifactStore::new(dir.path().join("second"));
    let first = run_training(&iris, &params, &first_store).unwrap();
    let second = run_training(&iris, &params, &second_store).unwrap();

    assert_eq!(first.accuracy, second.accuracy);
    assert_eq!(first.confusion, second.confusion);
    assert_eq!(first.model, second.model);
    assert_eq!(first.model_digest, second.model_digest);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(
        std::fs::read_to_string(first_store.confusion_matrix_path()).unwrap(),
        std::fs::read_to_string(second_store.confusion_matrix_path()).unwrap()
    );
}

#[test]
fn training_under_project_root_feeds_the_server() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("params.toml"),
        "n_estimators = 50\nmax_depth = 4\n",
    )
    .unwrap();
    let _guard = IrismlHomeGuard::set_home(dir.path().to_path_buf());

    let params = Params::load(&Params::default_path().unwrap()).unwrap();
    assert_eq!(params.n_estimators, 50);
    assert_eq!(params.train_size, 0.8);

    let store = ArtifactStore::from_project_root().unwrap();
    let outcome = run_training(&load_iris().unwrap(), &params, &store).unwrap();
    assert!(outcome.accuracy > 0.85, "accuracy {}", outcome.accuracy);

    let run_id = std::fs::read_to_string(dir.path().join("artifacts/latest_run.txt")).unwrap();
    assert!(!run_id.trim().is_empty());

    let serve = ServeConfig::from_env().unwrap();
    assert_eq!(serve.model_path, dir.path().join("artifacts").join("model.json"));
    let model = LoadedModel::load_or_stub(&serve.model_path).unwrap();
    assert_eq!(model.kind(), "trained");
    assert_eq!(model.predict_class(&[5.1, 3.5, 1.4, 0.2]), 0);
    let proba = model.predict_proba(&[5.1, 3.5, 1.4, 0.2]).unwrap();
    assert_eq!(proba.len(), 3);
    assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn missing_params_file_is_an_error() {
    let dir = tempdir().unwrap();
    let _guard = IrismlHomeGuard::set_home(dir.path().to_path_buf());
    let path = Params::default_path().unwrap();
    assert!(Params::load(&path).is_err());
}

#[test]
fn home_variable_sets_the_project_root() {
    let dir = tempdir().unwrap();
    let _guard = IrismlHomeGuard::set_home(dir.path().to_path_buf());
    assert_eq!(app_dirs::project_root().unwrap(), dir.path());
}

#[test]
fn blank_home_falls_back_to_current_dir() {
    let _guard = IrismlHomeGuard::set_home(std::path::PathBuf::from("  "));
    assert_eq!(
        app_dirs::project_root().unwrap(),
        std::env::current_dir().unwrap()
    );
}
