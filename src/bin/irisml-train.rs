//! Train the Iris random forest and write every artifact.

use irisml::artifacts::ArtifactStore;
use irisml::config::Params;
use irisml::dataset::load_iris;
use irisml::features::CLASS_NAMES;
use irisml::logging;
use irisml::training::{TrainError, TrainingOutcome, run_training};

fn main() {
    if let Some(flag) = std::env::args().nth(1) {
        if flag == "-h" || flag == "--help" {
            println!("{}", help_text());
            return;
        }
        eprintln!("Unknown argument: {flag}\n\n{}", help_text());
        std::process::exit(1);
    }
    logging::init_or_stdout("train");
    if let Err(err) = run() {
        tracing::error!("training failed: {err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), TrainError> {
    let params = Params::load(&Params::default_path()?)?;
    let store = ArtifactStore::from_project_root()?;
    let dataset = load_iris()?;
    let outcome = run_training(&dataset, &params, &store)?;
    print_outcome(&outcome, &store);
    Ok(())
}

fn print_outcome(outcome: &TrainingOutcome, store: &ArtifactStore) {
    println!("run id: {}", outcome.run_id);
    println!("test accuracy: {:.4}", outcome.accuracy);
    for (idx, stats) in outcome.report.per_class.iter().enumerate() {
        println!(
            "class {:>2} {:<12}  precision={:.3}  recall={:.3}  f1={:.3}  support={}",
            idx,
            CLASS_NAMES.get(idx).copied().unwrap_or("?"),
            stats.precision,
            stats.recall,
            stats.f1,
            stats.support
        );
    }
    println!("confusion matrix (rows=true, cols=pred):");
    let cm = &outcome.confusion;
    for truth in 0..cm.n_classes {
        let mut row = String::new();
        for pred in 0..cm.n_classes {
            row.push_str(&format!("{:6}", cm.get(truth, pred)));
        }
        println!("{row}");
    }
    println!("artifacts written to {}", store.dir().display());
}

fn help_text() -> &'static str {
    "Usage: irisml-train\n\n\
Trains a random forest on the Iris dataset using params.toml from the\n\
project root (IRISML_HOME or the current directory) and writes model.json,\n\
confusion_matrix.csv, classification_report.csv, latest_run.txt and\n\
runs.jsonl into artifacts/.\n"
}
