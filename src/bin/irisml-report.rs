//! Write the data-quality report for the Iris train/test split.

use irisml::dataset::load_iris;
use irisml::logging;
use irisml::report::{DataQualityReport, ReportError, default_report_path};
use tracing::info;

fn main() {
    if let Some(flag) = std::env::args().nth(1) {
        if flag == "-h" || flag == "--help" {
            println!("Usage: irisml-report\n\nWrites reports/data_quality_report.html under the project root.");
            return;
        }
        eprintln!("Unknown argument: {flag}");
        std::process::exit(1);
    }
    logging::init_or_stdout("report");
    if let Err(err) = run() {
        tracing::error!("report failed: {err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ReportError> {
    let dataset = load_iris()?;
    let report = DataQualityReport::build(&dataset)?;
    info!(train = ?report.train_shape, test = ?report.test_shape, "split shapes");
    info!(columns = ?report.columns, "columns");
    info!(
        train = report.missing_train,
        test = report.missing_test,
        "missing values"
    );
    for (column, dtype) in &report.dtypes {
        info!(%column, dtype, "column dtype");
    }

    let path = default_report_path()?;
    report.write_html(&path)?;
    info!(path = %path.display(), "data quality report written");
    println!("Wrote {}", path.display());
    Ok(())
}
