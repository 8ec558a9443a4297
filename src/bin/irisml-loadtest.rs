//! Drive concurrent prediction requests against a running server.

use irisml::loadtest::{
    DEFAULT_BASE_URL, LoadTestError, LoadTestResults, LoadTester, SCENARIO_PAUSE, Scenario,
    current_rss_mib, default_scenarios,
};

#[derive(Debug, Clone)]
struct CliOptions {
    base_url: String,
    quick: bool,
}

fn main() {
    let options = match parse_args(std::env::args().skip(1).collect()) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = run(&options) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(options: &CliOptions) -> Result<(), LoadTestError> {
    println!("Prediction server load test");
    println!("{}", "=".repeat(50));
    let initial_rss = current_rss_mib();
    match initial_rss {
        Some(rss) => println!("Initial memory usage: {rss:.2} MB (RSS)"),
        None => println!("Memory usage unavailable; skipping memory monitoring."),
    }

    let tester = LoadTester::new(&options.base_url)?;
    let scenarios: Vec<Scenario> = if options.quick {
        default_scenarios().into_iter().take(1).collect()
    } else {
        default_scenarios()
    };

    let mut all_results: Vec<(String, LoadTestResults)> = Vec::new();
    for (idx, scenario) in scenarios.iter().enumerate() {
        println!(
            "\nStarting {} load: {} requests, {} concurrent workers",
            scenario.name, scenario.requests, scenario.concurrency
        );
        println!("Target: {}", tester.predict_url());
        println!("{}", "-".repeat(50));
        let results = tester.run_scenario(scenario, |done, total| {
            let pct = done as f64 / total as f64 * 100.0;
            println!("Progress: {done}/{total} ({pct:.1}%)");
        })?;
        println!("{}", results.render());
        all_results.push((scenario.name.clone(), results));

        if !options.quick && idx + 1 < scenarios.len() {
            println!("\nWaiting {}s before the next scenario...", SCENARIO_PAUSE.as_secs());
            std::thread::sleep(SCENARIO_PAUSE);
        }
    }

    println!("\n{}\nSummary\n{}", "=".repeat(20), "=".repeat(20));
    for (name, results) in &all_results {
        println!("\n{name}:");
        println!("  success rate: {:.1}%", results.success_rate);
        println!("  throughput:   {:.1} req/s", results.requests_per_second);
        println!("  mean latency: {:.1} ms", results.response_times.mean_ms);
    }

    if let (Some(before), Some(after)) = (initial_rss, current_rss_mib()) {
        println!("\nMemory usage change: {:+.2} MB", after - before);
    }
    println!("\nLoad test complete.");
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut options = CliOptions {
        base_url: DEFAULT_BASE_URL.to_string(),
        quick: false,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--url" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--url requires a value".to_string())?;
                options.base_url = value.clone();
            }
            "--quick" => options.quick = true,
            other => return Err(format!("Unknown argument: {other}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn help_text() -> &'static str {
    "Usage: irisml-loadtest [options]\n\n\
Options:\n\
  --url <base>   Server base URL (default: http://127.0.0.1:8001)\n\
  --quick        Run only the light scenario\n\
  -h, --help     Show this help\n"
}
