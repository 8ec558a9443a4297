//! Concurrent load generator for the prediction server.
//!
//! Each scenario sends a fixed number of `POST /predict` requests from a
//! fixed-size pool of worker threads. Every request picks one of
//! [`SAMPLE_REQUESTS`] at random.

mod client;
mod stats;

pub use client::{REQUEST_TIMEOUT, RequestOutcome};
pub use stats::ResponseTimeStats;

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rand::seq::IndexedRandom;
use serde::Serialize;
use thiserror::Error;

use crate::features::FeatureVector;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8001";
/// Pause between consecutive scenarios.
pub const SCENARIO_PAUSE: Duration = Duration::from_secs(5);
/// Completed-request interval between progress lines.
pub const PROGRESS_EVERY: usize = 10;
/// Errors kept in the results.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Canonical request bodies: two setosa, two versicolor, one virginica.
pub const SAMPLE_REQUESTS: [FeatureVector; 5] = [
    FeatureVector {
        sepal_length: 5.1,
        sepal_width: 3.5,
        petal_length: 1.4,
        petal_width: 0.2,
    },
    FeatureVector {
        sepal_length: 6.3,
        sepal_width: 3.3,
        petal_length: 4.7,
        petal_width: 1.6,
    },
    FeatureVector {
        sepal_length: 7.7,
        sepal_width: 2.6,
        petal_length: 6.9,
        petal_width: 2.3,
    },
    FeatureVector {
        sepal_length: 4.9,
        sepal_width: 3.0,
        petal_length: 1.4,
        petal_width: 0.2,
    },
    FeatureVector {
        sepal_length: 6.7,
        sepal_width: 3.1,
        petal_length: 4.4,
        petal_width: 1.4,
    },
];

#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error("invalid base URL {0:?}: expected http:// or https://")]
    InvalidUrl(String),
    #[error("scenario {0:?} must have at least one request and one worker")]
    EmptyScenario(String),
}

/// One load level.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Scenario {
    pub name: String,
    pub requests: usize,
    pub concurrency: usize,
}

impl Scenario {
    pub fn new(name: &str, requests: usize, concurrency: usize) -> Self {
        Self {
            name: name.to_string(),
            requests,
            concurrency,
        }
    }
}

/// Light, medium and heavy load.
pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("light", 50, 5),
        Scenario::new("medium", 200, 20),
        Scenario::new("heavy", 500, 50),
    ]
}

/// A failed request, as kept in the results.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestError {
    pub request_id: usize,
    pub status_code: Option<u16>,
    pub error: String,
}

/// Aggregated outcome of one scenario.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadTestResults {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    /// Percentage, `0..=100`.
    pub success_rate: f64,
    pub total_time_secs: f64,
    pub requests_per_second: f64,
    pub response_times: ResponseTimeStats,
    /// The first [`MAX_REPORTED_ERRORS`] failures, in completion order.
    pub errors: Vec<RequestError>,
}

impl LoadTestResults {
    /// Summarize request outcomes collected over `elapsed`.
    pub fn analyze(outcomes: &[RequestOutcome], elapsed: Duration) -> Self {
        let total_requests = outcomes.len();
        let success_times: Vec<f64> = outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .map(|outcome| outcome.response_time_ms)
            .collect();
        let successful_requests = success_times.len();
        let errors: Vec<RequestError> = outcomes
            .iter()
            .filter_map(|outcome| {
                outcome.error.as_ref().map(|error| RequestError {
                    request_id: outcome.request_id,
                    status_code: outcome.status_code,
                    error: error.clone(),
                })
            })
            .take(MAX_REPORTED_ERRORS)
            .collect();
        let total_time_secs = elapsed.as_secs_f64();
        Self {
            total_requests,
            successful_requests,
            failed_requests: total_requests - successful_requests,
            success_rate: if total_requests > 0 {
                successful_requests as f64 / total_requests as f64 * 100.0
            } else {
                0.0
            },
            total_time_secs,
            requests_per_second: if total_time_secs > 0.0 {
                total_requests as f64 / total_time_secs
            } else {
                0.0
            },
            response_times: ResponseTimeStats::from_samples(&success_times),
            errors,
        }
    }

    /// Human-readable result block.
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let rt = &self.response_times;
        let mut out = String::new();
        let _ = writeln!(out, "\n{rule}\nLoad test results\n{rule}");
        let _ = writeln!(out, "Total requests:      {}", self.total_requests);
        let _ = writeln!(out, "Successful requests: {}", self.successful_requests);
        let _ = writeln!(out, "Failed requests:     {}", self.failed_requests);
        let _ = writeln!(out, "Success rate:        {:.2}%", self.success_rate);
        let _ = writeln!(out, "Total time:          {:.2}s", self.total_time_secs);
        let _ = writeln!(out, "Throughput:          {:.2} req/s", self.requests_per_second);
        let _ = writeln!(out, "\nResponse times (ms):");
        let _ = writeln!(out, "  mean:   {:.2}", rt.mean_ms);
        let _ = writeln!(out, "  median: {:.2}", rt.median_ms);
        let _ = writeln!(out, "  min:    {:.2}", rt.min_ms);
        let _ = writeln!(out, "  max:    {:.2}", rt.max_ms);
        let _ = writeln!(out, "  p95:    {:.2}", rt.p95_ms);
        if !self.errors.is_empty() {
            let _ = writeln!(out, "\nErrors (first {MAX_REPORTED_ERRORS}):");
            for error in &self.errors {
                let _ = writeln!(out, "  request {}: {}", error.request_id, error.error);
            }
        }
        out.push_str(&rule);
        out
    }
}

/// Sends prediction requests against one server.
#[derive(Debug)]
pub struct LoadTester {
    predict_url: String,
    agent: ureq::Agent,
}

impl LoadTester {
    pub fn new(base_url: &str) -> Result<Self, LoadTestError> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(LoadTestError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            predict_url: format!("{base}/predict"),
            agent: client::agent(),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Run one scenario to completion.
    ///
    /// `on_progress(completed, total)` is called on the calling thread every
    /// [`PROGRESS_EVERY`] completions.
    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<LoadTestResults, LoadTestError> {
        if scenario.requests == 0 || scenario.concurrency == 0 {
            return Err(LoadTestError::EmptyScenario(scenario.name.clone()));
        }
        let total = scenario.requests;
        let workers = scenario.concurrency.min(total);
        let next_id = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<RequestOutcome>();
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(total);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next_id = &next_id;
                scope.spawn(move || {
                    let mut rng = rand::rng();
                    loop {
                        let request_id = next_id.fetch_add(1, Ordering::Relaxed);
                        if request_id >= total {
                            break;
                        }
                        let features = SAMPLE_REQUESTS
                            .choose(&mut rng)
                            .unwrap_or(&SAMPLE_REQUESTS[0]);
                        let outcome =
                            client::post_predict(&self.agent, &self.predict_url, request_id, features);
                        if tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);
            for outcome in rx {
                outcomes.push(outcome);
                if outcomes.len() % PROGRESS_EVERY == 0 {
                    on_progress(outcomes.len(), total);
                }
            }
        });

        Ok(LoadTestResults::analyze(&outcomes, started.elapsed()))
    }
}

/// Resident set size of the current process, in MiB.
pub fn current_rss_mib() -> Option<f64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| process.memory() as f64 / 1024.0 / 1024.0)
}
