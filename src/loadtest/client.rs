//! HTTP client used by the load tester.

use std::time::{Duration, Instant};

use crate::features::FeatureVector;

/// Whole-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one `POST /predict`.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOutcome {
    pub request_id: usize,
    pub status_code: Option<u16>,
    pub response_time_ms: f64,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Build an agent with the load-test timeout.
pub fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build()
}

/// Send one prediction request and time it. Non-200 statuses and transport
/// failures become errors on the outcome.
pub fn post_predict(
    agent: &ureq::Agent,
    predict_url: &str,
    request_id: usize,
    features: &FeatureVector,
) -> RequestOutcome {
    let started = Instant::now();
    let result = agent.post(predict_url).send_json(features);
    let (status_code, error) = match result {
        Ok(response) => {
            let status = response.status();
            // Drain the body so the connection returns to the pool.
            let _ = response.into_string();
            if status == 200 {
                (Some(status), None)
            } else {
                (Some(status), Some(format!("HTTP {status}")))
            }
        }
        Err(ureq::Error::Status(status, _)) => (Some(status), Some(format!("HTTP {status}"))),
        Err(ureq::Error::Transport(transport)) => (None, Some(transport.to_string())),
    };
    RequestOutcome {
        request_id,
        status_code,
        response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_refused_is_reported_as_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let features = FeatureVector {
            sepal_length: 5.1,
            sepal_width: 3.5,
            petal_length: 1.4,
            petal_width: 0.2,
        };
        let outcome = post_predict(&agent(), &format!("http://{addr}/predict"), 7, &features);
        assert_eq!(outcome.request_id, 7);
        assert!(!outcome.is_success());
        assert_eq!(outcome.status_code, None);
    }
}
