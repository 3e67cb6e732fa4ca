use serde::Serialize;

use crate::error::{HarnessError, Result};

/// Figures extracted from one successful load generator run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub failed_requests: u64,
    pub requests_per_second: f64,
    pub time_per_request_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_requests: Option<u64>,
}

impl Metrics {
    pub fn new(requests_per_second: f64, time_per_request_ms: f64, failed_requests: u64) -> Self {
        Self {
            failed_requests,
            requests_per_second,
            time_per_request_ms,
            complete_requests: None,
        }
    }
}

pub trait ResultParser: Send + Sync {
    fn parse(&self, stdout: &str) -> Result<Metrics>;
}

/// Reads the summary ApacheBench prints on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbParser;

const COMPLETE_REQUESTS: &str = "Complete requests";
const FAILED_REQUESTS: &str = "Failed requests";
const REQUESTS_PER_SECOND: &str = "Requests per second";
const TIME_PER_REQUEST: &str = "Time per request";

impl ResultParser for AbParser {
    fn parse(&self, stdout: &str) -> Result<Metrics> {
        let mut complete = None;
        let mut failed = None;
        let mut rps = None;
        let mut time_mean = None;

        for line in stdout.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                COMPLETE_REQUESTS => complete = Some(number::<u64>(COMPLETE_REQUESTS, value)?),
                FAILED_REQUESTS => failed = Some(number::<u64>(FAILED_REQUESTS, value)?),
                REQUESTS_PER_SECOND => rps = Some(number::<f64>(REQUESTS_PER_SECOND, value)?),
                // ab prints this twice; the per-request mean is the one
                // without "across all concurrent requests".
                TIME_PER_REQUEST if value.ends_with("(mean)") => {
                    time_mean = Some(number::<f64>(TIME_PER_REQUEST, value)?)
                }
                _ => {}
            }
        }

        Ok(Metrics {
            failed_requests: failed.ok_or_else(|| missing(FAILED_REQUESTS))?,
            requests_per_second: rps.ok_or_else(|| missing(REQUESTS_PER_SECOND))?,
            time_per_request_ms: time_mean.ok_or_else(|| missing(TIME_PER_REQUEST))?,
            complete_requests: complete,
        })
    }
}

fn number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    let token = value.split_whitespace().next().unwrap_or_default();
    token
        .parse()
        .map_err(|_| HarnessError::ParseFailure(format!("{field}: '{token}' is not a number")))
}

fn missing(field: &str) -> HarnessError {
    HarnessError::ParseFailure(format!("'{field}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AB_OUTPUT: &str = "\
This is ApacheBench, Version 2.3 <$Revision: 1903618 $>

Server Software:        uvicorn
Server Hostname:        127.0.0.1
Server Port:            8000

Document Path:          /items/
Document Length:        22 bytes

Concurrency Level:      100
Time taken for tests:   0.078 seconds
Complete requests:      100
Failed requests:        3
   (Connect: 0, Receive: 0, Length: 3, Exceptions: 0)
Total transferred:      16700 bytes
Total body sent:        23400
HTML transferred:       2200 bytes
Requests per second:    1280.72 [#/sec] (mean)
Time per request:       78.081 [ms] (mean)
Time per request:       0.781 [ms] (mean, across all concurrent requests)
Transfer rate:          208.87 [Kbytes/sec] received
";

    #[test]
    fn parses_apachebench_summary() {
        let metrics = AbParser.parse(AB_OUTPUT).unwrap();
        assert_eq!(metrics.failed_requests, 3);
        assert_eq!(metrics.requests_per_second, 1280.72);
        assert_eq!(metrics.time_per_request_ms, 78.081);
        assert_eq!(metrics.complete_requests, Some(100));
    }

    #[test]
    fn missing_field_is_parse_failure() {
        let truncated = AB_OUTPUT.replace("Requests per second", "Requests/s");
        let err = AbParser.parse(&truncated).unwrap_err();
        assert!(matches!(err, HarnessError::ParseFailure(ref msg) if msg.contains("Requests per second")));
    }

    #[test]
    fn garbage_number_is_parse_failure() {
        let broken = AB_OUTPUT.replace("1280.72", "fast");
        assert!(matches!(
            AbParser.parse(&broken),
            Err(HarnessError::ParseFailure(_))
        ));
    }

    #[test]
    fn empty_output_is_parse_failure() {
        assert!(AbParser.parse("").is_err());
    }
}
