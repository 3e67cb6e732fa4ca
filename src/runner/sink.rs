use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::runner::parser::Metrics;

const HEADER: [&str; 4] = [
    "config",
    "failed_requests",
    "requests_per_second",
    "time_per_request_ms",
];

#[derive(Serialize)]
struct RawResultRow<'a> {
    config: &'a str,
    failed_requests: u64,
    requests_per_second: f64,
    time_per_request_ms: f64,
}

/// CSV file holding the parsed metrics of one coordinator run. Creating it
/// truncates whatever a previous run left behind; it is flushed and closed
/// when the run ends.
pub struct RawResultSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl RawResultSink {
    pub fn create(path: &Path) -> csv::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(HEADER)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, config: &str, metrics: &Metrics) -> csv::Result<()> {
        self.writer.serialize(RawResultRow {
            config,
            failed_requests: metrics.failed_requests,
            requests_per_second: metrics.requests_per_second,
            time_per_request_ms: metrics.time_per_request_ms,
        })
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
