use std::{fmt::Display, path::Path, time::Duration};

use log::{debug, error, info, warn};

use crate::error::HarnessError;

pub struct HarnessLogger;

impl HarnessLogger {
    pub fn running_command(config: &str, command: &str) {
        info!("Running command [{config}] {command}");
    }

    pub fn non_zero_exit(config: &str, code: i32, stderr: &str) {
        error!("[{config}] load generator failed with exit code {code} (non-zero exit)");
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            error!("[{config}] stderr: {stderr}");
        }
    }

    pub fn configuration_skipped(config: &str, err: &HarnessError) {
        warn!("[{config}] skipped ({}): {err}", err.kind());
    }

    pub fn batch_abandoned(config: &str, timeout: Duration, skipped: &[&str]) {
        error!("[{config}] timed out after {timeout:?} (execution timeout), abandoning batch");
        for name in skipped {
            warn!("[{name}] not attempted (execution timeout earlier in batch)");
        }
    }

    pub fn run_parsed(config: &str, rps: f64, mean_ms: f64, failed: u64) {
        debug!("[{config}] rps={rps:.2} mean={mean_ms:.3}ms failed={failed}");
    }

    #[cfg(feature = "verbose")]
    pub fn raw_output(config: &str, stdout: &str) {
        debug!("[{config}] raw output:\n{stdout}");
    }

    pub fn raw_results_unavailable(path: &Path, err: &dyn Display) {
        warn!("Raw results file {} unavailable: {err}", path.display());
    }

    pub fn pre_warm(instance: &str, url: &str) {
        info!("Pre-warming {instance} ({url})");
    }

    pub fn pass_started(pass: u32, passes: u32, instance: &str, url: &str) {
        info!("Pass {}/{} of {instance} ({url})", pass + 1, passes);
    }

    pub fn pass_missing(instance: &str, pass: u32) {
        warn!("{instance}: pass {} produced no metrics", pass + 1);
    }

    pub fn passes_abandoned(instance: &str, remaining: u32) {
        if remaining > 0 {
            warn!("{instance}: skipping {remaining} remaining pass(es) after timeout");
        }
    }

    pub fn no_data(instance: &str) {
        warn!("{instance}: no successful passes, reporting N/A");
    }

    pub fn baseline_unusable(baseline: &str, metric: &str) {
        warn!("Baseline {baseline} has no usable {metric} average, deltas reported as N/A");
    }
}
