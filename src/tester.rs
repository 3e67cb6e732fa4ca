use serde::Serialize;

use crate::{
    compare::Metric,
    config::{ConfigSet, InstanceSpec, RunConfigPatch},
    error::{HarnessError, Result},
    logging::HarnessLogger,
    runner::{
        parser::{Metrics, ResultParser},
        process::Execute,
        RunCoordinator,
    },
};

pub const DEFAULT_PASSES: u32 = 1;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Metrics collected for one instance, one entry per successful pass.
/// Failed passes leave no entry, so `passes.len()` can be below `attempted`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceResult {
    pub spec: InstanceSpec,
    pub passes: Vec<Metrics>,
    pub attempted: u32,
}

impl InstanceResult {
    pub fn new(spec: InstanceSpec) -> Self {
        Self {
            spec,
            passes: Vec::new(),
            attempted: 0,
        }
    }

    pub fn with_passes(spec: InstanceSpec, passes: Vec<Metrics>) -> Self {
        let attempted = passes.len() as u32;
        Self {
            spec,
            passes,
            attempted,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.passes.iter().map(|pass| metric.value(pass)).collect()
    }
}

/// Measures single instances through a [`RunCoordinator`].
pub struct InstanceTester<E, P> {
    coordinator: RunCoordinator<E, P>,
    defaults: RunConfigPatch,
    host: String,
}

impl<E: Execute, P: ResultParser> InstanceTester<E, P> {
    pub fn new(coordinator: RunCoordinator<E, P>, defaults: RunConfigPatch) -> Self {
        Self {
            coordinator,
            defaults,
            host: DEFAULT_HOST.to_string(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The instance URL always replaces any URL present in the defaults.
    fn patch_for(&self, spec: &InstanceSpec) -> RunConfigPatch {
        RunConfigPatch::default()
            .url(spec.url(&self.host))
            .merged_over(&self.defaults)
    }

    /// Runs one short priming call (request count equal to the client count)
    /// and throws its metrics away.
    pub async fn pre_warm(&self, spec: &InstanceSpec) -> Result<()> {
        let mut config = self.patch_for(spec).resolve(&spec.name)?;
        config.request_count = config.clients;
        HarnessLogger::pre_warm(&spec.name, &config.url);
        self.coordinator
            .run(&ConfigSet::single(spec.name.clone(), config))
            .await?;
        Ok(())
    }

    /// Runs `passes` measurement passes. A timeout ends the remaining passes
    /// for this instance.
    pub async fn measure(&self, spec: &InstanceSpec, passes: u32) -> Result<InstanceResult> {
        if passes == 0 {
            return Err(HarnessError::invalid_config("passes must be > 0"));
        }
        let config = self.patch_for(spec).resolve(&spec.name)?;
        let url = config.url.clone();
        let configs = ConfigSet::single(spec.name.clone(), config);

        let mut result = InstanceResult::new(spec.clone());
        for pass in 0..passes {
            HarnessLogger::pass_started(pass, passes, &spec.name, &url);
            let report = self.coordinator.run(&configs).await?;
            result.attempted += 1;
            match report.get(&spec.name) {
                Some(metrics) => result.passes.push(*metrics),
                None => HarnessLogger::pass_missing(&spec.name, pass),
            }
            if report.abandoned() {
                HarnessLogger::passes_abandoned(&spec.name, passes - pass - 1);
                break;
            }
        }
        Ok(result)
    }
}
