pub mod command;
pub mod parser;
pub mod process;
pub mod sink;

use std::{path::PathBuf, time::Duration};

use crate::{
    config::ConfigSet,
    error::{HarnessError, Result},
    logging::HarnessLogger,
};

use self::{
    command::{CommandBuilder, CommandLine},
    parser::{AbParser, Metrics, ResultParser},
    process::{Execute, ProcessExecutor},
    sink::RawResultSink,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Outcome of one [`RunCoordinator::run`] call. Only configurations that ran
/// to a zero exit and parsed cleanly have metrics.
#[derive(Debug, Default)]
pub struct RunReport {
    pub metrics: Vec<(String, Metrics)>,
    pub failures: Vec<(String, HarnessError)>,
    /// Configuration whose invocation timed out, ending the batch.
    pub timed_out: Option<String>,
    /// Configurations never attempted because of the timeout.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn get(&self, name: &str) -> Option<&Metrics> {
        self.metrics
            .iter()
            .find_map(|(entry, metrics)| (entry == name).then_some(metrics))
    }

    pub fn abandoned(&self) -> bool {
        self.timed_out.is_some()
    }
}

/// Drives the load generator over every entry of a [`ConfigSet`], one after
/// another.
pub struct RunCoordinator<E = ProcessExecutor, P = AbParser> {
    builder: CommandBuilder,
    executor: E,
    parser: P,
    timeout: Duration,
    raw_results: Option<PathBuf>,
}

impl RunCoordinator {
    pub fn apache_bench(program: impl Into<String>) -> Self {
        Self::new(CommandBuilder::new(program), ProcessExecutor::new(), AbParser)
    }
}

impl<E: Execute, P: ResultParser> RunCoordinator<E, P> {
    pub fn new(builder: CommandBuilder, executor: E, parser: P) -> Self {
        Self {
            builder,
            executor,
            parser,
            timeout: DEFAULT_TIMEOUT,
            raw_results: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn raw_results(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_results = Some(path.into());
        self
    }

    /// Runs every configuration in insertion order.
    ///
    /// Non-zero exits, spawn failures and unparsable output only drop the
    /// affected configuration. A timeout abandons the rest of the batch.
    /// An invalid configuration fails the call before anything is spawned.
    pub async fn run(&self, configs: &ConfigSet) -> Result<RunReport> {
        let commands = configs
            .iter()
            .map(|(name, config)| {
                self.builder
                    .build(config)
                    .map(|cmd| (name.to_string(), cmd))
                    .map_err(|err| match err {
                        HarnessError::InvalidConfig(reason) => {
                            HarnessError::InvalidConfig(format!("{name}: {reason}"))
                        }
                        other => other,
                    })
            })
            .collect::<Result<Vec<(String, CommandLine)>>>()?;

        let mut sink = self.open_sink();
        let mut report = RunReport::default();

        for (idx, (name, cmd)) in commands.iter().enumerate() {
            HarnessLogger::running_command(name, &cmd.to_string());
            match self.run_one(name, cmd).await {
                Ok(metrics) => {
                    if let Some(active) = sink.as_mut() {
                        if let Err(err) = active.append(name, &metrics) {
                            HarnessLogger::raw_results_unavailable(active.path(), &err);
                        }
                    }
                    report.metrics.push((name.clone(), metrics));
                }
                Err(HarnessError::ExecutionTimeout { timeout, .. }) => {
                    let skipped: Vec<&str> = commands[idx + 1..]
                        .iter()
                        .map(|(name, _)| name.as_str())
                        .collect();
                    HarnessLogger::batch_abandoned(name, timeout, &skipped);
                    report.timed_out = Some(name.clone());
                    report.skipped = skipped.into_iter().map(str::to_string).collect();
                    break;
                }
                Err(err) => {
                    match &err {
                        HarnessError::NonZeroExit { code, stderr } => {
                            HarnessLogger::non_zero_exit(name, *code, stderr)
                        }
                        other => HarnessLogger::configuration_skipped(name, other),
                    }
                    report.failures.push((name.clone(), err));
                }
            }
        }

        if let Some(sink) = sink {
            let path = sink.path().to_path_buf();
            if let Err(err) = sink.close() {
                HarnessLogger::raw_results_unavailable(&path, &err);
            }
        }

        Ok(report)
    }

    async fn run_one(&self, name: &str, cmd: &CommandLine) -> Result<Metrics> {
        let result = self.executor.execute(cmd, self.timeout).await?;
        if !result.success() {
            return Err(HarnessError::NonZeroExit {
                code: result.exit_code,
                stderr: result.stderr,
            });
        }
        #[cfg(feature = "verbose")]
        HarnessLogger::raw_output(name, &result.stdout);
        let metrics = self.parser.parse(&result.stdout)?;
        HarnessLogger::run_parsed(
            name,
            metrics.requests_per_second,
            metrics.time_per_request_ms,
            metrics.failed_requests,
        );
        Ok(metrics)
    }

    fn open_sink(&self) -> Option<RawResultSink> {
        let path = self.raw_results.as_deref()?;
        match RawResultSink::create(path) {
            Ok(sink) => Some(sink),
            Err(err) => {
                HarnessLogger::raw_results_unavailable(path, &err);
                None
            }
        }
    }
}
