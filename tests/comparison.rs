//! End-to-end comparison runs against a scripted load generator.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use abcompare::{
    runner::{
        command::{CommandBuilder, CommandLine},
        parser::AbParser,
        process::{Execute, ExecutionResult},
    },
    Aggregation, ComparisonEngine, ComparisonReport, HarnessError, InstanceSpec, InstanceTester,
    Metric, RunConfigPatch, RunCoordinator,
};
use async_trait::async_trait;

fn ab_output(rps: f64, time_mean: f64, failed: u64) -> String {
    format!(
        "This is ApacheBench, Version 2.3 <$Revision: 1903618 $>\n\
         \n\
         Concurrency Level:      100\n\
         Complete requests:      100\n\
         Failed requests:        {failed}\n\
         Requests per second:    {rps:.2} [#/sec] (mean)\n\
         Time per request:       {time_mean:.3} [ms] (mean)\n\
         Time per request:       {:.3} [ms] (mean, across all concurrent requests)\n",
        time_mean / 100.0
    )
}

/// Serves canned ApacheBench output by target port.
#[derive(Clone, Default)]
struct PortStub {
    outputs: Arc<HashMap<u16, String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl PortStub {
    fn new(outputs: Vec<(u16, String)>) -> Self {
        Self {
            outputs: Arc::new(outputs.into_iter().collect()),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Execute for PortStub {
    async fn execute(
        &self,
        cmd: &CommandLine,
        _timeout: Duration,
    ) -> Result<ExecutionResult, HarnessError> {
        let url = cmd.args.last().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(url.clone());
        let port: u16 = url
            .trim_start_matches("http://")
            .split(['/', ':'])
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        Ok(match self.outputs.get(&port) {
            Some(stdout) => ExecutionResult {
                stdout: stdout.clone(),
                ..Default::default()
            },
            None => ExecutionResult {
                stderr: "apr_socket_recv: Connection refused (111)".into(),
                exit_code: 1,
                ..Default::default()
            },
        })
    }
}

fn engine(stub: PortStub) -> ComparisonEngine<PortStub, AbParser> {
    let coordinator = RunCoordinator::new(CommandBuilder::default(), stub, AbParser);
    let tester = InstanceTester::new(coordinator, RunConfigPatch::default().clients(100));
    ComparisonEngine::new(tester)
}

fn specs() -> Vec<InstanceSpec> {
    vec![
        InstanceSpec::new("base", 8000).as_baseline(),
        InstanceSpec::new("mid", 8001),
        InstanceSpec::new("high", 8002),
    ]
}

fn three_instance_stub() -> PortStub {
    PortStub::new(vec![
        (8000, ab_output(1280.72, 78.081, 0)),
        (8001, ab_output(917.87, 108.948, 0)),
        (8002, ab_output(612.07, 163.379, 0)),
    ])
}

fn delta(report: &ComparisonReport, metric: Metric, instance: &str) -> Option<f64> {
    report
        .table(metric)
        .unwrap()
        .row(instance)
        .unwrap()
        .delta_to_baseline_percent
}

#[tokio::test]
async fn three_instances_against_baseline() {
    let report = engine(three_instance_stub())
        .compare(&specs())
        .await
        .unwrap();

    assert_eq!(report.baseline, "base");
    let mid = delta(&report, Metric::RequestsPerSecond, "mid").unwrap();
    let high = delta(&report, Metric::RequestsPerSecond, "high").unwrap();
    assert!((mid - -28.33).abs() < 0.05, "mid delta {mid}");
    assert!((high - -52.19).abs() < 0.05, "high delta {high}");
    assert_eq!(delta(&report, Metric::RequestsPerSecond, "base"), None);

    // slower instances take longer per request
    assert!(delta(&report, Metric::TimePerRequest, "mid").unwrap() > 0.0);
    // zero failed requests on the baseline leaves the delta undefined
    assert_eq!(delta(&report, Metric::FailedRequests, "mid"), None);

    let rendered = report.render();
    assert!(rendered.contains("Requests per second"));
    assert!(rendered.contains("| base"));
    assert!(rendered.contains("1280.72"));
    assert!(rendered.contains("-28.33"));
}

#[tokio::test]
async fn comparing_twice_gives_identical_reports() {
    let engine = engine(three_instance_stub()).passes(2);
    let first = engine.compare(&specs()).await.unwrap();
    let second = engine.compare(&specs()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.render(), second.render());
    assert_eq!(first.table(Metric::RequestsPerSecond).unwrap().runs, 2);
}

#[tokio::test]
async fn unreachable_instance_still_reported() {
    let stub = PortStub::new(vec![
        (8000, ab_output(1000.0, 100.0, 0)),
        (8002, ab_output(750.0, 133.333, 4)),
    ]);
    let report = engine(stub).compare(&specs()).await.unwrap();

    let rps = report.table(Metric::RequestsPerSecond).unwrap();
    let mid = rps.row("mid").unwrap();
    assert_eq!(mid.average, None);
    assert_eq!(mid.delta_to_baseline_percent, None);
    assert_eq!(rps.row("high").unwrap().delta_to_baseline_percent, Some(-25.0));
    assert!(rps.render().contains("N/A"));
}

#[tokio::test]
async fn pre_warm_issues_an_extra_call_per_instance() {
    let stub = three_instance_stub();
    engine(stub.clone())
        .pre_warm(true)
        .passes(2)
        .compare(&specs())
        .await
        .unwrap();
    assert_eq!(stub.calls(), 3 * (1 + 2));
}

#[tokio::test]
async fn baseline_is_checked_before_measuring() {
    let stub = three_instance_stub();
    let mut specs = specs();
    specs[1].baseline = true;

    let err = engine(stub.clone()).compare(&specs).await.unwrap_err();
    assert!(matches!(err, HarnessError::InvalidConfig(_)));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn median_aggregation_is_selectable() {
    let report = engine(three_instance_stub())
        .aggregation(Aggregation::Median)
        .compare(&specs())
        .await
        .unwrap();
    assert_eq!(report.aggregation, Aggregation::Median);
    let base = report
        .table(Metric::RequestsPerSecond)
        .unwrap()
        .row("base")
        .unwrap();
    assert_eq!(base.average, Some(1280.72));
}
