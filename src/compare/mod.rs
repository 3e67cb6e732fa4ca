use comfy_table::{presets::ASCII_FULL, Cell, CellAlignment, Table};
use serde::{Deserialize, Serialize};

use crate::{
    config::{validate_instances, InstanceSpec},
    error::{HarnessError, Result},
    logging::HarnessLogger,
    runner::{
        parser::{Metrics, ResultParser},
        process::Execute,
    },
    tester::{InstanceResult, InstanceTester, DEFAULT_PASSES},
};

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RequestsPerSecond,
    TimePerRequest,
    FailedRequests,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::RequestsPerSecond,
        Metric::TimePerRequest,
        Metric::FailedRequests,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::RequestsPerSecond => "Requests per second",
            Metric::TimePerRequest => "Time per request [ms]",
            Metric::FailedRequests => "Failed requests",
        }
    }

    pub fn value(self, metrics: &Metrics) -> f64 {
        match self {
            Metric::RequestsPerSecond => metrics.requests_per_second,
            Metric::TimePerRequest => metrics.time_per_request_ms,
            Metric::FailedRequests => metrics.failed_requests as f64,
        }
    }

    fn format(self, value: f64) -> String {
        match self {
            Metric::RequestsPerSecond => format!("{value:.2}"),
            Metric::TimePerRequest => format!("{value:.3}"),
            Metric::FailedRequests => format!("{value:.0}"),
        }
    }
}

/// How the per-run values of one instance are folded into a single number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
}

impl Aggregation {
    /// `None` for an empty input.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregation::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
        }
    }
}

/// Percentage difference of `value` against `baseline`. Undefined (`None`)
/// when the baseline is zero.
pub fn delta_percent(value: f64, baseline: f64) -> Option<f64> {
    if baseline == 0.0 || !baseline.is_finite() || !value.is_finite() {
        return None;
    }
    Some((value - baseline) / baseline * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub instance: String,
    pub metric: Metric,
    pub per_run_values: Vec<f64>,
    pub average: Option<f64>,
    pub baseline: bool,
    /// Always `None` on the baseline row.
    pub delta_to_baseline_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTable {
    pub metric: Metric,
    /// Number of run columns: the most successful passes of any instance.
    pub runs: usize,
    pub rows: Vec<ComparisonRow>,
}

impl MetricTable {
    pub fn row(&self, instance: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|row| row.instance == instance)
    }

    pub fn render(&self) -> String {
        let metric = self.metric;
        let mut headers = vec!["Instance".to_string()];
        headers.extend((1..=self.runs).map(|run| format!("Run {run}")));
        headers.push("Average".to_string());
        headers.push("Diff to baseline [%]".to_string());

        let mut table = Table::new();
        table.load_preset(ASCII_FULL).set_header(headers);

        for row in &self.rows {
            let mut values: Vec<String> = (0..self.runs)
                .map(|run| {
                    row.per_run_values
                        .get(run)
                        .map(|value| metric.format(*value))
                        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
                })
                .collect();
            values.push(
                row.average
                    .map(|value| metric.format(value))
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            );
            values.push(match (row.baseline, row.delta_to_baseline_percent) {
                (true, _) => String::new(),
                (false, Some(delta)) => format!("{delta:.2}"),
                (false, None) => NOT_AVAILABLE.to_string(),
            });

            let mut cells = vec![Cell::new(&row.instance)];
            cells.extend(
                values
                    .into_iter()
                    .map(|value| Cell::new(value).set_alignment(CellAlignment::Right)),
            );
            table.add_row(cells);
        }
        format!("{}\n{table}\n", metric.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub baseline: String,
    pub aggregation: Aggregation,
    pub tables: Vec<MetricTable>,
}

impl ComparisonReport {
    /// Builds one table per metric. Rows follow the order of `results`.
    pub fn from_results(results: &[InstanceResult], aggregation: Aggregation) -> Result<Self> {
        let specs: Vec<InstanceSpec> = results.iter().map(|result| result.spec.clone()).collect();
        validate_instances(&specs)?;
        let baseline = results
            .iter()
            .find(|result| result.spec.baseline)
            .ok_or_else(|| HarnessError::invalid_config("no instance is marked baseline"))?;

        for result in results.iter().filter(|result| result.passes.is_empty()) {
            HarnessLogger::no_data(result.name());
        }

        let runs = results
            .iter()
            .map(|result| result.passes.len())
            .max()
            .unwrap_or(0);

        let tables = Metric::ALL
            .iter()
            .map(|&metric| {
                let baseline_avg = aggregation.apply(&baseline.values(metric));
                if !matches!(baseline_avg, Some(avg) if avg != 0.0) && results.len() > 1 {
                    HarnessLogger::baseline_unusable(baseline.name(), metric.label());
                }
                let rows = results
                    .iter()
                    .map(|result| {
                        let per_run_values = result.values(metric);
                        let average = aggregation.apply(&per_run_values);
                        let is_baseline = result.spec.baseline;
                        let delta = match (is_baseline, average, baseline_avg) {
                            (false, Some(value), Some(base)) => delta_percent(value, base),
                            _ => None,
                        };
                        ComparisonRow {
                            instance: result.spec.name.clone(),
                            metric,
                            per_run_values,
                            average,
                            baseline: is_baseline,
                            delta_to_baseline_percent: delta,
                        }
                    })
                    .collect();
                MetricTable { metric, runs, rows }
            })
            .collect();

        Ok(Self {
            baseline: baseline.spec.name.clone(),
            aggregation,
            tables,
        })
    }

    pub fn table(&self, metric: Metric) -> Option<&MetricTable> {
        self.tables.iter().find(|table| table.metric == metric)
    }

    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(MetricTable::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Measures every instance in turn and compares them against the baseline.
pub struct ComparisonEngine<E, P> {
    tester: InstanceTester<E, P>,
    passes: u32,
    pre_warm: bool,
    aggregation: Aggregation,
}

impl<E: Execute, P: ResultParser> ComparisonEngine<E, P> {
    pub fn new(tester: InstanceTester<E, P>) -> Self {
        Self {
            tester,
            passes: DEFAULT_PASSES,
            pre_warm: false,
            aggregation: Aggregation::default(),
        }
    }

    pub fn passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    pub fn pre_warm(mut self, enabled: bool) -> Self {
        self.pre_warm = enabled;
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// The instance list is validated before anything is measured.
    pub async fn compare(&self, specs: &[InstanceSpec]) -> Result<ComparisonReport> {
        validate_instances(specs)?;
        if self.passes == 0 {
            return Err(HarnessError::invalid_config("passes must be > 0"));
        }

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            if self.pre_warm {
                self.tester.pre_warm(spec).await?;
            }
            results.push(self.tester.measure(spec, self.passes).await?);
        }

        ComparisonReport::from_results(&results, self.aggregation)
    }
}
