pub mod compare;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;
pub mod tester;

pub use compare::{Aggregation, ComparisonEngine, ComparisonReport, Metric};
pub use config::{ConfigSet, HarnessConfig, InstanceSpec, RunConfig, RunConfigPatch};
pub use error::HarnessError;
pub use runner::{parser::Metrics, RunCoordinator, RunReport};
pub use tester::{InstanceResult, InstanceTester};
