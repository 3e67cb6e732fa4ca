use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::prelude::*,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    compare::Aggregation,
    error::{ConfigLoadError, HarnessError, Result},
};

/// Name of the pseudo-entry whose fields are merged into every other entry.
pub const DEFAULTS_KEY: &str = "_defaults";
pub const DEFAULT_URI: &str = "/items/";

const DEFAULT_CLIENTS: u32 = 100;
const DEFAULT_COUNT: u32 = 100;
const DEFAULT_CONTENT_TYPE: &str = "application/json";
const DEFAULT_REQUEST_BODY: &str = "requestbody";

/// Fully resolved options for one load generator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub clients: u32,
    pub request_count: u32,
    pub content_type: String,
    pub request_body: PathBuf,
    pub url: String,
    pub keep_alive: bool,
}

/// Partially specified [`RunConfig`]. Unset fields fall back to whatever the
/// patch is merged over, and finally to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfigPatch {
    pub clients: Option<u32>,
    #[serde(alias = "request_count")]
    pub count: Option<u32>,
    pub content_type: Option<String>,
    pub request_body: Option<PathBuf>,
    pub url: Option<String>,
    #[serde(alias = "keep-alive")]
    pub keep_alive: Option<bool>,
}

impl RunConfigPatch {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn clients(mut self, clients: u32) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn request_body(mut self, path: impl Into<PathBuf>) -> Self {
        self.request_body = Some(path.into());
        self
    }

    /// Fields set on `self` win; unset fields are taken from `base`.
    pub fn merged_over(&self, base: &RunConfigPatch) -> RunConfigPatch {
        RunConfigPatch {
            clients: self.clients.or(base.clients),
            count: self.count.or(base.count),
            content_type: self
                .content_type
                .clone()
                .or_else(|| base.content_type.clone()),
            request_body: self
                .request_body
                .clone()
                .or_else(|| base.request_body.clone()),
            url: self.url.clone().or_else(|| base.url.clone()),
            keep_alive: self.keep_alive.or(base.keep_alive),
        }
    }

    /// Fills the remaining gaps with built-in defaults. Only the URL has no
    /// default.
    pub fn resolve(&self, name: &str) -> Result<RunConfig> {
        let url = self
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| HarnessError::invalid_config(format!("entry '{name}' has no url")))?;
        Ok(RunConfig {
            clients: self.clients.unwrap_or(DEFAULT_CLIENTS),
            request_count: self.count.unwrap_or(DEFAULT_COUNT),
            content_type: self
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            request_body: self
                .request_body
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REQUEST_BODY)),
            url,
            keep_alive: self.keep_alive.unwrap_or(false),
        })
    }
}

/// Named run configurations in insertion order. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSet {
    entries: Vec<(String, RunConfig)>,
}

impl ConfigSet {
    /// Builds a set from raw entries. An entry named [`DEFAULTS_KEY`] is not a
    /// configuration itself: it is merged over `base` and then under every
    /// other entry.
    pub fn from_entries<I>(base: &RunConfigPatch, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, RunConfigPatch)>,
    {
        let mut defaults = base.clone();
        let mut named = Vec::new();
        for (name, patch) in entries {
            if name == DEFAULTS_KEY {
                defaults = patch.merged_over(&defaults);
            } else {
                named.push((name, patch));
            }
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(named.len());
        for (name, patch) in named {
            if !seen.insert(name.clone()) {
                return Err(HarnessError::invalid_config(format!(
                    "duplicate configuration '{name}'"
                )));
            }
            let config = patch.merged_over(&defaults).resolve(&name)?;
            resolved.push((name, config));
        }

        Ok(Self { entries: resolved })
    }

    pub fn single(name: impl Into<String>, config: RunConfig) -> Self {
        Self {
            entries: vec![(name.into(), config)],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunConfig)> {
        self.entries
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&RunConfig> {
        self.entries
            .iter()
            .find_map(|(entry, config)| (entry == name).then_some(config))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One running deployment of the service under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub baseline: bool,
}

impl InstanceSpec {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            uri: None,
            baseline: false,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn as_baseline(mut self) -> Self {
        self.baseline = true;
        self
    }

    /// Request path, always starting with `/`. Empty or missing values fall
    /// back to [`DEFAULT_URI`].
    pub fn path(&self) -> String {
        match self.uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => {
                if uri.starts_with('/') {
                    uri.to_string()
                } else {
                    format!("/{uri}")
                }
            }
            _ => DEFAULT_URI.to_string(),
        }
    }

    pub fn url(&self, host: &str) -> String {
        format!("http://{host}:{}{}", self.port, self.path())
    }
}

/// Rejects instance lists that cannot produce a baseline comparison:
/// empty lists, duplicate names, and anything but exactly one baseline.
pub fn validate_instances(specs: &[InstanceSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(HarnessError::invalid_config("no instances configured"));
    }
    let mut names = HashSet::new();
    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(HarnessError::invalid_config("instance with empty name"));
        }
        if !names.insert(spec.name.as_str()) {
            return Err(HarnessError::invalid_config(format!(
                "duplicate instance '{}'",
                spec.name
            )));
        }
    }
    let baselines: Vec<&str> = specs
        .iter()
        .filter(|spec| spec.baseline)
        .map(|spec| spec.name.as_str())
        .collect();
    match baselines.len() {
        1 => Ok(()),
        0 => Err(HarnessError::invalid_config("no instance is marked baseline")),
        _ => Err(HarnessError::invalid_config(format!(
            "more than one baseline instance: {}",
            baselines.join(", ")
        ))),
    }
}

/// Harness settings, loaded from a TOML file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HarnessConfig {
    /// Load generator executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Host every instance is reached on.
    #[serde(default = "default_host")]
    pub host: String,

    /// Upper bound for a single load generator invocation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Measurement passes per instance.
    #[serde(default = "default_passes")]
    pub passes: u32,

    /// Issue a short priming call before measuring each instance.
    #[serde(default = "default_pre_warm")]
    pub pre_warm: bool,

    /// How per-run values are combined.
    #[serde(default)]
    pub aggregation: Aggregation,

    /// Optional CSV file receiving the parsed metrics of every run.
    #[serde(default)]
    pub raw_results: Option<PathBuf>,

    /// Run options shared by every instance.
    #[serde(default)]
    pub defaults: RunConfigPatch,

    #[serde(default = "default_instances", rename = "instance")]
    pub instances: Vec<InstanceSpec>,

    #[serde(flatten)]
    pub other_fields: HashMap<String, toml::Value>,
}

fn default_program() -> String {
    "ab".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_timeout_secs() -> u64 {
    100
}

fn default_passes() -> u32 {
    1
}

fn default_pre_warm() -> bool {
    true
}

fn default_instances() -> Vec<InstanceSpec> {
    vec![
        InstanceSpec::new("base", 8000).as_baseline(),
        InstanceSpec::new("app_one_base_middleware", 8001),
        InstanceSpec::new("app_two_base_middlewares", 8002),
    ]
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            host: default_host(),
            timeout_secs: default_timeout_secs(),
            passes: default_passes(),
            pre_warm: default_pre_warm(),
            aggregation: Aggregation::default(),
            raw_results: None,
            defaults: RunConfigPatch::default(),
            instances: default_instances(),
            other_fields: HashMap::new(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigLoadError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, ConfigLoadError> {
        let config: Self = toml::from_str(raw)?;

        for field in &config.other_fields {
            log::warn!(
                "Unknown configuration '{}' with value {:?}",
                field.0,
                field.1
            );
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let config_str = toml::to_string(&self)?;
        let mut file = File::create(path)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.passes == 0 {
            return Err(HarnessError::invalid_config("passes must be > 0"));
        }
        if self.timeout_secs == 0 {
            return Err(HarnessError::invalid_config("timeout_secs must be > 0"));
        }
        validate_instances(&self.instances)
    }
}
