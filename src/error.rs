use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("Invalid configuration: {0} (he::ic)")]
    InvalidConfig(String),
    #[error("Failed to execute `{command}`: {cause} (he::ef)")]
    ExecutionFailure {
        command: String,
        #[source]
        cause: std::io::Error,
    },
    #[error("`{command}` did not finish within {timeout:?} (he::to)")]
    ExecutionTimeout { command: String, timeout: Duration },
    #[error("Load generator exited with code {code} (he::nz)")]
    NonZeroExit { code: i32, stderr: String },
    #[error("Could not parse load generator output: {0} (he::pf)")]
    ParseFailure(String),
}

impl HarnessError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Fatal errors abort the unit of work they occur in; everything else
    /// degrades to "no data" for a single configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::InvalidConfig(_) | HarnessError::ExecutionTimeout { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::InvalidConfig(_) => "invalid config",
            HarnessError::ExecutionFailure { .. } => "execution failure",
            HarnessError::ExecutionTimeout { .. } => "execution timeout",
            HarnessError::NonZeroExit { .. } => "non-zero exit",
            HarnessError::ParseFailure(_) => "parse failure",
        }
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Could not open config")]
    Io(#[from] std::io::Error),
    #[error("Could not parse")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_and_timeout_are_fatal() {
        assert!(HarnessError::invalid_config("clients").is_fatal());
        assert!(HarnessError::ExecutionTimeout {
            command: "ab".into(),
            timeout: Duration::from_secs(1),
        }
        .is_fatal());
        assert!(!HarnessError::NonZeroExit {
            code: 22,
            stderr: String::new(),
        }
        .is_fatal());
        assert!(!HarnessError::ParseFailure("rps".into()).is_fatal());
        assert!(!HarnessError::ExecutionFailure {
            command: "ab".into(),
            cause: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .is_fatal());
    }
}
