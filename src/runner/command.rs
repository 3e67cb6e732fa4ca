use std::{ffi::OsString, fmt, path::PathBuf};

use crate::{
    config::RunConfig,
    error::{HarnessError, Result},
};

pub const DEFAULT_PROGRAM: &str = "ab";

/// A program plus its arguments, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<OsString>,
    pub workdir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
        }
    }

    pub fn arg(mut self, value: impl Into<OsString>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn workdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workdir = Some(path.into());
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Turns a [`RunConfig`] into an ApacheBench invocation.
///
/// Flags are always emitted in the same order: `-q -c <clients> -n <count>
/// -T <content type> -p <body file>`, then `-k` when keep-alive is on, then
/// the target URL. The body path is passed through as is.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build(&self, config: &RunConfig) -> Result<CommandLine> {
        if config.clients == 0 {
            return Err(HarnessError::invalid_config("clients must be > 0"));
        }
        if config.request_count == 0 {
            return Err(HarnessError::invalid_config("request count must be > 0"));
        }

        let mut cmd = CommandLine::new(&self.program)
            .arg("-q")
            .arg("-c")
            .arg(config.clients.to_string())
            .arg("-n")
            .arg(config.request_count.to_string())
            .arg("-T")
            .arg(&config.content_type)
            .arg("-p")
            .arg(config.request_body.as_os_str());
        if config.keep_alive {
            cmd = cmd.arg("-k");
        }
        Ok(cmd.arg(&config.url))
    }
}
