use crate::remote::{command::quote, execute, exists, RemoteError, RemoteExecutor};
use log::info;
use thiserror::Error;

/// The arguments passed to `virtualenv`, if not configured otherwise.
pub const DEFAULT_ARGS: &str = "--no-site-packages --clear";

/// A custom error describing the error cases for virtual environments.
#[derive(Debug, Error)]
pub enum VirtualenvError {
    /// The configuration is not usable.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// Creating the environment on the remote failed.
    #[error("remote failed: {0}")]
    Remote(#[from] RemoteError),
}

/// The configuration of a remote python virtual environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualenvConfig {
    path: String,
    use_sudo: bool,
    args: String,
}

impl VirtualenvConfig {
    /// Creates a configuration for an environment at `path`, with the default arguments.
    pub fn new(path: String) -> Result<Self, VirtualenvError> {
        if path.trim().is_empty() {
            return Err(VirtualenvError::Misconfigured(String::from(
                "please provide a path for the virtual environment",
            )));
        }

        Ok(VirtualenvConfig {
            path,
            use_sudo: false,
            args: String::from(DEFAULT_ARGS),
        })
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_args(mut self, args: String) -> Self {
        self.args = args;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The command that activates the environment at `path`, or at the configured path.
    pub fn prefix(&self, path: Option<&str>) -> Result<String, VirtualenvError> {
        let path = path.unwrap_or(&self.path).trim_end_matches('/');
        Ok(format!("source {}", quote(&format!("{path}/bin/activate"))?))
    }

    /// Wrap a command so it runs inside the configured environment.
    pub fn activated(&self, command: &str) -> Result<String, VirtualenvError> {
        Ok(format!("{} && {command}", self.prefix(None)?))
    }

    /// Create the environment on the remote, creating its directory if it is missing.
    pub fn setup(&self, executor: &dyn RemoteExecutor) -> Result<(), VirtualenvError> {
        let path = quote(&self.path)?;

        if !exists(executor, &self.path, self.use_sudo)? {
            info!("Creating {}.", self.path);
            execute(executor, &format!("mkdir -p {path}"), self.use_sudo)?;
        }

        info!("Setting up virtual environment in {}.", self.path);
        let command = if self.args.is_empty() {
            format!("virtualenv {path}")
        } else {
            format!("virtualenv {path} {}", self.args)
        };
        execute(executor, &command, self.use_sudo)?;

        Ok(())
    }
}
