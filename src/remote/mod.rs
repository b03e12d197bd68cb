use mockall::automock;
use std::path::{Component, Path};
use thiserror::Error;

/// Helpers to run commands and capture their output.
pub mod command;
/// An executor that runs everything on the local machine.
pub mod local;
/// An executor that runs commands and uploads files over ssh.
pub mod ssh;

/// A custom error for describing the error cases for remote execution.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The underlying Rust command creation failed. The parameter contains the error.
    #[error("the command cannot run: {0}")]
    CommandFailure(#[from] std::io::Error),
    /// The command returned a non-zero exit code. The parameters are the exit code and the output.
    #[error("the command returned non-zero exit code {0} with message: {1}")]
    NonZeroExitcode(i32, String),
    /// The command output contains non-UTF8 characters.
    #[error("the command returned invalid characters")]
    NonUtf8Return,
    /// The argument cannot be passed safely to a shell (e.g. it contains a nul byte).
    #[error("cannot quote {0:?} for the remote shell")]
    Unquotable(String),
    /// Only regular files can be uploaded.
    #[error("{0} is not a file")]
    NotAFile(String),
}

/// The capability to run commands on a remote host and to upload files to it.
///
/// Executors may include:
///   - ssh connections ([ssh::SshExecutor])
///   - the local machine ([local::LocalExecutor])
///   - etc.
#[automock]
pub trait RemoteExecutor {
    /// Run a command in the remote shell and return its output.
    fn run(&self, command: &str) -> Result<String, RemoteError>;

    /// Run a command as the superuser and return its output.
    fn sudo(&self, command: &str) -> Result<String, RemoteError>;

    /// Upload a local file to the remote path, writing it as the superuser if `use_sudo` is set.
    fn upload(&self, local_path: &Path, remote_path: &str, use_sudo: bool)
        -> Result<(), RemoteError>;
}

/// Run the command through [RemoteExecutor::sudo] or [RemoteExecutor::run].
pub fn execute(
    executor: &dyn RemoteExecutor,
    command: &str,
    use_sudo: bool,
) -> Result<String, RemoteError> {
    if use_sudo {
        executor.sudo(command)
    } else {
        executor.run(command)
    }
}

/// Test if a path exists on the remote.
pub fn exists(
    executor: &dyn RemoteExecutor,
    path: &str,
    use_sudo: bool,
) -> Result<bool, RemoteError> {
    let command = format!("test -e {}", command::quote(path)?);
    match execute(executor, &command, use_sudo) {
        Ok(_) => Ok(true),
        Err(RemoteError::NonZeroExitcode(_, _)) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Join a local relative path to a remote directory, always with forward slashes.
pub fn remote_join(remote_dir: &str, relative: &Path) -> String {
    let relative: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some(String::from("..")),
            _ => None,
        })
        .collect();
    if relative.is_empty() {
        return remote_dir.to_string();
    }
    let relative = relative.join("/");

    let dir = remote_dir.trim_end_matches('/');
    if !dir.is_empty() {
        format!("{dir}/{relative}")
    } else if remote_dir.starts_with('/') {
        format!("/{relative}")
    } else {
        relative
    }
}

/// An executor that runs everything inside a remote working directory.
///
/// Commands are prefixed with `cd <directory> &&` and relative upload targets
/// resolve inside the directory. The scope ends when this is dropped.
pub struct InDirectory<'a> {
    executor: &'a dyn RemoteExecutor,
    directory: String,
}

impl<'a> InDirectory<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, directory: &str) -> Self {
        InDirectory {
            executor,
            directory: directory.to_string(),
        }
    }

    fn prefixed(&self, command: &str) -> Result<String, RemoteError> {
        if self.directory.is_empty() {
            return Ok(command.to_string());
        }
        Ok(format!("cd {} && {command}", command::quote(&self.directory)?))
    }
}

impl RemoteExecutor for InDirectory<'_> {
    fn run(&self, command: &str) -> Result<String, RemoteError> {
        self.executor.run(&self.prefixed(command)?)
    }

    fn sudo(&self, command: &str) -> Result<String, RemoteError> {
        self.executor.sudo(&self.prefixed(command)?)
    }

    fn upload(&self, local_path: &Path, remote_path: &str, use_sudo: bool) -> Result<(), RemoteError> {
        if remote_path.starts_with('/') {
            self.executor.upload(local_path, remote_path, use_sudo)
        } else {
            let remote_path = remote_join(&self.directory, Path::new(remote_path));
            self.executor.upload(local_path, &remote_path, use_sudo)
        }
    }
}
