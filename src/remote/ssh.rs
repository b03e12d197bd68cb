use super::{
    command::{capture, quote},
    RemoteError, RemoteExecutor,
};
use duct::cmd;
use log::debug;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

/// An executor that runs commands on a host through the `ssh` binary.
///
/// The connection runs in batch mode, so keys have to be set up (in an agent,
/// `~/.ssh/config` or with [SshExecutor::with_identity]) and `sudo` has to be
/// passwordless. Files are uploaded by streaming them into `cat` over the same connection.
pub struct SshExecutor {
    host: String,
    port: Option<u16>,
    identity: Option<PathBuf>,
}

impl SshExecutor {
    /// Creates a new executor for the host, in `[user@]host` form.
    pub fn new(host: String) -> Self {
        SshExecutor {
            host,
            port: None,
            identity: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_identity(mut self, identity: PathBuf) -> Self {
        self.identity = Some(identity);
        self
    }

    fn arguments(&self, remote_command: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), "BatchMode=yes".into()];
        if let Some(port) = self.port {
            args.push("-p".into());
            args.push(port.to_string().into());
        }
        if let Some(identity) = &self.identity {
            args.push("-i".into());
            args.push(identity.into());
        }
        args.push("--".into());
        args.push(self.host.as_str().into());
        args.push(remote_command.into());
        args
    }

    fn escalate(command: &str) -> Result<String, RemoteError> {
        Ok(format!("sudo -n sh -c {}", quote(command)?))
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(&self, command: &str) -> Result<String, RemoteError> {
        debug!("[{}] run: {command}", self.host);
        capture(cmd("ssh", self.arguments(command)))
    }

    fn sudo(&self, command: &str) -> Result<String, RemoteError> {
        debug!("[{}] sudo: {command}", self.host);
        capture(cmd("ssh", self.arguments(&Self::escalate(command)?)))
    }

    fn upload(&self, local_path: &Path, remote_path: &str, use_sudo: bool) -> Result<(), RemoteError> {
        if !fs::metadata(local_path)?.is_file() {
            return Err(RemoteError::NotAFile(local_path.display().to_string()));
        }

        debug!(
            "[{}] put: {} -> {remote_path}",
            self.host,
            local_path.display()
        );
        let mut command = format!("cat > {}", quote(remote_path)?);
        if use_sudo {
            command = Self::escalate(&command)?;
        }
        capture(cmd("ssh", self.arguments(&command)).stdin_path(local_path))?;

        Ok(())
    }
}
