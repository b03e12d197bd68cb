use super::{
    command::{capture, quote},
    RemoteError, RemoteExecutor,
};
use duct::cmd;
use duct_sh::sh_dangerous;
use log::debug;
use std::{fs, path::Path};

/// An executor that treats the local machine as the remote.
///
/// Commands run in a subshell (`/bin/sh` on *nix, `cmd.exe` on Windows) in the
/// current directory and uploads are plain copies. Useful to deploy into a
/// directory on the same machine.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        LocalExecutor
    }
}

impl RemoteExecutor for LocalExecutor {
    fn run(&self, command: &str) -> Result<String, RemoteError> {
        debug!("[local] run: {command}");

        // We can run `sh_dangerous`, because it is on the user's computer.
        capture(sh_dangerous(command))
    }

    fn sudo(&self, command: &str) -> Result<String, RemoteError> {
        debug!("[local] sudo: {command}");
        capture(cmd!("sudo", "-n", "sh", "-c", command))
    }

    fn upload(&self, local_path: &Path, remote_path: &str, use_sudo: bool) -> Result<(), RemoteError> {
        if !fs::metadata(local_path)?.is_file() {
            return Err(RemoteError::NotAFile(local_path.display().to_string()));
        }

        debug!("[local] put: {} -> {remote_path}", local_path.display());
        if use_sudo {
            let command = format!(
                "cp {} {}",
                quote(&local_path.to_string_lossy())?,
                quote(remote_path)?
            );
            self.sudo(&command)?;
        } else {
            fs::copy(local_path, remote_path)?;
        }

        Ok(())
    }
}
