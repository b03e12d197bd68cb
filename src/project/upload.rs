use super::ProjectError;
use crate::remote::{
    command::{capture, quote},
    execute, remote_join, InDirectory, RemoteExecutor,
};
use duct::cmd;
use log::{debug, info};
use std::{env, fs, path::Path};

/// Upload a project directory to the remote via `tar`/`gzip`.
///
/// `local_dir` is the project directory to upload, defaulting to the current directory.
/// `remote_dir` is the directory to upload into (a copy of `local_dir` will appear as a
/// subdirectory of it), an empty string means the remote user's home directory.
///
/// The local temporary directory is removed in every case, the remote archive is
/// removed after every extraction attempt.
pub fn upload_project(
    executor: &dyn RemoteExecutor,
    local_dir: Option<&Path>,
    remote_dir: &str,
    use_sudo: bool,
) -> Result<(), ProjectError> {
    let local_dir = match local_dir {
        Some(local_dir) => local_dir.to_path_buf(),
        None => env::current_dir()
            .map_err(|err| ProjectError::InvalidDirectory(String::from("."), err))?,
    };
    let local_dir = fs::canonicalize(&local_dir)
        .map_err(|err| ProjectError::InvalidDirectory(local_dir.display().to_string(), err))?;

    let (Some(local_parent), Some(local_name)) = (local_dir.parent(), local_dir.file_name())
    else {
        return Err(ProjectError::UnnamedDirectory(
            local_dir.display().to_string(),
        ));
    };
    let local_name = local_name.to_string_lossy();
    let tar_file = format!("{local_name}.tar.gz");
    let target_tar = remote_join(remote_dir, Path::new(&tar_file));

    // Dropping the directory removes the local archive, even on failures
    let tmp_folder =
        tempfile::tempdir().map_err(|err| ProjectError::ArchiveFailed(err.to_string()))?;
    let tar_path = tmp_folder.path().join(&tar_file);

    debug!("Archiving {} to {}.", local_dir.display(), tar_path.display());
    capture(cmd!("tar", "-czf", &tar_path, "-C", local_parent, &*local_name))
        .map_err(|err| ProjectError::ArchiveFailed(err.to_string()))?;

    info!("Uploading {} to {target_tar}.", local_dir.display());
    executor.upload(&tar_path, &target_tar, use_sudo)?;

    let remote = InDirectory::new(executor, remote_dir);
    let quoted_tar = quote(&tar_file)?;
    let extracted = execute(&remote, &format!("tar -xzf {quoted_tar}"), use_sudo);
    let removed = execute(&remote, &format!("rm -f {quoted_tar}"), use_sudo);
    extracted?;
    removed?;

    let remote_name = if remote_dir.is_empty() { "~" } else { remote_dir };
    info!("Extracted {local_name} in {remote_name}.");
    Ok(())
}
