use super::ProjectError;
use log::debug;
use std::{
    cell::OnceCell,
    fs,
    path::{Path, PathBuf},
};

const DEFAULT_REMOTE_TOP: &str = "/opt";
const DEFAULT_REMOTE_TEMP_TOP: &str = "/tmp";
const DEFAULT_VIRTUAL_ENVIRONMENT_TOP: &str = "/opt/virtualenvs";

/// Manages the common paths of a project locally and remotely.
///
/// Remote paths usually contain the remote top directory and the project name,
/// only temporary files are created elsewhere (under the remote temp directory).
/// Local paths are all under the local top directory.
#[derive(Debug)]
pub struct ProjectInfo {
    project_name: String,
    local_top: PathBuf,
    remote_top: String,
    remote_temp_top: String,
    virtual_environment_top: String,
    subprojects: OnceCell<Vec<String>>,
}

impl ProjectInfo {
    /// Creates the paths of a project with the default remote directories.
    pub fn new(project_name: String, local_top: PathBuf) -> Self {
        ProjectInfo {
            project_name,
            local_top,
            remote_top: String::from(DEFAULT_REMOTE_TOP),
            remote_temp_top: String::from(DEFAULT_REMOTE_TEMP_TOP),
            virtual_environment_top: String::from(DEFAULT_VIRTUAL_ENVIRONMENT_TOP),
            subprojects: OnceCell::new(),
        }
    }

    pub fn with_remote_top(mut self, remote_top: String) -> Self {
        self.remote_top = remote_top;
        self
    }

    pub fn with_remote_temp_top(mut self, remote_temp_top: String) -> Self {
        self.remote_temp_top = remote_temp_top;
        self
    }

    pub fn with_virtual_environment_top(mut self, virtual_environment_top: String) -> Self {
        self.virtual_environment_top = virtual_environment_top;
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Location of thirdparty modules locally.
    pub fn local_thirdparty_directory(&self) -> PathBuf {
        self.local_top.join("thirdparty")
    }

    /// Location of the subprojects locally.
    pub fn local_project_directory(&self) -> PathBuf {
        self.local_top.join("projects")
    }

    /// Location of the project directory remotely.
    pub fn project_directory(&self) -> String {
        format!("{}/projects/{}", self.remote_top, self.project_name)
    }

    /// Location of temporary files remotely.
    pub fn temp_directory(&self) -> &str {
        &self.remote_temp_top
    }

    /// Location of the virtual environment remotely.
    pub fn virtual_environment(&self) -> String {
        format!("{}/{}", self.virtual_environment_top, self.project_name)
    }

    /// Location of a subproject directory remotely.
    pub fn subproject_directory(&self, subproject: &str) -> String {
        format!("{}/{}", self.project_directory(), subproject)
    }

    /// The names of the non-hidden directories in the local project directory, sorted.
    ///
    /// They are listed on the first call and remembered afterwards.
    pub fn subprojects(&self) -> Result<&[String], ProjectError> {
        if let Some(subprojects) = self.subprojects.get() {
            return Ok(subprojects);
        }

        let subprojects = list_subprojects(&self.local_project_directory())?;
        debug!(
            "Found {} subprojects of {}.",
            subprojects.len(),
            self.project_name
        );
        Ok(self.subprojects.get_or_init(|| subprojects))
    }
}

fn list_subprojects(root: &Path) -> Result<Vec<String>, ProjectError> {
    let unreadable = |err| ProjectError::Unreadable(root.display().to_string(), err);

    let mut subprojects = vec![];
    for entry in fs::read_dir(root).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') && entry.path().is_dir() {
            subprojects.push(name);
        }
    }
    subprojects.sort();

    Ok(subprojects)
}
