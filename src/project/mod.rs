use crate::remote::RemoteError;
use thiserror::Error;

/// Local and remote path conventions of a project.
pub mod info;
/// Upload a whole directory tree as a compressed archive.
pub mod upload;

pub use info::ProjectInfo;
pub use upload::upload_project;

/// A custom error describing the error cases for project operations.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The directory to upload doesn't exist or cannot be resolved.
    #[error("cannot upload {0}: {1}")]
    InvalidDirectory(String, std::io::Error),
    /// The directory has no name to archive it under (e.g. `/`).
    #[error("cannot upload {0}, it has no name")]
    UnnamedDirectory(String),
    /// Creating the temporary directory or the archive failed.
    #[error("cannot create the archive: {0}")]
    ArchiveFailed(String),
    /// Uploading, extracting or cleaning up on the remote failed.
    #[error("remote failed: {0}")]
    Remote(#[from] RemoteError),
    /// Reading the local projects directory failed.
    #[error("cannot list subprojects in {0}: {1}")]
    Unreadable(String, std::io::Error),
}
