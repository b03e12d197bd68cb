use mockall::automock;
use std::path::PathBuf;
use thiserror::Error;

/// A change detector that polls modification times of files and directories.
pub mod files_changed;
/// The ledger of modification times that the detector compares against.
pub mod index;

pub use index::EntryKind;

/// A custom error for describing the error cases for watching.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch root doesn't exist or it is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(String),
    /// The watch root exists but cannot be read.
    #[error("cannot read {0}: {1}")]
    Unreadable(String, std::io::Error),
}

/// What happened to a path between two detection passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single path reported by a detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub entry: EntryKind,
}

impl Change {
    pub fn new(path: PathBuf, kind: ChangeKind, entry: EntryKind) -> Self {
        Change { path, kind, entry }
    }
}

/// The changes found in one detection pass, in the order they were found.
pub type ChangeSet = Vec<Change>;

/// A change detector reports which paths changed since it was last asked.
///
/// Detectors may include:
///   - polling modification times ([files_changed::FilesChanged])
///   - etc.
#[automock]
pub trait ChangeDetector {
    /// Return every path that was added, modified or removed since the previous call.
    fn detect_changes(&mut self) -> ChangeSet;
}
