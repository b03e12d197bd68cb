use super::{
    index::{normalize_file_path, EntryKind, Mtime, MtimeIndex},
    Change, ChangeDetector, ChangeKind, ChangeSet, WatchError,
};
use log::{debug, trace, warn};
use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// A change detector that figures out which files have changed by polling modification times.
///
/// It works the following way:
///   1. Remember the modification times of every directory and file under the roots.
///   2. If the modification time of a directory changed, an entry was added to or removed from it:
///      list it and compare the listing to the remembered children.
///   3. If the modification time of a file changed, report the file as modified.
///
/// Files found while listing a directory are first compared in the next pass,
/// their discovery is the change in the pass that finds them.
pub struct FilesChanged {
    roots: Vec<PathBuf>,
    index: MtimeIndex,
}

fn stat(path: &Path) -> io::Result<(Mtime, bool)> {
    let metadata = fs::metadata(path)?;
    Ok((Mtime::from_metadata(&metadata)?, metadata.is_dir()))
}

impl FilesChanged {
    /// Remember the modification times of every file and directory in the given roots.
    pub fn new<I, P>(roots: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut files_changed = FilesChanged {
            roots: vec![],
            index: MtimeIndex::new(),
        };
        for root in roots {
            files_changed.watch(root)?;
        }

        Ok(files_changed)
    }

    /// Register another root directory, returning the entries that were not tracked before.
    pub fn watch<P: Into<PathBuf>>(&mut self, root: P) -> Result<ChangeSet, WatchError> {
        let root = root.into();
        let root_name = root.display().to_string();

        match fs::metadata(&root) {
            Ok(metadata) if metadata.is_dir() => {}
            _ => return Err(WatchError::NotADirectory(root_name)),
        }
        fs::read_dir(&root).map_err(|err| WatchError::Unreadable(root_name, err))?;

        debug!("Watching {} for changes.", root.display());
        let added = self.add_directory(&root);
        self.roots.push(root);

        Ok(added)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn index(&self) -> &MtimeIndex {
        &self.index
    }

    /// Walk a directory and remember every directory and file in it, the directory included.
    /// Returns the entries that were not tracked before.
    fn add_directory(&mut self, dirpath: &Path) -> ChangeSet {
        let mut added = vec![];

        for entry in WalkDir::new(dirpath).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping entry in {}: {err}.", dirpath.display());
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                let path = entry.into_path();
                match stat(&path) {
                    Ok((mtime, _)) => {
                        if self.index.insert_dir(path.clone(), mtime) {
                            added.push(Change::new(path, ChangeKind::Added, EntryKind::Directory));
                        }
                    }
                    Err(err) => skip(&path, &err),
                }
            } else if let Some(path) = self.add_file(entry.path()) {
                added.push(Change::new(path, ChangeKind::Added, EntryKind::File));
            }
        }

        added
    }

    /// Remember the modification time of the source behind `filepath`.
    /// Returns the tracked path if it was not tracked before.
    ///
    /// Links to directories are not followed, so they are not tracked at all.
    fn add_file(&mut self, filepath: &Path) -> Option<PathBuf> {
        let path = normalize_file_path(filepath);
        match stat(&path) {
            Ok((_, true)) => {
                debug!("{} links to a directory, not tracking it.", path.display());
                None
            }
            Ok((mtime, false)) => self.index.insert_file(path.clone(), mtime).then_some(path),
            Err(err) => {
                skip(&path, &err);
                None
            }
        }
    }

    /// Stop tracking a path that is gone, reporting it once (descendants are implied).
    fn remove(&mut self, path: &Path) -> Option<Change> {
        let mut removed = self.index.remove(path).into_iter();
        let (path, entry) = removed.next()?;
        debug!(
            "{} was removed with {} tracked descendants.",
            path.display(),
            removed.len()
        );

        Some(Change::new(path, ChangeKind::Removed, entry))
    }

    /// Compare the live listing of a directory to its tracked children.
    fn changed_in_directory(&mut self, dirpath: &Path) -> ChangeSet {
        let mut changed = vec![];

        let listing = match fs::read_dir(dirpath) {
            Ok(listing) => listing,
            Err(err) => {
                skip(dirpath, &err);
                return changed;
            }
        };
        let mut entries: Vec<(PathBuf, bool)> = listing
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    Some((entry.path(), is_dir))
                }
                Err(err) => {
                    warn!("Skipping entry in {}: {err}.", dirpath.display());
                    None
                }
            })
            .collect();
        entries.sort();

        let live_dirs: BTreeSet<&PathBuf> = entries
            .iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(path, _)| path)
            .collect();
        let live_files: BTreeSet<PathBuf> = entries
            .iter()
            .filter(|(_, is_dir)| !*is_dir)
            .map(|(path, _)| (path, normalize_file_path(path)))
            .filter(|(path, normalized)| path == &normalized || normalized.exists())
            .map(|(_, normalized)| normalized)
            .collect();

        // Removed entries, or entries that changed between file and directory
        for (child, entry) in self.index.children(dirpath) {
            let is_live = match entry {
                EntryKind::Directory => live_dirs.contains(&child),
                EntryKind::File => live_files.contains(&child),
            };
            if !is_live {
                changed.extend(self.remove(&child));
            }
        }

        for (path, is_dir) in entries {
            if is_dir {
                if !self.index.contains_dir(&path) {
                    changed.extend(self.add_directory(&path));
                }
            } else if !self.index.contains_file(&normalize_file_path(&path)) {
                if let Some(path) = self.add_file(&path) {
                    changed.push(Change::new(path, ChangeKind::Added, EntryKind::File));
                }
            }
        }

        changed
    }
}

/// Vanished paths are expected between listing and stat-ing, anything else is worth a warning.
fn skip(path: &Path, err: &io::Error) {
    if err.kind() == io::ErrorKind::NotFound {
        trace!("{} disappeared, skipping.", path.display());
    } else {
        warn!("Cannot read {}, skipping: {err}.", path.display());
    }
}

impl ChangeDetector for FilesChanged {
    /// Return a list of paths that have been added, modified or removed since the last call.
    fn detect_changes(&mut self) -> ChangeSet {
        let mut changed = vec![];
        let files = self.index.file_paths();

        // Roots that were removed and have come back
        for root in self.roots.clone() {
            if !self.index.contains_dir(&root) && root.is_dir() {
                changed.extend(self.add_directory(&root));
            }
        }

        // Changed directories remember their new children and forget the removed ones
        for dirpath in self.index.dir_paths() {
            let Some(recorded) = self.index.dir_mtime(&dirpath) else {
                continue;
            };

            match stat(&dirpath) {
                Ok((mtime, true)) => {
                    if mtime != recorded {
                        trace!("Directory {} changed.", dirpath.display());
                        self.index.update_dir(&dirpath, mtime);
                        changed.extend(self.changed_in_directory(&dirpath));
                    }
                }
                Ok((_, false)) => changed.extend(self.remove(&dirpath)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    changed.extend(self.remove(&dirpath))
                }
                Err(err) => skip(&dirpath, &err),
            }
        }

        // Update the rest of the files
        for filepath in files {
            let Some(recorded) = self.index.file_mtime(&filepath) else {
                continue;
            };

            match stat(&filepath) {
                Ok((mtime, false)) => {
                    if mtime != recorded {
                        self.index.update_file(&filepath, mtime);
                        changed.push(Change::new(filepath, ChangeKind::Modified, EntryKind::File));
                    }
                }
                // A link that was pointed to a directory
                Ok((_, true)) => changed.extend(self.remove(&filepath)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    changed.extend(self.remove(&filepath))
                }
                Err(err) => skip(&filepath, &err),
            }
        }

        debug!("Found {} changes.", changed.len());
        changed
    }
}
