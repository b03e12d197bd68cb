use log::trace;
use std::{
    collections::BTreeMap,
    fs::Metadata,
    io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Suffixes of compiled files that lose their last character (`foo.pyc` -> `foo.py`).
const STRIPPED_SUFFIXES: [&str; 2] = [".pyc", ".pyo"];
/// Suffix of compiled class files that is replaced by [SOURCE_SUFFIX].
const CLASS_SUFFIX: &str = "$py.class";
const SOURCE_SUFFIX: &str = ".py";

/// A modification fingerprint of a file or directory, only meaningful for equality.
///
/// It is the modification time in nanoseconds since the epoch. On Windows the
/// creation time is subtracted from it, so the value stays stable across
/// metadata-only changes there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mtime(i128);

impl Mtime {
    /// Read the fingerprint from the metadata, adjusting it on Windows.
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        let created = if cfg!(windows) {
            Some(metadata.created()?)
        } else {
            None
        };

        Ok(Mtime::from_times(metadata.modified()?, created))
    }

    /// Compute the fingerprint from a modification time and, where the platform
    /// needs the adjustment, a creation time.
    pub fn from_times(modified: SystemTime, created: Option<SystemTime>) -> Self {
        let modified = nanos_since_epoch(modified);
        match created {
            Some(created) => Mtime(modified - nanos_since_epoch(created)),
            None => Mtime(modified),
        }
    }
}

fn nanos_since_epoch(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_nanos() as i128,
        Err(err) => -(err.duration().as_nanos() as i128),
    }
}

/// Rewrite compiled python artifacts to the source file they were built from.
///
/// Paths that are not valid UTF-8 are returned unchanged.
pub fn normalize_file_path(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };

    let mut normalized = raw;
    if STRIPPED_SUFFIXES
        .iter()
        .any(|suffix| normalized.ends_with(suffix))
    {
        normalized = &normalized[..normalized.len() - 1];
    }
    if let Some(stem) = normalized.strip_suffix(CLASS_SUFFIX) {
        return PathBuf::from(format!("{stem}{SOURCE_SUFFIX}"));
    }

    PathBuf::from(normalized)
}

/// The kind of an entry in the [MtimeIndex].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// The ledger of last observed fingerprints for directories and files.
///
/// Both maps are ordered, so parents always come before their children.
/// A path is never present in both maps.
#[derive(Debug, Default)]
pub struct MtimeIndex {
    dirs: BTreeMap<PathBuf, Mtime>,
    files: BTreeMap<PathBuf, Mtime>,
}

impl MtimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a directory. Returns false if it was already tracked, keeping the old fingerprint.
    pub fn insert_dir(&mut self, path: PathBuf, mtime: Mtime) -> bool {
        if self.dirs.contains_key(&path) {
            return false;
        }
        self.files.remove(&path);
        trace!("Tracking directory {}.", path.display());
        self.dirs.insert(path, mtime);
        true
    }

    /// Track a file. Returns false if it was already tracked, keeping the old fingerprint.
    pub fn insert_file(&mut self, path: PathBuf, mtime: Mtime) -> bool {
        if self.files.contains_key(&path) {
            return false;
        }
        if self.dirs.contains_key(&path) {
            self.remove(&path);
        }
        trace!("Tracking file {}.", path.display());
        self.files.insert(path, mtime);
        true
    }

    /// Record a new fingerprint for a tracked directory, returning the previous one.
    pub fn update_dir(&mut self, path: &Path, mtime: Mtime) -> Option<Mtime> {
        self.dirs
            .get_mut(path)
            .map(|recorded| std::mem::replace(recorded, mtime))
    }

    /// Record a new fingerprint for a tracked file, returning the previous one.
    pub fn update_file(&mut self, path: &Path, mtime: Mtime) -> Option<Mtime> {
        self.files
            .get_mut(path)
            .map(|recorded| std::mem::replace(recorded, mtime))
    }

    pub fn dir_mtime(&self, path: &Path) -> Option<Mtime> {
        self.dirs.get(path).copied()
    }

    pub fn file_mtime(&self, path: &Path) -> Option<Mtime> {
        self.files.get(path).copied()
    }

    pub fn contains_dir(&self, path: &Path) -> bool {
        self.dirs.contains_key(path)
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn kind(&self, path: &Path) -> Option<EntryKind> {
        if self.dirs.contains_key(path) {
            Some(EntryKind::Directory)
        } else if self.files.contains_key(path) {
            Some(EntryKind::File)
        } else {
            None
        }
    }

    /// Stop tracking a path. For directories every descendant is dropped too.
    ///
    /// Returns the removed entries in path order, the path itself first.
    pub fn remove(&mut self, path: &Path) -> Vec<(PathBuf, EntryKind)> {
        let mut removed = vec![];

        if self.files.remove(path).is_some() {
            removed.push((path.to_path_buf(), EntryKind::File));
            return removed;
        }
        if self.dirs.remove(path).is_none() {
            return removed;
        }
        removed.push((path.to_path_buf(), EntryKind::Directory));

        let descendant_dirs = Self::descendants(&self.dirs, path);
        let descendant_files = Self::descendants(&self.files, path);
        for dir in descendant_dirs {
            self.dirs.remove(&dir);
            removed.push((dir, EntryKind::Directory));
        }
        for file in descendant_files {
            self.files.remove(&file);
            removed.push((file, EntryKind::File));
        }

        removed.sort_by(|(a, _), (b, _)| a.cmp(b));
        trace!(
            "Stopped tracking {} and {} descendants.",
            path.display(),
            removed.len() - 1
        );
        removed
    }

    fn descendants(map: &BTreeMap<PathBuf, Mtime>, path: &Path) -> Vec<PathBuf> {
        map.range(path.to_path_buf()..)
            .map(|(candidate, _)| candidate)
            .skip_while(|candidate| candidate.as_path() == path)
            .take_while(|candidate| candidate.starts_with(path))
            .cloned()
            .collect()
    }

    /// The tracked entries whose parent directory is `dir`.
    pub fn children(&self, dir: &Path) -> Vec<(PathBuf, EntryKind)> {
        let dirs = Self::descendants(&self.dirs, dir)
            .into_iter()
            .map(|path| (path, EntryKind::Directory));
        let files = Self::descendants(&self.files, dir)
            .into_iter()
            .map(|path| (path, EntryKind::File));

        dirs.chain(files)
            .filter(|(path, _)| path.parent() == Some(dir))
            .collect()
    }

    pub fn dir_paths(&self) -> Vec<PathBuf> {
        self.dirs.keys().cloned().collect()
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dirs.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mtime(secs: u64) -> Mtime {
        Mtime::from_times(UNIX_EPOCH + Duration::from_secs(secs), None)
    }

    #[test]
    fn it_should_normalize_compiled_files() {
        assert_eq!(PathBuf::from("a/foo.py"), normalize_file_path(Path::new("a/foo.pyc")));
        assert_eq!(PathBuf::from("a/foo.py"), normalize_file_path(Path::new("a/foo.pyo")));
        assert_eq!(
            PathBuf::from("a/foo.py"),
            normalize_file_path(Path::new("a/foo$py.class"))
        );
    }

    #[test]
    fn it_should_leave_other_files_alone() {
        assert_eq!(PathBuf::from("foo.py"), normalize_file_path(Path::new("foo.py")));
        assert_eq!(PathBuf::from("foo.class"), normalize_file_path(Path::new("foo.class")));
        assert_eq!(PathBuf::from("pyc"), normalize_file_path(Path::new("pyc")));
    }

    #[test]
    fn it_should_subtract_the_creation_time() {
        let modified = UNIX_EPOCH + Duration::from_secs(100);
        let created = UNIX_EPOCH + Duration::from_secs(40);

        assert_eq!(
            Mtime(60_000_000_000),
            Mtime::from_times(modified, Some(created))
        );
        assert_eq!(Mtime(100_000_000_000), Mtime::from_times(modified, None));
    }

    #[test]
    fn it_should_keep_the_adjusted_fingerprint_on_metadata_changes() {
        // Moving both timestamps by the same amount must not look like a change.
        let before = Mtime::from_times(
            UNIX_EPOCH + Duration::from_secs(100),
            Some(UNIX_EPOCH + Duration::from_secs(40)),
        );
        let after = Mtime::from_times(
            UNIX_EPOCH + Duration::from_secs(130),
            Some(UNIX_EPOCH + Duration::from_secs(70)),
        );

        assert_eq!(before, after);
    }

    #[test]
    fn it_should_handle_times_before_the_epoch() {
        let before_epoch = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(Mtime(-1_000_000_000), Mtime::from_times(before_epoch, None));
    }

    #[test]
    fn it_should_not_overwrite_on_insert() {
        let mut index = MtimeIndex::new();

        assert!(index.insert_file(PathBuf::from("a.txt"), mtime(1)));
        assert!(!index.insert_file(PathBuf::from("a.txt"), mtime(2)));
        assert_eq!(Some(mtime(1)), index.file_mtime(Path::new("a.txt")));

        assert_eq!(Some(mtime(1)), index.update_file(Path::new("a.txt"), mtime(2)));
        assert_eq!(Some(mtime(2)), index.file_mtime(Path::new("a.txt")));
        assert_eq!(None, index.update_file(Path::new("b.txt"), mtime(2)));
    }

    #[test]
    fn it_should_keep_files_and_directories_apart() {
        let mut index = MtimeIndex::new();

        index.insert_file(PathBuf::from("a"), mtime(1));
        index.insert_dir(PathBuf::from("a"), mtime(2));
        assert_eq!(Some(EntryKind::Directory), index.kind(Path::new("a")));
        assert!(!index.contains_file(Path::new("a")));

        index.insert_file(PathBuf::from("a/b"), mtime(3));
        index.insert_file(PathBuf::from("a"), mtime(4));
        assert_eq!(Some(EntryKind::File), index.kind(Path::new("a")));
        assert!(!index.contains_file(Path::new("a/b")));
        assert_eq!(1, index.len());
    }

    #[test]
    fn it_should_remove_directories_with_descendants() {
        let mut index = MtimeIndex::new();
        index.insert_dir(PathBuf::from("a"), mtime(1));
        index.insert_dir(PathBuf::from("a/b"), mtime(1));
        index.insert_file(PathBuf::from("a/b/c.txt"), mtime(1));
        index.insert_file(PathBuf::from("a/d.txt"), mtime(1));
        index.insert_file(PathBuf::from("ab.txt"), mtime(1));

        let removed = index.remove(Path::new("a"));

        assert_eq!(
            vec![
                (PathBuf::from("a"), EntryKind::Directory),
                (PathBuf::from("a/b"), EntryKind::Directory),
                (PathBuf::from("a/b/c.txt"), EntryKind::File),
                (PathBuf::from("a/d.txt"), EntryKind::File),
            ],
            removed
        );
        assert_eq!(vec![PathBuf::from("ab.txt")], index.file_paths());
        assert!(index.dir_paths().is_empty());
    }

    #[test]
    fn it_should_list_only_direct_children() {
        let mut index = MtimeIndex::new();
        index.insert_dir(PathBuf::from("a"), mtime(1));
        index.insert_dir(PathBuf::from("a/b"), mtime(1));
        index.insert_file(PathBuf::from("a/b/c.txt"), mtime(1));
        index.insert_file(PathBuf::from("a/d.txt"), mtime(1));

        let children = index.children(Path::new("a"));

        assert_eq!(
            vec![
                (PathBuf::from("a/b"), EntryKind::Directory),
                (PathBuf::from("a/d.txt"), EntryKind::File),
            ],
            children
        );
    }
}
