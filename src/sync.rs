use crate::{
    remote::{command::quote, execute, remote_join, RemoteError, RemoteExecutor},
    watch::{files_changed::FilesChanged, Change, ChangeDetector, ChangeKind, EntryKind, WatchError},
};
use duration_string::DurationString;
use log::{debug, info, warn};
use signal_hook::{consts::TERM_SIGNALS, flag};
use std::{
    env,
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::sleep,
    time::Duration,
};
use thiserror::Error;

/// The time to wait between two detection passes, if not configured otherwise.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// A custom error implementation for the sync loop
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("please provide a non-empty list of local paths")]
    NoLocalPaths,
    #[error("please provide a remote path to push content to")]
    NoRemotePath,
    #[error("cannot watch local paths: {0}")]
    Watch(#[from] WatchError),
    #[error("pushing changes failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("{0} is outside of {1}, cannot map it to the remote")]
    OutsideBase(String, String),
    #[error("cannot read the current directory: {0}")]
    NoCurrentDirectory(std::io::Error),
    #[error("cannot set up signal handlers: {0}")]
    SignalSetup(std::io::Error),
}

/// The configuration of [auto_sync].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The local directories to watch.
    pub local_paths: Vec<PathBuf>,
    /// The remote directory that mirrors the current directory.
    pub remote_path: String,
    /// Write the remote files and directories as the superuser.
    pub use_sudo: bool,
    /// The time to wait between two detection passes.
    pub interval: Duration,
    /// Remove the remote counterpart of removed paths, instead of only logging them.
    pub delete_removed: bool,
}

impl SyncConfig {
    pub fn new(local_paths: Vec<PathBuf>, remote_path: String) -> Self {
        SyncConfig {
            local_paths,
            remote_path,
            use_sudo: false,
            interval: DEFAULT_INTERVAL,
            delete_removed: false,
        }
    }

    /// Fail if there is nothing to watch or nowhere to push to.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.local_paths.is_empty() {
            return Err(SyncError::NoLocalPaths);
        }
        if self.remote_path.is_empty() {
            return Err(SyncError::NoRemotePath);
        }

        Ok(())
    }

    /// Fail if a local path cannot be mirrored relative to `base`.
    pub fn validate_paths(&self, base: &Path) -> Result<(), SyncError> {
        for path in &self.local_paths {
            relative_to(base, path)?;
        }

        Ok(())
    }
}

fn relative_to<'a>(base: &Path, path: &'a Path) -> Result<&'a Path, SyncError> {
    let outside =
        || SyncError::OutsideBase(path.display().to_string(), base.display().to_string());

    let relative = if path.is_absolute() {
        path.strip_prefix(base).map_err(|_| outside())?
    } else {
        path
    };
    if relative.components().any(|c| c == Component::ParentDir) {
        return Err(outside());
    }

    Ok(relative)
}

/// The base itself maps to the remote path, it is never removed.
fn is_base(relative: &Path) -> bool {
    relative.components().all(|c| c == Component::CurDir)
}

/// The loop that pushes every detected change to the remote.
///
/// Paths are mirrored relative to the base directory (the current directory by default):
/// `<base>/a/b.txt` is uploaded to `<remote_path>/a/b.txt`.
pub struct SyncLoop {
    config: SyncConfig,
    detector: Box<dyn ChangeDetector>,
    executor: Box<dyn RemoteExecutor>,
    base: PathBuf,
}

impl SyncLoop {
    pub fn new(
        config: SyncConfig,
        detector: Box<dyn ChangeDetector>,
        executor: Box<dyn RemoteExecutor>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let base = env::current_dir().map_err(SyncError::NoCurrentDirectory)?;
        config.validate_paths(&base)?;

        Ok(SyncLoop {
            config,
            detector,
            executor,
            base,
        })
    }

    /// Map absolute paths relative to this directory instead of the current one.
    pub fn with_base(mut self, base: PathBuf) -> Result<Self, SyncError> {
        self.config.validate_paths(&base)?;
        self.base = base;
        Ok(self)
    }

    fn upload(&self, change: &Change, relative: &Path, remote: &str) -> Result<(), SyncError> {
        info!("Uploading {} to {remote}.", relative.display());
        match self.executor.upload(&change.path, remote, self.config.use_sudo) {
            // Files can vanish between the detection and the upload, the next pass reports them.
            Err(err) if !change.path.is_file() => {
                info!("{} is gone, skipping: {err}.", relative.display());
                Ok(())
            }
            result => Ok(result?),
        }
    }

    fn push(&self, change: &Change) -> Result<(), SyncError> {
        let relative = relative_to(&self.base, &change.path)?;
        let remote = remote_join(&self.config.remote_path, relative);
        let use_sudo = self.config.use_sudo;

        match (change.kind, change.entry) {
            (ChangeKind::Removed, _) if is_base(relative) => {
                warn!("{} was removed, not removing {remote}.", change.path.display());
            }
            (ChangeKind::Removed, _) if self.config.delete_removed => {
                info!("{} was removed, removing {remote}.", relative.display());
                let command = format!("rm -rf {}", quote(&remote)?);
                execute(self.executor.as_ref(), &command, use_sudo)?;
            }
            (ChangeKind::Removed, _) => {
                info!("{} was removed, keeping {remote}.", relative.display());
            }
            (_, EntryKind::Directory) => {
                info!("Creating {remote}.");
                let command = format!("mkdir -p {}", quote(&remote)?);
                execute(self.executor.as_ref(), &command, use_sudo)?;
            }
            (_, EntryKind::File) => self.upload(change, relative, &remote)?,
        }

        Ok(())
    }

    /// Run one detection pass and push its changes. Returns the number of changes.
    ///
    /// The first failing upload stops the pass and is returned.
    pub fn step(&mut self) -> Result<usize, SyncError> {
        let changes = self.detector.detect_changes();
        for change in &changes {
            self.push(change)?;
        }

        Ok(changes.len())
    }

    /// Run passes with the configured interval between them until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), SyncError> {
        info!(
            "Pushing changes to {} every {}.",
            self.config.remote_path,
            DurationString::new(self.config.interval)
        );

        while !shutdown.load(Ordering::Relaxed) {
            if self.step()? == 0 {
                debug!("There are no changes.");
            }
            sleep(self.config.interval);
        }

        debug!("Finished running.");
        Ok(())
    }
}

/// Watch the local paths and push every change to the remote path, until the process is terminated.
///
/// The first termination signal lets the current pass finish, the second one exits immediately.
pub fn auto_sync(config: SyncConfig, executor: Box<dyn RemoteExecutor>) -> Result<(), SyncError> {
    config.validate()?;
    let base = env::current_dir().map_err(SyncError::NoCurrentDirectory)?;
    config.validate_paths(&base)?;

    let detector = FilesChanged::new(config.local_paths.clone())?;
    let mut sync_loop = SyncLoop::new(config, Box::new(detector), executor)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in TERM_SIGNALS {
        flag::register_conditional_shutdown(*signal, 1, Arc::clone(&shutdown))
            .map_err(SyncError::SignalSetup)?;
        flag::register(*signal, Arc::clone(&shutdown)).map_err(SyncError::SignalSetup)?;
    }

    sync_loop.run(&shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        remote::{local::LocalExecutor, MockRemoteExecutor},
        watch::MockChangeDetector,
    };
    use rand::distributions::{Alphanumeric, DistString};
    use std::{error::Error, fs};

    fn get_random_id() -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
    }

    fn config() -> SyncConfig {
        SyncConfig::new(vec![PathBuf::from("proj")], String::from("/srv/app"))
    }

    fn detecting(changes: Vec<Change>) -> Box<dyn ChangeDetector> {
        let mut detector = MockChangeDetector::new();
        detector
            .expect_detect_changes()
            .times(1)
            .returning(move || changes.clone());
        Box::new(detector)
    }

    fn file(path: &str, kind: ChangeKind) -> Change {
        Change::new(PathBuf::from(path), kind, EntryKind::File)
    }

    fn directory(path: &str, kind: ChangeKind) -> Change {
        Change::new(PathBuf::from(path), kind, EntryKind::Directory)
    }

    #[test]
    fn it_should_upload_changed_files() -> Result<(), SyncError> {
        let detector = detecting(vec![
            file("proj/x.txt", ChangeKind::Added),
            file("proj/a/y.txt", ChangeKind::Modified),
        ]);

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_upload()
            .withf(|local, remote, use_sudo| {
                local == Path::new("proj/x.txt") && remote == "/srv/app/proj/x.txt" && !*use_sudo
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        executor
            .expect_upload()
            .withf(|local, remote, _| {
                local == Path::new("proj/a/y.txt") && remote == "/srv/app/proj/a/y.txt"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?;
        assert_eq!(2, sync_loop.step()?);

        Ok(())
    }

    #[test]
    fn it_should_create_added_directories() -> Result<(), SyncError> {
        let detector = detecting(vec![
            directory("proj/sub", ChangeKind::Added),
            file("proj/sub/y.txt", ChangeKind::Added),
        ]);

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_run()
            .withf(|command| command == "mkdir -p /srv/app/proj/sub")
            .times(1)
            .returning(|_| Ok(String::new()));
        executor
            .expect_upload()
            .withf(|_, remote, _| remote == "/srv/app/proj/sub/y.txt")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?;
        assert_eq!(2, sync_loop.step()?);

        Ok(())
    }

    #[test]
    fn it_should_escalate_when_configured() -> Result<(), SyncError> {
        let detector = detecting(vec![
            directory("proj/sub", ChangeKind::Added),
            file("proj/sub/y.txt", ChangeKind::Added),
        ]);

        let mut executor = MockRemoteExecutor::new();
        executor.expect_run().times(0);
        executor
            .expect_sudo()
            .withf(|command| command == "mkdir -p /srv/app/proj/sub")
            .times(1)
            .returning(|_| Ok(String::new()));
        executor
            .expect_upload()
            .withf(|_, _, use_sudo| *use_sudo)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut config = config();
        config.use_sudo = true;
        let mut sync_loop = SyncLoop::new(config, detector, Box::new(executor))?;
        sync_loop.step()?;

        Ok(())
    }

    #[test]
    fn it_should_keep_removed_paths_by_default() -> Result<(), SyncError> {
        testing_logger::setup();
        let detector = detecting(vec![file("proj/old.txt", ChangeKind::Removed)]);

        let mut executor = MockRemoteExecutor::new();
        executor.expect_run().times(0);
        executor.expect_sudo().times(0);
        executor.expect_upload().times(0);

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?;
        assert_eq!(1, sync_loop.step()?);

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| {
                log.level == log::Level::Info
                    && log.body == "proj/old.txt was removed, keeping /srv/app/proj/old.txt."
            }));
        });

        Ok(())
    }

    #[test]
    fn it_should_delete_removed_paths_when_configured() -> Result<(), SyncError> {
        let detector = detecting(vec![directory("proj/old", ChangeKind::Removed)]);

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_run()
            .withf(|command| command == "rm -rf /srv/app/proj/old")
            .times(1)
            .returning(|_| Ok(String::new()));

        let mut config = config();
        config.delete_removed = true;
        let mut sync_loop = SyncLoop::new(config, detector, Box::new(executor))?;
        sync_loop.step()?;

        Ok(())
    }

    #[test]
    fn it_should_stop_on_a_failed_upload() -> Result<(), Box<dyn Error>> {
        let root = format!("test_directories/{}", get_random_id());
        fs::create_dir_all(&root)?;
        fs::write(format!("{root}/x.txt"), "x")?;
        fs::write(format!("{root}/y.txt"), "y")?;

        let detector = detecting(vec![
            file(&format!("{root}/x.txt"), ChangeKind::Modified),
            file(&format!("{root}/y.txt"), ChangeKind::Modified),
        ]);

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_upload()
            .times(1)
            .returning(|_, _, _| Err(RemoteError::NonZeroExitcode(1, String::from("denied"))));

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?;
        let result = sync_loop.step();
        assert!(
            matches!(result, Err(SyncError::Remote(RemoteError::NonZeroExitcode(1, _)))),
            "{result:?} should be a remote error"
        );

        fs::remove_dir_all(&root)?;

        Ok(())
    }

    #[test]
    fn it_should_skip_files_that_vanished_before_uploading() -> Result<(), SyncError> {
        let path = format!("test_directories/{}/gone.tmp", get_random_id());
        let detector = detecting(vec![file(&path, ChangeKind::Added)]);

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(LocalExecutor::new()))?;
        assert_eq!(1, sync_loop.step()?);

        Ok(())
    }

    #[test]
    fn it_should_skip_files_that_vanished_while_uploading() -> Result<(), Box<dyn Error>> {
        let root = format!("test_directories/{}", get_random_id());
        fs::create_dir_all(&root)?;
        let path = format!("{root}/x.txt");
        fs::write(&path, "x")?;

        let detector = detecting(vec![file(&path, ChangeKind::Modified)]);
        let mut executor = MockRemoteExecutor::new();
        executor.expect_upload().times(1).returning(|local, _, _| {
            fs::remove_file(local)?;
            Err(RemoteError::NonZeroExitcode(1, String::from("No such file")))
        });

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?;
        assert_eq!(1, sync_loop.step()?);

        fs::remove_dir_all(&root)?;

        Ok(())
    }

    #[test]
    fn it_should_never_remove_the_remote_path_itself() -> Result<(), SyncError> {
        for path in [".", "/home/me/proj"] {
            let detector = detecting(vec![directory(path, ChangeKind::Removed)]);
            let mut executor = MockRemoteExecutor::new();
            executor.expect_run().times(0);
            executor.expect_sudo().times(0);

            let mut config = config();
            config.delete_removed = true;
            let mut sync_loop = SyncLoop::new(config, detector, Box::new(executor))?
                .with_base(PathBuf::from("/home/me/proj"))?;
            assert_eq!(1, sync_loop.step()?);
        }

        Ok(())
    }

    #[test]
    fn it_should_map_absolute_paths_from_the_base() -> Result<(), SyncError> {
        let detector = detecting(vec![file("/home/me/proj/x.txt", ChangeKind::Modified)]);

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_upload()
            .withf(|local, remote, _| {
                local == Path::new("/home/me/proj/x.txt") && remote == "/srv/app/x.txt"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?
            .with_base(PathBuf::from("/home/me/proj"))?;
        sync_loop.step()?;

        Ok(())
    }

    #[test]
    fn it_should_refuse_paths_outside_the_base() -> Result<(), SyncError> {
        for path in ["/elsewhere/x.txt", "../x.txt"] {
            let detector = detecting(vec![file(path, ChangeKind::Modified)]);
            let mut executor = MockRemoteExecutor::new();
            executor.expect_upload().times(0);

            let mut sync_loop = SyncLoop::new(config(), detector, Box::new(executor))?
                .with_base(PathBuf::from("/home/me/proj"))?;
            let result = sync_loop.step();
            assert!(
                matches!(result, Err(SyncError::OutsideBase(_, _))),
                "{result:?} should be OutsideBase"
            );
        }

        Ok(())
    }

    #[test]
    fn it_should_run_until_shutdown() -> Result<(), SyncError> {
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut detector = MockChangeDetector::new();
        let flag = Arc::clone(&shutdown);
        detector.expect_detect_changes().times(1).returning(move || {
            flag.store(true, Ordering::Relaxed);
            vec![]
        });
        let mut executor = MockRemoteExecutor::new();
        executor.expect_upload().times(0);

        let mut config = config();
        config.interval = Duration::from_millis(10);
        let mut sync_loop = SyncLoop::new(config, Box::new(detector), Box::new(executor))?;

        sync_loop.run(&shutdown)
    }

    #[test]
    fn it_should_fail_without_local_paths() {
        let mut detector = MockChangeDetector::new();
        detector.expect_detect_changes().times(0);
        let executor = MockRemoteExecutor::new();

        let config = SyncConfig::new(vec![], String::from("/srv/app"));
        let result = SyncLoop::new(config, Box::new(detector), Box::new(executor));
        assert!(matches!(result, Err(SyncError::NoLocalPaths)));
    }

    #[test]
    fn it_should_fail_fast_on_empty_inputs() {
        let result = auto_sync(
            SyncConfig::new(vec![], String::from("/srv/app")),
            Box::new(MockRemoteExecutor::new()),
        );
        assert!(matches!(result, Err(SyncError::NoLocalPaths)));

        let result = auto_sync(
            SyncConfig::new(vec![PathBuf::from("/path/to/nowhere")], String::new()),
            Box::new(MockRemoteExecutor::new()),
        );
        assert!(matches!(result, Err(SyncError::NoRemotePath)));
    }

    #[test]
    fn it_should_fail_fast_on_paths_outside_the_current_directory() {
        for path in ["../x", "/path/to/nowhere"] {
            let result = auto_sync(
                SyncConfig::new(vec![PathBuf::from(path)], String::from("/srv")),
                Box::new(MockRemoteExecutor::new()),
            );
            assert!(
                matches!(result, Err(SyncError::OutsideBase(_, _))),
                "{result:?} should be OutsideBase"
            );
        }
    }

    #[test]
    fn it_should_refuse_a_base_outside_the_local_paths() -> Result<(), Box<dyn Error>> {
        let mut detector = MockChangeDetector::new();
        detector.expect_detect_changes().times(0);

        let local_path = env::current_dir()?.join("proj");
        let config = SyncConfig::new(vec![local_path], String::from("/srv"));
        let sync_loop =
            SyncLoop::new(config, Box::new(detector), Box::new(MockRemoteExecutor::new()))?;

        let result = sync_loop.with_base(PathBuf::from("/home/me/proj"));
        assert!(matches!(result, Err(SyncError::OutsideBase(_, _))));

        Ok(())
    }

    #[test]
    fn it_should_fail_on_missing_local_paths() {
        let missing = format!("test_directories/{}/missing", get_random_id());
        let result = auto_sync(
            SyncConfig::new(vec![PathBuf::from(missing)], String::from("/srv")),
            Box::new(MockRemoteExecutor::new()),
        );
        assert!(matches!(result, Err(SyncError::Watch(WatchError::NotADirectory(_)))));
    }
}
