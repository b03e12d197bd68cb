//! Upload projects to remote hosts and push local changes to them as they happen.
//!
//! ## How it works
//!
//! `kosher` is built up from a **change detector**, a **sync loop** and a
//! **remote executor**. The change detector remembers the modification times
//! of every file and directory under the watched roots and reports what was
//! added, modified or removed since it was last asked. The sync loop asks it
//! periodically and pushes every change through the remote executor (an ssh
//! connection or the local machine).
//!
//! ```ignore
//! +-----------+       +-----------------+       +-----------------+
//! | sync loop | ----> | change detector | ----> | remote executor |
//! +-----------+       +-----------------+       +-----------------+
//! ```
//!
//! There are also helpers to upload whole projects as archives, to keep
//! project paths consistent and to set up python virtual environments remotely.
//!

/// Upload whole projects and keep track of their paths.
pub mod project;
/// A remote executor runs commands on a host and uploads files to it
/// (e.g. [over ssh](remote::ssh::SshExecutor) or [locally](remote::local::LocalExecutor)).
pub mod remote;
/// The main program loop, that pushes changes to the remote infinitely.
pub mod sync;
/// Set up python virtual environments on the remote.
pub mod virtualenv;
/// A change detector tests which paths changed since it was last asked.
pub mod watch;
