use duration_string::DurationString;
use gumdrop::Options;
use std::path::PathBuf;

/// Upload projects to remote hosts and push local changes as they happen.
#[derive(Debug, Options)]
pub struct Args {
    /// The host to run on, in [user@]host form. Without it everything runs on this machine.
    #[options(short = "H")]
    pub host: Option<String>,

    /// The ssh port of the host.
    #[options()]
    pub port: Option<u16>,

    /// The ssh identity file to log in with.
    #[options()]
    pub identity: Option<PathBuf>,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print the error messages.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,

    #[options(command)]
    pub command: Option<Command>,
}

#[derive(Debug, Options)]
pub enum Command {
    /// Watch local directories and push every change to the remote.
    Watch(WatchOptions),
    /// Upload a directory to the remote as an archive and extract it there.
    Upload(UploadOptions),
    /// Create a python virtual environment on the remote.
    Virtualenv(VirtualenvOptions),
}

#[derive(Debug, Options)]
pub struct WatchOptions {
    /// The local directories to watch, relative to the current directory.
    #[options(free)]
    pub paths: Vec<PathBuf>,

    /// The remote directory that mirrors the current directory.
    #[options()]
    pub remote: String,

    /// Write to the remote as the superuser.
    #[options()]
    pub sudo: bool,

    /// Look for changes with this delay.
    ///
    /// Can be a number postfixed with ms, s(econd), m(inutes), h(ours)
    #[options(short = "e", long = "every", default = "1s")]
    pub delay: DurationString,

    /// Remove the remote files when the local ones are removed.
    #[options()]
    pub delete: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

#[derive(Debug, Options)]
pub struct UploadOptions {
    /// The directory to upload, defaults to the current directory.
    #[options(free)]
    pub directory: Option<PathBuf>,

    /// The remote directory to extract into, defaults to the home directory.
    #[options()]
    pub remote: String,

    /// Extract on the remote as the superuser.
    #[options()]
    pub sudo: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

#[derive(Debug, Options)]
pub struct VirtualenvOptions {
    /// The remote path of the virtual environment.
    #[options(free)]
    pub path: Option<String>,

    /// Create the environment as the superuser.
    #[options()]
    pub sudo: bool,

    /// The arguments to pass to virtualenv, instead of the default ones.
    #[options()]
    pub args: Option<String>,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}
