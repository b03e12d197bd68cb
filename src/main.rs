use args::{parse_args, Args, Command};
use kosher::{
    project::{upload_project, ProjectError},
    remote::{local::LocalExecutor, ssh::SshExecutor, RemoteExecutor},
    sync::{auto_sync, SyncConfig, SyncError},
    virtualenv::{VirtualenvConfig, VirtualenvError},
};
use log::{debug, error};
use logger::init_logger;
use std::process;
use thiserror::Error;

mod args;
mod logger;

#[derive(Debug, Error)]
pub enum MainError {
    #[error("Timezones cannot be loaded for the logger.")]
    FailedLoggerTimezones,
    #[error("The logger cannot be set up: {0}.")]
    FailedLogger(#[from] log::SetLoggerError),
    #[error("You have to pass a command: watch, upload or virtualenv.")]
    NoCommand,
    #[error("Watching failed: {0}.")]
    Sync(#[from] SyncError),
    #[error("Uploading failed: {0}.")]
    Project(#[from] ProjectError),
    #[error("Virtual environment failed: {0}.")]
    Virtualenv(#[from] VirtualenvError),
}

fn create_executor(args: &Args) -> Box<dyn RemoteExecutor> {
    match &args.host {
        Some(host) => {
            debug!("Connecting to {host} with ssh.");
            let mut executor = SshExecutor::new(host.clone());
            if let Some(port) = args.port {
                executor = executor.with_port(port);
            }
            if let Some(identity) = &args.identity {
                executor = executor.with_identity(identity.clone());
            }
            Box::new(executor)
        }
        None => {
            debug!("There is no host given, running on this machine.");
            Box::new(LocalExecutor::new())
        }
    }
}

fn main_inner(args: Args) -> Result<(), MainError> {
    let executor = create_executor(&args);

    match args.command {
        Some(Command::Watch(options)) => {
            let mut config = SyncConfig::new(options.paths, options.remote);
            config.use_sudo = options.sudo;
            config.interval = options.delay.into();
            config.delete_removed = options.delete;
            auto_sync(config, executor)?;
        }
        Some(Command::Upload(options)) => {
            upload_project(
                executor.as_ref(),
                options.directory.as_deref(),
                &options.remote,
                options.sudo,
            )?;
        }
        Some(Command::Virtualenv(options)) => {
            let mut config =
                VirtualenvConfig::new(options.path.unwrap_or_default())?.with_sudo(options.sudo);
            if let Some(args) = options.args {
                config = config.with_args(args);
            }
            config.setup(executor.as_ref())?;
        }
        None => return Err(MainError::NoCommand),
    }

    Ok(())
}

fn main() {
    let args = parse_args();

    if args.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = init_logger(&args) {
        eprintln!("{err}");
        process::exit(1);
    }

    // Start the main script.
    if let Err(err) = main_inner(args) {
        error!("{err}");
        process::exit(1);
    }
}
