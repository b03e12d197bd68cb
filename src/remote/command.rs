use super::RemoteError;
use duct::Expression;
use log::trace;

/// Quote an argument, so a POSIX shell reads it back as a single word.
pub fn quote(argument: &str) -> Result<String, RemoteError> {
    shlex::try_quote(argument)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| RemoteError::Unquotable(argument.to_string()))
}

/// Run the expression and return its trimmed output, with the stderr merged into stdout.
///
/// If the command fails to start, returns a non-zero exit code or prints non-utf8
/// characters, this function will result in an error.
pub fn capture(expression: Expression) -> Result<String, RemoteError> {
    trace!("Running {expression:?}.");
    let output = expression
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .run()?;

    let output_str =
        std::str::from_utf8(&output.stdout).map_err(|_| RemoteError::NonUtf8Return)?;
    let output_str = output_str.trim_end().to_string();
    output_str.lines().for_each(|line| {
        trace!("{line}");
    });

    if output.status.success() {
        Ok(output_str)
    } else {
        Err(RemoteError::NonZeroExitcode(
            output.status.code().unwrap_or(-1),
            output_str,
        ))
    }
}
