//! One-shot downloader invocations (metadata, format listing).

use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Run a downloader command to completion and capture stdout/stderr.
/// Ensures stdin is closed and both streams are drained concurrently so
/// neither pipe can fill up and stall the child.
pub(crate) async fn run(cmd: &mut Command) -> Result<(String, String, ExitStatus), std::io::Error> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

    let mut child = cmd.spawn()?;

    let mut stdout = child.stdout.take().ok_or_else(|| std::io::Error::other("could not capture stdout"))?;
    let mut stderr = child.stderr.take().ok_or_else(|| std::io::Error::other("could not capture stderr"))?;

    let mut output = String::new();
    let mut errors = String::new();

    let (out_res, err_res) = tokio::join!(stdout.read_to_string(&mut output), stderr.read_to_string(&mut errors));
    out_res?;
    err_res?;

    let status = child.wait().await?;
    Ok((output, errors, status))
}

/// Human-readable note for a non-success exit, embedding code or signal.
pub(crate) fn exit_status_note(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with status code {code}"),
        None => "terminated by signal".to_string(),
    }
}
