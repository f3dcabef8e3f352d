//! Process supervision for active downloads.
//!
//! One worker task per active download: spawns the downloader, streams its
//! stderr incrementally through the line assembler into the progress
//! parser, and reconciles the exit status into a terminal task state. The
//! worker owns the child; cancellation reaches it through the per-task
//! kill signal registered in the manager's handle table.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::events::DownloadEvent;
use crate::manager::{settle_active, ManagerInner};
use crate::progress::{parse_line, LineEvent};
use crate::task::{DownloadState, DownloadTask, TaskId};
use crate::toolchain::Toolchain;
use crate::ytdlp;

/// Cancellation handle tracked per active download. Removing it from the
/// handle table and firing `terminate` is all a cancel does synchronously;
/// the worker reacts by killing the child it owns.
pub(crate) struct ProcessHandle {
    kill: Arc<Notify>,
}

impl ProcessHandle {
    pub(crate) fn terminate(&self) {
        self.kill.notify_one();
    }
}

/// Filename template; the downloader substitutes the placeholders itself.
const OUTPUT_FILENAME_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Hand an active task to a supervision worker. Returns immediately; all
/// blocking work happens on the spawned worker.
pub(crate) fn execute_download(inner: Arc<ManagerInner>, task: DownloadTask) {
    tokio::spawn(async move {
        run_download(inner, task).await;
    });
}

async fn run_download(inner: Arc<ManagerInner>, task: DownloadTask) {
    let id = task.id;

    // Register the cancellation handle before any other work so a cancel
    // issued right after promotion always finds it.
    let kill = Arc::new(Notify::new());
    {
        let mut handles = inner.handles.lock().unwrap();
        handles.insert(id, ProcessHandle { kill: kill.clone() });
    }

    let toolchain = match inner.toolchain.resolve() {
        Ok(toolchain) => toolchain,
        Err(err) => {
            release_handle(&inner, id);
            fail(&inner, id, err.to_string());
            return;
        }
    };

    // A cancel that landed while we were resolving already settled the
    // task; it must not spawn a process anymore.
    if !inner.handles.lock().unwrap().contains_key(&id) {
        return;
    }

    let configuration = inner.preferences.configuration();
    let args = build_download_args(&task, &configuration.download_directory, &toolchain);

    let mut cmd = Command::new(&toolchain.ytdlp);
    cmd.args(&args);
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            release_handle(&inner, id);
            fail(&inner, id, format!("failed to spawn {}: {}", toolchain.ytdlp.display(), err));
            return;
        }
    };
    log::info!("started downloader for {}", task.source_url);

    let Some(mut stderr) = child.stderr.take() else {
        let _ = child.start_kill();
        release_handle(&inner, id);
        fail(&inner, id, "downloader stderr unavailable".to_string());
        return;
    };

    // Spawn succeeded: the task is downloading, at zero progress.
    {
        let mut registry = inner.registry.lock().unwrap();
        if registry
            .update_active(id, |task| task.state = DownloadState::Downloading { progress: 0.0, eta_seconds: None })
            .is_some()
        {
            inner.publish(DownloadEvent::Progress { id, progress: 0.0, eta_seconds: None });
        }
    }

    let mut assembler = LineAssembler::new();
    let mut chunk = [0u8; 4096];
    let mut cancelled = false;
    let mut stderr_done = false;
    let mut exited = false;
    let mut status: Option<ExitStatus> = None;

    loop {
        if exited && stderr_done {
            break;
        }

        tokio::select! {
            _ = kill.notified(), if !cancelled => {
                cancelled = true;
                log::info!("terminating downloader for task {}", id);
                if let Err(err) = child.start_kill() {
                    log::warn!("failed to kill downloader process: {}", err);
                }
            }

            read = stderr.read(&mut chunk), if !stderr_done => {
                match read {
                    Ok(0) => {
                        if let Some(line) = assembler.finish() {
                            handle_line(&inner, id, &line);
                        }
                        stderr_done = true;
                    }
                    Ok(n) => {
                        for line in assembler.split_chunk(&chunk[..n]) {
                            handle_line(&inner, id, &line);
                        }
                    }
                    Err(err) => {
                        log::warn!("error reading downloader output: {}", err);
                        stderr_done = true;
                    }
                }
            }

            wait_res = child.wait(), if !exited => {
                match wait_res {
                    Ok(s) => status = Some(s),
                    Err(err) => log::warn!("error waiting for downloader process: {}", err),
                }
                exited = true;
            }
        }
    }

    release_handle(&inner, id);

    // Reconcile the exit into a terminal state. `settle_active` is a no-op
    // when a cancel already moved the task to completed.
    match status {
        Some(status) if status.success() => {
            let fallback = configuration.download_directory.clone();
            settle_active(&inner, id, move |task| DownloadState::Finished {
                destination: task.destination_path.clone().unwrap_or(fallback),
            });
        }
        Some(status) => {
            fail(&inner, id, format!("downloader {}", ytdlp::exit_status_note(status)));
            return; // fail() already re-signalled the scheduler
        }
        None => {
            fail(&inner, id, "downloader wait failed".to_string());
            return;
        }
    }

    inner.signal_scheduler();
}

fn release_handle(inner: &ManagerInner, id: TaskId) {
    inner.handles.lock().unwrap().remove(&id);
}

fn fail(inner: &Arc<ManagerInner>, id: TaskId, reason: String) {
    log::error!("task {} failed: {}", id, reason);
    settle_active(inner, id, move |_| DownloadState::Failed { reason });
    inner.signal_scheduler();
}

fn handle_line(inner: &ManagerInner, id: TaskId, line: &str) {
    match parse_line(line) {
        Some(LineEvent::Progress { fraction, eta_seconds }) => {
            let mut registry = inner.registry.lock().unwrap();
            let updated = registry.update_active(id, |task| {
                task.state = DownloadState::Downloading { progress: fraction, eta_seconds };
            });
            if updated.is_some() {
                inner.publish(DownloadEvent::Progress { id, progress: fraction, eta_seconds });
            }
        }
        Some(LineEvent::Destination(path)) => {
            let mut registry = inner.registry.lock().unwrap();
            let updated = registry.update_active(id, |task| task.destination_path = Some(path.clone()));
            if updated.is_some() {
                inner.publish(DownloadEvent::Destination { id, path });
            }
        }
        None => {}
    }
}

/// Argument list for one download invocation: incremental newline-delimited
/// progress, original mtime disabled, optional transcoder location, format
/// selector, output template, source URL.
fn build_download_args(task: &DownloadTask, download_dir: &Path, toolchain: &Toolchain) -> Vec<String> {
    let mut args: Vec<String> = vec!["--newline".into(), "--no-mtime".into()];
    if let Some(ffmpeg) = &toolchain.ffmpeg {
        args.push("--ffmpeg-location".into());
        args.push(ffmpeg.display().to_string());
    }
    args.push("-f".into());
    args.push(task.format_selector.clone());
    args.push("-o".into());
    args.push(download_dir.join(OUTPUT_FILENAME_TEMPLATE).display().to_string());
    args.push(task.source_url.clone());
    args
}

/// Per-task accumulation buffer turning raw output chunks into lines.
/// The trailing partial line is retained across chunks and flushed at EOF;
/// the buffer dies with the worker, so it cannot outlive its task.
pub(crate) struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub(crate) fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Append a chunk and drain every complete line it closes.
    pub(crate) fn split_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.pending.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.pending.drain(..=idx).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            lines.push(String::from_utf8_lossy(&raw).into_owned());
        }
        lines
    }

    /// Flush the trailing partial line of a stream that ended without a
    /// final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).into_owned();
        if line.trim().is_empty() { None } else { Some(line) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::DownloadRequest;
    use std::path::PathBuf;

    fn make_task(url: &str, format: &str) -> DownloadTask {
        DownloadTask::from_request(&DownloadRequest::new(url, format))
    }

    #[test]
    fn test_build_args_without_transcoder() {
        let task = make_task("https://example.com/v/1", "best");
        let toolchain = Toolchain { ytdlp: PathBuf::from("/usr/bin/yt-dlp"), ffmpeg: None };

        let args = build_download_args(&task, Path::new("/downloads"), &toolchain);
        assert_eq!(args[0], "--newline");
        assert_eq!(args[1], "--no-mtime");
        assert!(!args.contains(&"--ffmpeg-location".to_string()));

        let f_idx = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_idx + 1], "best");
        let o_idx = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o_idx + 1], format!("/downloads{}%(title)s.%(ext)s", std::path::MAIN_SEPARATOR));
        assert_eq!(args.last().unwrap(), "https://example.com/v/1");
    }

    #[test]
    fn test_build_args_with_transcoder_location() {
        let task = make_task("https://example.com/v/2", "bestaudio/best");
        let toolchain = Toolchain {
            ytdlp: PathBuf::from("/usr/bin/yt-dlp"),
            ffmpeg: Some(PathBuf::from("/opt/homebrew/bin/ffmpeg")),
        };

        let args = build_download_args(&task, Path::new("/downloads"), &toolchain);
        let loc_idx = args.iter().position(|a| a == "--ffmpeg-location").unwrap();
        assert_eq!(args[loc_idx + 1], "/opt/homebrew/bin/ffmpeg");
    }

    #[test]
    fn test_assembler_splits_complete_lines() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.split_chunk(b"first line\nsecond line\n");
        assert_eq!(lines, vec!["first line".to_string(), "second line".to_string()]);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_assembler_retains_partial_tail_across_chunks() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.split_chunk(b"[download]  42.5% of 10MiB").is_empty());
        let lines = assembler.split_chunk(b" ETA 00:03\nnext");
        assert_eq!(lines, vec!["[download]  42.5% of 10MiB ETA 00:03".to_string()]);
        assert_eq!(assembler.finish(), Some("next".to_string()));
    }

    #[test]
    fn test_assembler_handles_crlf_and_blank_tail() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.split_chunk(b"one\r\ntwo\r\n  ");
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_assembler_burst_of_many_lines_in_one_chunk() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.split_chunk(b"a\nb\nc\nd\n");
        assert_eq!(lines.len(), 4);
    }
}
