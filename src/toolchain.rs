//! Locating the downloader and transcoder executables.
//!
//! Bundled locations are searched before system install directories, and
//! each bundled directory is probed for a platform-suffixed variant
//! ("yt-dlp-linux") next to the bare name. yt-dlp is mandatory; ffmpeg is
//! optional and its absence only drops the `--ffmpeg-location` flag.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::error::DownloaderError;

/// Name of the mandatory downloader executable.
pub const DOWNLOADER_EXECUTABLE: &str = "yt-dlp";

/// Name of the optional transcoding helper.
pub const TRANSCODER_EXECUTABLE: &str = "ffmpeg";

/// System install directories, probed in order after the bundled ones.
const SYSTEM_SEARCH_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin", "/usr/bin"];

/// Resolved absolute paths to the external executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub ytdlp: PathBuf,
    pub ffmpeg: Option<PathBuf>,
}

/// Resolver with a success-only cache: a failed resolution is retried on
/// the next call, a successful one is kept for the process lifetime.
pub struct ToolchainResolver {
    bundled_dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
    resolved: OnceCell<Toolchain>,
}

impl ToolchainResolver {
    /// Default search set: the running executable's directory and its
    /// `resources/` sibling, then the well-known system directories.
    pub fn new() -> Self {
        let mut bundled_dirs = Vec::new();
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                bundled_dirs.push(exe_dir.to_path_buf());
                bundled_dirs.push(exe_dir.join("resources"));
            }
        }
        let system_dirs = SYSTEM_SEARCH_DIRS.iter().map(PathBuf::from).collect();
        Self { bundled_dirs, system_dirs, resolved: OnceCell::new() }
    }

    /// Resolver with explicit search directories.
    pub fn with_dirs(bundled_dirs: Vec<PathBuf>, system_dirs: Vec<PathBuf>) -> Self {
        Self { bundled_dirs, system_dirs, resolved: OnceCell::new() }
    }

    /// Resolve the toolchain, caching on success.
    pub fn resolve(&self) -> Result<Toolchain, DownloaderError> {
        self.resolved
            .get_or_try_init(|| {
                let ytdlp = self
                    .locate(DOWNLOADER_EXECUTABLE)
                    .ok_or_else(|| DownloaderError::toolchain_missing(DOWNLOADER_EXECUTABLE))?;
                let ffmpeg = self.locate(TRANSCODER_EXECUTABLE);
                log::info!("resolved toolchain: yt-dlp={:?} ffmpeg={:?}", ytdlp, ffmpeg);
                Ok(Toolchain { ytdlp, ffmpeg })
            })
            .cloned()
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let suffixed = format!("{}-{}", name, std::env::consts::OS);
        for dir in &self.bundled_dirs {
            for candidate in [name, suffixed.as_str()] {
                let path = dir.join(candidate);
                if is_executable(&path) {
                    return Some(path);
                }
            }
        }
        for dir in &self.system_dirs {
            let path = dir.join(name);
            if is_executable(&path) {
                return Some(path);
            }
        }
        None
    }
}

impl Default for ToolchainResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
