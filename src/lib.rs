//! Download orchestration core for yt-dlp style media fetching.
//!
//! Accepts URL-based download requests, runs a bounded-concurrency queue of
//! external downloader processes, parses their streaming output into
//! structured progress, and exposes each task's lifecycle through an
//! observable registry. The graphical shell, preference persistence, and
//! desktop notification delivery are the embedder's concern and plug in
//! through the `Preferences` and `Notifier` traits.

pub mod error;
pub mod events;
pub mod formats;
pub mod manager;
pub mod notify;
pub mod progress;
pub mod registry;
pub mod settings;
pub mod task;
pub mod toolchain;

mod media_info;
mod subprocess;
mod ytdlp;

pub use error::DownloaderError;
pub use events::DownloadEvent;
pub use formats::FormatDescriptor;
pub use manager::DownloadManager;
pub use notify::{LogNotifier, Notifier};
pub use progress::{parse_line, LineEvent};
pub use registry::{QueueSnapshot, MAX_CONCURRENT_DOWNLOADS};
pub use settings::{DownloadConfiguration, FormatPreference, Preferences, StaticPreferences};
pub use task::{DownloadRequest, DownloadState, DownloadTask, MediaKind, TaskId};
pub use toolchain::{Toolchain, ToolchainResolver};
