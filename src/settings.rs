//! Preferences consumed by the core: output directory and format default.
//!
//! Persistence is the embedder's concern; the core only reads the current
//! configuration through the `Preferences` trait.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::task::MediaKind;

/// User-selectable format default, mapped to a concrete yt-dlp selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatPreference {
    Best,
    HighDefinition,
    AudioOnly,
    AskEveryTime,
}

impl FormatPreference {
    /// The selector string handed verbatim to the downloader.
    /// `AskEveryTime` falls back to "best"; the surrounding UI is expected
    /// to query `list_formats` and enqueue with an explicit id instead.
    pub fn format_selector(&self) -> &'static str {
        match self {
            FormatPreference::Best => "best",
            FormatPreference::HighDefinition => "bestvideo[height<=1080]+bestaudio/best",
            FormatPreference::AudioOnly => "bestaudio/best",
            FormatPreference::AskEveryTime => "best",
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            FormatPreference::AudioOnly => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }
}

/// Snapshot of the preferences the core consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfiguration {
    pub download_directory: PathBuf,
    pub format_preference: FormatPreference,
    pub should_prompt_for_format: bool,
}

impl Default for DownloadConfiguration {
    fn default() -> Self {
        let download_directory = dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join("Downloads"))
            .join("clipper");
        Self {
            download_directory,
            format_preference: FormatPreference::Best,
            should_prompt_for_format: false,
        }
    }
}

/// Source of the current configuration, injected into the manager.
pub trait Preferences: Send + Sync {
    fn configuration(&self) -> DownloadConfiguration;
}

/// In-memory preferences, used when no persistent store is wired in.
pub struct StaticPreferences {
    inner: Mutex<DownloadConfiguration>,
}

impl StaticPreferences {
    pub fn new(configuration: DownloadConfiguration) -> Self {
        Self { inner: Mutex::new(configuration) }
    }

    pub fn update(&self, block: impl FnOnce(&mut DownloadConfiguration)) {
        let mut configuration = self.inner.lock().unwrap();
        block(&mut configuration);
    }

    pub fn set_download_directory(&self, directory: PathBuf) {
        self.update(|configuration| configuration.download_directory = directory);
    }

    pub fn set_format_preference(&self, preference: FormatPreference) {
        self.update(|configuration| {
            configuration.format_preference = preference;
            configuration.should_prompt_for_format = preference == FormatPreference::AskEveryTime;
        });
    }
}

impl Default for StaticPreferences {
    fn default() -> Self {
        Self::new(DownloadConfiguration::default())
    }
}

impl Preferences for StaticPreferences {
    fn configuration(&self) -> DownloadConfiguration {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_selector_mapping() {
        assert_eq!(FormatPreference::Best.format_selector(), "best");
        assert_eq!(FormatPreference::HighDefinition.format_selector(), "bestvideo[height<=1080]+bestaudio/best");
        assert_eq!(FormatPreference::AudioOnly.format_selector(), "bestaudio/best");
        assert_eq!(FormatPreference::AskEveryTime.format_selector(), "best");
    }

    #[test]
    fn test_media_kind_per_preference() {
        assert_eq!(FormatPreference::AudioOnly.media_kind(), MediaKind::Audio);
        assert_eq!(FormatPreference::Best.media_kind(), MediaKind::Video);
    }

    #[test]
    fn test_selecting_ask_every_time_enables_prompt() {
        let preferences = StaticPreferences::default();
        assert!(!preferences.configuration().should_prompt_for_format);

        preferences.set_format_preference(FormatPreference::AskEveryTime);
        assert!(preferences.configuration().should_prompt_for_format);

        preferences.set_format_preference(FormatPreference::Best);
        assert!(!preferences.configuration().should_prompt_for_format);
    }

    #[test]
    fn test_update_closure_mutates_configuration() {
        let preferences = StaticPreferences::default();
        preferences.set_download_directory(PathBuf::from("/tmp/clips"));
        assert_eq!(preferences.configuration().download_directory, PathBuf::from("/tmp/clips"));
    }
}
