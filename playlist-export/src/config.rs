//! Run configuration.

use crate::backoff::Backoff;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Google OAuth client secrets (`client_secrets.json`).
    pub client_secrets: PathBuf,
    /// Root of the CSV output; playlist files go into sub-directories of it.
    pub output_dir: PathBuf,
    /// Loopback port the OAuth consent redirect lands on.
    pub redirect_port: u16,
    pub backoff: Backoff,
    /// The yt-dlp executable used for public playlists.
    pub yt_dlp: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from("client_secrets.json"),
            output_dir: PathBuf::from("output"),
            redirect_port: 8080,
            backoff: Backoff::default(),
            yt_dlp: PathBuf::from("yt-dlp"),
        }
    }
}

impl Config {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .map_or(default, Duration::from_secs)
        };
        Self {
            client_secrets: lookup("YT_EXPORT_CLIENT_SECRETS")
                .map_or(defaults.client_secrets, PathBuf::from),
            output_dir: lookup("YT_EXPORT_OUTPUT_DIR").map_or(defaults.output_dir, PathBuf::from),
            redirect_port: lookup("YT_EXPORT_REDIRECT_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.redirect_port),
            backoff: Backoff::new(
                secs("YT_EXPORT_BACKOFF_INITIAL_SECS", defaults.backoff.initial),
                secs("YT_EXPORT_BACKOFF_MAX_SECS", defaults.backoff.max),
            ),
            yt_dlp: lookup("YT_EXPORT_YT_DLP").map_or(defaults.yt_dlp, PathBuf::from),
        }
    }
}
