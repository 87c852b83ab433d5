//! Flat extraction of public playlists through the `yt-dlp` command-line tool.
//!
//! `yt-dlp --flat-playlist --dump-single-json <url>` lists a playlist's entries
//! without touching the media, paging through the playlist internally, so one
//! invocation per playlist is enough.

use crate::model::{VideoRecord, watch_url};
use eyre::Context;
use serde::Deserialize;
use std::path::PathBuf;

pub const UNKNOWN_PLAYLIST_TITLE: &str = "Unknown Playlist";

/// The parts of yt-dlp's single-JSON playlist dump that we read.
#[derive(Debug, Deserialize)]
pub struct FlatPlaylist {
    #[serde(default)]
    pub title: Option<String>,
    /// Absent when the URL did not resolve to a playlist.
    #[serde(default)]
    pub entries: Option<Vec<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct FlatEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl From<FlatEntry> for VideoRecord {
    fn from(entry: FlatEntry) -> Self {
        Self {
            title: entry.title.unwrap_or_default(),
            video_url: entry.url.unwrap_or_else(|| watch_url(&entry.id)),
            video_id: entry.id,
        }
    }
}

impl FlatPlaylist {
    pub fn from_json(json: &[u8]) -> eyre::Result<Self> {
        serde_json::from_slice(json).context("malformed yt-dlp playlist JSON")
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_PLAYLIST_TITLE)
    }

    /// The playlist's videos, or `None` if the result had no `entries` at all.
    pub fn into_videos(self) -> Option<Vec<VideoRecord>> {
        self.entries
            .map(|entries| entries.into_iter().map(VideoRecord::from).collect())
    }
}

/// Runs yt-dlp to list public playlists.
#[derive(Debug, Clone)]
pub struct FlatExtractor {
    program: PathBuf,
}

impl FlatExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn extract(&self, playlist_url: &str) -> eyre::Result<FlatPlaylist> {
        let output = tokio::process::Command::new(&self.program)
            .args([
                "--flat-playlist",
                "--dump-single-json",
                "--extractor-retries",
                "0",
                "--quiet",
                "--no-warnings",
            ])
            .arg(playlist_url)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eyre::bail!(
                "{} failed for {playlist_url} ({}): {}",
                self.program.display(),
                output.status,
                stderr.trim()
            );
        }

        FlatPlaylist::from_json(&output.stdout)
            .with_context(|| format!("decode playlist listing for {playlist_url}"))
    }
}
