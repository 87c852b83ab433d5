//! Drives one export run: list playlists, fetch their videos, write the CSVs.

use crate::csv_output::save_playlist_csv;
use crate::extract::FlatExtractor;
use crate::model::{Playlist, ProcessedPlaylist, VideoRecord};
use crate::youtube_api::YouTubeClient;
use eyre::Context;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tokio_stream::StreamExt;

/// Sub-directory of the output directory for the account's own playlists.
pub const USER_PLAYLISTS_DIR: &str = "user_playlists";
/// Sub-directory of the output directory for playlists given by URL.
pub const PUBLIC_PLAYLISTS_DIR: &str = "public_playlists";

/// Every playlist of the authenticated account, in API order.
pub async fn get_all_playlists(client: &YouTubeClient) -> eyre::Result<Vec<Playlist>> {
    let mut playlists = Vec::new();
    let mut stream = std::pin::pin!(client.list_my_playlists());
    while let Some(playlist) = stream.next().await {
        playlists.push(Playlist::from(playlist.context("fetch playlist")?));
    }
    Ok(playlists)
}

pub fn count_unique(playlists: &[Playlist]) -> usize {
    playlists
        .iter()
        .map(|p| p.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

pub async fn get_playlist_videos(
    client: &YouTubeClient,
    playlist_id: &str,
) -> eyre::Result<Vec<VideoRecord>> {
    let mut videos = Vec::new();
    let mut stream = std::pin::pin!(client.list_playlist_items(playlist_id));
    while let Some(item) = stream.next().await {
        videos.push(VideoRecord::from(item.context("fetch playlist item")?));
    }
    Ok(videos)
}

/// Per-playlist video counts of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub playlists: Vec<ProcessedPlaylist>,
}

impl ExportReport {
    pub fn total_videos(&self) -> usize {
        self.playlists.iter().map(|p| p.video_count).sum()
    }

    fn record(&mut self, title: &str, videos: &[VideoRecord]) {
        self.playlists.push(ProcessedPlaylist {
            title: title.to_string(),
            video_count: videos.len(),
        });
    }
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for playlist in &self.playlists {
            writeln!(
                f,
                "\tProcessed {} videos from playlist: '{}'",
                playlist.video_count, playlist.title
            )?;
        }
        write!(
            f,
            "Processed {} videos in total from {} playlist(s).",
            self.total_videos(),
            self.playlists.len()
        )
    }
}

/// Exports the account's own playlists, one CSV per playlist in `dir`.
///
/// Each playlist's file is written as soon as its last page arrives, so an
/// interrupted run keeps everything finished before the interruption.
pub async fn export_owned_playlists(
    client: &YouTubeClient,
    playlists: &[Playlist],
    dir: &Path,
) -> eyre::Result<ExportReport> {
    let mut report = ExportReport::default();
    for (i, playlist) in playlists.iter().enumerate() {
        tracing::info!(
            playlist = %playlist.title,
            progress = format_args!("{}/{}", i + 1, playlists.len()),
            "processing playlist"
        );
        let videos = get_playlist_videos(client, &playlist.id)
            .await
            .with_context(|| format!("fetch videos of playlist '{}'", playlist.title))?;
        save_playlist_csv(dir, &playlist.title, &videos);
        report.record(&playlist.title, &videos);
    }
    Ok(report)
}

/// Exports public playlists by URL using flat extraction, one CSV per playlist in `dir`.
///
/// URLs that don't resolve to a playlist are skipped with a warning.
pub async fn export_public_playlists(
    extractor: &FlatExtractor,
    playlist_urls: &[String],
    dir: &Path,
) -> eyre::Result<ExportReport> {
    let mut report = ExportReport::default();
    for (i, url) in playlist_urls.iter().enumerate() {
        tracing::info!(
            url = %url,
            progress = format_args!("{}/{}", i + 1, playlist_urls.len()),
            "processing playlist"
        );
        let playlist = extractor.extract(url).await?;
        let title = playlist.title().to_string();
        let Some(videos) = playlist.into_videos() else {
            tracing::warn!(url = %url, "extraction returned no playlist entries, skipping");
            continue;
        };
        save_playlist_csv(dir, &title, &videos);
        report.record(&title, &videos);
    }
    Ok(report)
}
