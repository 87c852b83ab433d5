//! Records produced by an export run.

use crate::youtube_api::{PlaylistItem, PlaylistResource};
use serde::{Deserialize, Serialize};

/// A playlist owned by the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub url: String,
}

impl Playlist {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: playlist_url(&id),
            id,
            title: title.into(),
        }
    }
}

impl From<PlaylistResource> for Playlist {
    fn from(resource: PlaylistResource) -> Self {
        Self::new(resource.id, resource.snippet.title)
    }
}

/// One video of a playlist, in the shape of a row of the per-playlist CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Video ID")]
    pub video_id: String,
    #[serde(rename = "Video URL")]
    pub video_url: String,
}

impl VideoRecord {
    /// A record whose URL is the standard watch page for `video_id`.
    pub fn new(title: impl Into<String>, video_id: impl Into<String>) -> Self {
        let video_id = video_id.into();
        Self {
            video_url: watch_url(&video_id),
            title: title.into(),
            video_id,
        }
    }
}

impl From<PlaylistItem> for VideoRecord {
    fn from(item: PlaylistItem) -> Self {
        Self::new(item.snippet.title, item.snippet.resource_id.video_id)
    }
}

/// How many videos were exported from one playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPlaylist {
    pub title: String,
    pub video_count: usize,
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={playlist_id}")
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
