//! YouTube Playlists API types.

use crate::youtube_api::types::PageInfo;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response structure for the `playlists.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlists/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistListResponse {
    /// A list of playlists that match the request criteria.
    pub items: VecDeque<PlaylistResource>,
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
    /// Token that can be used as the value of the pageToken parameter to retrieve the next page in the result set.
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A `playlist` resource as returned with `part=snippet`.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlists#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistResource {
    /// The ID that YouTube uses to uniquely identify the playlist.
    pub id: String,
    pub snippet: PlaylistSnippet,
}

/// The subset of the playlist snippet this tool reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistSnippet {
    /// The playlist's title.
    pub title: String,
}
