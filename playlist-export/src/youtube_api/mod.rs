//! Minimal read-only client for the YouTube Data API v3.
//!
//! Only the two list endpoints needed to export playlists are covered:
//! `playlists.list` (the authenticated account's playlists) and
//! `playlistItems.list` (the videos in one playlist). Both are exposed as
//! [`Stream`](tokio_stream::Stream)s that follow `nextPageToken` until the
//! listing is exhausted.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tokio_stream::StreamExt;
//! use youtube_playlist_export::youtube_api::YouTubeClient;
//!
//! # async fn example(client: YouTubeClient) -> eyre::Result<()> {
//! let mut playlists = std::pin::pin!(client.list_my_playlists());
//! while let Some(playlist) = playlists.next().await {
//!     let playlist = playlist?;
//!     println!("{} ({})", playlist.snippet.title, playlist.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod playlist_items;
pub mod playlists;
pub mod types;

pub use client::{TimeBoundAccessToken, YouTubeClient};
pub use playlist_items::PlaylistItem;
pub use playlists::PlaylistResource;
pub use types::{PageInfo, PagedStream};
