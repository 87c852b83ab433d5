//! Export the videos of YouTube playlists to CSV files.
//!
//! Two sources are supported: the playlists of an account, read through the
//! YouTube Data API after an OAuth consent in the browser, and public
//! playlists given by URL, listed with `yt-dlp`. Either way every playlist
//! ends up as one CSV file, and the files are then combined into one.

use crate::oauth::{ClientSecrets, OAuthManager};
use crate::youtube_api::{TimeBoundAccessToken, YouTubeClient};
use eyre::Context;
use std::sync::Arc;

pub mod backoff;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod export;
pub mod extract;
pub mod model;
pub mod oauth;
pub mod youtube_api;

pub use config::Config;
pub use error::ApiError;
pub use model::{Playlist, VideoRecord};

/// Runs the OAuth consent flow and returns a client for the consenting account.
pub async fn authenticate(config: &Config) -> eyre::Result<YouTubeClient> {
    let secrets = ClientSecrets::from_file(&config.client_secrets)
        .await
        .with_context(|| {
            format!(
                "load OAuth client secrets from {}",
                config.client_secrets.display()
            )
        })?;
    let oauth_manager = OAuthManager::new(secrets, config.redirect_port);
    let token = oauth_manager
        .authenticate()
        .await
        .context("authorize user to YouTube")?;

    Ok(YouTubeClient::new(
        TimeBoundAccessToken::new(token),
        Arc::new(oauth_manager),
        reqwest::Client::new(),
    )
    .with_backoff(config.backoff))
}
