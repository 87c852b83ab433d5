//! Core YouTube API client functionality and authentication management.

use crate::backoff::Backoff;
use crate::error::ApiError;
use crate::oauth::OAuthManager;
use crate::youtube_api::playlist_items::{PlaylistItem, PlaylistItemListResponse};
use crate::youtube_api::playlists::{PlaylistListResponse, PlaylistResource};
use crate::youtube_api::types::PagedStream;
use eyre::Context;
use http::Method;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

/// Production endpoint of the YouTube Data API v3.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page size the list endpoints accept.
const MAX_RESULTS: &str = "50";

/// An OAuth token together with the moment we stop trusting its access token.
#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Wraps a token that was just issued.
    ///
    /// The expiry is the token's `expires_in` minus a 5-minute safety buffer.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Refreshes this token, keeping the old refresh token if Google doesn't send a new one.
    ///
    /// Returns `Ok(false)` if the refresh was refused.
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        let Some(new_token) = oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        else {
            return Ok(false);
        };

        let old_token = std::mem::replace(&mut self.token, new_token);
        if self.token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            self.token
                .set_refresh_token(old_token.refresh_token().cloned());
        }
        self.expires_at = Self::calculate_token_expiry(&self.token);
        Ok(true)
    }

    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let now = SystemTime::now();
        match token.expires_in() {
            Some(expires_in) => now + expires_in.saturating_sub(Duration::from_secs(300)),
            // Google access tokens live for an hour.
            None => now + Duration::from_secs(3300),
        }
    }
}

/// Read-only client for the playlist endpoints of the YouTube Data API v3.
///
/// Every request goes through the client's [`Backoff`]: quota errors put the
/// whole run to sleep and are retried, anything else is returned to the caller.
/// Backoff waits can outlast the access token, so the token is refreshed before
/// each attempt whenever it is about to expire.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    token: Arc<Mutex<TimeBoundAccessToken>>,
    oauth_manager: Arc<OAuthManager>,
    client: reqwest::Client,
    api_base: String,
    backoff: Backoff,
}

impl YouTubeClient {
    pub fn new(
        token: TimeBoundAccessToken,
        oauth_manager: Arc<OAuthManager>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
            oauth_manager,
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            backoff: Backoff::default(),
        }
    }

    /// Points the client at a different API root (used to talk to a local mock).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            tracing::debug!("access token expired, attempting refresh");
            if !token.refresh(&self.oauth_manager).await? {
                tracing::error!("access token refresh failed, client is unusable");
                eyre::bail!("unable to refresh expired access token");
            }
        }
        Ok(token.token.access_token().secret().to_string())
    }

    /// Makes one authenticated GET against `endpoint` and decodes the JSON body.
    ///
    /// Non-success statuses become [`ApiError`]s so the backoff can tell quota
    /// exhaustion apart from real failures; bodies that don't decode into `T`
    /// become [`ApiError::MalformedResponse`].
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn get_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<T> {
        let access_token = self.fresh_access_token().await?;
        let url = format!("{}/{endpoint}", self.api_base);

        let response = self
            .client
            .request(Method::GET, &url)
            .header("Authorization", format!("Bearer {access_token}"))
            .query(query_params)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(ApiError::from_status(endpoint, status, body).into());
        }

        serde_json::from_str(&body).map_err(|source| {
            ApiError::MalformedResponse {
                endpoint: endpoint.to_string(),
                source,
            }
            .into()
        })
    }

    /// [`Self::get_once`], retried under the client's backoff policy.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<T> {
        self.backoff
            .retry(|| self.get_once(endpoint, query_params))
            .await
    }

    /// Returns a paginated stream of the authenticated user's playlists.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.readonly`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlists/list>
    #[instrument(skip(self))]
    pub fn list_my_playlists(
        &self,
    ) -> impl Stream<Item = eyre::Result<PlaylistResource>> + use<'_> {
        PagedStream::new("playlists", move |page_token| async move {
            let response = self.list_playlists_internal(page_token).await?;
            Ok((response.items, response.next_page_token))
        })
    }

    /// Returns a paginated stream of the items in one playlist.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self))]
    pub fn list_playlist_items<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> impl Stream<Item = eyre::Result<PlaylistItem>> + use<'a> {
        PagedStream::new("playlist items", move |page_token| async move {
            let response = self
                .list_playlist_items_internal(playlist_id, page_token)
                .await?;
            Ok((response.items, response.next_page_token))
        })
    }

    async fn list_playlists_internal(
        &self,
        page_token: Option<String>,
    ) -> eyre::Result<PlaylistListResponse> {
        let mut query_params = vec![
            ("part", "snippet"),
            ("mine", "true"),
            ("maxResults", MAX_RESULTS),
        ];
        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let playlists: PlaylistListResponse = self
            .get("playlists", &query_params)
            .await
            .context("list playlists")?;

        tracing::debug!(
            total_results = playlists.page_info.total_results,
            returned_items = playlists.items.len(),
            "fetched playlists"
        );
        Ok(playlists)
    }

    async fn list_playlist_items_internal(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> eyre::Result<PlaylistItemListResponse> {
        let mut query_params = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", MAX_RESULTS),
        ];
        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let items: PlaylistItemListResponse = self
            .get("playlistItems", &query_params)
            .await
            .with_context(|| format!("list items of playlist {playlist_id}"))?;

        tracing::debug!(
            playlist_id,
            total_results = items.page_info.total_results,
            returned_items = items.items.len(),
            "fetched playlist items"
        );
        Ok(items)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oauth::ClientSecrets;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields, StandardTokenResponse};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_stream::StreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A client with a valid token that talks to `server`.
    pub(crate) fn test_client(server: &MockServer) -> YouTubeClient {
        let mut token = StandardTokenResponse::new(
            AccessToken::new("test-access-token".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_expires_in(Some(&Duration::from_secs(3600)));
        let secrets = ClientSecrets {
            client_id: "id".into(),
            client_secret: "secret".into(),
            auth_uri: format!("{}/auth", server.uri()),
            token_uri: format!("{}/token", server.uri()),
        };
        YouTubeClient::new(
            TimeBoundAccessToken::new(token),
            Arc::new(OAuthManager::new(secrets, 0)),
            reqwest::Client::new(),
        )
        .with_api_base(server.uri())
        .with_backoff(Backoff::new(
            Duration::from_millis(10),
            Duration::from_millis(40),
        ))
    }

    pub(crate) fn playlist_page(items: &[(&str, &str)], next: Option<&str>) -> serde_json::Value {
        let items: Vec<_> = items
            .iter()
            .map(|(id, title)| json!({"kind": "youtube#playlist", "id": id, "snippet": {"title": title}}))
            .collect();
        let mut page = json!({
            "kind": "youtube#playlistListResponse",
            "pageInfo": {"totalResults": items.len(), "resultsPerPage": 50},
            "items": items,
        });
        if let Some(next) = next {
            page["nextPageToken"] = json!(next);
        }
        page
    }

    pub(crate) fn item_page(items: &[(&str, &str)], next: Option<&str>) -> serde_json::Value {
        let items: Vec<_> = items
            .iter()
            .map(|(video_id, title)| {
                json!({
                    "kind": "youtube#playlistItem",
                    "snippet": {
                        "title": title,
                        "resourceId": {"kind": "youtube#video", "videoId": video_id},
                    },
                })
            })
            .collect();
        let mut page = json!({
            "kind": "youtube#playlistItemListResponse",
            "pageInfo": {"totalResults": items.len(), "resultsPerPage": 50},
            "items": items,
        });
        if let Some(next) = next {
            page["nextPageToken"] = json!(next);
        }
        page
    }

    async fn collect<T>(stream: impl Stream<Item = eyre::Result<T>>) -> eyre::Result<Vec<T>> {
        let mut stream = std::pin::pin!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn lists_playlists_across_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlists"))
            .and(query_param("pageToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(playlist_page(
                &[("PL3", "Third")],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists"))
            .and(query_param("mine", "true"))
            .and(query_param("maxResults", "50"))
            .and(header("Authorization", "Bearer test-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(playlist_page(
                &[("PL1", "First"), ("PL2", "Second")],
                Some("page2"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let playlists = collect(client.list_my_playlists()).await.unwrap();
        let ids: Vec<_> = playlists.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["PL1", "PL2", "PL3"]);
        assert_eq!(playlists[1].snippet.title, "Second");
    }

    #[tokio::test]
    async fn zero_playlists_terminates_after_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(playlist_page(&[], None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let playlists = collect(client.list_my_playlists()).await.unwrap();
        assert!(playlists.is_empty());
    }

    #[tokio::test]
    async fn retries_quota_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("playlistId", "PL1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(item_page(&[("vid1", "Song")], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let items = collect(client.list_playlist_items("PL1")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].snippet.resource_id.video_id, "vid1");
    }

    #[tokio::test]
    async fn other_statuses_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(404).set_body_string("playlistNotFound"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = collect(client.list_playlist_items("nope")).await.unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(matches!(api_err, ApiError::Status { status, .. } if status.as_u16() == 404));
    }

    #[tokio::test]
    async fn missing_fields_are_malformed_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pageInfo": {"totalResults": 1, "resultsPerPage": 50},
                "items": [{"snippet": {"title": "no resource id"}}],
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = collect(client.list_playlist_items("PL1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::MalformedResponse { .. })
        ));
    }
}
