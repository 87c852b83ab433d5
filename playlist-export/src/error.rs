//! Error kinds surfaced by the YouTube API client.

use http::StatusCode;
use thiserror::Error;

/// A failed call to the YouTube Data API.
///
/// Callers normally see these wrapped in an [`eyre::Report`]; the backoff loop
/// downcasts to this type to decide whether a failure is worth waiting out.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API refused the request because the quota or rate limit was hit.
    #[error("YouTube API {endpoint} rate limited with status {status}: {body}")]
    RateLimited {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    #[error("YouTube API {endpoint} request failed with status {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    /// The response body did not have the shape we expect for this endpoint.
    #[error("malformed response from YouTube API {endpoint}")]
    MalformedResponse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("send request to YouTube API {endpoint}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Classifies a non-success status into the matching error kind.
    ///
    /// 403 is how YouTube reports an exhausted daily quota. 429 is also treated
    /// as a rate limit, so both are waited out rather than only 403.
    pub fn from_status(endpoint: &str, status: StatusCode, body: String) -> Self {
        let endpoint = endpoint.to_string();
        // YouTube reports exhausted quota as 403 quotaExceeded.
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited {
                endpoint,
                status,
                body,
            }
        } else {
            Self::Status {
                endpoint,
                status,
                body,
            }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether an arbitrary report was caused by a rate-limited API call.
    pub fn is_rate_limited_report(report: &eyre::Report) -> bool {
        report
            .downcast_ref::<Self>()
            .is_some_and(ApiError::is_rate_limited)
    }
}
