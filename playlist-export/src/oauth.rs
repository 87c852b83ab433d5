//! OAuth 2.0 installed-app flow for read-only YouTube access.
//!
//! The client ID and secret come from the JSON file Google hands out for
//! "Desktop app" OAuth clients. The user consents in their browser and Google
//! redirects back to a one-shot HTTP listener on the loopback interface.

use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    Scope, TokenResponse, TokenUrl, reqwest,
};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

const OAUTH_DONE: &str = "<!DOCTYPE html><html><body>\
    <p>Authorization complete. You can close this tab and return to the terminal.</p>\
    </body></html>";

/// Credentials of a Google OAuth client, as found in `client_secrets.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    TOKEN_URL.to_string()
}

/// Google nests the credentials under the application type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientSecretsFile {
    Installed(ClientSecrets),
    Web(ClientSecrets),
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("parse OAuth client secrets")?;
        Ok(match file {
            ClientSecretsFile::Installed(secrets) | ClientSecretsFile::Web(secrets) => secrets,
        })
    }

    pub async fn from_file(path: &Path) -> eyre::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read OAuth client secrets from {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// Runs the OAuth flows (initial consent and refresh) for one client.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    secrets: ClientSecrets,
    redirect_port: u16,
}

impl OAuthManager {
    /// `redirect_port` is the loopback port the consent redirect lands on; 0 picks any.
    pub fn new(secrets: ClientSecrets, redirect_port: u16) -> Self {
        Self {
            secrets,
            redirect_port,
        }
    }

    fn token_url(&self) -> eyre::Result<TokenUrl> {
        TokenUrl::new(self.secrets.token_uri.clone()).context("parse token endpoint URL")
    }

    fn http_client() -> eyre::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")
    }

    /// Performs the full consent flow and returns a fresh token.
    ///
    /// Opens the user's browser on Google's consent page and waits for the
    /// redirect carrying the authorization code, which is then exchanged (with
    /// the PKCE verifier) for an access token.
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = self
            .setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(self.secrets.auth_uri.clone())
                    .context("parse authorization endpoint URL")?,
            )
            .set_token_uri(self.token_url()?)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(READONLY_SCOPE.to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            // Headless machines can still paste the URL by hand.
            tracing::warn!(error = %e, "could not open browser; visit the URL above");
        }
        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        let token = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&Self::http_client()?)
            .await
            .context("exchange authorization code with access token")?;

        tracing::debug!("obtained YouTube access token");
        Ok(token)
    }

    /// Trades the token's refresh token for a new access token.
    ///
    /// Returns `Ok(None)` when there is no refresh token or Google rejects it as an
    /// invalid grant; the caller then has to go through [`Self::authenticate`] again.
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(self.token_url()?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&Self::http_client()?)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Binds the loopback listener that receives the consent redirect.
    ///
    /// Returns the redirect URL to register with the flow and a future resolving to
    /// the authorization code once a request with a matching `state` arrives.
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>>,
    )> {
        let socket = tokio::net::TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .with_context(|| format!("bind to localhost:{}", self.redirect_port))?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let (state, code) = parse_redirect_query(req.uri().query().unwrap_or(""));
                        if state.as_deref() != Some(csrf.secret().as_str()) {
                            return Err("invalid csrf token");
                        }
                        let Some(code) = code else {
                            return Err("no authorization code found");
                        };
                        if got.send(AuthorizationCode::new(code)).await.is_err() {
                            return Err("authorization code no longer awaited");
                        }
                        Ok(Response::new(Full::<Bytes>::from(OAUTH_DONE)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    code = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        code.ok_or_else(|| eyre::eyre!("redirect handler dropped before sending a code"))
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}

/// Pulls `state` and `code` out of the redirect's query string.
fn parse_redirect_query(query: &str) -> (Option<String>, Option<String>) {
    let mut state = None;
    let mut code = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "state" => state = Some(v.into_owned()),
            "code" => code = Some(v.into_owned()),
            _ => {}
        }
    }
    (state, code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn installed_client_secrets() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "project_id": "exporter",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "shh",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "shh");
        assert_eq!(secrets.auth_uri, "https://accounts.google.com/o/oauth2/auth");
    }

    #[test]
    fn web_client_secrets_fill_in_default_endpoints() {
        let json = r#"{"web": {"client_id": "id", "client_secret": "secret"}}"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.auth_uri, AUTH_URL);
        assert_eq!(secrets.token_uri, TOKEN_URL);
    }

    #[test]
    fn client_secrets_without_known_section_are_rejected() {
        assert!(ClientSecrets::from_json(r#"{"service_account": {}}"#).is_err());
        assert!(ClientSecrets::from_json(r#"{"installed": {"client_id": "x"}}"#).is_err());
    }

    #[test]
    fn redirect_query_is_decoded() {
        let (state, code) = parse_redirect_query("state=abc%3D&code=4%2F0Ad&scope=x+y");
        assert_eq!(state.as_deref(), Some("abc="));
        assert_eq!(code.as_deref(), Some("4/0Ad"));

        let (state, code) = parse_redirect_query("error=access_denied");
        assert_eq!(state, None);
        assert_eq!(code, None);
    }
}
