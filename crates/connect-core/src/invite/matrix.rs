//! Matrix Space Invitations
//!
//! Implements `SpaceInviter` against a Matrix homeserver. Email invites go
//! through the homeserver's identity-server flow: request an OpenID token,
//! register it with the identity server for a short-lived access token,
//! then call the room invite endpoint with medium "email".
//!
//! The bot session is logged in once at process start and must be released
//! with [`MatrixInviter::logout`] at shutdown.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{InviteOutcome, SpaceInviter};
use crate::error::{ConnectError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Matrix homeserver configuration
#[derive(Clone, Debug)]
pub struct MatrixConfig {
    /// Homeserver base URL (e.g. https://matrix.example.org)
    pub server_url: String,

    /// Bot account localpart or full user id
    pub bot_username: String,

    pub bot_password: String,

    /// Space (room) id invitees are granted access to
    pub space_id: String,

    /// Identity server handling email third-party invites
    pub identity_server: String,

    pub timeout_secs: u64,
}

impl MatrixConfig {
    /// Create from environment variables (`MATRIX_SERVER_URL`,
    /// `MATRIX_BOT_USERNAME`, `MATRIX_BOT_PASSWORD`, `MATRIX_SPACE_ID`,
    /// optional `MATRIX_IDENTITY_SERVER`)
    pub fn from_env() -> Result<Self> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| ConnectError::Config(format!("{key} not set")))
        };

        Ok(Self {
            server_url: require("MATRIX_SERVER_URL")?,
            bot_username: require("MATRIX_BOT_USERNAME")?,
            bot_password: require("MATRIX_BOT_PASSWORD")?,
            space_id: require("MATRIX_SPACE_ID")?,
            identity_server: std::env::var("MATRIX_IDENTITY_SERVER")
                .unwrap_or_else(|_| "sydent.filament.dm".into()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }
}

/// Matrix space inviter holding a logged-in bot session
pub struct MatrixInviter {
    http: reqwest::Client,
    config: MatrixConfig,
    access_token: String,
    user_id: String,
}

impl MatrixInviter {
    /// Log in with the bot password and hold the session for the process
    /// lifetime
    pub async fn login(config: MatrixConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConnectError::Config(format!("http client: {e}")))?;

        let response = http
            .post(format!("{}/_matrix/client/v3/login", config.server_url))
            .json(&serde_json::json!({
                "type": "m.login.password",
                "identifier": { "type": "m.id.user", "user": config.bot_username },
                "password": config.bot_password,
            }))
            .send()
            .await?;

        let login: LoginResponse = decode(response).await?;
        tracing::info!(user_id = %login.user_id, "logged into matrix");

        Ok(Self {
            http,
            config,
            access_token: login.access_token,
            user_id: login.user_id,
        })
    }

    /// Release the bot session
    pub async fn logout(&self) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/_matrix/client/v3/logout",
                self.config.server_url
            ))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        decode::<serde_json::Value>(response).await?;
        tracing::info!("logged out of matrix");
        Ok(())
    }

    async fn openid_token(&self) -> Result<OpenIdResponse> {
        let response = self
            .http
            .post(format!(
                "{}/_matrix/client/v3/user/{}/openid/request_token",
                self.config.server_url,
                encode_path_segment(&self.user_id)
            ))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        decode(response).await
    }

    async fn identity_token(&self, openid: &OpenIdResponse) -> Result<String> {
        let response = self
            .http
            .post(format!(
                "https://{}/_matrix/identity/v2/account/register",
                self.config.identity_server
            ))
            .json(&serde_json::json!({
                "access_token": openid.access_token,
                "expires_in": openid.expires_in.unwrap_or(3600),
                "matrix_server_name": openid.matrix_server_name,
                "token_type": openid.token_type.as_deref().unwrap_or("Bearer"),
            }))
            .send()
            .await?;

        let registered: IdentityRegisterResponse = decode(response).await?;
        Ok(registered.token)
    }
}

#[async_trait]
impl SpaceInviter for MatrixInviter {
    async fn invite(&self, email: &str) -> Result<InviteOutcome> {
        let openid = self.openid_token().await?;
        let id_access_token = self.identity_token(&openid).await?;

        let response = self
            .http
            .post(format!(
                "{}/_matrix/client/v3/rooms/{}/invite",
                self.config.server_url,
                encode_path_segment(&self.config.space_id)
            ))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "id_server": self.config.identity_server,
                "id_access_token": id_access_token,
                "medium": "email",
                "address": email,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            tracing::info!(%email, "sent space invitation");
            return Ok(InviteOutcome::Invited);
        }

        let status = response.status();
        let error: MatrixErrorBody = response.json().await.unwrap_or_default();

        if error.errcode.as_deref() == Some("M_FORBIDDEN")
            && error
                .error
                .as_deref()
                .is_some_and(|msg| msg.to_lowercase().contains("already"))
        {
            tracing::info!(%email, "address already belongs to a member");
            return Ok(InviteOutcome::AlreadyMember);
        }

        Err(ConnectError::Upstream(format!(
            "matrix invite failed ({status}): {} {}",
            error.errcode.unwrap_or_default(),
            error.error.unwrap_or_default()
        )))
    }

    fn name(&self) -> &str {
        "Matrix"
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectError::Upstream(format!(
            "matrix returned {status}: {body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| ConnectError::Upstream(format!("invalid matrix response: {e}")))
}

/// Matrix user and room ids carry `@`, `!` and `:` which some proxies
/// mishandle unencoded in paths.
fn encode_path_segment(segment: &str) -> String {
    segment
        .replace('%', "%25")
        .replace('@', "%40")
        .replace('!', "%21")
        .replace(':', "%3A")
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    user_id: String,
}

#[derive(Deserialize)]
struct OpenIdResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    matrix_server_name: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Deserialize)]
struct IdentityRegisterResponse {
    token: String,
}

#[derive(Deserialize, Default)]
struct MatrixErrorBody {
    #[serde(default)]
    errcode: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
