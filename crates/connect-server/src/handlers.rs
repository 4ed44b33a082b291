//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
};
use serde::{Deserialize, Serialize};

use connect_core::{
    CheckoutCreated, CheckoutRequest, ConnectError, CreatorStatus, ProvisionRequest, Provisioned,
    ReturnOutcome, WebhookAck,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct InfoResponse {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountIdQuery {
    pub account_id: String,
}

#[derive(Serialize)]
pub struct ReturnResponse {
    pub success: bool,
    pub status: &'static str,
    pub message: &'static str,
    pub creator_id: String,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_url: Option<String>,
}

#[derive(Serialize)]
pub struct OnboardResponse {
    pub success: bool,
    #[serde(flatten)]
    pub provisioned: Provisioned,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(flatten)]
    pub created: CheckoutCreated,
}

#[derive(Debug, Serialize)]
pub struct CreatorListResponse {
    pub count: usize,
    pub creators: Vec<CreatorStatus>,
}

#[derive(Debug, Serialize)]
pub struct LoginLinkResponse {
    pub url: String,
    pub created: i64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(error: &ConnectError) -> ApiError {
    let (status, code) = match error {
        ConnectError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        ConnectError::Conflict(_) => (StatusCode::BAD_REQUEST, "CONFLICT"),
        ConnectError::Precondition(_) => (StatusCode::BAD_REQUEST, "PRECONDITION_FAILED"),
        ConnectError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ConnectError::Authentication(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        ConnectError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
        ConnectError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        ConnectError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.into(),
        }),
    )
}

fn api_error(error: ConnectError) -> ApiError {
    if matches!(
        error,
        ConnectError::Upstream(_) | ConnectError::Storage(_) | ConnectError::Config(_)
    ) {
        tracing::error!(%error, "request failed");
    }
    error_response(&error)
}

// ============================================================================
// Handlers
// ============================================================================

/// Service info
pub async fn root() -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "creator-connect",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Provision a creator (admin only)
pub async fn onboard_creator(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProvisionRequest>,
) -> Result<Json<OnboardResponse>, ApiError> {
    state.auth.verify(&headers).map_err(api_error)?;

    let provisioned = state
        .onboarding
        .provision(payload)
        .await
        .map_err(api_error)?;

    Ok(Json(OnboardResponse {
        success: true,
        provisioned,
    }))
}

/// Landing endpoint for creators returning from hosted onboarding
pub async fn connect_return(
    State(state): State<AppState>,
    Query(query): Query<AccountIdQuery>,
) -> Result<Json<ReturnResponse>, ApiError> {
    let outcome = state
        .onboarding
        .handle_return(&query.account_id)
        .await
        .map_err(api_error)?;

    let response = match outcome {
        ReturnOutcome::Complete {
            creator_id,
            account_id,
        } => ReturnResponse {
            success: true,
            status: "complete",
            message: "Onboarding complete. You can start accepting payments.",
            creator_id,
            account_id,
            retry_url: None,
        },
        ReturnOutcome::Incomplete {
            creator_id,
            account_id,
            retry_url,
        } => ReturnResponse {
            success: false,
            status: "incomplete",
            message: "Onboarding is not finished yet. Use the link to continue.",
            creator_id,
            account_id,
            retry_url: Some(retry_url),
        },
    };

    Ok(Json(response))
}

/// Redirect an expired onboarding link to a fresh one
pub async fn connect_refresh(
    State(state): State<AppState>,
    Query(query): Query<AccountIdQuery>,
) -> Result<Redirect, ApiError> {
    let link = state
        .onboarding
        .refresh_link(&query.account_id)
        .await
        .map_err(api_error)?;

    Ok(Redirect::temporary(&link.url))
}

/// Signed Connect webhook deliveries
pub async fn stripe_connect_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "missing stripe-signature header".into(),
                    code: "MISSING_SIGNATURE".into(),
                }),
            )
        })?;

    let ack = state
        .webhooks
        .handle(&body, signature)
        .await
        .map_err(|e| match e {
            // Bad signatures map to 400 so the provider surfaces them as
            // endpoint misconfiguration instead of retrying forever
            ConnectError::Authentication(_) => {
                tracing::warn!(error = %e, "webhook signature failed");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: "invalid signature".into(),
                        code: "INVALID_SIGNATURE".into(),
                    }),
                )
            }
            other => api_error(other),
        })?;

    Ok(Json(ack))
}

/// Create a split-fee checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let created = state.checkout.create(payload).await.map_err(api_error)?;
    Ok(Json(CheckoutResponse {
        success: true,
        created,
    }))
}

/// List all creators with live provider status (admin only)
pub async fn list_creators(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CreatorListResponse>, ApiError> {
    state.auth.verify(&headers).map_err(api_error)?;

    let creators = state.onboarding.list_creators().await.map_err(api_error)?;

    Ok(Json(CreatorListResponse {
        count: creators.len(),
        creators,
    }))
}

/// Detailed status for one creator (admin only)
pub async fn get_creator(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(creator_id): Path<String>,
) -> Result<Json<CreatorStatus>, ApiError> {
    state.auth.verify(&headers).map_err(api_error)?;

    let status = state
        .onboarding
        .creator_status(&creator_id)
        .await
        .map_err(api_error)?;

    Ok(Json(status))
}

/// Mint an Express-dashboard login link for a creator (admin only)
pub async fn generate_login_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(creator_id): Path<String>,
) -> Result<Json<LoginLinkResponse>, ApiError> {
    state.auth.verify(&headers).map_err(api_error)?;

    let link = state
        .onboarding
        .login_link(&creator_id)
        .await
        .map_err(api_error)?;

    Ok(Json(LoginLinkResponse {
        url: link.url,
        created: link.created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use base64::{Engine as _, engine::general_purpose::STANDARD};

    use connect_core::{
        AccessGrantTrigger, CheckoutOrchestrator, MemoryCreatorStore, MockConnectProvider,
        MockSpaceInviter, OnboardingService, WebhookDispatcher, WebhookVerifier,
    };

    use crate::auth::AdminCredentials;

    async fn state_with_creator() -> AppState {
        let store = Arc::new(MemoryCreatorStore::new());
        let provider = Arc::new(MockConnectProvider::new());
        let inviter = Arc::new(MockSpaceInviter::new());

        let onboarding = Arc::new(OnboardingService::new(
            store.clone(),
            provider.clone(),
            "http://localhost:3001",
        ));
        onboarding
            .provision(ProvisionRequest {
                creator_id: "creator_1".into(),
                email: "creator@example.com".into(),
                name: None,
            })
            .await
            .unwrap();

        let checkout = Arc::new(CheckoutOrchestrator::new(
            store,
            provider.clone(),
            "http://localhost:3001",
        ));
        let grants = Arc::new(AccessGrantTrigger::new(provider, inviter));
        let webhooks = Arc::new(WebhookDispatcher::new(
            WebhookVerifier::new("whsec_test"),
            onboarding.clone(),
            grants,
        ));

        AppState {
            onboarding,
            checkout,
            webhooks,
            auth: AdminCredentials::new("admin", "hunter2"),
        }
    }

    fn admin_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("admin:hunter2"))
                .parse()
                .unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn listing_creators_requires_admin_credentials() {
        let state = state_with_creator().await;

        let denied = list_creators(State(state.clone()), HeaderMap::new()).await;
        assert_eq!(denied.unwrap_err().0, StatusCode::UNAUTHORIZED);

        let allowed = list_creators(State(state), admin_headers()).await.unwrap();
        assert_eq!(allowed.0.count, 1);
    }

    #[tokio::test]
    async fn creator_status_requires_admin_credentials() {
        let state = state_with_creator().await;

        let denied = get_creator(
            State(state.clone()),
            HeaderMap::new(),
            Path("creator_1".into()),
        )
        .await;
        assert_eq!(denied.unwrap_err().0, StatusCode::UNAUTHORIZED);

        let allowed = get_creator(State(state), admin_headers(), Path("creator_1".into()))
            .await
            .unwrap();
        assert_eq!(allowed.0.record.creator_id, "creator_1");
    }

    #[tokio::test]
    async fn login_links_require_admin_credentials() {
        let state = state_with_creator().await;

        let denied = generate_login_link(
            State(state.clone()),
            HeaderMap::new(),
            Path("creator_1".into()),
        )
        .await;
        assert_eq!(denied.unwrap_err().0, StatusCode::UNAUTHORIZED);

        let allowed =
            generate_login_link(State(state), admin_headers(), Path("creator_1".into()))
                .await
                .unwrap();
        assert!(!allowed.0.url.is_empty());
    }
}
