//! Split-Fee Checkout
//!
//! Builds subscription checkout sessions on a creator's sub-account with
//! the platform fee applied. Checkout is only offered once the provider
//! has enabled charges for the creator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::creator::CreatorStore;
use crate::error::{ConnectError, Result};
use crate::provider::{CheckoutParams, ConnectProvider};

/// Platform cut applied when the caller does not override it
pub const DEFAULT_APPLICATION_FEE_PERCENT: f64 = 10.0;

/// Checkout session request
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRequest {
    pub creator_id: String,
    pub price_id: String,
    #[serde(default)]
    pub application_fee_percent: Option<f64>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// Created checkout session
#[derive(Clone, Debug, Serialize)]
pub struct CheckoutCreated {
    pub session_id: String,
    pub url: String,
    pub creator_id: String,
    #[serde(rename = "stripe_account")]
    pub provider_account_id: String,
    pub application_fee_percent: f64,
}

/// Checkout orchestrator
pub struct CheckoutOrchestrator {
    store: Arc<dyn CreatorStore>,
    provider: Arc<dyn ConnectProvider>,
    base_url: String,
}

impl CheckoutOrchestrator {
    pub fn new(
        store: Arc<dyn CreatorStore>,
        provider: Arc<dyn ConnectProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            base_url: base_url.into(),
        }
    }

    /// Create a subscription checkout session for a creator
    pub async fn create(&self, request: CheckoutRequest) -> Result<CheckoutCreated> {
        if request.creator_id.trim().is_empty() {
            return Err(ConnectError::Validation("creator_id is required".into()));
        }
        if request.price_id.trim().is_empty() {
            return Err(ConnectError::Validation("price_id is required".into()));
        }

        let record = self.store.get(&request.creator_id)?.ok_or_else(|| {
            ConnectError::NotFound(format!("creator {} not found", request.creator_id))
        })?;

        if !record.charges_enabled {
            return Err(ConnectError::Precondition(format!(
                "creator {} has not completed onboarding",
                record.creator_id
            )));
        }

        let fee = request
            .application_fee_percent
            .unwrap_or(DEFAULT_APPLICATION_FEE_PERCENT);

        let params = CheckoutParams {
            price_id: request.price_id,
            application_fee_percent: fee,
            success_url: request
                .success_url
                .unwrap_or_else(|| format!("{}/success", self.base_url)),
            cancel_url: request
                .cancel_url
                .unwrap_or_else(|| format!("{}/cancel", self.base_url)),
        };

        let checkout = self
            .provider
            .create_checkout(&record.provider_account_id, params)
            .await?;

        tracing::info!(
            creator_id = %record.creator_id,
            session_id = %checkout.id,
            fee_percent = fee,
            "checkout session created"
        );

        Ok(CheckoutCreated {
            session_id: checkout.id,
            url: checkout.url,
            creator_id: record.creator_id,
            provider_account_id: record.provider_account_id,
            application_fee_percent: fee,
        })
    }
}
