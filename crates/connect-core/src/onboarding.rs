//! Creator Provisioning and Reconciliation
//!
//! `OnboardingService` owns the creator lifecycle: provisioning a provider
//! sub-account plus local record, reconciling local state from provider
//! snapshots, and the read paths built on top (listing, status, dashboard
//! login links).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::creator::{CreatorRecord, CreatorStore};
use crate::email::is_valid_email;
use crate::error::{ConnectError, Result};
use crate::provider::{AccountRequirements, ConnectProvider, LoginLink, OnboardingLink};

/// Provisioning request for one creator
#[derive(Clone, Debug, Deserialize)]
pub struct ProvisionRequest {
    pub creator_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Successful provisioning result
#[derive(Clone, Debug, Serialize)]
pub struct Provisioned {
    pub creator_id: String,
    pub account_id: String,
    pub onboarding_url: String,
    pub expires_at: i64,
}

/// Result of a creator landing back on the platform after the hosted
/// onboarding flow
#[derive(Clone, Debug)]
pub enum ReturnOutcome {
    /// Details were submitted; the record is now onboarded
    Complete {
        creator_id: String,
        account_id: String,
    },
    /// Onboarding is still incomplete; `retry_url` resumes it
    Incomplete {
        creator_id: String,
        account_id: String,
        retry_url: String,
    },
}

/// Combined local and provider view of one creator
#[derive(Clone, Debug, Serialize)]
pub struct CreatorStatus {
    #[serde(flatten)]
    pub record: CreatorRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payouts_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<AccountRequirements>,
    /// Present when the provider lookup failed and only local state is shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Creator onboarding service
pub struct OnboardingService {
    store: Arc<dyn CreatorStore>,
    provider: Arc<dyn ConnectProvider>,
    base_url: String,
}

impl OnboardingService {
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

    fn return_url(&self, account_id: &str) -> String {
        format!("{}/connect/return?account_id={account_id}", self.base_url)
    }

    fn refresh_url(&self, account_id: &str) -> String {
        format!("{}/connect/refresh?account_id={account_id}", self.base_url)
    }

    /// Provision a new creator: provider sub-account first, local record
    /// second. A crash in between leaves an orphan sub-account at the
    /// provider but never a local record without one.
    pub async fn provision(&self, request: ProvisionRequest) -> Result<Provisioned> {
        if request.creator_id.trim().is_empty() {
            return Err(ConnectError::Validation("creator_id is required".into()));
        }
        if request.email.trim().is_empty() {
            return Err(ConnectError::Validation("email is required".into()));
        }
        if !is_valid_email(&request.email) {
            return Err(ConnectError::Validation(format!(
                "invalid email: {}",
                request.email
            )));
        }

        if let Some(existing) = self.store.get(&request.creator_id)? {
            return Err(ConnectError::Conflict(format!(
                "creator {} already exists with account {}",
                existing.creator_id, existing.provider_account_id
            )));
        }

        let account_id = self
            .provider
            .create_account(&request.email, &request.creator_id)
            .await?;

        let link = self
            .provider
            .create_onboarding_link(
                &account_id,
                &self.return_url(&account_id),
                &self.refresh_url(&account_id),
            )
            .await?;

        let record = CreatorRecord::new(
            &request.creator_id,
            &account_id,
            &request.email,
            request.name,
        );
        self.store.insert(&record)?;

        tracing::info!(
            creator_id = %record.creator_id,
            account_id = %account_id,
            "creator provisioned"
        );

        Ok(Provisioned {
            creator_id: record.creator_id,
            account_id,
            onboarding_url: link.url,
            expires_at: link.expires_at,
        })
    }

    /// Overwrite a creator's activation flags from a provider snapshot.
    /// Unknown accounts fail with `NotFound`.
    pub fn reconcile(
        &self,
        provider_account_id: &str,
        details_submitted: bool,
        charges_enabled: bool,
    ) -> Result<CreatorRecord> {
        let mut record = self
            .store
            .get_by_account(provider_account_id)?
            .ok_or_else(|| {
                ConnectError::NotFound(format!(
                    "no creator for provider account {provider_account_id}"
                ))
            })?;

        record.apply_snapshot(details_submitted, charges_enabled);
        self.store.update(&record)?;

        tracing::info!(
            creator_id = %record.creator_id,
            account_id = %provider_account_id,
            onboarding_complete = details_submitted,
            charges_enabled,
            "creator reconciled"
        );

        Ok(record)
    }

    /// Handle a creator returning from the hosted onboarding flow. The
    /// return itself proves nothing, so the account is re-fetched and
    /// reconciled before deciding the outcome.
    pub async fn handle_return(&self, account_id: &str) -> Result<ReturnOutcome> {
        let record = self.store.get_by_account(account_id)?.ok_or_else(|| {
            ConnectError::NotFound(format!("no creator for provider account {account_id}"))
        })?;

        let snapshot = self.provider.retrieve_account(account_id).await?;
        let record = self.reconcile(
            account_id,
            snapshot.details_submitted,
            snapshot.charges_enabled,
        )?;

        if record.onboarding_complete {
            return Ok(ReturnOutcome::Complete {
                creator_id: record.creator_id,
                account_id: account_id.to_string(),
            });
        }

        let link = self.refresh_link(account_id).await?;
        Ok(ReturnOutcome::Incomplete {
            creator_id: record.creator_id,
            account_id: account_id.to_string(),
            retry_url: link.url,
        })
    }

    /// Mint a fresh onboarding link for an expired one
    pub async fn refresh_link(&self, account_id: &str) -> Result<OnboardingLink> {
        if self.store.get_by_account(account_id)?.is_none() {
            return Err(ConnectError::NotFound(format!(
                "no creator for provider account {account_id}"
            )));
        }

        self.provider
            .create_onboarding_link(
                account_id,
                &self.return_url(account_id),
                &self.refresh_url(account_id),
            )
            .await
    }

    /// List every creator, enriched with a fresh provider snapshot where
    /// one can be fetched. A failed lookup degrades that entry to local
    /// state with an `error` note instead of failing the listing.
    pub async fn list_creators(&self) -> Result<Vec<CreatorStatus>> {
        let records = self.store.list()?;
        let mut statuses = Vec::with_capacity(records.len());

        for mut record in records {
            match self.provider.retrieve_account(&record.provider_account_id).await {
                Ok(snapshot) => {
                    record.onboarding_complete = snapshot.details_submitted;
                    record.charges_enabled = snapshot.charges_enabled;
                    statuses.push(CreatorStatus {
                        record,
                        payouts_enabled: Some(snapshot.payouts_enabled),
                        requirements: Some(snapshot.requirements),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        creator_id = %record.creator_id,
                        error = %e,
                        "provider lookup failed, returning local state"
                    );
                    statuses.push(CreatorStatus {
                        record,
                        payouts_enabled: None,
                        requirements: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(statuses)
    }

    /// Detailed status for one creator. The provider snapshot is required
    /// here; an upstream failure surfaces to the caller.
    pub async fn creator_status(&self, creator_id: &str) -> Result<CreatorStatus> {
        let mut record = self
            .store
            .get(creator_id)?
            .ok_or_else(|| ConnectError::NotFound(format!("creator {creator_id} not found")))?;

        let snapshot = self
            .provider
            .retrieve_account(&record.provider_account_id)
            .await?;

        record.onboarding_complete = snapshot.details_submitted;
        record.charges_enabled = snapshot.charges_enabled;

        Ok(CreatorStatus {
            record,
            payouts_enabled: Some(snapshot.payouts_enabled),
            requirements: Some(snapshot.requirements),
            error: None,
        })
    }

    /// Mint an Express-dashboard login link for an onboarded creator
    pub async fn login_link(&self, creator_id: &str) -> Result<LoginLink> {
        let record = self
            .store
            .get(creator_id)?
            .ok_or_else(|| ConnectError::NotFound(format!("creator {creator_id} not found")))?;

        self.provider
            .create_login_link(&record.provider_account_id)
            .await
    }
}
