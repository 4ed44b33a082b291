//! Payment Provider Integration
//!
//! Abstraction over the payment provider's platform API: sub-account
//! creation, onboarding links, account status, split-fee checkout and
//! customer lookup.

mod mock;
mod stripe;

pub use mock::MockConnectProvider;
pub use stripe::{StripeConfig, StripeConnectClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Point-in-time activation status reported by the provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub details_submitted: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub requirements: AccountRequirements,
}

/// Outstanding compliance requirements for a sub-account
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequirements {
    pub currently_due: Vec<String>,
    pub eventually_due: Vec<String>,
    pub past_due: Vec<String>,
}

/// Time-limited onboarding link
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnboardingLink {
    pub url: String,
    pub expires_at: i64,
}

/// Dashboard login link for a sub-account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginLink {
    pub url: String,
    pub created: i64,
}

/// Parameters for a split-fee checkout session
#[derive(Clone, Debug)]
pub struct CheckoutParams {
    pub price_id: String,
    /// Platform cut as a percentage of the subscription total
    pub application_fee_percent: f64,
    pub success_url: String,
    pub cancel_url: String,
}

/// Provider-issued checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderCheckout {
    pub id: String,
    pub url: String,
}

/// Payment provider client trait
///
/// Implement this per provider; `MockConnectProvider` covers tests and
/// local development.
#[async_trait]
pub trait ConnectProvider: Send + Sync {
    /// Create a sub-account for a creator. `creator_id` is attached as
    /// external metadata for later reverse lookup.
    async fn create_account(&self, email: &str, creator_id: &str) -> Result<String>;

    /// Request a time-limited onboarding link bound to fixed return and
    /// refresh URLs.
    async fn create_onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<OnboardingLink>;

    /// Fetch the provider's current view of a sub-account
    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot>;

    /// Create a subscription checkout session on a sub-account, with the
    /// platform fee applied to the total.
    async fn create_checkout(
        &self,
        account_id: &str,
        params: CheckoutParams,
    ) -> Result<ProviderCheckout>;

    /// Look up a customer's email within a sub-account. Customer ids are
    /// not unique across sub-accounts, so the account scope is required.
    /// Returns `Ok(None)` when the customer is missing, deleted, or has
    /// no email on file.
    async fn customer_email(&self, account_id: &str, customer_id: &str)
        -> Result<Option<String>>;

    /// Create an Express-dashboard login link for a sub-account
    async fn create_login_link(&self, account_id: &str) -> Result<LoginLink>;
}
