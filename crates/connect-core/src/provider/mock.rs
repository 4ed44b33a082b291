//! Mock Connect Provider
//!
//! In-memory provider for tests and local development. Account status is
//! driven explicitly via `set_account_status`, standing in for the
//! out-of-band onboarding a real creator completes with the provider.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    AccountRequirements, AccountSnapshot, CheckoutParams, ConnectProvider, LoginLink,
    OnboardingLink, ProviderCheckout,
};
use crate::error::{ConnectError, Result};

/// Onboarding links stay valid for five minutes, mirroring the provider's
/// short-lived links.
const LINK_TTL_SECS: i64 = 300;

#[derive(Default)]
pub struct MockConnectProvider {
    accounts: RwLock<HashMap<String, AccountSnapshot>>,
    customers: RwLock<HashMap<(String, String), String>>,
    checkouts: RwLock<Vec<ProviderCheckout>>,
}

impl MockConnectProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the provider-side status of an account
    pub fn set_account_status(
        &self,
        account_id: &str,
        details_submitted: bool,
        charges_enabled: bool,
    ) {
        let mut accounts = self.accounts.write().unwrap();
        if let Some(snapshot) = accounts.get_mut(account_id) {
            snapshot.details_submitted = details_submitted;
            snapshot.charges_enabled = charges_enabled;
        }
    }

    /// Register a customer record inside a sub-account
    pub fn add_customer(&self, account_id: &str, customer_id: &str, email: &str) {
        self.customers.write().unwrap().insert(
            (account_id.to_string(), customer_id.to_string()),
            email.to_string(),
        );
    }

    /// Checkout sessions issued so far
    pub fn checkouts(&self) -> Vec<ProviderCheckout> {
        self.checkouts.read().unwrap().clone()
    }
}

#[async_trait]
impl ConnectProvider for MockConnectProvider {
    async fn create_account(&self, _email: &str, creator_id: &str) -> Result<String> {
        let account_id = format!(
            "acct_mock_{}",
            uuid::Uuid::new_v4().simple().to_string()[..12].to_owned()
        );

        self.accounts.write().unwrap().insert(
            account_id.clone(),
            AccountSnapshot {
                account_id: account_id.clone(),
                details_submitted: false,
                charges_enabled: false,
                payouts_enabled: false,
                requirements: AccountRequirements::default(),
            },
        );

        tracing::debug!(%account_id, %creator_id, "mock sub-account created");
        Ok(account_id)
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        _return_url: &str,
        _refresh_url: &str,
    ) -> Result<OnboardingLink> {
        if !self.accounts.read().unwrap().contains_key(account_id) {
            return Err(ConnectError::Upstream(format!(
                "no such account: {account_id}"
            )));
        }

        Ok(OnboardingLink {
            url: format!("https://connect.mock/setup/{account_id}"),
            expires_at: Utc::now().timestamp() + LINK_TTL_SECS,
        })
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot> {
        self.accounts
            .read()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| ConnectError::Upstream(format!("no such account: {account_id}")))
    }

    async fn create_checkout(
        &self,
        account_id: &str,
        _params: CheckoutParams,
    ) -> Result<ProviderCheckout> {
        if !self.accounts.read().unwrap().contains_key(account_id) {
            return Err(ConnectError::Upstream(format!(
                "no such account: {account_id}"
            )));
        }

        let id = format!(
            "cs_mock_{}",
            uuid::Uuid::new_v4().simple().to_string()[..12].to_owned()
        );
        let checkout = ProviderCheckout {
            url: format!("https://checkout.mock/c/{id}"),
            id,
        };

        self.checkouts.write().unwrap().push(checkout.clone());
        Ok(checkout)
    }

    async fn customer_email(
        &self,
        account_id: &str,
        customer_id: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .customers
            .read()
            .unwrap()
            .get(&(account_id.to_string(), customer_id.to_string()))
            .cloned())
    }

    async fn create_login_link(&self, account_id: &str) -> Result<LoginLink> {
        if !self.accounts.read().unwrap().contains_key(account_id) {
            return Err(ConnectError::Upstream(format!(
                "no such account: {account_id}"
            )));
        }

        Ok(LoginLink {
            url: format!("https://dashboard.mock/login/{account_id}"),
            created: Utc::now().timestamp(),
        })
    }
}
