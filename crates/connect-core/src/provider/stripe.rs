//! Stripe Connect Client
//!
//! Implements `ConnectProvider` against the Stripe API with form-encoded
//! requests. Sub-account scoping uses the `Stripe-Account` header.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    AccountRequirements, AccountSnapshot, CheckoutParams, ConnectProvider, LoginLink,
    OnboardingLink, ProviderCheckout,
};
use crate::error::{ConnectError, Result};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Stripe API configuration
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...)
    pub secret_key: String,

    /// API base URL (overridable for tests)
    pub api_base: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base: DEFAULT_API_BASE.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables (`STRIPE_SECRET_KEY`)
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| ConnectError::Config("STRIPE_SECRET_KEY not set".into()))?;
        Ok(Self::new(secret_key))
    }

    /// Override the API base URL (for testing)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Stripe Connect client
pub struct StripeConnectClient {
    config: StripeConfig,
    http: reqwest::Client,
}

impl StripeConnectClient {
    pub fn new(config: StripeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConnectError::Config(format!("http client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        stripe_account: Option<&str>,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.config.api_base))
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .form(params);

        if let Some(account) = stripe_account {
            request = request.header("Stripe-Account", account);
        }

        Self::decode(request.send().await?).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        stripe_account: Option<&str>,
    ) -> Result<Option<T>> {
        let mut request = self
            .http
            .get(format!("{}{path}", self.config.api_base))
            .basic_auth(&self.config.secret_key, Option::<&str>::None);

        if let Some(account) = stripe_account {
            request = request.header("Stripe-Account", account);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(Self::decode(response).await?))
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, error = %body, "Stripe API call failed");
            return Err(ConnectError::Upstream(format!(
                "stripe returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConnectError::Upstream(format!("invalid stripe response: {e}")))
    }
}

#[async_trait]
impl ConnectProvider for StripeConnectClient {
    async fn create_account(&self, email: &str, creator_id: &str) -> Result<String> {
        let params = [
            ("type", "express".to_string()),
            ("email", email.to_string()),
            ("capabilities[card_payments][requested]", "true".to_string()),
            ("capabilities[transfers][requested]", "true".to_string()),
            ("business_type", "individual".to_string()),
            ("metadata[creator_id]", creator_id.to_string()),
        ];

        let account: AccountResponse = self.post_form("/v1/accounts", None, &params).await?;
        Ok(account.id)
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<OnboardingLink> {
        let params = [
            ("account", account_id.to_string()),
            ("return_url", return_url.to_string()),
            ("refresh_url", refresh_url.to_string()),
            ("type", "account_onboarding".to_string()),
        ];

        let link: AccountLinkResponse = self.post_form("/v1/account_links", None, &params).await?;
        Ok(OnboardingLink {
            url: link.url,
            expires_at: link.expires_at,
        })
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot> {
        let account: AccountResponse = self
            .get_json(&format!("/v1/accounts/{account_id}"), None)
            .await?
            .ok_or_else(|| {
                ConnectError::Upstream(format!("stripe account {account_id} not found"))
            })?;

        let requirements = account.requirements.unwrap_or_default();
        Ok(AccountSnapshot {
            account_id: account.id,
            details_submitted: account.details_submitted,
            charges_enabled: account.charges_enabled,
            payouts_enabled: account.payouts_enabled,
            requirements: AccountRequirements {
                currently_due: requirements.currently_due,
                eventually_due: requirements.eventually_due,
                past_due: requirements.past_due,
            },
        })
    }

    async fn create_checkout(
        &self,
        account_id: &str,
        params: CheckoutParams,
    ) -> Result<ProviderCheckout> {
        let form = [
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", params.price_id),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", params.success_url),
            ("cancel_url", params.cancel_url),
            (
                "subscription_data[application_fee_percent]",
                params.application_fee_percent.to_string(),
            ),
        ];

        let session: CheckoutSessionResponse = self
            .post_form("/v1/checkout/sessions", Some(account_id), &form)
            .await?;

        let url = session
            .url
            .ok_or_else(|| ConnectError::Upstream("no checkout URL returned".into()))?;

        Ok(ProviderCheckout {
            id: session.id,
            url,
        })
    }

    async fn customer_email(
        &self,
        account_id: &str,
        customer_id: &str,
    ) -> Result<Option<String>> {
        let customer: Option<CustomerResponse> = self
            .get_json(&format!("/v1/customers/{customer_id}"), Some(account_id))
            .await?;

        Ok(customer.and_then(|c| if c.deleted { None } else { c.email }))
    }

    async fn create_login_link(&self, account_id: &str) -> Result<LoginLink> {
        let link: LoginLinkResponse = self
            .post_form(&format!("/v1/accounts/{account_id}/login_links"), None, &[])
            .await?;

        Ok(LoginLink {
            url: link.url,
            created: link.created,
        })
    }
}

#[derive(Deserialize)]
struct AccountResponse {
    id: String,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    requirements: Option<RequirementsResponse>,
}

#[derive(Deserialize, Default)]
struct RequirementsResponse {
    #[serde(default)]
    currently_due: Vec<String>,
    #[serde(default)]
    eventually_due: Vec<String>,
    #[serde(default)]
    past_due: Vec<String>,
}

#[derive(Deserialize)]
struct AccountLinkResponse {
    url: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct LoginLinkResponse {
    url: String,
    #[serde(default)]
    created: i64,
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct CustomerResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    deleted: bool,
}
