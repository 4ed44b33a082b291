//! Webhook Verification and Dispatch
//!
//! Events arrive signed with a shared secret in the `stripe-signature`
//! header. The raw body is verified before any JSON parsing. Once a
//! signature checks out the event is acknowledged no matter what the
//! downstream handlers do; the provider retries on anything else and a
//! handler bug must not amplify into a retry storm.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ConnectError, Result};
use crate::grant::AccessGrantTrigger;
use crate::onboarding::OnboardingService;

/// Oldest event timestamp accepted, in seconds
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Tolerated clock skew for timestamps from the future, in seconds
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed `stripe-signature` header
#[derive(Debug)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse the comma-separated `k=v` header. Unknown keys (including
    /// `v0` test-mode signatures) are ignored; a missing `t` or `v1`
    /// fails.
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut v1_signature = None;

        for pair in header.split(',') {
            let Some((key, value)) = pair.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        ConnectError::Authentication("malformed signature timestamp".into())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        ConnectError::Authentication("malformed signature hex".into())
                    })?);
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or_else(|| {
                ConnectError::Authentication("signature header missing timestamp".into())
            })?,
            v1_signature: v1_signature.ok_or_else(|| {
                ConnectError::Authentication("signature header missing v1 signature".into())
            })?,
        })
    }
}

/// Webhook signature verifier
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify the raw payload against the signature header. Every failure
    /// mode maps to `Authentication`.
    pub fn verify(&self, payload: &str, header: &str) -> Result<()> {
        let parsed = SignatureHeader::parse(header)?;

        let now = chrono::Utc::now().timestamp();
        if now - parsed.timestamp > MAX_EVENT_AGE_SECS {
            return Err(ConnectError::Authentication(
                "signature timestamp too old".into(),
            ));
        }
        if parsed.timestamp - now > MAX_CLOCK_SKEW_SECS {
            return Err(ConnectError::Authentication(
                "signature timestamp in the future".into(),
            ));
        }

        let expected = compute_signature(&self.secret, parsed.timestamp, payload);

        // Length mismatch yields a zero Choice without branching on content
        if expected.ct_eq(parsed.v1_signature.as_slice()).into() {
            Ok(())
        } else {
            Err(ConnectError::Authentication(
                "signature mismatch".into(),
            ))
        }
    }
}

fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Envelope shared by every event type
#[derive(Debug, Deserialize)]
pub struct ConnectEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Connected sub-account the event originated from, when applicable
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub livemode: bool,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// `account.updated` payload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccountUpdatedPayload {
    pub id: String,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub charges_enabled: bool,
}

/// `checkout.session.completed` payload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutCompletedPayload {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// `customer.subscription.deleted` payload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionCancelledPayload {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
}

/// Acknowledgment body returned to the provider
#[derive(Clone, Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Webhook dispatcher: verify, parse, route, always acknowledge
pub struct WebhookDispatcher {
    verifier: WebhookVerifier,
    onboarding: Arc<OnboardingService>,
    grants: Arc<AccessGrantTrigger>,
}

impl WebhookDispatcher {
    pub fn new(
        verifier: WebhookVerifier,
        onboarding: Arc<OnboardingService>,
        grants: Arc<AccessGrantTrigger>,
    ) -> Self {
        Self {
            verifier,
            onboarding,
            grants,
        }
    }

    /// Handle one raw webhook delivery. A bad signature or unparseable
    /// body is rejected; after that the event is acknowledged even when a
    /// handler fails.
    pub async fn handle(&self, payload: &str, signature_header: &str) -> Result<WebhookAck> {
        self.verifier.verify(payload, signature_header)?;

        let event: ConnectEvent = serde_json::from_str(payload)
            .map_err(|e| ConnectError::Validation(format!("malformed event body: {e}")))?;

        tracing::info!(
            event_id = %event.id,
            kind = %event.kind,
            account = event.account.as_deref().unwrap_or("platform"),
            "webhook received"
        );

        if let Err(e) = self.dispatch(&event).await {
            tracing::error!(
                event_id = %event.id,
                kind = %event.kind,
                error = %e,
                "webhook handler failed, acknowledging anyway"
            );
        }

        Ok(WebhookAck { received: true })
    }

    async fn dispatch(&self, event: &ConnectEvent) -> Result<()> {
        match event.kind.as_str() {
            "account.updated" => {
                let account: AccountUpdatedPayload =
                    serde_json::from_value(event.data.object.clone())
                        .map_err(|e| ConnectError::Validation(format!("account payload: {e}")))?;
                self.onboarding.reconcile(
                    &account.id,
                    account.details_submitted,
                    account.charges_enabled,
                )?;
            }
            "checkout.session.completed" => {
                let session: CheckoutCompletedPayload =
                    serde_json::from_value(event.data.object.clone())
                        .map_err(|e| ConnectError::Validation(format!("session payload: {e}")))?;
                self.grants
                    .on_payment_completed(event.account.as_deref(), &session)
                    .await?;
            }
            "customer.subscription.deleted" => {
                let subscription: SubscriptionCancelledPayload =
                    serde_json::from_value(event.data.object.clone()).map_err(|e| {
                        ConnectError::Validation(format!("subscription payload: {e}"))
                    })?;
                self.grants.on_subscription_cancelled(&subscription).await?;
            }
            other => {
                tracing::debug!(kind = %other, "ignoring unhandled event type");
            }
        }

        Ok(())
    }
}

/// Build a valid `stripe-signature` header for a payload (test support)
#[cfg(test)]
pub fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
    format!(
        "t={timestamp},v1={}",
        hex::encode(compute_signature(secret, timestamp, payload))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::{CheckoutOrchestrator, CheckoutRequest};
    use crate::creator::MemoryCreatorStore;
    use crate::invite::MockSpaceInviter;
    use crate::onboarding::{OnboardingService, ProvisionRequest};
    use crate::provider::MockConnectProvider;

    const SECRET: &str = "whsec_test_secret";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn header_parses_and_ignores_unknown_keys() {
        let header = SignatureHeader::parse("t=1700000000,v0=deadbeef,v1=00ff,foo=bar").unwrap();
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.v1_signature, vec![0x00, 0xff]);
    }

    #[test]
    fn header_requires_timestamp_and_v1() {
        assert!(SignatureHeader::parse("v1=00ff").is_err());
        assert!(SignatureHeader::parse("t=1700000000").is_err());
        assert!(SignatureHeader::parse("t=abc,v1=00ff").is_err());
        assert!(SignatureHeader::parse("t=1700000000,v1=zz").is_err());
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(SECRET, now(), payload);
        assert!(verifier().verify(payload, &header).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(SECRET, now(), payload);
        let result = verifier().verify(r#"{"id":"evt_2"}"#, &header);
        assert!(matches!(result, Err(ConnectError::Authentication(_))));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign("whsec_other", now(), payload);
        let result = verifier().verify(payload, &header);
        assert!(matches!(result, Err(ConnectError::Authentication(_))));
    }

    #[test]
    fn stale_and_future_timestamps_are_rejected() {
        let payload = r#"{"id":"evt_1"}"#;

        let stale = sign(SECRET, now() - MAX_EVENT_AGE_SECS - 10, payload);
        assert!(verifier().verify(payload, &stale).is_err());

        let future = sign(SECRET, now() + MAX_CLOCK_SKEW_SECS + 10, payload);
        assert!(verifier().verify(payload, &future).is_err());

        let skewed = sign(SECRET, now() + MAX_CLOCK_SKEW_SECS - 5, payload);
        assert!(verifier().verify(payload, &skewed).is_ok());
    }

    struct Fixture {
        dispatcher: WebhookDispatcher,
        checkout: CheckoutOrchestrator,
        provider: Arc<MockConnectProvider>,
        inviter: Arc<MockSpaceInviter>,
        account_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryCreatorStore::new());
        let provider = Arc::new(MockConnectProvider::new());
        let inviter = Arc::new(MockSpaceInviter::new());

        let onboarding = Arc::new(OnboardingService::new(
            store.clone(),
            provider.clone(),
            "http://localhost:3001",
        ));
        let grants = Arc::new(AccessGrantTrigger::new(provider.clone(), inviter.clone()));
        let checkout =
            CheckoutOrchestrator::new(store.clone(), provider.clone(), "http://localhost:3001");

        let provisioned = onboarding
            .provision(ProvisionRequest {
                creator_id: "creator_1".into(),
                email: "creator@example.com".into(),
                name: None,
            })
            .await
            .unwrap();

        Fixture {
            dispatcher: WebhookDispatcher::new(verifier(), onboarding, grants),
            checkout,
            provider,
            inviter,
            account_id: provisioned.account_id,
        }
    }

    fn account_updated_event(
        account_id: &str,
        details_submitted: bool,
        charges_enabled: bool,
    ) -> String {
        serde_json::json!({
            "id": "evt_account",
            "type": "account.updated",
            "created": now(),
            "data": {
                "object": {
                    "id": account_id,
                    "details_submitted": details_submitted,
                    "charges_enabled": charges_enabled,
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn account_updated_unlocks_checkout() {
        let f = fixture().await;

        let payload = account_updated_event(&f.account_id, true, true);
        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);

        let created = f
            .checkout
            .create(CheckoutRequest {
                creator_id: "creator_1".into(),
                price_id: "price_123".into(),
                application_fee_percent: None,
                success_url: None,
                cancel_url: None,
            })
            .await
            .unwrap();
        assert!(created.url.contains("checkout.mock"));

        // Charges pause; checkout locks again
        let payload = account_updated_event(&f.account_id, true, false);
        f.dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();

        let result = f
            .checkout
            .create(CheckoutRequest {
                creator_id: "creator_1".into(),
                price_id: "price_123".into(),
                application_fee_percent: None,
                success_url: None,
                cancel_url: None,
            })
            .await;
        assert!(matches!(result, Err(ConnectError::Precondition(_))));
    }

    #[tokio::test]
    async fn completed_checkout_invites_the_payer() {
        let f = fixture().await;
        f.provider.add_customer(&f.account_id, "cus_1", "payer@example.com");

        let payload = serde_json::json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "account": f.account_id,
            "created": now(),
            "data": {
                "object": { "id": "cs_1", "customer": "cus_1" }
            }
        })
        .to_string();

        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);
        assert_eq!(f.inviter.invited(), vec!["payer@example.com"]);
    }

    #[tokio::test]
    async fn handler_failures_are_swallowed_and_acked() {
        let f = fixture().await;

        // Unknown account: reconcile fails, delivery still acknowledged
        let payload = account_updated_event("acct_unknown", true, true);
        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);

        // Session with no resolvable email: no invite, still acknowledged
        let payload = serde_json::json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "created": now(),
            "data": { "object": { "id": "cs_1" } }
        })
        .to_string();
        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);
        assert!(f.inviter.invited().is_empty());
    }

    #[tokio::test]
    async fn inviter_outage_does_not_fail_the_delivery() {
        let f = fixture().await;
        f.inviter.fail_next(true);

        let payload = serde_json::json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "account": f.account_id,
            "created": now(),
            "data": {
                "object": { "id": "cs_1", "customer_email": "payer@example.com" }
            }
        })
        .to_string();

        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);
        assert!(f.inviter.invited().is_empty());
    }

    #[tokio::test]
    async fn bad_signature_is_the_only_rejection() {
        let f = fixture().await;

        let payload = account_updated_event(&f.account_id, true, true);
        let result = f.dispatcher.handle(&payload, "t=0,v1=00").await;
        assert!(matches!(result, Err(ConnectError::Authentication(_))));

        // Valid signature over garbage JSON is a validation failure
        let garbage = "not json";
        let result = f
            .dispatcher
            .handle(garbage, &sign(SECRET, now(), garbage))
            .await;
        assert!(matches!(result, Err(ConnectError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged() {
        let f = fixture().await;

        let payload = serde_json::json!({
            "id": "evt_other",
            "type": "payout.paid",
            "created": now(),
            "data": { "object": {} }
        })
        .to_string();

        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);
    }

    #[tokio::test]
    async fn cancellation_events_are_acknowledged() {
        let f = fixture().await;

        let payload = serde_json::json!({
            "id": "evt_cancel",
            "type": "customer.subscription.deleted",
            "account": f.account_id,
            "created": now(),
            "data": {
                "object": { "id": "sub_1", "customer": "cus_1" }
            }
        })
        .to_string();

        let ack = f
            .dispatcher
            .handle(&payload, &sign(SECRET, now(), &payload))
            .await
            .unwrap();
        assert!(ack.received);
    }
}
