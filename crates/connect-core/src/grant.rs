//! Subscriber Access Grants
//!
//! Turns completed payments into space invitations. The payer's email is
//! taken from the checkout session when present, otherwise looked up at
//! the provider inside the creator's sub-account.

use std::sync::Arc;

use crate::email::is_valid_email;
use crate::error::{ConnectError, Result};
use crate::invite::{InviteOutcome, SpaceInviter};
use crate::provider::ConnectProvider;
use crate::webhook::{CheckoutCompletedPayload, SubscriptionCancelledPayload};

/// Outcome of one completed payment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    Invited { email: String },
    AlreadyMember { email: String },
}

/// Access grant trigger
pub struct AccessGrantTrigger {
    provider: Arc<dyn ConnectProvider>,
    inviter: Arc<dyn SpaceInviter>,
}

impl AccessGrantTrigger {
    pub fn new(provider: Arc<dyn ConnectProvider>, inviter: Arc<dyn SpaceInviter>) -> Self {
        Self { provider, inviter }
    }

    /// Invite the payer behind a completed checkout session into the space
    pub async fn on_payment_completed(
        &self,
        connected_account: Option<&str>,
        session: &CheckoutCompletedPayload,
    ) -> Result<GrantOutcome> {
        let email = match self.resolve_email(connected_account, session).await {
            Some(email) => email,
            None => {
                return Err(ConnectError::Validation(format!(
                    "no customer email for session {}",
                    session.id
                )));
            }
        };

        if !is_valid_email(&email) {
            return Err(ConnectError::Validation(format!(
                "invalid customer email: {email}"
            )));
        }

        match self.inviter.invite(&email).await? {
            InviteOutcome::Invited => {
                tracing::info!(%email, backend = self.inviter.name(), "subscriber invited");
                Ok(GrantOutcome::Invited { email })
            }
            InviteOutcome::AlreadyMember => {
                tracing::info!(%email, "subscriber already a member");
                Ok(GrantOutcome::AlreadyMember { email })
            }
        }
    }

    /// Cancelled subscriptions are logged for an operator; automated
    /// removal is deliberately not wired up.
    pub async fn on_subscription_cancelled(
        &self,
        payload: &SubscriptionCancelledPayload,
    ) -> Result<()> {
        let customer = payload.customer.as_deref().unwrap_or("unknown");
        tracing::warn!(
            subscription = %payload.id,
            %customer,
            "subscription cancelled, space removal deferred to an operator"
        );

        if let Err(e) = self.inviter.revoke(customer).await {
            tracing::warn!(%customer, error = %e, "space removal unavailable");
        }

        Ok(())
    }

    async fn resolve_email(
        &self,
        connected_account: Option<&str>,
        session: &CheckoutCompletedPayload,
    ) -> Option<String> {
        if let Some(email) = &session.customer_email {
            return Some(email.clone());
        }

        let account = connected_account?;
        let customer = session.customer.as_deref()?;

        match self.provider.customer_email(account, customer).await {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(
                    %account,
                    %customer,
                    error = %e,
                    "customer lookup failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invite::MockSpaceInviter;
    use crate::provider::MockConnectProvider;

    fn trigger() -> (
        AccessGrantTrigger,
        Arc<MockConnectProvider>,
        Arc<MockSpaceInviter>,
    ) {
        let provider = Arc::new(MockConnectProvider::new());
        let inviter = Arc::new(MockSpaceInviter::new());
        let trigger = AccessGrantTrigger::new(provider.clone(), inviter.clone());
        (trigger, provider, inviter)
    }

    fn session(customer: Option<&str>, customer_email: Option<&str>) -> CheckoutCompletedPayload {
        CheckoutCompletedPayload {
            id: "cs_test_1".into(),
            customer: customer.map(Into::into),
            customer_email: customer_email.map(Into::into),
        }
    }

    #[tokio::test]
    async fn session_email_wins_over_lookup() {
        let (trigger, _, inviter) = trigger();

        let outcome = trigger
            .on_payment_completed(None, &session(None, Some("payer@example.com")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            GrantOutcome::Invited {
                email: "payer@example.com".into()
            }
        );
        assert_eq!(inviter.invited(), vec!["payer@example.com"]);
    }

    #[tokio::test]
    async fn missing_session_email_falls_back_to_customer_lookup() {
        let (trigger, provider, inviter) = trigger();
        provider.add_customer("acct_a", "cus_1", "payer@example.com");

        let outcome = trigger
            .on_payment_completed(Some("acct_a"), &session(Some("cus_1"), None))
            .await
            .unwrap();

        assert!(matches!(outcome, GrantOutcome::Invited { .. }));
        assert_eq!(inviter.invited(), vec!["payer@example.com"]);
    }

    #[tokio::test]
    async fn unresolvable_email_is_a_validation_error() {
        let (trigger, _, inviter) = trigger();

        let result = trigger
            .on_payment_completed(Some("acct_a"), &session(Some("cus_missing"), None))
            .await;

        assert!(matches!(result, Err(ConnectError::Validation(_))));
        assert!(inviter.invited().is_empty());
    }

    #[tokio::test]
    async fn repeat_payments_report_already_member() {
        let (trigger, _, inviter) = trigger();
        inviter.add_member("payer@example.com");

        let outcome = trigger
            .on_payment_completed(None, &session(None, Some("payer@example.com")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            GrantOutcome::AlreadyMember {
                email: "payer@example.com".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_email_is_rejected_before_inviting() {
        let (trigger, _, inviter) = trigger();

        let result = trigger
            .on_payment_completed(None, &session(None, Some("not-an-email")))
            .await;

        assert!(matches!(result, Err(ConnectError::Validation(_))));
        assert!(inviter.invited().is_empty());
    }

    #[tokio::test]
    async fn cancellation_never_fails_the_caller() {
        let (trigger, _, _) = trigger();

        let payload = SubscriptionCancelledPayload {
            id: "sub_1".into(),
            customer: Some("cus_1".into()),
        };
        trigger.on_subscription_cancelled(&payload).await.unwrap();
    }
}
