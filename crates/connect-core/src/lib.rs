//! Creator Connect Core
//!
//! Creator onboarding and payment-event lifecycle for a platform selling
//! subscriptions on behalf of independent creators:
//!
//! 1. An admin provisions a creator: a provider sub-account is created and
//!    the creator receives a hosted onboarding link.
//! 2. Signed provider webhooks reconcile local activation state as the
//!    creator completes (or falls out of) onboarding.
//! 3. Once charges are enabled, subscribers check out on the creator's
//!    sub-account with the platform fee split off the top.
//! 4. Completed payments invite the payer into the creators' private
//!    communication space.

pub mod checkout;
pub mod creator;
pub mod email;
pub mod error;
pub mod grant;
pub mod invite;
pub mod onboarding;
pub mod provider;
pub mod webhook;

pub use checkout::{CheckoutCreated, CheckoutOrchestrator, CheckoutRequest,
    DEFAULT_APPLICATION_FEE_PERCENT};
pub use creator::{CreatorRecord, CreatorStore, JsonFileCreatorStore, MemoryCreatorStore};
pub use error::{ConnectError, Result};
pub use grant::{AccessGrantTrigger, GrantOutcome};
pub use invite::{InviteOutcome, MatrixConfig, MatrixInviter, MockSpaceInviter, SpaceInviter};
pub use onboarding::{CreatorStatus, OnboardingService, ProvisionRequest, Provisioned,
    ReturnOutcome};
pub use provider::{AccountSnapshot, ConnectProvider, MockConnectProvider, StripeConfig,
    StripeConnectClient};
pub use webhook::{ConnectEvent, WebhookAck, WebhookDispatcher, WebhookVerifier};
