//! Application State

use std::sync::Arc;

use connect_core::{CheckoutOrchestrator, OnboardingService, WebhookDispatcher};

use crate::auth::AdminCredentials;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub onboarding: Arc<OnboardingService>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub auth: AdminCredentials,
}
