//! Communication-Space Invitations
//!
//! Abstraction over the private space a paying subscriber is granted
//! access to. The only required capability is an idempotent email invite.

mod matrix;

pub use matrix::{MatrixConfig, MatrixInviter};

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ConnectError, Result};

/// Result of one invitation attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InviteOutcome {
    /// A new invitation was sent
    Invited,
    /// The address already belongs to a member; treated as success
    AlreadyMember,
}

/// Space-invitation capability
#[async_trait]
pub trait SpaceInviter: Send + Sync {
    /// Invite an address into the space
    async fn invite(&self, email: &str) -> Result<InviteOutcome>;

    /// Remove a member from the space. Stub: removal is deferred to an
    /// operator, so cancelled subscriptions are only logged.
    async fn revoke(&self, customer_id: &str) -> Result<()> {
        Err(ConnectError::Upstream(format!(
            "space removal not implemented (customer {customer_id})"
        )))
    }

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Recording inviter for tests
#[derive(Default)]
pub struct MockSpaceInviter {
    members: Mutex<HashSet<String>>,
    invited: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl MockSpaceInviter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a member so the next invite reports `AlreadyMember`
    pub fn add_member(&self, email: &str) {
        self.members.lock().unwrap().insert(email.to_string());
    }

    /// Make subsequent invites fail with an upstream error
    pub fn fail_next(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Every address an invite was attempted for, in order
    pub fn invited(&self) -> Vec<String> {
        self.invited.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpaceInviter for MockSpaceInviter {
    async fn invite(&self, email: &str) -> Result<InviteOutcome> {
        if *self.fail.lock().unwrap() {
            return Err(ConnectError::Upstream("invite backend unavailable".into()));
        }

        self.invited.lock().unwrap().push(email.to_string());

        if !self.members.lock().unwrap().insert(email.to_string()) {
            return Ok(InviteOutcome::AlreadyMember);
        }
        Ok(InviteOutcome::Invited)
    }

    fn name(&self) -> &str {
        "MockSpace"
    }
}
