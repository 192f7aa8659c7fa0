//! Account activation records owned by the user service.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    Registration,
    PasswordReset,
}

/// A pending activation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub user_id: UserId,
    pub kind: ActivationKind,
    pub expires_at: DateTime<Utc>,
}

/// Trait for purging accounts that were never confirmed.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Deletes activations expired before `now`, and the users whose
    /// registration was never confirmed. Returns the number of deleted users.
    async fn purge_expired_registrations(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[derive(Debug, Default)]
struct InMemoryAccountState {
    users: HashSet<UserId>,
    activations: Vec<Activation>,
}

/// In-memory account directory for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountDirectory {
    state: Arc<RwLock<InMemoryAccountState>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user together with a pending activation.
    pub fn add_pending(&self, user_id: UserId, kind: ActivationKind, expires_at: DateTime<Utc>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.users.insert(user_id);
        state.activations.push(Activation {
            user_id,
            kind,
            expires_at,
        });
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .users
            .contains(&user_id)
    }

    pub fn activation_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .activations
            .len()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn purge_expired_registrations(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut state.activations)
            .into_iter()
            .partition(|a| a.expires_at < now);
        state.activations = live;

        let mut deleted = 0;
        for activation in expired {
            if activation.kind == ActivationKind::Registration
                && state.users.remove(&activation.user_id)
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
