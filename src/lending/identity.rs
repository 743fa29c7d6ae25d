//! Caller identity and per-request context

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::error::{LendingError, LendingResult};
use super::model::Role;

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Request-scoped inputs threaded through every lending operation
#[derive(Debug, Clone)]
pub struct RequestContext {
    identity: Option<Identity>,
    deadline: Instant,
}

impl RequestContext {
    pub fn new(identity: Option<Identity>, timeout: Duration) -> Self {
        Self {
            identity,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn authenticated(identity: Identity, timeout: Duration) -> Self {
        Self::new(Some(identity), timeout)
    }

    pub fn anonymous(timeout: Duration) -> Self {
        Self::new(None, timeout)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Drive `operation` to completion or fail with [LendingError::Timeout]
    /// once the deadline passes. A unit of work abandoned here is dropped
    /// uncommitted, so none of its writes apply.
    pub async fn within_deadline<T, F>(&self, operation: &str, fut: F) -> LendingResult<T>
    where
        F: Future<Output = LendingResult<T>>,
    {
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = %operation, "Operation deadline exceeded");
                Err(LendingError::Timeout)
            }
        }
    }
}
