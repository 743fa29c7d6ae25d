//! Request identity for GraphQL operations
//!
//! The HTTP handler verifies the bearer token and attaches the resulting
//! [Identity] as request data. Resolvers never read the token themselves;
//! they build a [RequestContext] and pass it explicitly to the services.
//!
//! ## Guards
//!
//! Use `AuthGuard` to reject anonymous callers before a resolver runs:
//!
//! ```ignore
//! #[graphql(guard = "AuthGuard")]
//! async fn my_loans(&self, ctx: &Context<'_>) -> Result<Vec<Loan>> { ... }
//! ```

use std::time::Duration;

use async_graphql::{Context, ErrorExtensions, Guard, Result};

use crate::lending::{Identity, LendingError, RequestContext};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-operation deadline, registered as schema data
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout(pub Duration);

impl Default for RequestTimeout {
    fn default() -> Self {
        Self(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// Extension trait to get the caller from GraphQL context
pub trait AuthExt {
    /// The verified caller, if a valid token was sent
    fn identity(&self) -> Option<&Identity>;

    /// The caller, or an `UNAUTHORIZED` error
    fn auth_identity(&self) -> Result<&Identity>;

    /// Identity plus a fresh deadline, for handing to the services
    fn request_context(&self) -> RequestContext;
}

impl<'a> AuthExt for Context<'a> {
    fn identity(&self) -> Option<&Identity> {
        self.data_opt::<Identity>()
    }

    fn auth_identity(&self) -> Result<&Identity> {
        self.identity()
            .ok_or_else(|| LendingError::Unauthorized.extend())
    }

    fn request_context(&self) -> RequestContext {
        let timeout = self
            .data_opt::<RequestTimeout>()
            .copied()
            .unwrap_or_default();
        RequestContext::new(self.identity().cloned(), timeout.0)
    }
}

/// Guard that requires authentication for GraphQL operations.
///
/// Use with `#[graphql(guard = "AuthGuard")]` on queries or mutations.
#[derive(Default)]
pub struct AuthGuard;

impl Guard for AuthGuard {
    fn check(&self, ctx: &Context<'_>) -> impl std::future::Future<Output = Result<()>> + Send {
        let result = ctx.auth_identity().map(|_| ());
        async move { result }
    }
}
