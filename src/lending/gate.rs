//! Role-based authorization checks
//!
//! Pure functions over the caller's identity; used by the ledger and by the
//! catalog and user services.

use super::error::{LendingError, LendingResult};
use super::identity::Identity;
use super::model::Role;

/// Roles allowed to act on other users' loans and records
pub const STAFF: &[Role] = &[Role::Admin, Role::Librarian];

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::Librarian, Role::Reader];

/// Require an identity whose role is one of `required`
pub fn authorize<'a>(identity: Option<&'a Identity>, required: &[Role]) -> LendingResult<&'a Identity> {
    let identity = identity.ok_or(LendingError::Unauthorized)?;
    if required.contains(&identity.role) {
        Ok(identity)
    } else {
        Err(LendingError::Forbidden(format!(
            "role {} is not permitted",
            identity.role
        )))
    }
}

/// Require an identity that is `owner_id` itself or holds one of `privileged`
pub fn authorize_owner_or<'a>(
    identity: Option<&'a Identity>,
    owner_id: &str,
    privileged: &[Role],
) -> LendingResult<&'a Identity> {
    let identity = identity.ok_or(LendingError::Unauthorized)?;
    if identity.user_id == owner_id || privileged.contains(&identity.role) {
        Ok(identity)
    } else {
        Err(LendingError::Forbidden(format!(
            "role {} may not act for another user",
            identity.role
        )))
    }
}
