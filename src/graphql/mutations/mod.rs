pub mod auth;
pub mod catalog;
pub mod loans;
pub mod reviews;
pub mod user;

pub use auth::AuthMutations;
pub use catalog::CatalogMutations;
pub use loans::LoanMutations;
pub use reviews::ReviewMutations;
pub use user::UserMutations;

pub(crate) mod prelude {
    pub(crate) use async_graphql::{Context, Object, Result};

    pub(crate) use crate::graphql::auth::{AuthExt, AuthGuard};
    pub(crate) use crate::graphql::helpers::*;
    pub(crate) use crate::graphql::types::*;
    pub(crate) use crate::lending::{LendingError, LoanLedger};
    pub(crate) use crate::services::{AuthService, CatalogService, UserService};
}
