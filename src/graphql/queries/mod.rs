pub mod books;
pub mod loans;
pub mod user;

pub use books::BookQueries;
pub use loans::LoanQueries;
pub use user::UserQueries;

pub(crate) mod prelude {
    pub(crate) use async_graphql::{Context, Object, Result};

    pub(crate) use crate::graphql::auth::{AuthExt, AuthGuard};
    pub(crate) use crate::graphql::helpers::*;
    pub(crate) use crate::graphql::types::*;
    pub(crate) use crate::lending::LoanLedger;
    pub(crate) use crate::services::{AuthService, CatalogService, UserService};
}
