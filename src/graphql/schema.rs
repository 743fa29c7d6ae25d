//! GraphQL schema definition with merged query and mutation roots
//!
//! Each domain contributes one `#[Object]` struct; `MergedObject` combines
//! them into the roots.

use async_graphql::extensions::Tracing;
use async_graphql::{EmptySubscription, MergedObject, Schema};

use crate::lending::LoanLedger;
use crate::services::{AuthService, CatalogService, UserService};

use super::auth::RequestTimeout;
use super::mutations::{AuthMutations, CatalogMutations, LoanMutations, ReviewMutations, UserMutations};
use super::queries::{BookQueries, LoanQueries, UserQueries};

/// The GraphQL schema type
pub type ShelfmarkSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

#[derive(MergedObject, Default)]
pub struct QueryRoot(UserQueries, BookQueries, LoanQueries);

#[derive(MergedObject, Default)]
pub struct MutationRoot(
    AuthMutations,
    CatalogMutations,
    ReviewMutations,
    UserMutations,
    LoanMutations,
);

/// Services every resolver may reach through the context
#[derive(Clone)]
pub struct SchemaServices {
    pub ledger: LoanLedger,
    pub catalog: CatalogService,
    pub users: UserService,
    pub auth: AuthService,
    pub request_timeout: RequestTimeout,
}

/// Build the GraphQL schema with all resolvers
pub fn build_schema(services: SchemaServices) -> ShelfmarkSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(services.ledger)
        .data(services.catalog)
        .data(services.users)
        .data(services.auth)
        .data(services.request_timeout)
        .extension(Tracing)
        .finish()
}
