//! Account, catalog and user services built on the document store

pub mod auth;
pub mod catalog;
pub mod users;

pub use auth::{AuthConfig, AuthService, AuthSession, SignUpInput};
pub use catalog::{
    AuthorInput, AuthorUpdate, BookInput, BookUpdate, CatalogService, PublisherInput,
    PublisherUpdate, ReviewInput, ReviewUpdate,
};
pub use users::{UserService, UserUpdate};
