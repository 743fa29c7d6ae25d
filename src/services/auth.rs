//! Authentication service for accounts and JWT handling
//!
//! Provides:
//! - Sign-up and login
//! - Password hashing with bcrypt
//! - Access token generation and validation

use std::collections::BTreeSet;
use std::sync::Arc;

use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{DocumentStore, DocumentStoreExt, Filter, Stored};
use crate::lending::{Identity, LendingError, LendingResult, Role, User};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    pub role: Role,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

// ============================================================================
// Auth Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct SignUpInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub favorite_genres: Vec<String>,
}

/// Token plus the account it was issued for
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: Stored<User>,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default: 24 hours)
    pub access_token_lifetime: i64,
    /// Bcrypt cost factor (default: 12)
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            access_token_lifetime: 24 * 60 * 60,
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> LendingResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(LendingError::invalid(format!("'{email}' is not a valid email address")))
    }
}

pub fn validate_password(password: &str) -> LendingResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LendingError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

// ============================================================================
// Auth Service
// ============================================================================

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(store: Arc<dyn DocumentStore>, config: AuthConfig) -> Self {
        Self { store, config }
    }

    // ========================================================================
    // Sign-up
    // ========================================================================

    /// Create a Reader account and log it in.
    ///
    /// While no admin exists the new account is made admin instead, so a
    /// fresh deployment can be administered.
    pub async fn sign_up(&self, input: SignUpInput) -> LendingResult<AuthSession> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(LendingError::invalid("name must not be empty"));
        }
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        validate_password(&input.password)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(LendingError::invalid("email already registered"));
        }

        let has_admin = !self
            .store
            .list::<User>(&Filter::eq("role", Role::Admin.as_str()))
            .await?
            .is_empty();
        let role = if has_admin {
            Role::Reader
        } else {
            info!(email = %email, "Creating first admin user");
            Role::Admin
        };

        let user = self
            .store
            .create(User {
                name,
                email,
                password_hash: self.hash_password(&input.password)?,
                role,
                favorite_genres: input.favorite_genres,
                registered_at: Utc::now(),
                active_loans: BTreeSet::new(),
            })
            .await?;

        info!(user_id = %user.id, role = %role, "User signed up");
        let token = self.issue_token(&user.id, role)?;
        Ok(AuthSession { token, user })
    }

    // ========================================================================
    // Login
    // ========================================================================

    pub async fn login(&self, email: &str, password: &str) -> LendingResult<AuthSession> {
        let email = normalize_email(email);
        let user = match self.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                debug!(email = %email, "Login for unknown email");
                return Err(LendingError::Unauthorized);
            }
        };

        if !self.verify_password(password, &user.value.password_hash)? {
            debug!(user_id = %user.id, "Login with wrong password");
            return Err(LendingError::Unauthorized);
        }

        let token = self.issue_token(&user.id, user.value.role)?;
        info!(user_id = %user.id, "User logged in");
        Ok(AuthSession { token, user })
    }

    /// The account behind `identity`
    pub async fn current_user(&self, identity: Option<&Identity>) -> LendingResult<Stored<User>> {
        let identity = identity.ok_or(LendingError::Unauthorized)?;
        self.store
            .get::<User>(&identity.user_id)
            .await?
            .ok_or_else(|| LendingError::not_found("user", identity.user_id.as_str()))
    }

    pub async fn recover_password(&self, _email: &str) -> LendingResult<bool> {
        Err(LendingError::Unsupported("password recovery"))
    }

    pub async fn reset_password(&self, _otp: &str, _new_password: &str) -> LendingResult<bool> {
        Err(LendingError::Unsupported("password reset"))
    }

    async fn find_by_email(&self, email: &str) -> LendingResult<Option<Stored<User>>> {
        let mut found = self.store.list::<User>(&Filter::eq("email", email)).await?;
        Ok(found.pop())
    }

    // ========================================================================
    // Password Helpers
    // ========================================================================

    pub(crate) fn hash_password(&self, password: &str) -> LendingResult<String> {
        hash(password, self.config.bcrypt_cost)
            .map_err(|e| LendingError::Internal(format!("failed to hash password: {e}")))
    }

    pub(crate) fn verify_password(&self, password: &str, hash: &str) -> LendingResult<bool> {
        verify(password, hash)
            .map_err(|e| LendingError::Internal(format!("failed to verify password: {e}")))
    }

    // ========================================================================
    // Token Helpers
    // ========================================================================

    pub fn issue_token(&self, user_id: &str, role: Role) -> LendingResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            role,
            exp: (now + Duration::seconds(self.config.access_token_lifetime)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| LendingError::Internal(format!("failed to sign token: {e}")))
    }

    /// Decode a bearer token into the caller's identity
    pub fn verify_token(&self, token: &str) -> LendingResult<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!(error = %e, "JWT verification failed");
            LendingError::Unauthorized
        })?;

        Ok(Identity::new(data.claims.sub, data.claims.role))
    }
}
