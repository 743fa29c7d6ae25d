//! User administration

use std::sync::Arc;

use tracing::info;

use crate::db::{
    DocumentStore, DocumentStoreExt, Filter, Stored, UnitOfWork, UnitOfWorkExt, commit_or_rollback,
};
use crate::lending::gate::{self, ADMIN_ONLY, STAFF};
use crate::lending::retry::{RetryConfig, retry_conflicts};
use crate::lending::{LendingError, LendingResult, RequestContext, Role, User};

use super::auth::{AuthService, normalize_email, validate_email, validate_password};
use super::catalog::Records;

/// Fields left as `None` are unchanged
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub favorite_genres: Option<Vec<String>>,
    /// Admin only
    pub role: Option<Role>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    records: Records,
    auth: AuthService,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthService, retry: RetryConfig) -> Self {
        Self {
            records: Records::new(store, retry),
            auth,
        }
    }

    fn store(&self) -> &Arc<dyn DocumentStore> {
        self.records.store()
    }

    pub async fn list_users(&self, ctx: &RequestContext) -> LendingResult<Vec<Stored<User>>> {
        gate::authorize(ctx.identity(), STAFF)?;
        ctx.within_deadline("list_users", async {
            Ok(self.store().list::<User>(&Filter::all()).await?)
        })
        .await
    }

    pub async fn user(&self, ctx: &RequestContext, id: &str) -> LendingResult<Stored<User>> {
        gate::authorize_owner_or(ctx.identity(), id, STAFF)?;
        ctx.within_deadline("user", self.records.fetch("user", id)).await
    }

    /// Users edit themselves; admins edit anyone.
    ///
    /// Changing one's own password requires the current one. The last admin
    /// cannot be demoted.
    pub async fn update_user(&self, ctx: &RequestContext, id: &str, update: UserUpdate) -> LendingResult<Stored<User>> {
        let caller = gate::authorize_owner_or(ctx.identity(), id, ADMIN_ONLY)?;
        if update.role.is_some() {
            gate::authorize(Some(caller), ADMIN_ONLY)?;
        }
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(LendingError::invalid("name must not be empty"));
            }
        }

        let updated = ctx
            .within_deadline("update_user", async {
                let email = match &update.email {
                    Some(email) => {
                        let email = normalize_email(email);
                        validate_email(&email)?;
                        let taken = self
                            .store()
                            .list::<User>(&Filter::eq("email", email.as_str()))
                            .await?
                            .into_iter()
                            .any(|other| other.id != id);
                        if taken {
                            return Err(LendingError::invalid("email already registered"));
                        }
                        Some(email)
                    }
                    None => None,
                };

                let password_hash = match &update.new_password {
                    Some(new_password) => {
                        validate_password(new_password)?;
                        if caller.user_id == id {
                            let current = self.records.fetch::<User>("user", id).await?;
                            let supplied = update.current_password.as_deref().unwrap_or_default();
                            if !self.auth.verify_password(supplied, &current.value.password_hash)? {
                                return Err(LendingError::invalid("current password is incorrect"));
                            }
                        }
                        Some(self.auth.hash_password(new_password)?)
                    }
                    None => None,
                };

                let changes = UserChanges {
                    name: update.name.as_deref().map(|name| name.trim().to_string()),
                    email,
                    favorite_genres: update.favorite_genres.clone(),
                    role: update.role,
                    password_hash,
                };
                retry_conflicts(|| self.try_update(id, &changes), self.records.retry(), "update_user").await
            })
            .await?;

        info!(user_id = %id, actor = %caller.user_id, "User updated");
        Ok(updated)
    }

    /// Admin only; refused while the user still holds books or is the last
    /// admin
    pub async fn delete_user(&self, ctx: &RequestContext, id: &str) -> LendingResult<bool> {
        let caller = gate::authorize(ctx.identity(), ADMIN_ONLY)?;
        ctx.within_deadline(
            "delete_user",
            retry_conflicts(|| self.try_delete(id), self.records.retry(), "delete_user"),
        )
        .await?;

        info!(user_id = %id, actor = %caller.user_id, "User deleted");
        Ok(true)
    }

    async fn try_update(&self, id: &str, changes: &UserChanges) -> LendingResult<Stored<User>> {
        let mut uow = self.store().begin().await?;
        let staged = stage_update(uow.as_mut(), id, changes).await;
        commit_or_rollback(uow, staged).await
    }

    async fn try_delete(&self, id: &str) -> LendingResult<()> {
        let mut uow = self.store().begin().await?;
        let staged = stage_delete(uow.as_mut(), id).await;
        commit_or_rollback(uow, staged).await
    }
}

/// Validated field changes, ready to apply
struct UserChanges {
    name: Option<String>,
    email: Option<String>,
    favorite_genres: Option<Vec<String>>,
    role: Option<Role>,
    password_hash: Option<String>,
}

impl UserChanges {
    fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(genres) = &self.favorite_genres {
            user.favorite_genres = genres.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(hash) = &self.password_hash {
            user.password_hash = hash.clone();
        }
    }
}

async fn fetch_user(uow: &mut dyn UnitOfWork, id: &str) -> LendingResult<Stored<User>> {
    uow.get::<User>(id)
        .await?
        .ok_or_else(|| LendingError::not_found("user", id))
}

/// Fails unless an admin other than `id` exists. The admin list is read in
/// `uow`, so a concurrent demotion of that other admin fails the commit.
async fn ensure_other_admin(uow: &mut dyn UnitOfWork, id: &str) -> LendingResult<()> {
    let admins = uow
        .list::<User>(&Filter::eq("role", Role::Admin.as_str()))
        .await?;
    if admins.iter().all(|admin| admin.id == id) {
        return Err(LendingError::invalid("at least one admin account must remain"));
    }
    Ok(())
}

async fn stage_update(uow: &mut dyn UnitOfWork, id: &str, changes: &UserChanges) -> LendingResult<Stored<User>> {
    let mut user = fetch_user(uow, id).await?;
    if user.value.role == Role::Admin && changes.role.is_some_and(|role| role != Role::Admin) {
        ensure_other_admin(uow, id).await?;
    }
    changes.apply(&mut user.value);
    uow.save(&mut user).await?;
    Ok(user)
}

async fn stage_delete(uow: &mut dyn UnitOfWork, id: &str) -> LendingResult<()> {
    let user = fetch_user(uow, id).await?;
    if !user.value.active_loans.is_empty() {
        return Err(LendingError::invalid(format!(
            "user {id} still has {} active loan(s)",
            user.value.active_loans.len()
        )));
    }
    if user.value.role == Role::Admin {
        ensure_other_admin(uow, id).await?;
    }
    uow.remove(&user).await?;
    Ok(())
}
