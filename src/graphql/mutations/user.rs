use super::prelude::*;

#[derive(Default)]
pub struct UserMutations;

#[Object]
impl UserMutations {
    /// Update a profile: your own, or anyone's as admin
    async fn update_user(&self, ctx: &Context<'_>, id: String, input: UpdateUserInput) -> Result<User> {
        let users = ctx.data::<UserService>()?;
        Ok(users
            .update_user(&ctx.request_context(), &id, input.into())
            .await
            .gql()?
            .into())
    }

    async fn delete_user(&self, ctx: &Context<'_>, id: String) -> Result<bool> {
        let users = ctx.data::<UserService>()?;
        users.delete_user(&ctx.request_context(), &id).await.gql()
    }
}
