use super::prelude::*;

#[derive(Default)]
pub struct UserQueries;

#[Object]
impl UserQueries {
    /// Get the current authenticated user
    async fn me(&self, ctx: &Context<'_>) -> Result<User> {
        let auth = ctx.data::<AuthService>()?;
        Ok(auth.current_user(ctx.identity()).await.gql()?.into())
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        let users = ctx.data::<UserService>()?;
        let all = users.list_users(&ctx.request_context()).await.gql()?;
        Ok(convert_all(all))
    }

    async fn user(&self, ctx: &Context<'_>, id: String) -> Result<User> {
        let users = ctx.data::<UserService>()?;
        Ok(users.user(&ctx.request_context(), &id).await.gql()?.into())
    }
}
