use super::prelude::*;

#[derive(Default)]
pub struct AuthMutations;

#[Object]
impl AuthMutations {
    /// Create an account and log it in
    async fn sign_up(&self, ctx: &Context<'_>, input: SignUpInput) -> Result<AuthPayload> {
        let auth = ctx.data::<AuthService>()?;
        Ok(auth.sign_up(input.into()).await.gql()?.into())
    }

    async fn login(&self, ctx: &Context<'_>, email: String, password: String) -> Result<AuthPayload> {
        let auth = ctx.data::<AuthService>()?;
        Ok(auth.login(&email, &password).await.gql()?.into())
    }

    async fn recover_password(&self, ctx: &Context<'_>, email: String) -> Result<bool> {
        let auth = ctx.data::<AuthService>()?;
        auth.recover_password(&email).await.gql()
    }

    async fn reset_password(&self, ctx: &Context<'_>, otp: String, new_password: String) -> Result<bool> {
        let auth = ctx.data::<AuthService>()?;
        auth.reset_password(&otp, &new_password).await.gql()
    }
}
