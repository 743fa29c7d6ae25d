use super::prelude::*;

#[derive(Default)]
pub struct LoanQueries;

#[Object]
impl LoanQueries {
    /// Loans held by the current user, open and closed
    #[graphql(guard = "AuthGuard")]
    async fn my_loans(&self, ctx: &Context<'_>) -> Result<Vec<Loan>> {
        let ledger = ctx.data::<LoanLedger>()?;
        let user_id = ctx.auth_identity()?.user_id.clone();
        let loans = ledger
            .loans_for_user(&ctx.request_context(), &user_id)
            .await
            .gql()?;
        Ok(loans_to_graphql(ledger, loans))
    }

    /// Loans of any user (self, or staff for others)
    async fn loans_for_user(&self, ctx: &Context<'_>, user_id: String) -> Result<Vec<Loan>> {
        let ledger = ctx.data::<LoanLedger>()?;
        let loans = ledger
            .loans_for_user(&ctx.request_context(), &user_id)
            .await
            .gql()?;
        Ok(loans_to_graphql(ledger, loans))
    }

    /// Borrowed loans past their due date (staff only)
    async fn overdue_loans(&self, ctx: &Context<'_>) -> Result<Vec<Loan>> {
        let ledger = ctx.data::<LoanLedger>()?;
        let loans = ledger.overdue_loans(&ctx.request_context()).await.gql()?;
        Ok(loans_to_graphql(ledger, loans))
    }
}
