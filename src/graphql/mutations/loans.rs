use super::prelude::*;

#[derive(Default)]
pub struct LoanMutations;

#[Object]
impl LoanMutations {
    /// Borrow a book. `userId` defaults to the caller; staff may borrow on
    /// behalf of others.
    async fn borrow_book(&self, ctx: &Context<'_>, book_id: String, user_id: Option<String>) -> Result<Loan> {
        let ledger = ctx.data::<LoanLedger>()?;
        let user_id = match user_id {
            Some(id) => id,
            None => ctx.auth_identity()?.user_id.clone(),
        };
        let loan = ledger
            .borrow(&ctx.request_context(), &book_id, &user_id)
            .await
            .gql()?;
        Ok(loan_to_graphql(ledger, loan))
    }

    async fn return_book(&self, ctx: &Context<'_>, loan_id: String) -> Result<Loan> {
        let ledger = ctx.data::<LoanLedger>()?;
        let loan = ledger
            .return_loan(&ctx.request_context(), &loan_id)
            .await
            .gql()?;
        Ok(loan_to_graphql(ledger, loan))
    }

    /// Only the transition to `RETURNED` is supported
    async fn update_loan(&self, ctx: &Context<'_>, id: String, status: LoanStatus) -> Result<Loan> {
        let ledger = ctx.data::<LoanLedger>()?;
        let loan = ledger
            .update_loan(&ctx.request_context(), &id, status.into())
            .await
            .gql()?;
        Ok(loan_to_graphql(ledger, loan))
    }

    #[graphql(guard = "AuthGuard")]
    async fn reserve_book(&self, _ctx: &Context<'_>, book_id: String) -> Result<Loan> {
        tracing::debug!(book_id = %book_id, "Reservation requested");
        Err::<Loan, _>(LendingError::Unsupported("reserveBook")).gql()
    }
}
