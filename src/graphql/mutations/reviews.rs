use crate::services::ReviewInput;

use super::prelude::*;

#[derive(Default)]
pub struct ReviewMutations;

#[Object]
impl ReviewMutations {
    async fn add_review(&self, ctx: &Context<'_>, input: AddReviewInput) -> Result<Review> {
        let catalog = ctx.data::<CatalogService>()?;
        let review = ReviewInput {
            rating: input.rating,
            review_text: input.review_text,
        };
        Ok(catalog
            .add_review(&ctx.request_context(), &input.book_id, review)
            .await
            .gql()?
            .into())
    }

    /// Only the review's author may edit it
    async fn edit_review(&self, ctx: &Context<'_>, id: String, input: EditReviewInput) -> Result<Review> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .edit_review(&ctx.request_context(), &id, input.into())
            .await
            .gql()?
            .into())
    }

    async fn delete_review(&self, ctx: &Context<'_>, id: String) -> Result<bool> {
        let catalog = ctx.data::<CatalogService>()?;
        catalog.delete_review(&ctx.request_context(), &id).await.gql()
    }
}
