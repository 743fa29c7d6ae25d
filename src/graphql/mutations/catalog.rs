use super::prelude::*;

#[derive(Default)]
pub struct CatalogMutations;

#[Object]
impl CatalogMutations {
    // ------------------------------------------------------------------------
    // Books
    // ------------------------------------------------------------------------

    /// Add a book to the catalog (admin only)
    async fn add_book(&self, ctx: &Context<'_>, input: AddBookInput) -> Result<Book> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .add_book(&ctx.request_context(), input.into())
            .await
            .gql()?
            .into())
    }

    async fn edit_book(&self, ctx: &Context<'_>, id: String, input: EditBookInput) -> Result<Book> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .edit_book(&ctx.request_context(), &id, input.into())
            .await
            .gql()?
            .into())
    }

    /// Checked-out books cannot be deleted
    async fn delete_book(&self, ctx: &Context<'_>, id: String) -> Result<bool> {
        let catalog = ctx.data::<CatalogService>()?;
        catalog.delete_book(&ctx.request_context(), &id).await.gql()
    }

    // ------------------------------------------------------------------------
    // Authors
    // ------------------------------------------------------------------------

    async fn create_author(&self, ctx: &Context<'_>, input: CreateAuthorInput) -> Result<Author> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .create_author(&ctx.request_context(), input.into())
            .await
            .gql()?
            .into())
    }

    async fn update_author(&self, ctx: &Context<'_>, id: String, input: UpdateAuthorInput) -> Result<Author> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .update_author(&ctx.request_context(), &id, input.into())
            .await
            .gql()?
            .into())
    }

    async fn delete_author(&self, ctx: &Context<'_>, id: String) -> Result<bool> {
        let catalog = ctx.data::<CatalogService>()?;
        catalog.delete_author(&ctx.request_context(), &id).await.gql()
    }

    // ------------------------------------------------------------------------
    // Publishers
    // ------------------------------------------------------------------------

    async fn create_publisher(&self, ctx: &Context<'_>, input: CreatePublisherInput) -> Result<Publisher> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .create_publisher(&ctx.request_context(), input.into())
            .await
            .gql()?
            .into())
    }

    async fn update_publisher(
        &self,
        ctx: &Context<'_>,
        id: String,
        input: UpdatePublisherInput,
    ) -> Result<Publisher> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .update_publisher(&ctx.request_context(), &id, input.into())
            .await
            .gql()?
            .into())
    }

    async fn delete_publisher(&self, ctx: &Context<'_>, id: String) -> Result<bool> {
        let catalog = ctx.data::<CatalogService>()?;
        catalog.delete_publisher(&ctx.request_context(), &id).await.gql()
    }
}
