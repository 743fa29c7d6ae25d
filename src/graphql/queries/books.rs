use super::prelude::*;

#[derive(Default)]
pub struct BookQueries;

#[Object]
impl BookQueries {
    /// All books in the catalog
    async fn books(&self, ctx: &Context<'_>) -> Result<Vec<Book>> {
        let catalog = ctx.data::<CatalogService>()?;
        let books = catalog.list_books(&ctx.request_context()).await.gql()?;
        Ok(convert_all(books))
    }

    /// A single book by ID
    async fn book(&self, ctx: &Context<'_>, id: String) -> Result<Book> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .book_details(&ctx.request_context(), &id)
            .await
            .gql()?
            .into())
    }

    async fn authors(&self, ctx: &Context<'_>) -> Result<Vec<Author>> {
        let catalog = ctx.data::<CatalogService>()?;
        let authors = catalog.list_authors(&ctx.request_context()).await.gql()?;
        Ok(convert_all(authors))
    }

    async fn author(&self, ctx: &Context<'_>, id: String) -> Result<Author> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog.author(&ctx.request_context(), &id).await.gql()?.into())
    }

    async fn publishers(&self, ctx: &Context<'_>) -> Result<Vec<Publisher>> {
        let catalog = ctx.data::<CatalogService>()?;
        let publishers = catalog.list_publishers(&ctx.request_context()).await.gql()?;
        Ok(convert_all(publishers))
    }

    async fn publisher(&self, ctx: &Context<'_>, id: String) -> Result<Publisher> {
        let catalog = ctx.data::<CatalogService>()?;
        Ok(catalog
            .publisher(&ctx.request_context(), &id)
            .await
            .gql()?
            .into())
    }

    /// Reviews left on a book
    async fn book_reviews(&self, ctx: &Context<'_>, book_id: String) -> Result<Vec<Review>> {
        let catalog = ctx.data::<CatalogService>()?;
        let reviews = catalog
            .book_reviews(&ctx.request_context(), &book_id)
            .await
            .gql()?;
        Ok(convert_all(reviews))
    }
}
