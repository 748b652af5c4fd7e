use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{ChoiceNode, Listing, ListingDetail};

/// Source of catalog facets (manufacturer -> model group -> model -> trim)
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Valid choices one level below `prefix`.
    async fn resolve(&self, prefix: &[String]) -> Result<Vec<ChoiceNode>, RemoteError>;
}

/// Marketplace search and per-listing detail endpoints
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Run a compiled query, results in marketplace order
    async fn search(&self, query: &str) -> Result<Vec<Listing>, RemoteError>;

    async fn detail(&self, listing_id: &str) -> Result<ListingDetail, RemoteError>;

    /// Public page of a listing
    fn listing_url(&self, listing_id: &str) -> String;
}
