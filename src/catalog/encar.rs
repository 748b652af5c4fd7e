use crate::catalog::traits::{CatalogProvider, ListingSource};
use crate::catalog::types::{DetailResponse, NavFacet, NavResponse, SearchResponse, WireListing};
use crate::config::MarketplaceConfig;
use crate::error::RemoteError;
use crate::models::{ChoiceNode, Listing, ListingDetail};
use crate::query::nav_query;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Newest-first ordering of search results
const SORT_BY_MODIFIED: &str = "%7CModifiedDate%7C0%7C1";
const NAV_METADATA: &str = "%7CMetadata%7CSort";

/// Client for the Encar catalog, search and detail endpoints
pub struct EncarClient {
    client: Client,
    config: MarketplaceConfig,
}

impl EncarClient {
    pub fn new(config: MarketplaceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?count=true&q={}&sr={}",
            self.config.search_url, query, SORT_BY_MODIFIED
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        debug!("Fetching URL: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(self.config.request_timeout)
            } else {
                RemoteError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, url, "Marketplace returned non-success status");
            return Err(RemoteError::from_status(status));
        }

        let body = response.text().await.map_err(RemoteError::from)?;
        serde_json::from_str(&body).map_err(RemoteError::from)
    }
}

/// Walk the navigation tree down through the facets selected by `prefix`.
fn facets_below<'a>(root: &'a [NavFacet], prefix: &[String]) -> &'a [NavFacet] {
    let mut level = root;
    for key in prefix {
        let selected = level
            .iter()
            .find(|f| f.is_selected)
            .or_else(|| level.iter().find(|f| &f.display_value == key));
        match selected {
            Some(facet) => level = facet.children(),
            None => return &[],
        }
    }
    level
}

/// Position of the car-type node in `iNav.Nodes`; the trim-level query drops
/// the sell-type node so it sits one place earlier.
fn car_type_node_index(depth: usize) -> usize {
    if depth < 3 {
        2
    } else {
        1
    }
}

pub(crate) fn choices_from_nav(nav: &NavResponse, prefix: &[String]) -> Vec<ChoiceNode> {
    let root = nav
        .inav
        .nodes
        .get(car_type_node_index(prefix.len()))
        .and_then(|n| n.facets.first())
        .map(|car_type| car_type.children())
        .unwrap_or(&[]);

    let parent = prefix.last().cloned();
    let with_span = prefix.len() == 2;

    let mut choices: Vec<ChoiceNode> = facets_below(root, prefix)
        .iter()
        .filter(|f| !f.display_value.is_empty())
        .map(|f| {
            ChoiceNode::new(f.display_value.clone(), f.label())
                .with_parent(parent.clone())
                .with_production(if with_span { f.production() } else { None })
        })
        .collect();

    if prefix.is_empty() {
        choices.sort_by(|a, b| a.label.cmp(&b.label));
    }
    choices
}

#[async_trait]
impl CatalogProvider for EncarClient {
    async fn resolve(&self, prefix: &[String]) -> Result<Vec<ChoiceNode>, RemoteError> {
        let Some(q) = nav_query(prefix) else {
            warn!(depth = prefix.len(), "Catalog prefix is deeper than the catalog");
            return Ok(Vec::new());
        };

        let url = format!(
            "{}?count=true&q={}&inav={}",
            self.config.nav_url, q, NAV_METADATA
        );
        let nav: NavResponse = self.get_json(&url).await?;
        let choices = choices_from_nav(&nav, prefix);

        debug!(depth = prefix.len(), count = choices.len(), "Resolved catalog level");
        Ok(choices)
    }
}

#[async_trait]
impl ListingSource for EncarClient {
    async fn search(&self, query: &str) -> Result<Vec<Listing>, RemoteError> {
        let resp: SearchResponse = self.get_json(&self.search_url(query)).await?;

        let total = resp.search_results.len();
        let listings: Vec<Listing> = resp
            .search_results
            .into_iter()
            .filter_map(WireListing::into_listing)
            .collect();

        if listings.len() < total {
            warn!(
                skipped = total - listings.len(),
                "Search results without an id were skipped"
            );
        }
        Ok(listings)
    }

    async fn detail(&self, listing_id: &str) -> Result<ListingDetail, RemoteError> {
        let url = format!(
            "{}/{}",
            self.config.detail_url.trim_end_matches('/'),
            urlencoding::encode(listing_id)
        );
        let resp: DetailResponse = self.get_json(&url).await?;
        Ok(resp.into())
    }

    fn listing_url(&self, listing_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.listing_url.trim_end_matches('/'),
            listing_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn facet(name: &str, eng: &str, selected: bool, children: Vec<Value>) -> Value {
        json!({
            "DisplayValue": name,
            "IsSelected": selected,
            "Metadata": { "EngName": [eng], "ModelStartDate": ["201903"], "ModelEndDate": [""] },
            "Refinements": { "Nodes": [ { "Facets": children } ] }
        })
    }

    fn nav(car_type_index: usize, manufacturers: Vec<Value>) -> NavResponse {
        let mut nodes = vec![json!({ "Facets": [] }); car_type_index];
        nodes.push(json!({
            "Facets": [ { "DisplayValue": "A", "Refinements": { "Nodes": [ { "Facets": manufacturers } ] } } ]
        }));
        serde_json::from_value(json!({ "iNav": { "Nodes": nodes } })).unwrap()
    }

    #[test]
    fn test_manufacturers_sorted_by_label() {
        let resp = nav(
            2,
            vec![
                facet("현대", "Hyundai", false, vec![]),
                facet("기아", "Kia", false, vec![]),
                facet("BMW", "BMW", false, vec![]),
            ],
        );
        let choices = choices_from_nav(&resp, &[]);
        let labels: Vec<&str> = choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["BMW", "Hyundai", "Kia"]);
        assert_eq!(choices[1].key, "현대");
        assert!(choices[1].parent_key.is_none());
    }

    #[test]
    fn test_generations_follow_selected_path() {
        let generations = vec![facet("쏘나타 (DN8)", "Sonata (DN8)", false, vec![])];
        let groups = vec![
            facet("그랜저", "Grandeur", false, vec![]),
            facet("쏘나타", "Sonata", true, generations),
        ];
        let resp = nav(2, vec![facet("현대", "Hyundai", true, groups)]);

        let prefix = vec!["현대".to_string(), "쏘나타".to_string()];
        let choices = choices_from_nav(&resp, &prefix);
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].key, "쏘나타 (DN8)");
        assert_eq!(choices[0].parent_key.as_deref(), Some("쏘나타"));
        assert_eq!(choices[0].production.map(|p| p.start_year), Some(2019));
    }

    #[test]
    fn test_trims_use_shifted_node() {
        let trims = vec![facet("가솔린", "Gasoline", false, vec![])];
        let models = vec![facet("쏘나타 (DN8)", "Sonata (DN8)", true, trims)];
        let groups = vec![facet("쏘나타", "Sonata", true, models)];
        let resp = nav(1, vec![facet("현대", "Hyundai", true, groups)]);

        let prefix = vec![
            "현대".to_string(),
            "쏘나타".to_string(),
            "쏘나타 (DN8)".to_string(),
        ];
        let choices = choices_from_nav(&resp, &prefix);
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].key, "가솔린");
        assert!(choices[0].production.is_none());
    }

    #[test]
    fn test_unknown_path_yields_nothing() {
        let resp = nav(2, vec![facet("현대", "Hyundai", false, vec![])]);
        assert!(choices_from_nav(&resp, &["기아".to_string()]).is_empty());
    }

    #[test]
    fn test_urls() {
        let client = EncarClient::new(MarketplaceConfig::default()).unwrap();
        assert_eq!(
            client.listing_url("123"),
            "https://fem.encar.com/cars/detail/123"
        );
        assert!(client
            .search_url("(And.Hidden.N.)")
            .ends_with("q=(And.Hidden.N.)&sr=%7CModifiedDate%7C0%7C1"));
    }
}
