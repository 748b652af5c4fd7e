//! Wire formats of the marketplace endpoints.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{Listing, ListingDetail, ProductionSpan};

/// Response of the catalog navigation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct NavResponse {
    #[serde(rename = "iNav", default)]
    pub inav: NavNodes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NavNodes {
    #[serde(default)]
    pub nodes: Vec<NavNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NavNode {
    #[serde(default)]
    pub facets: Vec<NavFacet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NavFacet {
    #[serde(default)]
    pub display_value: String,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub metadata: FacetMetadata,
    #[serde(default)]
    pub refinements: NavNodes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacetMetadata {
    #[serde(default)]
    pub eng_name: Vec<Value>,
    #[serde(default)]
    pub model_start_date: Vec<Value>,
    #[serde(default)]
    pub model_end_date: Vec<Value>,
}

impl NavNodes {
    /// Facets of the first refinement node, the next catalog level down
    pub fn first_facets(&self) -> &[NavFacet] {
        self.nodes
            .first()
            .map(|n| n.facets.as_slice())
            .unwrap_or(&[])
    }
}

impl NavFacet {
    pub fn children(&self) -> &[NavFacet] {
        self.refinements.first_facets()
    }

    pub fn eng_name(&self) -> Option<String> {
        self.metadata
            .eng_name
            .first()
            .and_then(value_to_string)
            .filter(|s| !s.trim().is_empty())
    }

    /// Label shown to the user: English name, falling back to the Korean one
    pub fn label(&self) -> String {
        self.eng_name()
            .unwrap_or_else(|| self.display_value.clone())
    }

    /// Production years from `ModelStartDate`/`ModelEndDate` (YYYYMM)
    pub fn production(&self) -> Option<ProductionSpan> {
        let start_year = self
            .metadata
            .model_start_date
            .first()
            .and_then(value_to_string)
            .and_then(|s| yyyymm_year(&s))?;
        let end_year = self
            .metadata
            .model_end_date
            .first()
            .and_then(value_to_string)
            .and_then(|s| yyyymm_year(&s));
        Some(ProductionSpan {
            start_year,
            end_year,
        })
    }
}

/// Response of the search endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub search_results: Vec<WireListing>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireListing {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub mileage: Option<f64>,
    #[serde(default)]
    pub form_year: Value,
}

impl WireListing {
    /// `None` when the record carries no usable id
    pub fn into_listing(self) -> Option<Listing> {
        let id = value_to_string(&self.id).filter(|s| !s.is_empty())?;
        Some(Listing {
            id,
            manufacturer: self.manufacturer.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            badge: self.badge.unwrap_or_default(),
            price: self.price.unwrap_or(0.0),
            mileage_km: self.mileage.unwrap_or(0.0).max(0.0) as u64,
            form_year: value_to_string(&self.form_year).unwrap_or_default(),
        })
    }
}

/// Response of the vehicle detail endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub spec: DetailSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailSpec {
    #[serde(default)]
    pub displacement: Value,
}

impl From<DetailResponse> for ListingDetail {
    fn from(resp: DetailResponse) -> Self {
        let displacement_cc = match &resp.spec.displacement {
            Value::Number(n) => n.as_u64().map(|v| v as u32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        ListingDetail { displacement_cc }
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yyyymm_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.len() == 6 && s.chars().all(|c| c.is_ascii_digit()) {
        s[..4].parse().ok()
    } else {
        None
    }
}
