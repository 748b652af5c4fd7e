use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a bot user (Telegram user id)
pub type UserId = i64;

/// Where notifications for a saved search are delivered (Telegram chat id)
pub type Destination = i64;

/// Years a catalog generation was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionSpan {
    pub start_year: i32,
    /// `None` while the generation is still in production
    pub end_year: Option<i32>,
}

/// One selectable node of the catalog hierarchy (or a locally generated option)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoiceNode {
    /// Machine key sent back to the marketplace
    pub key: String,
    /// Human readable label
    pub label: String,
    pub parent_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<ProductionSpan>,
}

impl ChoiceNode {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            parent_key: None,
            production: None,
        }
    }

    pub fn with_parent(mut self, parent_key: Option<String>) -> Self {
        self.parent_key = parent_key;
        self
    }

    pub fn with_production(mut self, production: Option<ProductionSpan>) -> Self {
        self.production = production;
        self
    }
}

/// Completed description of the vehicle a user wants to hear about
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilter {
    pub manufacturer: String,
    pub model_group: String,
    pub model: String,
    pub trim: String,
    pub year_from: i32,
    pub year_to: i32,
    pub mileage_from: u32,
    pub mileage_to: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl SearchFilter {
    /// Color to filter on, `None` when any color is acceptable
    pub fn color_predicate(&self) -> Option<&str> {
        self.color
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("any"))
    }

    /// One-line description used in listings of saved searches
    pub fn summary(&self) -> String {
        format!(
            "{} {} {}\nYears: {}-{}\nMileage: {}-{} km",
            self.manufacturer,
            self.model,
            self.trim,
            self.year_from,
            self.year_to,
            self.mileage_from,
            self.mileage_to
        )
    }
}

/// A filter as it is persisted for a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedSearch {
    pub id: String,
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub filter: SearchFilter,
}

impl SavedSearch {
    pub fn new(destination: Destination, filter: SearchFilter) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            destination,
            created_at: Utc::now(),
            filter,
        }
    }
}

/// A single marketplace search result
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub manufacturer: String,
    pub model: String,
    pub badge: String,
    /// Asking price in units of 10 000 KRW, as the marketplace reports it
    pub price: f64,
    pub mileage_km: u64,
    pub form_year: String,
}

/// Extra data from the per-listing detail endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDetail {
    pub displacement_cc: Option<u32>,
}

/// A match ready to be delivered
#[derive(Debug, Clone)]
pub struct Notification {
    pub listing: Listing,
    /// `None` when the detail fetch failed
    pub detail: Option<ListingDetail>,
    pub listing_url: String,
}

impl Notification {
    /// Telegram HTML rendering of the notification
    pub fn to_html(&self) -> String {
        let listing = &self.listing;
        let name = format!("{} {} {}", listing.manufacturer, listing.model, listing.badge);
        let price_won = (listing.price * 10_000.0).round() as u64;

        let mut text = format!(
            "✅ New listing matching your search!\n\n<b>{}</b> {}\nMileage: {} km\nPrice: ₩{}",
            escape_html(name.trim()),
            escape_html(&listing.form_year),
            group_thousands(listing.mileage_km),
            group_thousands(price_won),
        );

        match &self.detail {
            Some(detail) => {
                match detail.displacement_cc {
                    Some(cc) => text.push_str(&format!("\nEngine: {}cc", cc)),
                    None => text.push_str("\nEngine: not specified"),
                }
                text.push_str(&format!(
                    "\n\n👉 <a href='{}'>Open listing</a>",
                    self.listing_url
                ));
            }
            None => text.push_str("\nℹ️ Could not fetch listing details."),
        }

        text
    }
}

/// `1234567` -> `1 234 567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        Listing {
            id: "38012345".to_string(),
            manufacturer: "현대".to_string(),
            model: "쏘나타 (DN8)".to_string(),
            badge: "2.0".to_string(),
            price: 2350.0,
            mileage_km: 41230,
            form_year: "2021".to_string(),
        }
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1 000");
        assert_eq!(group_thousands(23_500_000), "23 500 000");
    }

    #[test]
    fn test_color_predicate_treats_any_as_none() {
        let mut filter = SearchFilter {
            manufacturer: "현대".into(),
            model_group: "쏘나타".into(),
            model: "쏘나타 (DN8)".into(),
            trim: "가솔린".into(),
            year_from: 2020,
            year_to: 2023,
            mileage_from: 0,
            mileage_to: 50000,
            color: Some("any".into()),
        };
        assert_eq!(filter.color_predicate(), None);
        filter.color = Some("흰색".into());
        assert_eq!(filter.color_predicate(), Some("흰색"));
    }

    #[test]
    fn test_notification_with_detail() {
        let n = Notification {
            listing: listing(),
            detail: Some(ListingDetail {
                displacement_cc: Some(1999),
            }),
            listing_url: "https://fem.encar.com/cars/detail/38012345".to_string(),
        };
        let html = n.to_html();
        assert!(html.contains("Mileage: 41 230 km"));
        assert!(html.contains("Price: ₩23 500 000"));
        assert!(html.contains("Engine: 1999cc"));
        assert!(html.contains("https://fem.encar.com/cars/detail/38012345"));
    }

    #[test]
    fn test_notification_without_detail() {
        let n = Notification {
            listing: listing(),
            detail: None,
            listing_url: String::new(),
        };
        let html = n.to_html();
        assert!(html.contains("Could not fetch listing details"));
        assert!(!html.contains("Engine:"));
    }
}
