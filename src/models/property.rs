use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Search filters shared by the listing and count endpoints
///
/// Unset fields are left out of the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    pub city: Option<String>,
    pub property_type: Option<String>,
    pub operation: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub rooms: Option<u32>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

impl PropertyFilter {
    /// Query parameters in wire naming
    pub fn to_params(&self) -> Vec<(String, Option<String>)> {
        vec![
            ("city".to_string(), self.city.clone()),
            ("propertyType".to_string(), self.property_type.clone()),
            ("operation".to_string(), self.operation.clone()),
            ("minPrice".to_string(), self.min_price.map(|v| v.to_string())),
            ("maxPrice".to_string(), self.max_price.map(|v| v.to_string())),
            ("rooms".to_string(), self.rooms.map(|v| v.to_string())),
            ("page".to_string(), self.page.map(|v| v.to_string())),
            ("limit".to_string(), self.limit.map(|v| v.to_string())),
            ("sort".to_string(), self.sort.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PropertyCount {
    #[serde(alias = "total")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShortListing {
    #[serde(default, alias = "items", alias = "results")]
    pub data: Vec<PropertySummary>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_params_keep_wire_names() {
        let filter = PropertyFilter {
            city: Some("Lisbon".to_string()),
            min_price: Some(100_000),
            rooms: Some(2),
            ..Default::default()
        };
        let params = filter.to_params();

        let defined: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
            .collect();
        assert_eq!(
            defined,
            vec![("city", "Lisbon"), ("minPrice", "100000"), ("rooms", "2")]
        );
    }

    #[test]
    fn test_short_listing_accepts_items_alias() {
        let listing: ShortListing = serde_json::from_value(json!({
            "items": [{"id": "p-1", "title": "Loft", "price": 250000.0, "garage": true}]
        }))
        .unwrap();

        assert_eq!(listing.data.len(), 1);
        assert_eq!(listing.data[0].id, json!("p-1"));
        assert_eq!(listing.data[0].extra["garage"], true);
        assert_eq!(listing.total, None);
    }

    #[test]
    fn test_count_accepts_total_alias() {
        let count: PropertyCount = serde_json::from_value(json!({"total": 12})).unwrap();
        assert_eq!(count.count, 12);
    }
}
