use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::http_client::{ApiClient, RequestOptions};
use crate::models::{PropertyCount, PropertyFilter, ShortListing};

/// Property search endpoints
#[derive(Clone)]
pub struct PropertiesApi {
    client: ApiClient,
}

impl PropertiesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn count(&self, filter: &PropertyFilter, signal: Option<CancellationToken>) -> Result<PropertyCount> {
        self.client
            .get("/properties/count", options(filter, signal))
            .await
    }

    pub async fn short_listing(
        &self,
        filter: &PropertyFilter,
        signal: Option<CancellationToken>,
    ) -> Result<ShortListing> {
        self.client
            .get("/properties/short-listing", options(filter, signal))
            .await
    }

    /// Full property detail; the shape is owned by the UI
    pub async fn get(&self, id: &str) -> Result<Value> {
        self.client
            .get(&detail_path(id), RequestOptions::new())
            .await
    }
}

/// Detail path with `id` escaped as a single segment
fn detail_path(id: &str) -> String {
    format!("/properties/{id}", id = urlencoding::encode(id))
}

fn options(filter: &PropertyFilter, signal: Option<CancellationToken>) -> RequestOptions {
    let options = RequestOptions::new().params(filter.to_params());
    match signal {
        Some(token) => options.signal(token),
        None => options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_path_escapes_id() {
        assert_eq!(detail_path("42"), "/properties/42");
        assert_eq!(detail_path("a/b?c=1"), "/properties/a%2Fb%3Fc%3D1");
        assert_eq!(detail_path("casa azul"), "/properties/casa%20azul");
    }

    #[test]
    fn test_options_carry_filter_and_signal() {
        let filter = PropertyFilter {
            city: Some("Porto".to_string()),
            ..Default::default()
        };
        let options = options(&filter, Some(CancellationToken::new()));
        assert!(options.signal.is_some());
        assert!(options
            .params
            .iter()
            .any(|(k, v)| k == "city" && v.as_deref() == Some("Porto")));
    }
}
