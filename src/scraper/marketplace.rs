use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, error, info};

use super::{Marketplace, ScrapeError};

const USER_AGENT: &str = concat!("forge-scrape/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct MarketplaceEndpoints {
    pub opensea_base_url: String,
    pub opensea_api_key: Option<String>,
    pub magiceden_base_url: String,
    pub magiceden_api_key: Option<String>,
    /// Pause between pages of one collection
    pub page_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for MarketplaceEndpoints {
    fn default() -> Self {
        Self {
            opensea_base_url: "https://api.opensea.io/api/v1".to_string(),
            opensea_api_key: None,
            magiceden_base_url: "https://api-mainnet.magiceden.dev/v2".to_string(),
            magiceden_api_key: None,
            page_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct MarketplaceClient {
    http: reqwest::Client,
    endpoints: MarketplaceEndpoints,
}

impl MarketplaceClient {
    pub fn new(endpoints: MarketplaceEndpoints) -> Result<Self, ScrapeError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(endpoints.request_timeout)
            .build()?;
        Ok(Self { http, endpoints })
    }

    /// Collects up to `limit` items of a collection.
    ///
    /// Stops early on an empty page. A failing page ends the scrape and the
    /// items gathered so far are returned.
    pub async fn scrape_collection(
        &self,
        marketplace: Marketplace,
        collection: &str,
        limit: usize,
    ) -> Vec<Value> {
        let mut items: Vec<Value> = Vec::with_capacity(limit.min(1_024));
        let mut offset = 0usize;

        while items.len() < limit {
            let page_size = marketplace.max_page_size().min(limit - items.len());
            match self.fetch_page(marketplace, collection, page_size, offset).await {
                Ok(page) if page.is_empty() => break,
                Ok(page) => {
                    offset += page.len();
                    debug!(
                        marketplace = %marketplace,
                        collection,
                        page_items = page.len(),
                        offset,
                        "Fetched listing page"
                    );
                    items.extend(page);
                }
                Err(err) => {
                    error!("Error scraping {marketplace} collection {collection}: {err}");
                    break;
                }
            }
            if items.len() < limit && !self.endpoints.page_delay.is_zero() {
                tokio::time::sleep(self.endpoints.page_delay).await;
            }
        }

        items.truncate(limit);
        info!(
            marketplace = %marketplace,
            collection,
            items = items.len(),
            "Scraped collection"
        );
        items
    }

    async fn fetch_page(
        &self,
        marketplace: Marketplace,
        collection: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Value>, ScrapeError> {
        let request = match marketplace {
            Marketplace::OpenSea => {
                let url = format!(
                    "{}/assets",
                    self.endpoints.opensea_base_url.trim_end_matches('/')
                );
                let mut request = self.http.get(url).query(&[
                    ("collection", collection.to_string()),
                    ("limit", page_size.to_string()),
                    ("offset", offset.to_string()),
                ]);
                if let Some(key) = &self.endpoints.opensea_api_key {
                    request = request.header("X-API-KEY", key);
                }
                request
            }
            Marketplace::MagicEden => {
                let url = format!(
                    "{}/collections/{}/listings",
                    self.endpoints.magiceden_base_url.trim_end_matches('/'),
                    collection
                );
                let mut request = self.http.get(url).query(&[
                    ("limit", page_size.to_string()),
                    ("offset", offset.to_string()),
                ]);
                if let Some(key) = &self.endpoints.magiceden_api_key {
                    request = request.header(AUTHORIZATION, format!("Bearer {key}"));
                }
                request
            }
        };

        let response = request.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let body: Value = response.json().await?;
        page_items(marketplace, body)
    }
}

/// Pulls the item list out of one page body.
fn page_items(marketplace: Marketplace, body: Value) -> Result<Vec<Value>, ScrapeError> {
    let items = match (marketplace, body) {
        (Marketplace::OpenSea, Value::Object(mut map)) => {
            map.remove("assets").unwrap_or(Value::Array(Vec::new()))
        }
        (Marketplace::MagicEden, body) => body,
        (_, other) => other,
    };
    match items {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        _ => Err(ScrapeError::Parse(format!(
            "unexpected {marketplace} listing payload"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opensea_pages_read_assets() {
        let items = page_items(Marketplace::OpenSea, json!({"assets": [{"token_id": "1"}]})).unwrap();
        assert_eq!(items.len(), 1);
        assert!(page_items(Marketplace::OpenSea, json!({})).unwrap().is_empty());
    }

    #[test]
    fn magiceden_pages_are_bare_arrays() {
        let items = page_items(Marketplace::MagicEden, json!([{"tokenMint": "a"}, {"tokenMint": "b"}])).unwrap();
        assert_eq!(items.len(), 2);
        assert!(page_items(Marketplace::MagicEden, json!({"error": "x"})).is_err());
    }
}
