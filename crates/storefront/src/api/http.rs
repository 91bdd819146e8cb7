//! `reqwest` implementation of the collaborator APIs.
//!
//! Catalog lookups are cached with `moka`; user and order calls are never
//! cached because they carry per-session state.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use storefront_sync_core::{OrderConfirmation, OrderDraft, ProductId, SessionToken, User};

use super::{ApiError, CatalogApi, CatalogProduct, OrderApi, UserApi};
use crate::config::ClientConfig;

/// Characters of a response body kept in errors and logs.
const BODY_SNIPPET_LEN: usize = 200;

/// HTTP client for the storefront backend.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct HttpApi {
    inner: Arc<HttpApiInner>,
}

struct HttpApiInner {
    client: reqwest::Client,
    base_url: Url,
    catalog: Cache<ProductId, CatalogProduct>,
}

impl HttpApi {
    /// Create a client rooted at `base_url`.
    ///
    /// Paths are resolved relative to `base_url`, which is treated as a
    /// directory whether or not it ends in `/`.
    #[must_use]
    pub fn new(mut base_url: Url, catalog_ttl: Duration) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let catalog = Cache::builder()
            .max_capacity(1000)
            .time_to_live(catalog_ttl)
            .build();

        Self {
            inner: Arc::new(HttpApiInner {
                client: reqwest::Client::new(),
                base_url,
                catalog,
            }),
        }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.catalog_cache_ttl)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Check the status and parse the body of a response.
    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let url = response.url().clone();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ApiError::Unauthorized);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.path().to_string()));
        }

        // Get response body as text first for better error diagnostics
        let text = response.text().await?;
        let snippet: String = text.chars().take(BODY_SNIPPET_LEN).collect();

        if !status.is_success() {
            tracing::error!(
                status = %status,
                url = %url,
                body = %snippet,
                "backend returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: snippet,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                url = %url,
                body = %snippet,
                "failed to parse backend response"
            );
            ApiError::Parse(e)
        })
    }
}

impl UserApi for HttpApi {
    #[instrument(skip_all)]
    async fn current_user(&self, token: &SessionToken) -> Result<User, ApiError> {
        let url = self.endpoint(&["users", "me"])?;
        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(token.expose())
            .send()
            .await?;
        Self::read_json(response).await
    }
}

impl OrderApi for HttpApi {
    #[instrument(skip_all, fields(items = draft.items.len()))]
    async fn submit_order(
        &self,
        token: &SessionToken,
        draft: &OrderDraft,
    ) -> Result<OrderConfirmation, ApiError> {
        let url = self.endpoint(&["orders"])?;
        let response = self
            .inner
            .client
            .post(url)
            .bearer_auth(token.expose())
            .json(draft)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

impl CatalogApi for HttpApi {
    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn product(&self, product_id: &ProductId) -> Result<CatalogProduct, ApiError> {
        if let Some(product) = self.inner.catalog.get(product_id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let url = self.endpoint(&["products", product_id.as_str()])?;
        let response = self.inner.client.get(url).send().await?;
        let product: CatalogProduct = Self::read_json(response).await?;

        self.inner
            .catalog
            .insert(product_id.clone(), product.clone())
            .await;

        Ok(product)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpApi {
        HttpApi::new(Url::parse(base).unwrap(), Duration::from_secs(60))
    }

    #[test]
    fn test_endpoint_treats_base_as_directory() {
        let api = api("https://shop.test/api");
        assert_eq!(
            api.endpoint(&["users", "me"]).unwrap().as_str(),
            "https://shop.test/api/users/me"
        );
    }

    #[test]
    fn test_endpoint_with_trailing_slash() {
        let api = api("https://shop.test/api/v1/");
        assert_eq!(
            api.endpoint(&["orders"]).unwrap().as_str(),
            "https://shop.test/api/v1/orders"
        );
    }

    #[test]
    fn test_endpoint_escapes_product_ids() {
        let api = api("https://shop.test/");
        assert_eq!(
            api.endpoint(&["products", "a/b c"]).unwrap().as_str(),
            "https://shop.test/products/a%2Fb%20c"
        );
    }
}
