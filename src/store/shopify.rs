use super::{ProductStore, StoreError};
use crate::http::build_client;
use crate::models::{ProductSnapshot, ProductUpdate};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;

const PRODUCT_QUERY: &str = r#"
query ProductContent($id: ID!) {
  product(id: $id) {
    id
    title
    descriptionHtml
    tags
    seo { title description }
  }
}
"#;

const PRODUCT_UPDATE: &str = r#"
mutation ProductContentUpdate($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id }
    userErrors { field message }
  }
}
"#;

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    pub shop_domain: String,
    pub access_token: String,
    pub api_version: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

/// Product store backed by the Shopify Admin GraphQL API.
#[derive(Debug, Clone)]
pub struct ShopifyProductStore {
    endpoint: String,
    access_token: String,
    http: Client,
}

impl ShopifyProductStore {
    pub fn new(config: ShopifyConfig) -> Self {
        let domain = config.shop_domain.trim().trim_end_matches('/');
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Self {
            endpoint: format!("{base}/admin/api/{}/graphql.json", config.api_version),
            access_token: config.access_token,
            http: build_client(config.timeout, config.connect_timeout),
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, StoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|err| StoreError::Upstream(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Upstream(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|err| StoreError::Upstream(err.to_string()))?;
        if !payload.errors.is_empty() {
            let messages: Vec<String> = payload
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect();
            return Err(StoreError::Upstream(messages.join("; ")));
        }
        payload
            .data
            .ok_or_else(|| StoreError::Upstream("missing data".into()))
    }
}

#[async_trait]
impl ProductStore for ShopifyProductStore {
    async fn fetch_product(&self, id: &str) -> Result<ProductSnapshot, StoreError> {
        let data: ProductData = self.graphql(PRODUCT_QUERY, json!({ "id": id })).await?;
        let product = data.product.ok_or(StoreError::NotFound)?;
        let seo = product.seo.unwrap_or_default();
        Ok(ProductSnapshot {
            id: product.id,
            title: product.title,
            description_html: product.description_html.filter(|html| !html.trim().is_empty()),
            tags: product.tags,
            seo_title: seo.title,
            seo_description: seo.description,
        })
    }

    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError> {
        let input = json!({
            "id": id,
            "descriptionHtml": update.description_html,
            "tags": update.tags,
            "seo": {
                "title": update.seo_title,
                "description": update.seo_description,
            },
        });
        let data: UpdateData = self
            .graphql(PRODUCT_UPDATE, json!({ "input": input }))
            .await?;
        let result = data
            .product_update
            .ok_or_else(|| StoreError::Upstream("missing productUpdate".into()))?;
        if !result.user_errors.is_empty() {
            return Err(StoreError::Rejected(
                result
                    .user_errors
                    .into_iter()
                    .map(|error| error.message)
                    .collect(),
            ));
        }
        if result.product.is_none() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProductData {
    product: Option<ShopifyProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShopifyProduct {
    id: String,
    title: String,
    description_html: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    seo: Option<Seo>,
}

#[derive(Debug, Default, Deserialize)]
struct Seo {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateData {
    product_update: Option<UpdatePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    product: Option<Value>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GRAPHQL_PATH: &str = "/admin/api/2024-10/graphql.json";

    fn store(server: &MockServer) -> ShopifyProductStore {
        ShopifyProductStore::new(ShopifyConfig {
            shop_domain: server.uri(),
            access_token: "shpat_test".into(),
            api_version: "2024-10".into(),
            timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
        })
    }

    fn update() -> ProductUpdate {
        ProductUpdate {
            description_html: "<p>New</p>".into(),
            tags: vec!["Wool".into()],
            seo_title: "Title".into(),
            seo_description: "Description".into(),
        }
    }

    #[tokio::test]
    async fn fetch_maps_product_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(header("X-Shopify-Access-Token", "shpat_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"product": {
                    "id": "gid://shopify/Product/1",
                    "title": "Wool Socks",
                    "descriptionHtml": "",
                    "tags": ["socks"],
                    "seo": {"title": null, "description": "Warm"}
                }}
            })))
            .mount(&server)
            .await;

        let product = store(&server)
            .fetch_product("gid://shopify/Product/1")
            .await
            .expect("product");
        assert_eq!(product.title, "Wool Socks");
        assert_eq!(product.description_html, None);
        assert_eq!(product.tags, vec!["socks"]);
        assert_eq!(product.seo_title, None);
        assert_eq!(product.seo_description.as_deref(), Some("Warm"));
    }

    #[tokio::test]
    async fn null_product_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"product": null}})),
            )
            .mount(&server)
            .await;
        let err = store(&server).fetch_product("gid://x").await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn graphql_errors_are_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Throttled"}]
            })))
            .mount(&server)
            .await;
        let err = store(&server).fetch_product("gid://x").await.expect_err("throttled");
        assert_eq!(err.to_string(), "upstream error: Throttled");
    }

    #[tokio::test]
    async fn update_sends_seo_and_reports_user_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "variables": {"input": {
                    "id": "gid://shopify/Product/1",
                    "tags": ["Wool"],
                    "seo": {"title": "Title", "description": "Description"}
                }}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"productUpdate": {
                    "product": null,
                    "userErrors": [
                        {"field": ["seo", "title"], "message": "Title is too long"},
                        {"field": ["tags"], "message": "Tags are invalid"}
                    ]
                }}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = store(&server)
            .update_product("gid://shopify/Product/1", &update())
            .await
            .expect_err("rejected");
        match err {
            StoreError::Rejected(messages) => {
                assert_eq!(messages, vec!["Title is too long", "Tags are invalid"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_succeeds_when_product_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"productUpdate": {
                    "product": {"id": "gid://shopify/Product/1"},
                    "userErrors": []
                }}
            })))
            .mount(&server)
            .await;
        store(&server)
            .update_product("gid://shopify/Product/1", &update())
            .await
            .expect("updated");
    }

    #[tokio::test]
    async fn http_failure_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = store(&server)
            .update_product("gid://shopify/Product/1", &update())
            .await
            .expect_err("503");
        assert!(matches!(err, StoreError::Upstream(_)));
    }
}
