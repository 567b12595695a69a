use crate::http::build_client;
use crate::shopify::config::ShopifyConfig;
use crate::shopify::products::{
    ImageEnvelope, ImageRecord, ImageResponse, NewImage, NewProduct, ProductEnvelope,
    ProductRecord, ProductResponse,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// The marketplace's create-then-attach product API.
#[async_trait]
pub trait Storefront: Send + Sync {
    async fn create_product(&self, product: &NewProduct) -> Result<ProductRecord, ShopifyError>;

    async fn attach_image(
        &self,
        product_id: u64,
        image: &NewImage,
    ) -> Result<ImageRecord, ShopifyError>;

    async fn fetch_product(&self, product_id: u64) -> Result<ProductRecord, ShopifyError>;

    async fn delete_product(&self, product_id: u64) -> Result<(), ShopifyError>;

    fn product_url(&self, handle: &str) -> String;
}

pub struct ShopifyClient {
    http: Client,
    config: ShopifyConfig,
}

impl ShopifyClient {
    pub fn new(config: ShopifyConfig) -> Self {
        Self {
            http: build_client(config.timeout),
            config,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-Shopify-Access-Token", &self.config.access_token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.admin_root())
    }
}

#[async_trait]
impl Storefront for ShopifyClient {
    async fn create_product(&self, product: &NewProduct) -> Result<ProductRecord, ShopifyError> {
        let response = self
            .authorized(self.http.post(self.url("products.json")))
            .json(&ProductEnvelope { product })
            .send()
            .await
            .map_err(transport_error)?;
        let payload: ProductResponse = decode(response).await?;
        Ok(payload.product)
    }

    async fn attach_image(
        &self,
        product_id: u64,
        image: &NewImage,
    ) -> Result<ImageRecord, ShopifyError> {
        let response = self
            .authorized(
                self.http
                    .post(self.url(&format!("products/{product_id}/images.json"))),
            )
            .json(&ImageEnvelope { image })
            .send()
            .await
            .map_err(transport_error)?;
        let payload: ImageResponse = decode(response).await?;
        Ok(payload.image)
    }

    async fn fetch_product(&self, product_id: u64) -> Result<ProductRecord, ShopifyError> {
        let response = self
            .authorized(self.http.get(self.url(&format!("products/{product_id}.json"))))
            .send()
            .await
            .map_err(transport_error)?;
        let payload: ProductResponse = decode(response).await?;
        Ok(payload.product)
    }

    async fn delete_product(&self, product_id: u64) -> Result<(), ShopifyError> {
        let response = self
            .authorized(
                self.http
                    .delete(self.url(&format!("products/{product_id}.json"))),
            )
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await.map(|_| ())
    }

    fn product_url(&self, handle: &str) -> String {
        format!("https://{}/products/{handle}", self.config.shop_domain)
    }
}

fn transport_error(err: reqwest::Error) -> ShopifyError {
    if err.is_timeout() {
        ShopifyError::Timeout
    } else {
        ShopifyError::Request(err.to_string())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ShopifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ShopifyError::Status {
        status: status.as_u16(),
        body: body.chars().take(512).collect(),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ShopifyError> {
    ensure_success(response)
        .await?
        .json::<T>()
        .await
        .map_err(|err| ShopifyError::InvalidResponse(err.to_string()))
}
