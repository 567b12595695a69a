use crate::llm::ListingMetadata;
use crate::shopify::PublishedListing;
use crate::shopify::products::normalize_tags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as, skip_serializing_none};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesRequest {
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateListingRequest {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub metadata: Option<MetadataPayload>,
}

/// Listing metadata as clients send it back. Older clients use `price`, send it as the raw
/// text of a number input, and may send tags as a single comma-separated string; all of that
/// is adapted here, once.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: TagsField,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(alias = "price", default)]
    pub estimated_price: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsField {
    Joined(String),
    List(Vec<String>),
}

impl Default for TagsField {
    fn default() -> Self {
        TagsField::List(Vec::new())
    }
}

impl From<MetadataPayload> for ListingMetadata {
    fn from(payload: MetadataPayload) -> Self {
        let tags = match payload.tags {
            TagsField::Joined(value) => normalize_tags([value]),
            TagsField::List(values) => normalize_tags(values),
        };
        ListingMetadata {
            title: payload.title,
            description: payload.description,
            category: payload.category,
            tags,
            estimated_price: payload.estimated_price,
        }
    }
}

/// Uniform `{success, ...}` envelope returned by every listing route.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: Option<String>,
    pub metadata: Option<ListingMetadata>,
    pub cropped_images: Option<Vec<String>>,
    pub batch_id: Option<String>,
    pub shopify_product: Option<ShopifyProductSummary>,
    pub stages: Option<Vec<StageReport>>,
}

impl ApiResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifyProductSummary {
    pub title: String,
    pub description: String,
    pub price: String,
    pub category: String,
    pub tags: Vec<String>,
    pub url: String,
    pub images: Vec<String>,
}

impl From<&PublishedListing> for ShopifyProductSummary {
    fn from(listing: &PublishedListing) -> Self {
        Self {
            title: listing.title.clone(),
            description: listing.description.clone(),
            price: listing.price.clone(),
            category: listing.category.clone(),
            tags: listing.tags.clone(),
            url: listing.url.clone(),
            images: listing.images.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}
