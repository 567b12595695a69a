use crate::llm::ListingMetadata;
use crate::shopify::client::{ShopifyError, Storefront};
use crate::shopify::products::{NewImage, NewProduct, NewVariant, normalize_tags};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Read-only copy of the listing as the marketplace reports it after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedListing {
    pub id: u64,
    pub url: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub category: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("product creation failed: {0}")]
    Create(ShopifyError),
    #[error("attaching image {position} to product {product_id} failed: {source}")]
    Attach {
        product_id: u64,
        position: u32,
        source: ShopifyError,
    },
    #[error("reloading product {product_id} failed: {source}")]
    Reload {
        product_id: u64,
        source: ShopifyError,
    },
}

pub fn price_string(estimated_price: u64) -> String {
    estimated_price.to_string()
}

pub fn product_from_metadata(metadata: &ListingMetadata, vendor: &str) -> NewProduct {
    NewProduct {
        title: metadata.title.clone(),
        body_html: metadata.description.clone(),
        vendor: vendor.to_string(),
        product_type: metadata.category.clone(),
        tags: normalize_tags(&metadata.tags),
        variants: vec![NewVariant {
            price: price_string(metadata.estimated_price),
        }],
    }
}

/// Create, attach every image in order, then reload for the hosted image URLs.
///
/// All-or-nothing: if any attach or the reload fails, the freshly created product is
/// deleted before the error is returned.
pub async fn publish(
    store: &dyn Storefront,
    metadata: &ListingMetadata,
    images: &[Vec<u8>],
    vendor: &str,
) -> Result<PublishedListing, PublishError> {
    let product = product_from_metadata(metadata, vendor);
    let created = store
        .create_product(&product)
        .await
        .map_err(PublishError::Create)?;
    info!(
        target = "snaplist.shopify",
        product_id = created.id,
        handle = %created.handle,
        "product_created"
    );

    for (index, bytes) in images.iter().enumerate() {
        let image = NewImage {
            attachment: BASE64.encode(bytes),
            position: index as u32 + 1,
        };
        if let Err(source) = store.attach_image(created.id, &image).await {
            rollback(store, created.id).await;
            return Err(PublishError::Attach {
                product_id: created.id,
                position: image.position,
                source,
            });
        }
        debug!(
            target = "snaplist.shopify",
            product_id = created.id,
            position = image.position,
            "image_attached"
        );
    }

    let reloaded = match store.fetch_product(created.id).await {
        Ok(product) => product,
        Err(source) => {
            rollback(store, created.id).await;
            return Err(PublishError::Reload {
                product_id: created.id,
                source,
            });
        }
    };

    let mut hosted = reloaded.images.clone();
    hosted.sort_by_key(|image| image.position);

    Ok(PublishedListing {
        id: reloaded.id,
        url: store.product_url(&reloaded.handle),
        title: reloaded.title.clone(),
        description: reloaded
            .body_html
            .clone()
            .unwrap_or_else(|| product.body_html.clone()),
        price: reloaded
            .variants
            .first()
            .map(|variant| variant.price.clone())
            .unwrap_or_else(|| price_string(metadata.estimated_price)),
        category: reloaded.product_type.clone(),
        tags: normalize_tags([reloaded.tags.as_str()]),
        images: hosted.into_iter().map(|image| image.src).collect(),
    })
}

async fn rollback(store: &dyn Storefront, product_id: u64) {
    match store.delete_product(product_id).await {
        Ok(()) => warn!(
            target = "snaplist.shopify",
            product_id, "product_rolled_back"
        ),
        Err(err) => warn!(
            target = "snaplist.shopify",
            product_id,
            error = %err,
            "product_rollback_failed"
        ),
    }
}
