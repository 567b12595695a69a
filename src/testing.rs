//! In-process stand-ins for the oracle and the marketplace, plus fixture images.

use crate::imaging::JPEG_DATA_URL_PREFIX;
use crate::llm::{ListingMetadata, LlmError, MetadataOracle, OracleRequest};
use crate::shopify::products::{
    ImageRecord, NewImage, NewProduct, ProductRecord, VariantRecord,
};
use crate::shopify::{ShopifyError, Storefront};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const LAMP_FIXTURE: &str = r#"{"title":"Desk Lamp","description":"...","category":"Home","tags":["lamp","vintage"],"estimated_price":25}"#;

pub fn lamp_metadata() -> ListingMetadata {
    ListingMetadata {
        title: "Desk Lamp".into(),
        description: "...".into(),
        category: "Home".into(),
        tags: vec!["lamp".into(), "vintage".into()],
        estimated_price: 25,
    }
}

pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

pub fn sample_png_rgba(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| Rgba([200, 10, 10, (x % 256) as u8]));
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

pub fn data_url(bytes: &[u8]) -> String {
    format!("{JPEG_DATA_URL_PREFIX}{}", BASE64.encode(bytes))
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), format)
        .expect("encode fixture");
    buffer
}

pub struct ScriptedOracle {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last: Mutex<Option<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn replying(text: &str) -> Self {
        Self::with_reply(Ok(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(Err(message.to_string()))
    }

    fn with_reply(reply: Result<String, String>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<OracleRequest> {
        self.last.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MetadataOracle for ScriptedOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("lock") = Some(request.clone());
        self.reply.clone().map_err(LlmError::Http)
    }
}

#[derive(Debug, Clone)]
pub enum StoreCall {
    Create(NewProduct),
    Attach {
        product_id: u64,
        attachment: String,
        position: u32,
    },
    Fetch(u64),
    Delete(u64),
}

/// Records every marketplace call and keeps the single product it creates.
#[derive(Default)]
pub struct RecordingStorefront {
    fail_create: bool,
    fail_attach_at: Option<usize>,
    fail_fetch: bool,
    calls: Mutex<Vec<StoreCall>>,
    product: Mutex<Option<ProductRecord>>,
}

impl RecordingStorefront {
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    /// Fails the attach call at `index` (0-based call order).
    pub fn failing_attach_at(index: usize) -> Self {
        Self {
            fail_attach_at: Some(index),
            ..Default::default()
        }
    }

    pub fn failing_fetch() -> Self {
        Self {
            fail_fetch: true,
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> bool {
        self.calls()
            .iter()
            .any(|call| matches!(call, StoreCall::Delete(_)))
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().expect("lock").push(call);
    }

    fn attach_count(&self) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| matches!(call, StoreCall::Attach { .. }))
            .count()
    }
}

#[async_trait]
impl Storefront for RecordingStorefront {
    async fn create_product(&self, product: &NewProduct) -> Result<ProductRecord, ShopifyError> {
        self.record(StoreCall::Create(product.clone()));
        if self.fail_create {
            return Err(ShopifyError::Status {
                status: 422,
                body: r#"{"errors":{"title":["can't be blank"]}}"#.into(),
            });
        }
        let record = ProductRecord {
            id: 1001,
            title: product.title.clone(),
            body_html: Some(product.body_html.clone()),
            product_type: product.product_type.clone(),
            tags: product.tags.join(", "),
            handle: product.title.to_lowercase().replace(' ', "-"),
            variants: product
                .variants
                .iter()
                .enumerate()
                .map(|(idx, variant)| VariantRecord {
                    id: 5000 + idx as u64,
                    price: variant.price.clone(),
                })
                .collect(),
            images: Vec::new(),
        };
        *self.product.lock().expect("lock") = Some(record.clone());
        Ok(record)
    }

    async fn attach_image(
        &self,
        product_id: u64,
        image: &NewImage,
    ) -> Result<ImageRecord, ShopifyError> {
        let index = self.attach_count();
        self.record(StoreCall::Attach {
            product_id,
            attachment: image.attachment.clone(),
            position: image.position,
        });
        if self.fail_attach_at == Some(index) {
            return Err(ShopifyError::Status {
                status: 500,
                body: "upstream error".into(),
            });
        }
        let stored = ImageRecord {
            id: 9000 + image.position as u64,
            position: image.position,
            src: format!(
                "https://cdn.shopify.test/{product_id}/{}.jpg",
                image.position
            ),
        };
        if let Some(product) = self.product.lock().expect("lock").as_mut() {
            product.images.push(stored.clone());
        }
        Ok(stored)
    }

    async fn fetch_product(&self, product_id: u64) -> Result<ProductRecord, ShopifyError> {
        self.record(StoreCall::Fetch(product_id));
        if self.fail_fetch {
            return Err(ShopifyError::Timeout);
        }
        self.product
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| ShopifyError::Status {
                status: 404,
                body: "not found".into(),
            })
    }

    async fn delete_product(&self, product_id: u64) -> Result<(), ShopifyError> {
        self.record(StoreCall::Delete(product_id));
        *self.product.lock().expect("lock") = None;
        Ok(())
    }

    fn product_url(&self, handle: &str) -> String {
        format!("https://demo.myshopify.com/products/{handle}")
    }
}
