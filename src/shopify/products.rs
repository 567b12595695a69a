use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub title: String,
    pub body_html: String,
    pub vendor: String,
    pub product_type: String,
    #[serde(serialize_with = "join_tags")]
    pub tags: Vec<String>,
    pub variants: Vec<NewVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVariant {
    pub price: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewImage {
    pub attachment: String,
    pub position: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRecord {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub tags: String,
    pub handle: String,
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantRecord {
    pub id: u64,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRecord {
    pub id: u64,
    #[serde(default)]
    pub position: u32,
    pub src: String,
}

#[derive(Serialize)]
pub(super) struct ProductEnvelope<'a> {
    pub product: &'a NewProduct,
}

#[derive(Serialize)]
pub(super) struct ImageEnvelope<'a> {
    pub image: &'a NewImage,
}

#[derive(Deserialize)]
pub(super) struct ProductResponse {
    pub product: ProductRecord,
}

#[derive(Deserialize)]
pub(super) struct ImageResponse {
    pub image: ImageRecord,
}

/// Shopify stores tags as one comma-separated string.
fn join_tags<S: Serializer>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&tags.join(", "))
}

/// Ordered, trimmed tags from either a joined string or a list. Empty entries are dropped.
pub fn normalize_tags<I, T>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    raw.into_iter()
        .flat_map(|entry| {
            entry
                .as_ref()
                .split(',')
                .map(|tag| tag.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}
