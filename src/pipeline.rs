use crate::archive::BatchArchive;
use crate::imaging::{self, NormalizedImage};
use crate::llm::{
    ListingMetadata, MetadataError, MetadataOracle, OpenAiClient, OpenAiConfig, OracleRequest,
    PromptVariant, build_request, get_metadata,
};
use crate::models::StageReport;
use crate::shopify::{
    PublishError, PublishedListing, ShopifyClient, ShopifyConfig, Storefront, publish,
};
use chrono::Utc;
use rand::Rng;
use serde_json::{Value, json};
use std::{fmt, future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Pipeline {
    oracle: Arc<dyn MetadataOracle>,
    storefront: Option<Arc<dyn Storefront>>,
    pub config: Arc<PipelineConfig>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub prompt: PromptVariant,
    pub vendor: String,
    pub max_images: usize,
    pub archive: Option<BatchArchive>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prompt: PromptVariant::default(),
            vendor: crate::shopify::config::DEFAULT_VENDOR.to_string(),
            max_images: 10,
            archive: None,
        }
    }
}

impl Pipeline {
    pub fn new(
        oracle: Arc<dyn MetadataOracle>,
        storefront: Option<Arc<dyn Storefront>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            oracle,
            storefront,
            config: Arc::new(config),
        }
    }

    /// Wires the OpenAI oracle and, when credentials are present, the Shopify storefront.
    pub fn from_env(config: PipelineConfig) -> Self {
        let oracle: Arc<dyn MetadataOracle> =
            Arc::new(OpenAiClient::new(OpenAiConfig::from_env()));
        let storefront = ShopifyConfig::from_env()
            .map(|cfg| Arc::new(ShopifyClient::new(cfg)) as Arc<dyn Storefront>);
        if storefront.is_none() {
            warn!(
                target = "snaplist.pipeline",
                "SHOPIFY_SHOP_URL/SHOPIFY_ACCESS_TOKEN not set; publishing disabled"
            );
        }
        Self::new(oracle, storefront, config)
    }

    pub fn publishing_enabled(&self) -> bool {
        self.storefront.is_some()
    }

    /// Crop the photos and ask the oracle for listing metadata. Nothing is published.
    pub async fn generate_metadata(&self, images: Vec<String>) -> BatchOutcome {
        self.run(images, false).await
    }

    /// Full flow: crop, describe, then publish to the marketplace.
    pub async fn upload_and_publish(&self, images: Vec<String>) -> BatchOutcome {
        self.run(images, true).await
    }

    /// Publish caller-approved metadata with the supplied photos.
    pub async fn create_listing(
        &self,
        images: Vec<String>,
        metadata: ListingMetadata,
    ) -> BatchOutcome {
        let mut run = BatchRun::new(images.len());
        let result = async {
            self.check_batch(&images)?;
            run.advance(BatchState::Normalizing);
            let normalized = run
                .capture("normalize_images", stages::normalize_images(images))
                .await?;
            run.cropped_images = normalized.iter().map(NormalizedImage::to_data_url).collect();
            run.metadata = Some(metadata.clone());

            run.advance(BatchState::Publishing);
            let store = self.require_storefront()?;
            let listing = run
                .capture(
                    "publish_listing",
                    stages::publish_listing(store, &metadata, normalized, &self.config.vendor),
                )
                .await?;
            run.listing = Some(listing);
            Ok::<(), PipelineError>(())
        }
        .await;
        run.finish(result)
    }

    async fn run(&self, images: Vec<String>, publish: bool) -> BatchOutcome {
        let mut run = BatchRun::new(images.len());
        let result = async {
            self.check_batch(&images)?;

            run.advance(BatchState::Normalizing);
            let normalized = run
                .capture("normalize_images", stages::normalize_images(images))
                .await?;
            let cropped: Vec<String> =
                normalized.iter().map(NormalizedImage::to_data_url).collect();

            run.advance(BatchState::BuildingRequest);
            let request = run
                .capture(
                    "build_request",
                    stages::build_oracle_request(&cropped, self.config.prompt),
                )
                .await?;
            run.cropped_images = cropped;

            run.advance(BatchState::AwaitingOracle);
            let metadata = run
                .capture(
                    "request_metadata",
                    stages::request_metadata(self.oracle.as_ref(), &request),
                )
                .await?;
            run.metadata = Some(metadata.clone());

            if let Some(archive) = &self.config.archive {
                let batch_id = run.id.to_string();
                run.capture(
                    "archive_batch",
                    stages::archive_batch(archive, &batch_id, &normalized, &metadata),
                )
                .await?;
            }

            if publish {
                run.advance(BatchState::Publishing);
                let store = self.require_storefront()?;
                let listing = run
                    .capture(
                        "publish_listing",
                        stages::publish_listing(
                            store,
                            &metadata,
                            normalized,
                            &self.config.vendor,
                        ),
                    )
                    .await?;
                run.listing = Some(listing);
            }
            Ok::<(), PipelineError>(())
        }
        .await;
        run.finish(result)
    }

    fn check_batch(&self, images: &[String]) -> Result<(), PipelineError> {
        if images.iter().all(|image| image.trim().is_empty()) {
            return Err(PipelineError::invalid_input(
                "receive_batch",
                "No images provided",
            ));
        }
        if images.len() > self.config.max_images {
            return Err(PipelineError::invalid_input(
                "receive_batch",
                format!(
                    "too many images: {} (max {})",
                    images.len(),
                    self.config.max_images
                ),
            ));
        }
        Ok(())
    }

    fn require_storefront(&self) -> Result<&dyn Storefront, PipelineError> {
        self.storefront.as_deref().ok_or_else(|| {
            PipelineError::internal("publish_listing", "marketplace is not configured")
        })
    }
}

/// Per-request identifier: UTC timestamp plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchId(String);

impl BatchId {
    pub fn generate() -> Self {
        let suffix: u32 = rand::rng().random();
        Self(format!(
            "{}-{suffix:08x}",
            Utc::now().format("%Y%m%d%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Received,
    Normalizing,
    BuildingRequest,
    AwaitingOracle,
    Publishing,
    Done,
    Failed { stage: String, reason: String },
}

/// Final, non-propagating result of one batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub state: BatchState,
    pub image_count: usize,
    pub stages: Vec<StageReport>,
    pub metadata: Option<ListingMetadata>,
    pub cropped_images: Vec<String>,
    pub listing: Option<PublishedListing>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == BatchState::Done
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            BatchState::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }
}

struct BatchRun {
    id: BatchId,
    state: BatchState,
    image_count: usize,
    stages: Vec<StageReport>,
    metadata: Option<ListingMetadata>,
    cropped_images: Vec<String>,
    listing: Option<PublishedListing>,
}

impl BatchRun {
    fn new(image_count: usize) -> Self {
        let id = BatchId::generate();
        debug!(target = "snaplist.pipeline", batch_id = %id, images = image_count, "batch_received");
        Self {
            id,
            state: BatchState::Received,
            image_count,
            stages: Vec::new(),
            metadata: None,
            cropped_images: Vec::new(),
            listing: None,
        }
    }

    fn advance(&mut self, next: BatchState) {
        debug!(
            target = "snaplist.pipeline",
            batch_id = %self.id,
            from = ?self.state,
            to = ?next,
            "batch_transition"
        );
        self.state = next;
    }

    async fn capture<T, Fut>(&mut self, name: &'static str, fut: Fut) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        self.stages
            .push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }

    fn finish(mut self, result: Result<(), PipelineError>) -> BatchOutcome {
        match result {
            Ok(()) => {
                self.advance(BatchState::Done);
                info!(
                    target = "snaplist.pipeline",
                    batch_id = %self.id,
                    stages = self.stages.len(),
                    "batch_done"
                );
                crate::metrics::batch_finished("done", self.image_count);
            }
            Err(err) => {
                warn!(
                    target = "snaplist.pipeline",
                    batch_id = %self.id,
                    stage = err.stage(),
                    kind = ?err.kind(),
                    error = %err.detail(),
                    "batch_failed"
                );
                self.advance(BatchState::Failed {
                    stage: err.stage().to_string(),
                    reason: err.detail().to_string(),
                });
                crate::metrics::batch_finished("failed", self.image_count);
            }
        }
        BatchOutcome {
            batch_id: self.id,
            state: self.state,
            image_count: self.image_count,
            stages: self.stages,
            metadata: self.metadata,
            cropped_images: self.cropped_images,
            listing: self.listing,
        }
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Decode,
    Oracle,
    Schema,
    Publish,
    Internal,
}

impl PipelineError {
    pub fn new(stage: &'static str, kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::InvalidInput, message)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::Internal, message)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

impl From<MetadataError> for PipelineError {
    fn from(err: MetadataError) -> Self {
        let kind = match err {
            MetadataError::Oracle(_) => PipelineErrorKind::Oracle,
            MetadataError::Schema(_) => PipelineErrorKind::Schema,
        };
        Self::new("request_metadata", kind, err.to_string())
    }
}

impl From<PublishError> for PipelineError {
    fn from(err: PublishError) -> Self {
        Self::new("publish_listing", PipelineErrorKind::Publish, err.to_string())
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::*;

    /// Decoding and re-encoding is CPU-bound, so it runs off the async workers. Images are
    /// processed one after another.
    pub async fn normalize_images(
        images: Vec<String>,
    ) -> Result<StageOutcome<Vec<NormalizedImage>>, PipelineError> {
        let normalized = tokio::task::spawn_blocking(move || {
            images
                .iter()
                .enumerate()
                .map(|(idx, image)| {
                    imaging::normalize_encoded(image).map_err(|err| {
                        PipelineError::new(
                            "normalize_images",
                            PipelineErrorKind::Decode,
                            format!("image {}: {err}", idx + 1),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|err| PipelineError::internal("normalize_images", err.to_string()))??;

        let sides: Vec<u32> = normalized.iter().map(|image| image.side).collect();
        let sources: Vec<[u32; 2]> = normalized
            .iter()
            .map(|image| [image.source_width, image.source_height])
            .collect();
        Ok(StageOutcome::new(
            normalized,
            json!({
                "count": sides.len(),
                "sides": sides,
                "sources": sources,
            }),
        ))
    }

    pub async fn build_oracle_request(
        images: &[String],
        prompt: PromptVariant,
    ) -> Result<StageOutcome<OracleRequest>, PipelineError> {
        let request = build_request(images, prompt);
        Ok(StageOutcome::new(
            request,
            json!({
                "prompt": prompt,
                "images": images.len(),
            }),
        ))
    }

    pub async fn request_metadata(
        oracle: &dyn MetadataOracle,
        request: &OracleRequest,
    ) -> Result<StageOutcome<ListingMetadata>, PipelineError> {
        let metadata = get_metadata(oracle, request).await?;
        Ok(StageOutcome::new(
            metadata.clone(),
            json!({
                "title": metadata.title,
                "category": metadata.category,
                "tag_count": metadata.tags.len(),
                "estimated_price": metadata.estimated_price,
            }),
        ))
    }

    /// Best effort: a failed dump is logged and recorded, never fatal.
    pub async fn archive_batch(
        archive: &BatchArchive,
        batch_id: &str,
        images: &[NormalizedImage],
        metadata: &ListingMetadata,
    ) -> Result<StageOutcome<()>, PipelineError> {
        let output = match archive.store(batch_id, images, metadata).await {
            Ok(dir) => json!({"stored": true, "path": dir.display().to_string()}),
            Err(err) => {
                warn!(target = "snaplist.pipeline", batch_id, error = %err, "batch_archive_failed");
                json!({"stored": false, "error": err.to_string()})
            }
        };
        Ok(StageOutcome::new((), output))
    }

    pub async fn publish_listing(
        store: &dyn Storefront,
        metadata: &ListingMetadata,
        images: Vec<NormalizedImage>,
        vendor: &str,
    ) -> Result<StageOutcome<PublishedListing>, PipelineError> {
        let bytes: Vec<Vec<u8>> = images.into_iter().map(|image| image.bytes).collect();
        let listing = publish(store, metadata, &bytes, vendor).await?;
        Ok(StageOutcome::new(
            listing.clone(),
            json!({
                "product_id": listing.id,
                "url": listing.url,
                "images": listing.images.len(),
            }),
        ))
    }
}
