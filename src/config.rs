use crate::archive::BatchArchive;
use crate::llm::PromptVariant;
use crate::pipeline::PipelineConfig;
use crate::shopify::config::vendor_from_env;
use std::{env, path::PathBuf};
use tracing::warn;

const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Server-level settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub debug_mode: bool,
    pub body_limit: usize,
    pub auth_password: Option<String>,
    pub metrics_key: Option<String>,
    /// Directory holding the capture UI; served for any unrouted GET when set.
    pub static_dir: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let prompt = prompt_variant(env::var("LISTING_PROMPT").ok().as_deref());

        Self {
            port: env_parse("PORT").unwrap_or(5001),
            debug_mode: parse_env_bool("DEBUG_MODE"),
            body_limit: env_parse::<usize>("REQUEST_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_BODY_LIMIT),
            auth_password: env_string("AUTH_PASSWORD"),
            metrics_key: env_string("METRICS_KEY"),
            static_dir: env_string("STATIC_DIR").map(PathBuf::from),
            pipeline: PipelineConfig {
                prompt,
                vendor: vendor_from_env(),
                max_images: env_parse::<usize>("MAX_IMAGES")
                    .filter(|v| *v >= 1)
                    .unwrap_or(10),
                archive: BatchArchive::from_env(),
            },
        }
    }
}

/// Unknown names fall back to the valuation prompt with a warning, so tracing must already
/// be initialised when this runs.
fn prompt_variant(raw: Option<&str>) -> PromptVariant {
    match raw {
        Some(raw) => raw.parse::<PromptVariant>().unwrap_or_else(|err| {
            warn!(target = "snaplist.api", "{err}; using the valuation prompt");
            PromptVariant::Valuation
        }),
        None => PromptVariant::default(),
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

pub fn parse_env_bool(key: &str) -> bool {
    env::var(key)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
