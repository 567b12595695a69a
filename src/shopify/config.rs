use std::{env, time::Duration};

pub const DEFAULT_API_VERSION: &str = "2024-01";
pub const DEFAULT_VENDOR: &str = "Butler Warehouse";

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// Bare shop domain, e.g. `example.myshopify.com`.
    pub shop_domain: String,
    /// Scheme and host the Admin API is reached on. `https://{shop_domain}` unless
    /// `SHOPIFY_API_BASE_URL` points somewhere else (a proxy, a local stand-in).
    pub api_base: String,
    pub access_token: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl ShopifyConfig {
    /// `None` unless both the shop URL and access token are configured.
    pub fn from_env() -> Option<Self> {
        let shop_url = env::var("SHOPIFY_SHOP_URL").ok()?;
        let access_token = env::var("SHOPIFY_ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())?;
        let shop_domain = shop_domain(&shop_url)?;
        let api_base = env::var("SHOPIFY_API_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("https://{shop_domain}"));
        Some(Self {
            shop_domain,
            api_base,
            access_token,
            api_version: env::var("SHOPIFY_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
            timeout: Duration::from_secs(
                env::var("SHOPIFY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(30),
            ),
        })
    }

    pub fn admin_root(&self) -> String {
        format!("{}/admin/api/{}", self.api_base, self.api_version)
    }
}

pub fn vendor_from_env() -> String {
    env::var("SHOPIFY_VENDOR")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_VENDOR.to_string())
}

fn shop_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let domain = without_scheme.split('/').next()?.trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}
