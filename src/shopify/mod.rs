pub mod client;
pub mod config;
pub mod products;
pub mod publisher;

pub use client::{ShopifyClient, ShopifyError, Storefront};
pub use config::ShopifyConfig;
pub use publisher::{PublishError, PublishedListing, publish};
