use reqwest::Client;
use std::time::Duration;

/// Outbound client with a bounded total timeout. A timed-out call surfaces as a
/// transport error and fails the batch like any other.
pub fn build_client(timeout: Duration) -> Client {
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(connect).min(timeout))
        .build()
        .unwrap_or_else(|_| Client::new())
}
