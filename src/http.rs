use reqwest::Client;
use std::time::Duration;

/// Client for JSON calls to the marketplace backend.
pub fn build_client() -> Client {
    client_with_timeout(secs_from_env("HTTP_TIMEOUT_SECS", 15))
}

/// Client for image uploads, which carry whole files and get a longer budget.
pub fn build_upload_client() -> Client {
    client_with_timeout(secs_from_env("UPLOAD_TIMEOUT_SECS", 60))
}

fn client_with_timeout(timeout: u64) -> Client {
    let connect = secs_from_env("HTTP_CONNECT_TIMEOUT_SECS", 5);
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn secs_from_env(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
