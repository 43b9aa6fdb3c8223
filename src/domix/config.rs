use once_cell::sync::Lazy;
use std::env;

pub const DEFAULT_API_ROOT: &str = "https://domix-server.onrender.com";

pub static API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("DOMIX_API_ROOT")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_ROOT.to_string())
});
