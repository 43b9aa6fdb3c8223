//! reqwest clients for the marketplace backend.

pub mod ads;
pub mod blob;
pub mod config;
pub mod users;

pub use ads::HttpAdService;
pub use blob::HttpBlobStore;
pub use users::HttpUserDirectory;

use serde_json::Value;

/// Pulls a human-readable message out of an error body. The backend answers
/// with `{"message": ..}`, `{"error": ..}`, a JSON string, or plain text
/// depending on the endpoint.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let message = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(text)) => text,
        Ok(Value::Object(map)) => ["message", "error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)?,
        Ok(_) => return None,
        Err(_) if body.starts_with('<') => return None,
        Err(_) => body.to_string(),
    };
    let message = message.trim().to_string();
    (!message.is_empty()).then_some(message)
}
