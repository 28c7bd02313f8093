use axum::{extract::Extension, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::security::ServiceCredential;

/// Workflow engine callback. The credential middleware has already verified
/// the bearer token.
pub async fn workflow(
    Extension(credential): Extension<ServiceCredential>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let subject = credential.subject.unwrap_or_default();
    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    info!(subject = %subject, event = %event, "workflow callback received");
    Json(json!({ "success": true, "subject": subject, "event": event }))
}
