use axum::Json;
use serde_json::{Map, Value};

/// OPA-style liveness probe: `200 {}` once the trust data is loaded.
pub(crate) async fn health() -> Json<Value> {
    Json(Value::Object(Map::new()))
}
