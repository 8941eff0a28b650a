use datacloud_policy::PolicyEngine;
use pdp::app::{AppState, build_router};

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// Router over the trust data shipped in `policy/data.json`.
pub fn shipped_app() -> axum::Router {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../policy/data.json");
    let engine = PolicyEngine::from_path(path).expect("shipped trust data");
    build_router(AppState::new(engine))
}
