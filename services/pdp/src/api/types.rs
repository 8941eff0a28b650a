//! Wire shapes of the OPA Data API.
use datacloud_policy::PolicyInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /v1/data/{path}`.
#[derive(Debug, Default, Deserialize)]
pub struct DataRequest {
    #[serde(default)]
    pub input: Option<PolicyInput>,
}

/// Response of a data query. An undefined document serializes as `{}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DataResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
