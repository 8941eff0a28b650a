//! Checks the trust document shipped in `policy/data.json`.
use datacloud_policy::{PolicyEngine, PolicyInput, Rule};
use serde_json::json;
use std::path::PathBuf;

fn shipped_engine() -> PolicyEngine {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../policy/data.json");
    PolicyEngine::from_path(path).expect("shipped trust data")
}

#[test]
fn readme_example_is_allowed() {
    let input: PolicyInput = serde_json::from_value(json!({
        "user_info": {
            "iss": "https://iam.example.org/",
            "groups": ["users"]
        },
        "path": "/api/v1/users/",
        "method": "GET",
        "has_body": "false"
    }))
    .expect("input");
    assert!(shipped_engine().evaluate_rule(Rule::Allow, &input));
}

#[test]
fn regular_user_cannot_create_other_users() {
    let input = PolicyInput::from(json!({
        "user_info": {"iss": "https://iam.example.org/", "groups": ["users"]},
        "path": "/api/v1/users/",
        "method": "POST",
        "has_body": true
    }));
    let decision = shipped_engine().evaluate(&input);
    assert!(decision.is_user);
    assert!(!decision.allow);
}

#[test]
fn admin_can_delete_users() {
    let input = PolicyInput::from(json!({
        "user_info": {"iss": "https://iam.example.org", "groups": ["users", "admins"]},
        "path": "/api/v1/users/0b0f5a4e-1f0e-4c43-9a39-2f4f1b1f6c55",
        "method": "DELETE",
        "has_body": false
    }));
    let decision = shipped_engine().evaluate(&input);
    assert!(decision.is_admin);
    assert!(decision.allow);
}
