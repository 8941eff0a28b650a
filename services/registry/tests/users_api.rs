mod common;

use axum::http::StatusCode;
use common::{memory_app, read_json};
use http_helpers::{empty_request, json_request};
use serde_json::{Value, json};
use tower::ServiceExt;

fn user_body(sub: &str, name: &str) -> Value {
    json!({
        "sub": sub,
        "name": name,
        "email": format!("{sub}@example.org"),
        "issuer": "https://iam.example.org"
    })
}

async fn create(app: &axum::Router, sub: &str, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/users/", user_body(sub, name)))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await["id"]
        .as_str()
        .expect("id")
        .to_string()
}

#[tokio::test]
async fn crud_flow() {
    let app = memory_app();
    let id = create(&app, "abc", "Jane Doe").await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/v1/users/{id}")))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::OK);
    let user = read_json(response).await;
    assert_eq!(user["sub"], "abc");
    assert_eq!(user["issuer"], "https://iam.example.org/");
    assert!(user["created_at"].is_string());

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/users/{id}"),
            user_body("abc", "Jane Smith"),
        ))
        .await
        .expect("put");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/v1/users/{id}")))
        .await
        .expect("get updated");
    assert_eq!(read_json(response).await["name"], "Jane Smith");

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/v1/users/{id}")))
            .await
            .expect("delete");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app
        .oneshot(empty_request("GET", &format!("/api/v1/users/{id}")))
        .await
        .expect("get deleted");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        read_json(response).await["message"],
        format!("User with ID '{id}' does not exist")
    );
}

#[tokio::test]
async fn duplicate_sub_and_issuer_is_conflict() {
    let app = memory_app();
    create(&app, "abc", "Jane").await;
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/users", user_body("abc", "Other")))
        .await
        .expect("duplicate");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        read_json(response).await["message"],
        "User with sub 'abc' and belonging to issuer 'https://iam.example.org/' already exists"
    );

    let other = create(&app, "def", "John").await;
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/users/{other}"),
            user_body("abc", "John"),
        ))
        .await
        .expect("conflicting update");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_input_is_unprocessable() {
    let app = memory_app();
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/users/not-a-uuid"))
        .await
        .expect("bad id");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/users/", json!({"sub": "abc"})))
        .await
        .expect("bad body");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/users/?page=0"))
        .await
        .expect("bad page");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/users/?size=abc"))
        .await
        .expect("bad size");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/users/?sort=password"))
        .await
        .expect("bad sort");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/v1/users/6f1c5c62-9a55-4ad4-a4bb-6f1f3e9c2d1a",
            user_body("abc", "Jane"),
        ))
        .await
        .expect("missing user");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn self_registration_without_identity_is_unprocessable() {
    let app = memory_app();
    let response = app
        .oneshot(empty_request("POST", "/api/v1/users/"))
        .await
        .expect("empty post");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        read_json(response).await["message"],
        "Attribute 'sub' of User can't be NULL"
    );
}

#[tokio::test]
async fn options_lists_allowed_methods() {
    let app = memory_app();
    for path in ["/api/v1/users", "/api/v1/users/"] {
        let response = app
            .clone()
            .oneshot(empty_request("OPTIONS", path))
            .await
            .expect("options");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get("allow").expect("allow header"),
            "DELETE, GET, OPTIONS, POST, PUT"
        );
    }
}

#[tokio::test]
async fn list_paginates_with_links() {
    let app = memory_app();
    for (sub, name) in [
        ("u1", "Alice"),
        ("u2", "Bob"),
        ("u3", "Carol"),
        ("u4", "Dave"),
        ("u5", "Eve"),
    ] {
        create(&app, sub, name).await;
    }

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/users/?size=2&page=2&sort=name"))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .expect("data")
        .iter()
        .map(|user| user["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["Carol", "Dave"]);
    assert_eq!(
        body["page"],
        json!({"size": 2, "number": 2, "total_elements": 5, "total_pages": 3})
    );
    assert_eq!(
        body["links"]["next"],
        "http://localhost:8000/api/v1/users/?size=2&sort=name&page=3"
    );
    assert_eq!(
        body["links"]["prev"],
        "http://localhost:8000/api/v1/users/?size=2&sort=name&page=1"
    );
    assert_eq!(
        body["links"]["first"],
        "http://localhost:8000/api/v1/users/?size=2&sort=name&page=1"
    );
    assert_eq!(
        body["links"]["last"],
        "http://localhost:8000/api/v1/users/?size=2&sort=name&page=3"
    );
}

#[tokio::test]
async fn list_filters_case_insensitively() {
    let app = memory_app();
    create(&app, "u1", "Alice Liddell").await;
    create(&app, "u2", "Bob").await;
    create(&app, "u3", "Alan").await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/users?name=AL&sort=-name"))
        .await
        .expect("filtered");
    let body = read_json(response).await;
    assert_eq!(body["page"]["total_elements"], 2);
    assert_eq!(body["data"][0]["name"], "Alice Liddell");
    assert_eq!(body["data"][1]["name"], "Alan");
    assert!(body["links"]["next"].is_null());

    let response = app
        .oneshot(empty_request(
            "GET",
            "/api/v1/users?created_after=2999-01-01T00:00:00Z",
        ))
        .await
        .expect("future filter");
    let body = read_json(response).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["page"]["total_pages"], 1);
}

#[tokio::test]
async fn system_endpoints_are_public() {
    let app = memory_app();
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/system/health"))
        .await
        .expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/system/info"))
        .await
        .expect("info");
    let body = read_json(response).await;
    assert_eq!(body["project_name"], "app");
    assert_eq!(body["api_version"], "v1");

    let response = app
        .oneshot(empty_request("GET", "/api/v1/openapi.json"))
        .await
        .expect("openapi");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["paths"].get("/api/v1/users/{user_id}").is_some());
}
