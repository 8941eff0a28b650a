//! User API handlers.
//!
//! # Purpose
//! CRUD over registered users under `/api/v1/users`, with filtering, sorting
//! and pagination on the collection.
//!
//! # Key invariants
//! - Malformed ids, queries and bodies are `422`, never `400`.
//! - `POST` without a body registers the authenticated caller.
//! - `DELETE` is idempotent.
use crate::api::error::{ApiError, api_store_error, api_unprocessable};
use crate::api::types::ItemId;
use crate::app::AppState;
use crate::auth::oidc::Caller;
use crate::model::{ListParams, ModelError, UserCreate, UserList, UserQuery};
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, OriginalUri, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Map;
use uuid::Uuid;

/// Collection route; the trailing-slash form is served too.
pub const USERS_PATH: &str = "/api/v1/users";
pub const ALLOWED_METHODS: &str = "DELETE, GET, OPTIONS, POST, PUT";

fn model_error(err: ModelError) -> ApiError {
    api_unprocessable(&err.to_string())
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| api_unprocessable(&format!("Invalid user ID '{raw}'")))
}

fn parse_body(body: &Bytes) -> Result<UserCreate, ApiError> {
    let create: UserCreate = serde_json::from_slice(body)
        .map_err(|err| api_unprocessable(&format!("invalid user body: {err}")))?;
    create.normalized().map_err(model_error)
}

fn is_blank(body: &Bytes) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

#[utoipa::path(
    options,
    path = "/api/v1/users",
    tag = "users",
    responses(
        (status = 204, description = "Allowed methods in the Allow header")
    )
)]
pub(crate) async fn options_users() -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS))],
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body(content = UserCreate, description = "Omit to register the caller"),
    responses(
        (status = 201, description = "User created", body = ItemId),
        (status = 409, description = "Duplicate sub and issuer", body = crate::api::types::ErrorResponse),
        (status = 422, description = "Invalid body or missing identity attributes", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_user(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let create = if is_blank(&body) {
        match caller {
            Some(Extension(caller)) => UserCreate::from_identity(
                Some(caller.subject.as_str()),
                Some(caller.issuer.as_str()),
                &caller.claims,
            ),
            None => UserCreate::from_identity(None, None, &Map::new()),
        }
        .map_err(model_error)?
    } else {
        parse_body(&body)?
    };
    let user = state
        .store
        .create_user(create)
        .await
        .map_err(|err| api_store_error(err, "failed to create user"))?;
    tracing::info!(user_id = %user.id, issuer = %user.issuer, "user created");
    Ok((StatusCode::CREATED, Json(ItemId { id: user.id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated users", body = UserList),
        (status = 422, description = "Invalid query", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<UserList>, ApiError> {
    let Query(query) = query.map_err(|err| api_unprocessable(&err.body_text()))?;
    let params = ListParams::try_from(query).map_err(model_error)?;
    let page = state
        .store
        .list_users(&params)
        .await
        .map_err(|err| api_store_error(err, "failed to list users"))?;

    let mut resource = state.base_url.as_ref().clone();
    resource.set_path(uri.path());
    resource.set_query(uri.query());
    Ok(Json(UserList::new(page.items, &params, page.total, &resource)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = crate::model::User),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse),
        (status = 422, description = "Invalid user ID", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<crate::model::User>, ApiError> {
    let id = parse_user_id(&user_id)?;
    let user = state
        .store
        .get_user(id)
        .await
        .map_err(|err| api_store_error(err, "failed to load user"))?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = UserCreate,
    responses(
        (status = 204, description = "User updated"),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Duplicate sub and issuer", body = crate::api::types::ErrorResponse),
        (status = 422, description = "Invalid user ID or body", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let id = parse_user_id(&user_id)?;
    let update = parse_body(&body)?;
    state
        .store
        .update_user(id, update)
        .await
        .map_err(|err| api_store_error(err, "failed to update user"))?;
    tracing::info!(user_id = %id, "user updated");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted or already absent"),
        (status = 422, description = "Invalid user ID", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_user_id(&user_id)?;
    state
        .store
        .delete_user(id)
        .await
        .map_err(|err| api_store_error(err, "failed to delete user"))?;
    tracing::info!(user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_must_be_uuid() {
        let err = parse_user_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body.message, "Invalid user ID 'not-a-uuid'");
        assert!(parse_user_id("6f1c5c62-9a55-4ad4-a4bb-6f1f3e9c2d1a").is_ok());
    }

    #[test]
    fn body_is_validated_and_normalized() {
        let body = Bytes::from_static(
            br#"{"sub":"abc","name":"Jane","email":"jane@example.org","issuer":"https://iam.example.org"}"#,
        );
        let create = parse_body(&body).expect("valid");
        assert_eq!(create.issuer, "https://iam.example.org/");

        let err = parse_body(&Bytes::from_static(br#"{"sub":"abc"}"#)).unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn whitespace_body_counts_as_absent() {
        assert!(is_blank(&Bytes::from_static(b"")));
        assert!(is_blank(&Bytes::from_static(b"\n ")));
        assert!(!is_blank(&Bytes::from_static(b"{}")));
    }
}
