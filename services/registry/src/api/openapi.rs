//! OpenAPI schema aggregation for the registry API.
use crate::api::types::{AuthModes, ErrorResponse, HealthStatus, ItemId, Maintainer, SystemInfo};
use crate::api::{system, users};
use crate::model::{PageNavigation, Pagination, User, UserCreate, UserList};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "datacloud-registry",
        version = "v1",
        description = "DataCloud user registry HTTP API"
    ),
    paths(
        system::system_info,
        system::system_health,
        users::options_users,
        users::create_user,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user
    ),
    components(schemas(
        ErrorResponse,
        ItemId,
        HealthStatus,
        Maintainer,
        AuthModes,
        SystemInfo,
        User,
        UserCreate,
        UserList,
        Pagination,
        PageNavigation
    )),
    tags(
        (name = "system", description = "System and discovery endpoints"),
        (name = "users", description = "User registration and lookup")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_user_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|path| *path == "/api/v1/users"));
        assert!(paths.iter().any(|path| *path == "/api/v1/users/{user_id}"));
        assert!(paths.iter().any(|path| *path == "/api/v1/system/health"));
    }
}
