//! Registry domain model.
//!
//! # Purpose
//! Defines the `User` entity, its create/update payload, the list query with
//! filtering, sorting and pagination, and the paginated list envelope.
//!
//! # Key invariants
//! - `(sub, issuer)` identifies a user; stores enforce uniqueness.
//! - `issuer` is stored in normalized URL form (an empty path becomes `/`).
//! - `page` and `size` are at least 1; `total_pages` is at least 1 even for an
//!   empty list.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 5;
pub const DEFAULT_SORT: &str = "-created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Item unique ID.
    pub id: Uuid,
    /// Issuer's subject associated with this user.
    pub sub: String,
    /// User name and surname.
    pub name: String,
    /// User email address.
    pub email: String,
    /// Issuer URL.
    pub issuer: String,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(create: UserCreate) -> Self {
        Self {
            id: Uuid::new_v4(),
            sub: create.sub,
            name: create.name,
            email: create.email,
            issuer: create.issuer,
            created_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: UserCreate) {
        self.sub = update.sub;
        self.name = update.name;
        self.email = update.email;
        self.issuer = update.issuer;
    }
}

/// Body of `POST /users` and `PUT /users/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub issuer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Attribute '{0}' of User can't be NULL")]
    NotNull(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl UserCreate {
    /// Build the payload for self-registration from the authenticated identity.
    pub fn from_identity(
        subject: Option<&str>,
        issuer: Option<&str>,
        claims: &Map<String, Value>,
    ) -> Result<Self, ModelError> {
        let claim = |name: &'static str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ModelError::NotNull(name))
        };
        let sub = subject
            .map(str::to_string)
            .ok_or(ModelError::NotNull("sub"))?;
        let issuer = issuer
            .map(str::to_string)
            .ok_or(ModelError::NotNull("issuer"))?;
        Self {
            sub,
            name: claim("name")?,
            email: claim("email")?,
            issuer,
        }
        .normalized()
    }

    /// Validate fields and return the payload with a normalized issuer URL.
    pub fn normalized(mut self) -> Result<Self, ModelError> {
        if self.sub.trim().is_empty() {
            return Err(invalid("sub", "must not be blank"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be blank"));
        }
        validate_email(&self.email)?;
        self.issuer = normalize_http_url(&self.issuer)?;
        Ok(self)
    }
}

fn invalid(field: &'static str, reason: &str) -> ModelError {
    ModelError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn validate_email(email: &str) -> Result<(), ModelError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid("email", "missing '@'"));
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(invalid("email", "not a valid email address"));
    }
    Ok(())
}

fn normalize_http_url(raw: &str) -> Result<String, ModelError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|err| invalid("issuer", &err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid("issuer", "must be an http(s) URL"));
    }
    Ok(parsed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Sub,
    Name,
    Email,
    Issuer,
    CreatedAt,
}

impl SortKey {
    pub fn column(self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::Sub => "sub",
            SortKey::Name => "name",
            SortKey::Email => "email",
            SortKey::Issuer => "issuer",
            SortKey::CreatedAt => "created_at",
        }
    }

    fn compare(self, a: &User, b: &User) -> Ordering {
        match self {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::Sub => a.sub.cmp(&b.sub),
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Email => a.email.cmp(&b.email),
            SortKey::Issuer => a.issuer.cmp(&b.issuer),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub descending: bool,
}

impl Sort {
    /// Parse `key` or `-key`.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let (descending, name) = match raw.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, raw),
        };
        let key = match name {
            "id" => SortKey::Id,
            "sub" => SortKey::Sub,
            "name" => SortKey::Name,
            "email" => SortKey::Email,
            "issuer" => SortKey::Issuer,
            "created_at" => SortKey::CreatedAt,
            _ => return Err(invalid("sort", &format!("unknown sort key '{name}'"))),
        };
        Ok(Self { key, descending })
    }

    /// Ties fall back to ascending `id`, as the Postgres store orders them.
    pub fn compare(&self, a: &User, b: &User) -> Ordering {
        let ordering = self.key.compare(a, b);
        let ordering = if self.descending {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

/// Query string of `GET /users`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// User's subject must contain this string.
    pub sub: Option<String>,
    /// User's name must contain this string.
    pub name: Option<String>,
    /// User's email address must contain this string.
    pub email: Option<String>,
    /// User's issuer URL must contain this string.
    pub issuer: Option<String>,
    /// Creation time must be lower than or equal to this value.
    pub created_before: Option<DateTime<Utc>>,
    /// Creation time must be greater than or equal to this value.
    pub created_after: Option<DateTime<Utc>>,
    /// Page number, starting at 1.
    pub page: Option<u32>,
    /// Chunk size.
    pub size: Option<u32>,
    /// Key to sort by; prefix with '-' for reverse order.
    pub sort: Option<String>,
}

/// Substring and creation-time filters applied by the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub sub: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub issuer: Option<String>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        contains_ci(&user.sub, self.sub.as_deref())
            && contains_ci(&user.name, self.name.as_deref())
            && contains_ci(&user.email, self.email.as_deref())
            && contains_ci(&user.issuer, self.issuer.as_deref())
            && self
                .created_before
                .is_none_or(|limit| user.created_at <= limit)
            && self
                .created_after
                .is_none_or(|limit| user.created_at >= limit)
    }
}

fn contains_ci(value: &str, needle: Option<&str>) -> bool {
    needle.is_none_or(|needle| value.to_lowercase().contains(&needle.to_lowercase()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub filter: UserFilter,
    pub sort: Sort,
    pub page: u32,
    pub size: u32,
}

impl ListParams {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }
}

impl TryFrom<UserQuery> for ListParams {
    type Error = ModelError;

    fn try_from(query: UserQuery) -> Result<Self, Self::Error> {
        let page = query.page.unwrap_or(DEFAULT_PAGE);
        if page < 1 {
            return Err(invalid("page", "must be greater than or equal to 1"));
        }
        let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE);
        if size < 1 {
            return Err(invalid("size", "must be greater than or equal to 1"));
        }
        let sort = Sort::parse(query.sort.as_deref().unwrap_or(DEFAULT_SORT))?;
        Ok(Self {
            filter: UserFilter {
                sub: query.sub,
                name: query.name,
                email: query.email,
                issuer: query.issuer,
                created_before: query.created_before,
                created_after: query.created_after,
            },
            sort,
            page,
            size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub size: u32,
    pub number: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(number: u32, size: u32, total_elements: u64) -> Self {
        let total_pages = total_elements.div_ceil(u64::from(size)).max(1);
        Self {
            size,
            number,
            total_elements,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageNavigation {
    pub first: String,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub last: String,
}

impl PageNavigation {
    /// Build links from the current resource URL, replacing its `page` parameter.
    pub fn new(resource: &url::Url, page: &Pagination) -> Self {
        let number = u64::from(page.number);
        Self {
            first: with_page(resource, 1),
            prev: (number > 1).then(|| with_page(resource, number - 1)),
            next: (number < page.total_pages).then(|| with_page(resource, number + 1)),
            last: with_page(resource, page.total_pages),
        }
    }
}

fn with_page(resource: &url::Url, page: u64) -> String {
    let mut url = resource.clone();
    let kept: Vec<(String, String)> = resource
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    url.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserList {
    pub data: Vec<User>,
    pub page: Pagination,
    pub links: PageNavigation,
}

impl UserList {
    pub fn new(data: Vec<User>, params: &ListParams, total: u64, resource: &url::Url) -> Self {
        let page = Pagination::new(params.page, params.size, total);
        let links = PageNavigation::new(resource, &page);
        Self { data, page, links }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create() -> UserCreate {
        UserCreate {
            sub: "abc".to_string(),
            name: "Jane Doe".to_string(),
            email: "jane@example.org".to_string(),
            issuer: "https://iam.example.org".to_string(),
        }
    }

    #[test]
    fn issuer_is_normalized() {
        let create = create().normalized().expect("valid");
        assert_eq!(create.issuer, "https://iam.example.org/");
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let mut bad = create();
        bad.email = "not-an-email".to_string();
        assert!(matches!(
            bad.normalized(),
            Err(ModelError::Invalid { field: "email", .. })
        ));

        let mut bad = create();
        bad.issuer = "ftp://iam.example.org".to_string();
        assert!(matches!(
            bad.normalized(),
            Err(ModelError::Invalid { field: "issuer", .. })
        ));

        let mut bad = create();
        bad.sub = " ".to_string();
        assert!(bad.normalized().is_err());
    }

    #[test]
    fn identity_without_email_is_not_null_error() {
        let claims = json!({"name": "Jane"});
        let err = UserCreate::from_identity(
            Some("abc"),
            Some("https://iam.example.org/"),
            claims.as_object().expect("object"),
        )
        .unwrap_err();
        assert_eq!(err, ModelError::NotNull("email"));
        assert_eq!(err.to_string(), "Attribute 'email' of User can't be NULL");
    }

    #[test]
    fn identity_builds_payload() {
        let claims = json!({"name": "Jane", "email": "jane@example.org"});
        let create = UserCreate::from_identity(
            Some("abc"),
            Some("https://iam.example.org"),
            claims.as_object().expect("object"),
        )
        .expect("create");
        assert_eq!(create.sub, "abc");
        assert_eq!(create.issuer, "https://iam.example.org/");
    }

    #[test]
    fn sort_parses_direction() {
        let sort = Sort::parse("-created_at").expect("sort");
        assert_eq!(sort.key, SortKey::CreatedAt);
        assert!(sort.descending);
        let sort = Sort::parse("email").expect("sort");
        assert_eq!(sort.key.column(), "email");
        assert!(!sort.descending);
        assert!(Sort::parse("password").is_err());
    }

    #[test]
    fn list_params_defaults_and_bounds() {
        let params = ListParams::try_from(UserQuery::default()).expect("params");
        assert_eq!(params.page, 1);
        assert_eq!(params.size, 5);
        assert_eq!(params.sort, Sort::parse(DEFAULT_SORT).expect("sort"));
        assert_eq!(params.offset(), 0);

        let query = UserQuery {
            page: Some(0),
            ..UserQuery::default()
        };
        assert!(ListParams::try_from(query).is_err());
        let query = UserQuery {
            size: Some(0),
            ..UserQuery::default()
        };
        assert!(ListParams::try_from(query).is_err());
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let user = User::new(create().normalized().expect("valid"));
        let filter = UserFilter {
            name: Some("jane".to_string()),
            issuer: Some("IAM.example".to_string()),
            ..UserFilter::default()
        };
        assert!(filter.matches(&user));
        let filter = UserFilter {
            email: Some("john".to_string()),
            ..UserFilter::default()
        };
        assert!(!filter.matches(&user));
    }

    #[test]
    fn creation_bounds_are_inclusive() {
        let user = User::new(create().normalized().expect("valid"));
        let filter = UserFilter {
            created_before: Some(user.created_at),
            created_after: Some(user.created_at),
            ..UserFilter::default()
        };
        assert!(filter.matches(&user));
    }

    #[test]
    fn empty_list_still_has_one_page() {
        let page = Pagination::new(1, 5, 0);
        assert_eq!(page.total_pages, 1);
        assert_eq!(Pagination::new(1, 5, 11).total_pages, 3);
    }

    #[test]
    fn navigation_replaces_page_parameter() {
        let url = url::Url::parse("http://localhost:8000/api/v1/users/?page=2&size=2&name=j")
            .expect("url");
        let page = Pagination::new(2, 2, 5);
        let links = PageNavigation::new(&url, &page);
        assert_eq!(
            links.first,
            "http://localhost:8000/api/v1/users/?size=2&name=j&page=1"
        );
        assert_eq!(
            links.prev.as_deref(),
            Some("http://localhost:8000/api/v1/users/?size=2&name=j&page=1")
        );
        assert_eq!(
            links.next.as_deref(),
            Some("http://localhost:8000/api/v1/users/?size=2&name=j&page=3")
        );
        assert_eq!(
            links.last,
            "http://localhost:8000/api/v1/users/?size=2&name=j&page=3"
        );
    }

    #[test]
    fn single_page_has_no_prev_or_next() {
        let url = url::Url::parse("http://localhost:8000/api/v1/users").expect("url");
        let links = PageNavigation::new(&url, &Pagination::new(1, 5, 3));
        assert!(links.prev.is_none());
        assert!(links.next.is_none());
        assert_eq!(links.last, "http://localhost:8000/api/v1/users?page=1");
    }
}
