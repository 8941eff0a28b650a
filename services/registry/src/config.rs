use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9000";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_OPA_AUTHZ_URL: &str = "http://localhost:8181/v1/data/app";
pub const DEFAULT_POLICY_DATA_PATH: &str = "policy/data.json";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000/";
pub const DEFAULT_PROJECT_NAME: &str = "app";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_IDP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_OPA_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("unknown storage backend '{other}'"),
        }
    }
}

/// How bearer tokens are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthnMode {
    /// Validate tokens locally against the trusted IdPs' JWKS.
    Local,
}

impl FromStr for AuthnMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(AuthnMode::Local),
            other => anyhow::bail!("unknown authentication mode '{other}'"),
        }
    }
}

impl AuthnMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthnMode::Local => "local",
        }
    }
}

/// Where authorization decisions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthzMode {
    /// Ask a remote OPA-compatible decision point.
    Opa,
    /// Evaluate the policy rules in-process.
    Embedded,
}

impl FromStr for AuthzMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "opa" => Ok(AuthzMode::Opa),
            "embedded" => Ok(AuthzMode::Embedded),
            other => anyhow::bail!("unknown authorization mode '{other}'"),
        }
    }
}

impl AuthzMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthzMode::Opa => "opa",
            AuthzMode::Embedded => "embedded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintainerConfig {
    pub name: Option<String>,
    pub url: Option<String>,
    pub email: Option<String>,
}

// Registry configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub log_level: String,
    pub project_name: String,
    pub maintainer: MaintainerConfig,
    pub base_url: url::Url,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub trusted_idps: Vec<String>,
    pub authn_mode: Option<AuthnMode>,
    pub authz_mode: Option<AuthzMode>,
    pub opa_authz_url: url::Url,
    pub opa_timeout_ms: u64,
    pub idp_timeout_ms: u64,
    pub policy_data_path: PathBuf,
    pub cors_origins: Vec<String>,
    pub oidc_allowed_algorithms: Vec<Algorithm>,
    pub oidc_audience: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    log_level: Option<String>,
    project_name: Option<String>,
    maintainer_name: Option<String>,
    maintainer_url: Option<String>,
    maintainer_email: Option<String>,
    base_url: Option<String>,
    storage: Option<StorageBackend>,
    db_url: Option<String>,
    db_max_connections: Option<u32>,
    trusted_idps: Option<Vec<String>>,
    authn_mode: Option<AuthnMode>,
    authz_mode: Option<AuthzMode>,
    opa_authz_url: Option<String>,
    opa_timeout_ms: Option<u64>,
    idp_timeout_ms: Option<u64>,
    policy_data_path: Option<PathBuf>,
    cors_origins: Option<Vec<String>>,
    oidc_allowed_algorithms: Option<Vec<String>>,
    oidc_audience: Option<String>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parse {key}")),
        None => Ok(default),
    }
}

/// Parse a list given either as a JSON array or as comma-separated values.
pub fn parse_list(raw: &str) -> Result<Vec<String>> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw).with_context(|| "parse JSON list");
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn parse_algorithms(values: &[String]) -> Result<Vec<Algorithm>> {
    let mut algorithms = Vec::with_capacity(values.len());
    for value in values {
        let alg = Algorithm::from_str(value.trim().to_ascii_uppercase().as_str())
            .with_context(|| format!("parse oidc algorithm '{value}'"))?;
        if !crate::auth::oidc::is_supported_algorithm(alg) {
            anyhow::bail!("unsupported oidc algorithm '{value}'");
        }
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }
    if algorithms.is_empty() {
        anyhow::bail!("at least one oidc algorithm must be allowed");
    }
    Ok(algorithms)
}

/// Map the level names used by operators onto `EnvFilter` directives.
pub fn normalize_log_level(raw: &str) -> Result<String> {
    let level = match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        other => anyhow::bail!("unknown log level '{other}'"),
    };
    Ok(level.to_string())
}

fn parse_http_url(raw: &str, what: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw.trim()).with_context(|| format!("parse {what}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{what} must be an http(s) URL");
    }
    Ok(parsed)
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment layer only; cross-field checks run once the layers are merged.
    fn load_env() -> Result<Self> {
        let bind_addr = env_parse("DC_REGISTRY_BIND", DEFAULT_BIND.parse()?)?;
        let metrics_bind = env_parse("DC_REGISTRY_METRICS_BIND", DEFAULT_METRICS_BIND.parse()?)?;
        let log_level = normalize_log_level(
            &env_opt("DC_REGISTRY_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        )
        .with_context(|| "parse DC_REGISTRY_LOG_LEVEL")?;
        let base_url = parse_http_url(
            &env_opt("DC_REGISTRY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            "DC_REGISTRY_BASE_URL",
        )?;
        let postgres = env_opt("DC_REGISTRY_DB_URL")
            .map(|url| -> Result<PostgresConfig> {
                Ok(PostgresConfig {
                    url,
                    max_connections: env_parse(
                        "DC_REGISTRY_DB_MAX_CONNECTIONS",
                        DEFAULT_PG_MAX_CONNECTIONS,
                    )?,
                    connect_timeout_ms: env_parse(
                        "DC_REGISTRY_DB_CONNECT_TIMEOUT_MS",
                        DEFAULT_PG_CONNECT_TIMEOUT_MS,
                    )?,
                    acquire_timeout_ms: env_parse(
                        "DC_REGISTRY_DB_ACQUIRE_TIMEOUT_MS",
                        DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
                    )?,
                })
            })
            .transpose()?;
        let default_storage = if postgres.is_some() {
            StorageBackend::Postgres
        } else {
            StorageBackend::Memory
        };
        let storage = env_parse("DC_REGISTRY_STORAGE", default_storage)?;
        let trusted_idps = match env_opt("DC_REGISTRY_TRUSTED_IDPS") {
            Some(raw) => parse_list(&raw).with_context(|| "parse DC_REGISTRY_TRUSTED_IDPS")?,
            None => Vec::new(),
        };
        let authn_mode = env_opt("DC_REGISTRY_AUTHN_MODE")
            .map(|raw| raw.parse())
            .transpose()
            .with_context(|| "parse DC_REGISTRY_AUTHN_MODE")?;
        let authz_mode = env_opt("DC_REGISTRY_AUTHZ_MODE")
            .map(|raw| raw.parse())
            .transpose()
            .with_context(|| "parse DC_REGISTRY_AUTHZ_MODE")?;
        let opa_authz_url = parse_http_url(
            &env_opt("DC_REGISTRY_OPA_AUTHZ_URL")
                .unwrap_or_else(|| DEFAULT_OPA_AUTHZ_URL.to_string()),
            "DC_REGISTRY_OPA_AUTHZ_URL",
        )?;
        let cors_origins = match env_opt("DC_REGISTRY_CORS_ORIGINS") {
            Some(raw) => parse_list(&raw).with_context(|| "parse DC_REGISTRY_CORS_ORIGINS")?,
            None => vec![DEFAULT_CORS_ORIGIN.to_string()],
        };
        let oidc_allowed_algorithms = match env_opt("DC_REGISTRY_OIDC_ALLOWED_ALGORITHMS") {
            Some(raw) => parse_algorithms(&parse_list(&raw)?)
                .with_context(|| "parse DC_REGISTRY_OIDC_ALLOWED_ALGORITHMS")?,
            None => vec![Algorithm::ES256, Algorithm::RS256],
        };

        let config = Self {
            bind_addr,
            metrics_bind,
            log_level,
            project_name: env_opt("DC_REGISTRY_PROJECT_NAME")
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
            maintainer: MaintainerConfig {
                name: env_opt("DC_REGISTRY_MAINTAINER_NAME"),
                url: env_opt("DC_REGISTRY_MAINTAINER_URL"),
                email: env_opt("DC_REGISTRY_MAINTAINER_EMAIL"),
            },
            base_url,
            storage,
            postgres,
            trusted_idps,
            authn_mode,
            authz_mode,
            opa_authz_url,
            opa_timeout_ms: env_parse("DC_REGISTRY_OPA_TIMEOUT_MS", DEFAULT_OPA_TIMEOUT_MS)?,
            idp_timeout_ms: env_parse("DC_REGISTRY_IDP_TIMEOUT_MS", DEFAULT_IDP_TIMEOUT_MS)?,
            policy_data_path: env_opt("DC_REGISTRY_POLICY_DATA")
                .unwrap_or_else(|| DEFAULT_POLICY_DATA_PATH.to_string())
                .into(),
            cors_origins,
            oidc_allowed_algorithms,
            oidc_audience: env_opt("DC_REGISTRY_OIDC_AUDIENCE"),
        };
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::load_env()?;
        if let Some(path) = env_opt("DC_REGISTRY_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read DC_REGISTRY_CONFIG: {path}"))?;
            config.merge_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        self.merge_yaml(contents)?;
        self.validate()
    }

    fn merge_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: RegistryConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse registry config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.log_level {
            self.log_level = normalize_log_level(&value).with_context(|| "parse log_level")?;
        }
        if let Some(value) = override_cfg.project_name {
            self.project_name = value;
        }
        if let Some(value) = override_cfg.maintainer_name {
            self.maintainer.name = Some(value);
        }
        if let Some(value) = override_cfg.maintainer_url {
            self.maintainer.url = Some(value);
        }
        if let Some(value) = override_cfg.maintainer_email {
            self.maintainer.email = Some(value);
        }
        if let Some(value) = override_cfg.base_url {
            self.base_url = parse_http_url(&value, "base_url")?;
        }
        if let Some(value) = override_cfg.db_url {
            let pg = self.postgres.get_or_insert_with(|| PostgresConfig {
                url: String::new(),
                max_connections: DEFAULT_PG_MAX_CONNECTIONS,
                connect_timeout_ms: DEFAULT_PG_CONNECT_TIMEOUT_MS,
                acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
            });
            pg.url = value;
            if override_cfg.storage.is_none() {
                self.storage = StorageBackend::Postgres;
            }
        }
        if let Some(value) = override_cfg.db_max_connections
            && let Some(pg) = self.postgres.as_mut()
        {
            pg.max_connections = value;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.trusted_idps {
            self.trusted_idps = value;
        }
        if let Some(value) = override_cfg.authn_mode {
            self.authn_mode = Some(value);
        }
        if let Some(value) = override_cfg.authz_mode {
            self.authz_mode = Some(value);
        }
        if let Some(value) = override_cfg.opa_authz_url {
            self.opa_authz_url = parse_http_url(&value, "opa_authz_url")?;
        }
        if let Some(value) = override_cfg.opa_timeout_ms {
            self.opa_timeout_ms = value;
        }
        if let Some(value) = override_cfg.idp_timeout_ms {
            self.idp_timeout_ms = value;
        }
        if let Some(value) = override_cfg.policy_data_path {
            self.policy_data_path = value;
        }
        if let Some(value) = override_cfg.cors_origins {
            self.cors_origins = value;
        }
        if let Some(values) = override_cfg.oidc_allowed_algorithms {
            self.oidc_allowed_algorithms =
                parse_algorithms(&values).with_context(|| "parse oidc_allowed_algorithms")?;
        }
        if let Some(value) = override_cfg.oidc_audience {
            self.oidc_audience = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.authn_mode.is_none() && self.authz_mode.is_some() {
            anyhow::bail!(
                "If authorization mode is defined, authentication mode can't be undefined."
            );
        }
        for issuer in &self.trusted_idps {
            parse_http_url(issuer, "trusted identity provider")
                .with_context(|| format!("invalid trusted identity provider '{issuer}'"))?;
        }
        for origin in &self.cors_origins {
            if origin != "*" {
                parse_http_url(origin, "CORS origin")
                    .with_context(|| format!("invalid CORS origin '{origin}'"))?;
            }
        }
        Ok(())
    }
}
