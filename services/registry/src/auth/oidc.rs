//! OIDC bearer token validation with cached discovery, JWKS and userinfo.
//!
//! # Purpose
//! Authenticate inbound bearer tokens issued by one of the trusted identity
//! providers and collect the caller's identity claims.
//!
//! # Key invariants
//! - The header algorithm must be in the configured allowlist before any
//!   network work happens.
//! - Claims are decoded unverified only to locate the issuer; the issuer must
//!   be trusted before discovery or JWKS are fetched.
//! - JWKS and discovery caches are time-bounded; an unknown `kid` forces one
//!   JWKS refresh.
//! - The `iss` in the returned identity is always the verified token issuer,
//!   even when the userinfo document carries its own.
//!
//! # Concurrency model
//! Caches live in `DashMap`s shared across clones of the validator.
//!
//! # Security model
//! - Audience is only enforced when one is configured.
//! - Error details never include token contents.
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use dashmap::DashMap;
use datacloud_policy::UserInfo;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Settings for [`OidcValidator`].
#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub trusted_issuers: Vec<String>,
    pub allowed_algorithms: Vec<Algorithm>,
    pub audience: Option<String>,
    pub http_timeout: Duration,
    pub jwks_ttl: Duration,
    pub discovery_ttl: Duration,
    pub clock_skew_seconds: u64,
}

impl OidcSettings {
    pub fn new(trusted_issuers: Vec<String>, allowed_algorithms: Vec<Algorithm>) -> Self {
        Self {
            trusted_issuers,
            allowed_algorithms,
            audience: None,
            http_timeout: Duration::from_secs(5),
            jwks_ttl: Duration::from_secs(3600),
            discovery_ttl: Duration::from_secs(3600),
            clock_skew_seconds: 60,
        }
    }
}

/// Validator for bearer tokens from the trusted identity providers.
#[derive(Debug, Clone)]
pub struct OidcValidator {
    client: reqwest::Client,
    settings: Arc<OidcSettings>,
    jwks_cache: Arc<DashMap<String, CachedJwks>>,
    discovery_cache: Arc<DashMap<String, CachedDiscovery>>,
}

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub issuer: String,
    pub subject: String,
    /// Token claims with the userinfo document merged over them.
    pub claims: Map<String, Value>,
}

impl Caller {
    /// Claims in the shape the policy rules expect as `input.user_info`.
    pub fn user_info(&self) -> UserInfo {
        UserInfo::from(Value::Object(self.claims.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("missing issuer")]
    MissingIssuer,
    #[error("issuer not trusted")]
    IssuerNotTrusted,
    #[error("missing subject")]
    MissingSubject,
    #[error("missing key id")]
    MissingKeyId,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid jwk: {0}")]
    InvalidJwk(String),
    #[error("jwks key not found")]
    JwksKeyNotFound,
    #[error("userinfo request failed with status {0}")]
    Userinfo(u16),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("invalid claim: {0}")]
    InvalidClaim(String),
}

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct CachedDiscovery {
    document: DiscoveryDocument,
    expires_at: Instant,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
    #[serde(default)]
    userinfo_endpoint: Option<String>,
}

/// Algorithms this validator knows how to match against a JWK.
pub fn is_supported_algorithm(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
    )
}

/// Compare issuers ignoring one trailing `/`.
pub fn same_issuer(a: &str, b: &str) -> bool {
    a.strip_suffix('/').unwrap_or(a) == b.strip_suffix('/').unwrap_or(b)
}

impl OidcValidator {
    pub fn new(settings: OidcSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: Arc::new(settings),
            jwks_cache: Arc::new(DashMap::new()),
            discovery_cache: Arc::new(DashMap::new()),
        }
    }

    pub fn trusted_issuers(&self) -> &[String] {
        &self.settings.trusted_issuers
    }

    /// Validate a bearer token and resolve the caller's identity.
    ///
    /// # Errors
    /// - `UnsupportedAlgorithm` when the header algorithm is not allowed.
    /// - `IssuerNotTrusted` when `iss` is not one of the trusted issuers.
    /// - `JwksKeyNotFound` / `InvalidJwk` when no matching signing key exists.
    /// - `Jwt` for signature, expiry or audience failures.
    /// - `Userinfo` / `Http` when the identity provider cannot be queried.
    pub async fn authenticate(&self, token: &str) -> Result<Caller, OidcError> {
        let header = decode_header(token)?;
        if !self.settings.allowed_algorithms.contains(&header.alg) {
            return Err(OidcError::UnsupportedAlgorithm);
        }
        let kid = header.kid.as_deref().ok_or(OidcError::MissingKeyId)?;

        let unverified = decode_unverified_claims(token)?;
        let issuer = extract_string_claim(&unverified, "iss").ok_or(OidcError::MissingIssuer)?;
        if !self
            .settings
            .trusted_issuers
            .iter()
            .any(|trusted| same_issuer(trusted, &issuer))
        {
            return Err(OidcError::IssuerNotTrusted);
        }

        let discovery = self.discover(&issuer).await?;
        let jwks = self.get_jwks(&discovery.jwks_uri).await?;
        let decoding_key = match find_jwk(&jwks, kid) {
            Some(key) => {
                ensure_jwk_matches_algorithm(key, header.alg)?;
                DecodingKey::from_jwk(key)?
            }
            None => {
                let refreshed = self.refresh_jwks(&discovery.jwks_uri).await?;
                let key = find_jwk(&refreshed, kid).ok_or(OidcError::JwksKeyNotFound)?;
                ensure_jwk_matches_algorithm(key, header.alg)?;
                DecodingKey::from_jwk(key)?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[issuer.as_str()]);
        match &self.settings.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }
        validation.leeway = self.settings.clock_skew_seconds;
        let token_data = decode::<Value>(token, &decoding_key, &validation)?;
        validate_iat(&token_data.claims, self.settings.clock_skew_seconds)?;

        let Value::Object(mut claims) = token_data.claims else {
            return Err(OidcError::InvalidClaim("claims".to_string()));
        };
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(OidcError::MissingSubject)?;

        if let Some(endpoint) = &discovery.userinfo_endpoint {
            let userinfo = self.fetch_userinfo(endpoint, token).await?;
            if let Some(sub) = userinfo.get("sub").and_then(Value::as_str)
                && sub != subject
            {
                return Err(OidcError::InvalidClaim("userinfo subject mismatch".to_string()));
            }
            claims.extend(userinfo);
        }
        claims.insert("iss".to_string(), Value::String(issuer.clone()));

        tracing::debug!(issuer = %issuer, "bearer token authenticated");
        Ok(Caller {
            issuer,
            subject,
            claims,
        })
    }

    async fn discover(&self, issuer: &str) -> Result<DiscoveryDocument, OidcError> {
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        if let Some(entry) = self.discovery_cache.get(&discovery_url)
            && entry.expires_at > Instant::now()
        {
            return Ok(entry.document.clone());
        }

        let document: DiscoveryDocument = self
            .client
            .get(&discovery_url)
            .timeout(self.settings.http_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.discovery_cache.insert(
            discovery_url,
            CachedDiscovery {
                document: document.clone(),
                expires_at: Instant::now() + self.settings.discovery_ttl,
            },
        );
        Ok(document)
    }

    async fn get_jwks(&self, jwks_url: &str) -> Result<JwkSet, OidcError> {
        if let Some(entry) = self.jwks_cache.get(jwks_url)
            && entry.expires_at > Instant::now()
        {
            return Ok(entry.jwks.clone());
        }
        self.refresh_jwks(jwks_url).await
    }

    async fn refresh_jwks(&self, jwks_url: &str) -> Result<JwkSet, OidcError> {
        let jwks: JwkSet = self
            .client
            .get(jwks_url)
            .timeout(self.settings.http_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.jwks_cache.insert(
            jwks_url.to_string(),
            CachedJwks {
                jwks: jwks.clone(),
                expires_at: Instant::now() + self.settings.jwks_ttl,
            },
        );
        Ok(jwks)
    }

    async fn fetch_userinfo(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<Map<String, Value>, OidcError> {
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .timeout(self.settings.http_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OidcError::Userinfo(status.as_u16()));
        }
        match response.json::<Value>().await? {
            Value::Object(map) => Ok(map),
            _ => Err(OidcError::InvalidClaim("userinfo document".to_string())),
        }
    }
}

fn ensure_jwk_matches_algorithm(jwk: &Jwk, alg: Algorithm) -> Result<(), OidcError> {
    // The JWK `alg` member is optional; when present it must agree.
    if let Some(key_alg) = jwk.common.key_algorithm.as_ref() {
        let expected = match alg {
            Algorithm::RS256 => KeyAlgorithm::RS256,
            Algorithm::RS384 => KeyAlgorithm::RS384,
            Algorithm::RS512 => KeyAlgorithm::RS512,
            Algorithm::PS256 => KeyAlgorithm::PS256,
            Algorithm::PS384 => KeyAlgorithm::PS384,
            Algorithm::PS512 => KeyAlgorithm::PS512,
            Algorithm::ES256 => KeyAlgorithm::ES256,
            Algorithm::ES384 => KeyAlgorithm::ES384,
            _ => return Err(OidcError::UnsupportedAlgorithm),
        };
        if *key_alg != expected {
            return Err(OidcError::InvalidJwk("alg mismatch".to_string()));
        }
    }
    match (&jwk.algorithm, alg) {
        (
            AlgorithmParameters::RSA(_),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => Ok(()),
        (AlgorithmParameters::EllipticCurve(params), Algorithm::ES256) => {
            if params.curve != EllipticCurve::P256 {
                return Err(OidcError::InvalidJwk("unexpected EC curve".to_string()));
            }
            Ok(())
        }
        (AlgorithmParameters::EllipticCurve(params), Algorithm::ES384) => {
            if params.curve != EllipticCurve::P384 {
                return Err(OidcError::InvalidJwk("unexpected EC curve".to_string()));
            }
            Ok(())
        }
        _ => Err(OidcError::InvalidJwk("kty mismatch".to_string())),
    }
}

fn find_jwk<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
}

fn decode_unverified_claims(token: &str) -> Result<Value, OidcError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| OidcError::InvalidClaim("token format".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| OidcError::InvalidClaim("token payload".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| OidcError::InvalidClaim(format!("token payload: {err}")))
}

fn extract_string_claim(claims: &Value, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(str::to_string)
}

fn validate_iat(claims: &Value, leeway_seconds: u64) -> Result<(), OidcError> {
    // `iat` is optional for access tokens, but never in the future.
    let Some(iat) = claims.get("iat") else {
        return Ok(());
    };
    let iat = iat
        .as_i64()
        .ok_or_else(|| OidcError::InvalidClaim("iat".to_string()))?;
    let leeway = i64::try_from(leeway_seconds).unwrap_or(i64::MAX);
    if iat > Utc::now().timestamp().saturating_add(leeway) {
        return Err(OidcError::InvalidClaim("iat in future".to_string()));
    }
    Ok(())
}
