//! Token verifier backed by an identity provider's published JWKS.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::warn;
use url::Url;
use warden_application::{AuthCache, TokenClaims, TokenVerifier, issuer_keys_key};
use warden_core::{AppError, AppResult};

/// Verifies RS256 tokens against the issuer realm's published keys.
///
/// The key set is cached by realm; an unknown `kid` triggers one fresh
/// fetch so key rotation does not lock holders of new tokens out for a
/// full cache TTL.
pub struct JwksTokenVerifier {
    http: reqwest::Client,
    cache: Arc<dyn AuthCache>,
    issuer: Url,
    realm: String,
    audience: String,
    keys_ttl_seconds: u32,
}

impl JwksTokenVerifier {
    /// Creates a verifier for one issuer realm and audience.
    pub fn new(
        http: reqwest::Client,
        cache: Arc<dyn AuthCache>,
        issuer_url: &str,
        audience: impl Into<String>,
        keys_ttl_seconds: u32,
    ) -> AppResult<Self> {
        let issuer = Url::parse(issuer_url)
            .map_err(|error| AppError::Validation(format!("invalid issuer url: {error}")))?;
        let realm = realm_from_issuer(&issuer);

        Ok(Self {
            http,
            cache,
            issuer,
            realm,
            audience: audience.into(),
            keys_ttl_seconds,
        })
    }

    async fn load_jwks(&self, force_refresh: bool) -> AppResult<JwkSet> {
        let key = issuer_keys_key(&self.realm);

        if !force_refresh {
            match self.cache.get(&key).await {
                Ok(Some(encoded)) => match serde_json::from_str::<JwkSet>(&encoded) {
                    Ok(jwks) => return Ok(jwks),
                    Err(error) => {
                        warn!(%key, %error, "discarding undecodable issuer key cache entry");
                    }
                },
                Ok(None) => {}
                Err(error) => {
                    warn!(%key, %error, "issuer key cache read failed, fetching fresh");
                }
            }
        }

        let url = format!(
            "{}/protocol/openid-connect/certs",
            self.issuer.as_str().trim_end_matches('/')
        );
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to fetch issuer keys: {error}"))
            })?
            .error_for_status()
            .map_err(|error| {
                AppError::Unavailable(format!("issuer rejected the key request: {error}"))
            })?;
        let body = response.text().await.map_err(|error| {
            AppError::Unavailable(format!("failed to read issuer key response: {error}"))
        })?;

        let jwks: JwkSet = serde_json::from_str(&body).map_err(|error| {
            AppError::Internal(format!("issuer returned an undecodable key set: {error}"))
        })?;

        if let Err(error) = self
            .cache
            .set(&key, &body, self.keys_ttl_seconds)
            .await
        {
            warn!(%key, %error, "failed to cache issuer keys");
        }

        Ok(jwks)
    }
}

#[async_trait]
impl TokenVerifier for JwksTokenVerifier {
    async fn verify(&self, raw_token: &str) -> AppResult<TokenClaims> {
        let header = decode_header(raw_token)
            .map_err(|error| AppError::Unauthorized(format!("malformed token: {error}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::Unauthorized("token is missing a key id".to_owned()))?;

        let jwks = self.load_jwks(false).await?;
        let jwk = match find_key(&jwks, &kid) {
            Some(jwk) => jwk.clone(),
            None => {
                // kid unknown to the cached set: the issuer may have rotated
                let refreshed = self.load_jwks(true).await?;
                find_key(&refreshed, &kid).cloned().ok_or_else(|| {
                    AppError::Unauthorized(format!("no published key matches kid '{kid}'"))
                })?
            }
        };

        let (Some(modulus), Some(exponent)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            return Err(AppError::Unauthorized(format!(
                "published key '{kid}' is not an RSA signing key"
            )));
        };
        let decoding_key = DecodingKey::from_rsa_components(modulus, exponent).map_err(|error| {
            AppError::Internal(format!("published key '{kid}' is unusable: {error}"))
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str().trim_end_matches('/')]);

        let data = decode::<RawClaims>(raw_token, &decoding_key, &validation)
            .map_err(map_jwt_error)?;

        map_claims(data.claims)
    }
}

fn realm_from_issuer(issuer: &Url) -> String {
    issuer
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .map(str::to_owned)
        .unwrap_or_else(|| issuer.host_str().unwrap_or("issuer").to_owned())
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|jwk| jwk.kid.as_deref() == Some(kid))
}

fn map_jwt_error(error: jsonwebtoken::errors::Error) -> AppError {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized("token is expired".to_owned()),
        ErrorKind::InvalidAudience => {
            AppError::Unauthorized("token audience does not match".to_owned())
        }
        ErrorKind::InvalidIssuer => {
            AppError::Unauthorized("token issuer does not match".to_owned())
        }
        _ => AppError::Unauthorized(format!("token validation failed: {error}")),
    }
}

fn map_claims(raw: RawClaims) -> AppResult<TokenClaims> {
    let issued_at = epoch_to_datetime(raw.iat)?;
    let expires_at = epoch_to_datetime(raw.exp)?;

    Ok(TokenClaims {
        subject: raw.sub.unwrap_or_default(),
        preferred_username: raw.preferred_username,
        email: raw.email,
        realm_roles: raw.realm_access.roles,
        client_roles: raw
            .resource_access
            .into_iter()
            .map(|(client, access)| (client, access.roles))
            .collect(),
        issued_at,
        expires_at,
        session_id: raw.sid,
        scopes: raw.scope.split_whitespace().map(str::to_owned).collect(),
        issuer: raw.iss,
        authorized_party: raw.azp,
    })
}

fn epoch_to_datetime(epoch: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .ok_or_else(|| AppError::Unauthorized(format!("token carries an invalid timestamp: {epoch}")))
}

#[derive(Debug, Clone, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    preferred_username: Option<String>,
    email: Option<String>,
    #[serde(default)]
    realm_access: RealmAccess,
    #[serde(default)]
    resource_access: BTreeMap<String, ClientAccess>,
    iat: i64,
    exp: i64,
    sid: Option<String>,
    #[serde(default)]
    scope: String,
    iss: String,
    azp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use url::Url;
    use warden_core::AppError;

    use super::{RawClaims, map_claims, map_jwt_error, realm_from_issuer};

    #[test]
    fn realm_is_the_last_issuer_path_segment() {
        let Ok(issuer) = Url::parse("https://id.example.com/realms/acme") else {
            panic!("issuer must parse");
        };
        assert_eq!(realm_from_issuer(&issuer), "acme");

        let Ok(bare) = Url::parse("https://id.example.com/") else {
            panic!("issuer must parse");
        };
        assert_eq!(realm_from_issuer(&bare), "id.example.com");
    }

    #[test]
    fn expired_signature_maps_to_unauthorized() {
        let error = jsonwebtoken::errors::ErrorKind::ExpiredSignature.into();
        let mapped = map_jwt_error(error);
        assert!(matches!(mapped, AppError::Unauthorized(message) if message.contains("expired")));
    }

    #[test]
    fn keycloak_shaped_claims_map_onto_token_claims() {
        let raw: Result<RawClaims, _> = serde_json::from_value(serde_json::json!({
            "sub": "u-1",
            "preferred_username": "alice",
            "realm_access": {"roles": ["member", "superadmin"]},
            "resource_access": {"warden": {"roles": ["auditor"]}},
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
            "sid": "sess-1",
            "scope": "openid profile email",
            "iss": "https://id.example.com/realms/acme",
            "azp": "warden"
        }));
        let Ok(raw) = raw else {
            panic!("raw claims must deserialize");
        };

        let claims = map_claims(raw);
        let Ok(claims) = claims else {
            panic!("claims must map");
        };
        assert_eq!(claims.subject, "u-1");
        assert_eq!(claims.realm_roles, ["member".to_owned(), "superadmin".to_owned()]);
        assert_eq!(
            claims.client_roles.get("warden"),
            Some(&vec!["auditor".to_owned()])
        );
        assert_eq!(claims.scopes.len(), 3);
        assert_eq!(claims.session_id.as_deref(), Some("sess-1"));
        assert!(claims.expires_at > claims.issued_at);
    }

    #[test]
    fn subject_defaults_to_empty_when_absent() {
        let raw: Result<RawClaims, _> = serde_json::from_value(serde_json::json!({
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
            "iss": "https://id.example.com/realms/acme"
        }));
        let Ok(raw) = raw else {
            panic!("raw claims must deserialize");
        };

        let claims = map_claims(raw);
        let Ok(claims) = claims else {
            panic!("claims must map");
        };
        assert!(claims.subject.is_empty());
    }
}
