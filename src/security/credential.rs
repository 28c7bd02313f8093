//! HMAC-SHA256 signed service credentials for server-to-server callbacks.
//!
//! Tokens are compact JWTs (`header.payload.signature`, base64url without
//! padding) signed with a shared secret. Verification is stateless: nothing
//! is stored and nothing is mutated.
//!
//! Flow Overview:
//! 1) Split into exactly three segments.
//! 2) Recompute the MAC over `header.payload` and compare in constant time.
//! 3) Require `alg = HS256`, then decode the claims.
//! 4) Reject expired tokens and tokens issued more than five minutes ahead.
//! 5) Unknown subjects are logged and still accepted.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::secure::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";
const MAX_CLOCK_SKEW_SECONDS: i64 = 300;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("missing Authorization header")]
    Missing,
    #[error("Authorization header must use the Bearer scheme")]
    Scheme,
    #[error("invalid token format")]
    Format,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token issued in the future")]
    IssuedInFuture,
    #[error("invalid signing key")]
    Key,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CredentialHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Claims carried in the payload, in unix seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// A verified credential, attached to request extensions by the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredential {
    pub subject: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl From<ServiceClaims> for ServiceCredential {
    fn from(claims: ServiceClaims) -> Self {
        Self {
            subject: claims.sub,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}

#[derive(Clone)]
pub struct ServiceCredentialVerifier {
    secret: SecretString,
    known_subjects: BTreeSet<String>,
}

impl fmt::Debug for ServiceCredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentialVerifier")
            .field("secret", &"***")
            .field("known_subjects", &self.known_subjects)
            .finish()
    }
}

impl ServiceCredentialVerifier {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            known_subjects: BTreeSet::new(),
        }
    }

    /// Subjects expected to call in. Others are accepted but logged.
    #[must_use]
    pub fn with_known_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    /// Verify a compact token and return its claims.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, the signature does not
    /// match, or the time claims are out of range.
    pub fn verify(&self, token: &str, now_unix_seconds: i64) -> Result<ServiceCredential, CredentialError> {
        let mut parts = token.trim().split('.');
        let header_b64 = parts.next().ok_or(CredentialError::Format)?;
        let claims_b64 = parts.next().ok_or(CredentialError::Format)?;
        let sig_b64 = parts.next().ok_or(CredentialError::Format)?;
        if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
            return Err(CredentialError::Format);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| CredentialError::Base64)?;
        let expected = self.sign(&format!("{header_b64}.{claims_b64}"))?;
        if !constant_time_eq(&expected, &signature) {
            return Err(CredentialError::InvalidSignature);
        }

        let header: CredentialHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(CredentialError::UnsupportedAlg(header.alg));
        }

        let claims: ServiceClaims = b64d_json(claims_b64)?;
        if claims.exp.is_some_and(|exp| exp <= now_unix_seconds) {
            return Err(CredentialError::Expired);
        }
        if claims
            .iat
            .is_some_and(|iat| iat > now_unix_seconds.saturating_add(MAX_CLOCK_SKEW_SECONDS))
        {
            return Err(CredentialError::IssuedInFuture);
        }

        match claims.sub.as_deref() {
            Some(subject) if self.known_subjects.contains(subject) => {
                debug!(subject, "service credential verified");
            }
            subject => {
                warn!(subject = subject.unwrap_or("<none>"), "service credential from unknown subject");
            }
        }

        Ok(claims.into())
    }

    /// Mint a credential for `subject` valid for `ttl` from `now_unix_seconds`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(
        &self,
        subject: &str,
        ttl: Duration,
        now_unix_seconds: i64,
    ) -> Result<String, CredentialError> {
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let header = CredentialHeader {
            alg: ALG.to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = ServiceClaims {
            sub: Some(subject.to_string()),
            iat: Some(now_unix_seconds),
            exp: Some(now_unix_seconds.saturating_add(ttl_seconds)),
        };
        self.encode(&header, &claims)
    }

    /// Extract the bearer token from `headers` and verify it.
    ///
    /// # Errors
    /// Returns `Missing` or `Scheme` for header problems, otherwise the
    /// verification error.
    pub fn authorize_headers(
        &self,
        headers: &HeaderMap,
        now_unix_seconds: i64,
    ) -> Result<ServiceCredential, CredentialError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(CredentialError::Missing)?
            .to_str()
            .map_err(|_| CredentialError::Scheme)?
            .trim();
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(CredentialError::Scheme)?;
        self.verify(token, now_unix_seconds)
    }

    fn encode(&self, header: &CredentialHeader, claims: &ServiceClaims) -> Result<String, CredentialError> {
        let signing_input = format!("{}.{}", b64e_json(header)?, b64e_json(claims)?);
        let signature = Base64UrlUnpadded::encode_string(&self.sign(&signing_input)?);
        Ok(format!("{signing_input}.{signature}"))
    }

    fn sign(&self, signing_input: &str) -> Result<Vec<u8>, CredentialError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| CredentialError::Key)?;
        mac.update(signing_input.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, CredentialError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, CredentialError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| CredentialError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Reject callbacks without a valid service credential.
pub async fn require_service_credential(
    State(verifier): State<Arc<ServiceCredentialVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    match verifier.authorize_headers(request.headers(), Utc::now().timestamp()) {
        Ok(credential) => {
            request.extensions_mut().insert(credential);
            next.run(request).await
        }
        Err(err) => {
            warn!(path = %request.uri().path(), "service credential rejected: {err}");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": err.to_string() })),
            )
                .into_response()
        }
    }
}
