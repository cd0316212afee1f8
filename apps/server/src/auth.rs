//! Authentication primitives.
//!
//! Callers present an HS256 bearer token signed with the configured shared
//! secret. The resulting [`Principal`] is attached to the request by
//! middleware and copied into every sub-request of a batch.

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{config::AuthConfig, state::AppState, Error};

pub const ANONYMOUS_USER: &str = "Anonymous User";

/// Security principal used by every permission check of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Superuser; bypasses every permission check.
    #[serde(default)]
    pub root: bool,
}

impl Principal {
    pub fn root(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            roles: Vec::new(),
            root: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            subject: ANONYMOUS_USER.to_string(),
            roles: Vec::new(),
            root: false,
        }
    }
}

/// Claims accepted in bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
    Misconfigured(String),
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Error::Unauthorized("Missing bearer token".to_string()),
            AuthError::InvalidToken(msg) => {
                Error::Unauthorized(format!("Invalid bearer token: {msg}"))
            }
            AuthError::Misconfigured(msg) => {
                Error::Configuration(format!("Authentication misconfigured: {msg}"))
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        Error::from(self).into_response()
    }
}

#[derive(Clone)]
pub struct AuthManager {
    config: Arc<AuthConfig>,
}

impl AuthManager {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn required(&self) -> bool {
        self.config.required
    }

    /// Resolve the caller of a request.
    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        if !self.enabled() {
            return Ok(Principal::root(self.config.root_user.clone()));
        }

        let Some(authz) = headers.get(header::AUTHORIZATION) else {
            return if self.required() {
                Err(AuthError::MissingToken)
            } else {
                Ok(Principal::anonymous())
            };
        };

        let authz = authz.to_str().map_err(|_| {
            AuthError::InvalidToken("Authorization header is not valid UTF-8".to_string())
        })?;

        let token = authz
            .strip_prefix("Bearer ")
            .or_else(|| authz.strip_prefix("bearer "))
            .ok_or_else(|| {
                AuthError::InvalidToken("Authorization header must be 'Bearer <token>'".to_string())
            })?;

        let claims = self.decode_token(token)?;
        Ok(self.principal_from_claims(claims))
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self
            .config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| AuthError::Misconfigured("auth.jwt_secret is not set".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    fn principal_from_claims(&self, claims: Claims) -> Principal {
        Principal {
            root: claims.sub == self.config.root_user,
            subject: claims.sub,
            roles: claims.roles,
        }
    }
}

/// Extractor for the principal attached by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedPrincipal)
            .ok_or_else(|| AuthError::MissingToken.into_response())
    }
}

/// Attach the caller's `Principal` (or reject the request).
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    match state.auth.authenticate_headers(req.headers()) {
        Ok(principal) => {
            tracing::debug!(subject = %principal.subject, "Authenticated caller");
            req.extensions_mut().insert::<Principal>(principal);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(error = ?err, "Authentication failed");
            err.into_response()
        }
    }
}
