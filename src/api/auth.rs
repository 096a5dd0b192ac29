//! Bearer-token authentication and role checks.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sprintify_core::models::Role;

use super::{error::ApiError, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(
        &self,
        uid: &str,
        email: &str,
        name: Option<&str>,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: uid.to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

/// Mint a token for `uid`, valid for `ttl`.
pub fn issue_token(
    secret: &str,
    uid: &str,
    email: &str,
    name: Option<&str>,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    JwtKeys::new(secret).issue(uid, email, name, ttl)
}

/// The caller behind a verified token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    /// False until the caller has created a profile with `POST /auth/register`.
    pub registered: bool,
}

impl AuthUser {
    pub fn require(&self, min: Role) -> Result<(), ApiError> {
        if self.role.at_least(min) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("insufficient permissions".into()))
        }
    }
}

/// Extracts a registered caller. Unregistered token holders get 403.
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthUser>() {
            Some(user) if user.registered => Ok(user.clone()),
            Some(_) => Err(ApiError::Forbidden(
                "profile not registered, call POST /api/auth/register first".into(),
            )),
            None => Err(ApiError::Unauthorized("authentication required".into())),
        }
    }
}

/// Extracts any authenticated caller, registered or not.
#[derive(Debug, Clone)]
pub struct Identity(pub AuthUser);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(Identity)
            .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))
    }
}

fn bearer_token(req: &Request) -> Result<Option<String>, ApiError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("malformed authorization header".into()))?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        _ => Err(ApiError::Unauthorized("expected a bearer token".into())),
    }
}

/// Verifies the bearer token, if any, and attaches an [`AuthUser`].
/// Requests without a token pass through; handlers that need a caller reject them.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(&req)? else {
        return Ok(next.run(req).await);
    };

    let claims = state.keys.verify(&token).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::Unauthorized("invalid or expired token".into())
    })?;

    let user = match state.db.get_user(&claims.sub)? {
        Some(profile) if profile.disabled => {
            return Err(ApiError::Forbidden("account disabled".into()));
        }
        Some(profile) => AuthUser {
            uid: profile.uid,
            email: profile.email,
            name: profile.display_name.or(claims.name),
            role: profile.role,
            registered: true,
        },
        None => AuthUser {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
            role: Role::Normal,
            registered: false,
        },
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

pub async fn require_admin(user: AuthUser, req: Request, next: Next) -> Result<Response, ApiError> {
    user.require(Role::Admin)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_with_the_same_secret() {
        let token = issue_token("s3cret", "u1", "u1@example.com", Some("U"), Duration::hours(1)).unwrap();
        let claims = JwtKeys::new("s3cret").verify(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.name.as_deref(), Some("U"));
        assert!(JwtKeys::new("other").verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = issue_token("s3cret", "u1", "u1@example.com", None, Duration::hours(-2)).unwrap();
        assert!(JwtKeys::new("s3cret").verify(&token).is_err());
    }

    #[test]
    fn role_check() {
        let user = AuthUser {
            uid: "u".into(),
            email: "u@example.com".into(),
            name: None,
            role: Role::Premium,
            registered: true,
        };
        assert!(user.require(Role::Normal).is_ok());
        assert!(user.require(Role::Premium).is_ok());
        assert!(user.require(Role::Admin).is_err());
    }
}
