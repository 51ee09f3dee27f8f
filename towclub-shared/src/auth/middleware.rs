/// Bearer token authentication for axum
///
/// The middleware validates the access token of each request and stores an
/// [`AuthContext`] in the request extensions. Handlers take the context as
/// an extractor:
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use towclub_shared::auth::middleware::{create_jwt_middleware, AuthContext};
///
/// async fn me(auth: AuthContext) -> String {
///     auth.pilot_id.to_string()
/// }
///
/// let app: Router = Router::new()
///     .route("/v1/pilots/me", get(me))
///     .layer(middleware::from_fn(create_jwt_middleware("secret")));
/// ```

use std::future::Future;
use std::pin::Pin;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};

/// Identity of the calling pilot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub pilot_id: Uuid,
}

#[derive(Debug)]
pub enum AuthError {
    /// No Authorization header
    MissingCredentials,

    /// Header present but not `Bearer <token>`
    InvalidFormat(String),

    /// Bad signature, expired, or not an access token
    InvalidToken(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing credentials".to_string(),
            ),
            AuthError::InvalidFormat(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AuthError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
        };

        (status, Json(AuthErrorBody { error, message })).into_response()
    }
}

/// Validates the bearer token in `headers`
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        other => AuthError::InvalidToken(format!("Invalid token: {other}")),
    })?;

    Ok(AuthContext {
        pilot_id: claims.sub,
    })
}

pub async fn jwt_auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = authenticate(req.headers(), &secret).inspect_err(|e| {
        debug!(path = %req.uri().path(), error = ?e, "Rejected request");
    })?;

    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Result<Response, AuthError>> + Send>>;

/// Builds a closure for `axum::middleware::from_fn` that authenticates with
/// `secret`
pub fn create_jwt_middleware(
    secret: impl Into<String>,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    let secret = secret.into();
    move |req, next| {
        let secret = secret.clone();
        Box::pin(jwt_auth_middleware(secret, req, next))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or(AuthError::MissingCredentials)
    }
}
