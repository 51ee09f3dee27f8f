/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Create a pilot account
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Refresh access token

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use towclub_shared::{
    auth::{
        jwt::{self, TokenPair},
        password,
    },
    models::pilot::{CreatePilot, Pilot},
};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked against the password policy after the field rules
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Tokens handed out at registration and login
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub pilot_id: Uuid,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New access token (12h)
    pub access_token: String,
}

/// Register a new pilot
///
/// New accounts are guests without organizer rights; an organizer grants
/// membership and roles.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "ruth@example.com",
///   "password": "windenstart1",
///   "first_name": "Ruth",
///   "last_name": "Keller"
/// }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "pilot_id": "uuid",
///   "access_token": "eyJ...",
///   "refresh_token": "eyJ...",
///   "token_type": "Bearer",
///   "expires_in": 43200
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Email already registered
/// - `422 Unprocessable Entity`: Validation failed
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    validate_request(&req)?;
    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::validation("password", e))?;

    let password_hash = password::hash_password(&req.password)?;

    let pilot = Pilot::create(
        &state.db,
        CreatePilot {
            email: req.email.trim().to_lowercase(),
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
        },
    )
    .await?;

    info!(pilot_id = %pilot.id, name = %pilot.full_name(), "Registered pilot");

    let tokens = jwt::issue_token_pair(pilot.id, state.jwt_secret())?;
    Ok(Json(AuthResponse {
        pilot_id: pilot.id,
        tokens,
    }))
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// {
///   "email": "ruth@example.com",
///   "password": "windenstart1"
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `422 Unprocessable Entity`: Validation failed
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    validate_request(&req)?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let pilot = Pilot::find_by_email(&state.db, &req.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &pilot.password_hash)? {
        warn!(pilot_id = %pilot.id, "Failed login");
        return Err(invalid());
    }

    let tokens = jwt::issue_token_pair(pilot.id, state.jwt_secret())?;
    Ok(Json(AuthResponse {
        pilot_id: pilot.id,
        tokens,
    }))
}

/// Token refresh endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/refresh
/// Content-Type: application/json
///
/// {
///   "refresh_token": "eyJ..."
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}
