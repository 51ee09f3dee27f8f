/// Error handling for the API server
///
/// All handlers return `ApiResult<T>`; every error becomes a JSON body of
/// the form `{"error": "...", "message": "...", "details": [...]}` with the
/// matching status code. Domain errors from `towclub-shared` convert with
/// `?`.
///
/// # Example
///
/// ```
/// use towclub_api::error::{ApiError, ApiResult};
///
/// fn check_amount(amount: i32) -> ApiResult<i32> {
///     if amount < 0 {
///         return Err(ApiError::validation("amount", "Amount must not be negative"));
///     }
///     Ok(amount)
/// }
///
/// assert!(check_amount(-1).is_err());
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use towclub_shared::{
    auth::{authorization::AuthzError, jwt::JwtError, middleware::AuthError, password::PasswordError},
    billing::BillingError,
    models::{
        absorption::AbsorptionError, purchase::PurchaseError, report::ReportError,
        run::RunError,
    },
    selection::SignupError,
};
use validator::Validate;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. duplicate signup or an already billed signup
    Conflict(String),

    /// Unprocessable entity (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation error
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Logged here, never exposed to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Runs `validator` rules on a request body
pub fn validate_request<T: Validate>(req: &T) -> ApiResult<()> {
    req.validate().map_err(|e| {
        let mut errors: Vec<ValidationErrorDetail> = e
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(errors)
    })
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                use sqlx::error::ErrorKind;

                match db_err.kind() {
                    ErrorKind::UniqueViolation => {
                        let message = match db_err.constraint() {
                            Some("pilots_email_key") => "Email already registered",
                            Some("trainings_date_key") => "A training already exists on this date",
                            Some("signups_training_pilot_key") => {
                                "Pilot is already signed up for this training"
                            }
                            Some("reports_training_key") => "This training already has a report",
                            Some("bills_signup_key") => "Signup is already billed",
                            _ => "Duplicate entry",
                        };
                        ApiError::Conflict(message.to_string())
                    }
                    ErrorKind::CheckViolation => ApiError::validation(
                        db_err.constraint().unwrap_or("value"),
                        "Value out of range",
                    ),
                    ErrorKind::ForeignKeyViolation => {
                        ApiError::NotFound("Referenced resource not found".to_string())
                    }
                    _ => ApiError::InternalError(format!("Database error: {}", db_err)),
                }
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert auth errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::UnknownPilot(_) => ApiError::Unauthorized("Unknown pilot".to_string()),
            AuthzError::NotOrga => ApiError::Forbidden("Organizer role required".to_string()),
            AuthzError::NotAuthorized => {
                ApiError::Forbidden("Not authorized to access this resource".to_string())
            }
            AuthzError::DatabaseError(err) => err.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<SignupError> for ApiError {
    fn from(err: SignupError) -> Self {
        match err {
            SignupError::TrainingNotFound(_) => ApiError::not_found("Training"),
            SignupError::SignupNotFound(_) => ApiError::not_found("Signup"),
            SignupError::TrainingInPast(_) => ApiError::validation("training", err.to_string()),
            SignupError::AlreadySignedUp | SignupError::AlreadyBilled(_) => {
                ApiError::Conflict(err.to_string())
            }
            SignupError::Database(e) => e.into(),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::TrainingNotFound(_) => ApiError::not_found("Training"),
            RunError::ParticipantsChanged { .. } => {
                ApiError::validation("participant_count", err.to_string())
            }
            RunError::AlreadyBilled(_) => ApiError::Conflict(err.to_string()),
            RunError::Database(e) => e.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::TrainingNotFound(_) => ApiError::not_found("Training"),
            ReportError::NotFound(_) => ApiError::not_found("Report"),
            ReportError::OrgaNotInTraining(_) | ReportError::DuplicateOrga => {
                ApiError::validation("orga", err.to_string())
            }
            ReportError::Database(e) => e.into(),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::ReportNotFound(_) => ApiError::not_found("Report"),
            BillingError::SignupNotFound(_) => ApiError::not_found("Signup"),
            BillingError::SignupNotInTraining(_) | BillingError::SignupNotSelected(_) => {
                ApiError::validation("signup_id", err.to_string())
            }
            BillingError::AlreadyBilled(_) => ApiError::Conflict(err.to_string()),
            BillingError::AmountOverflow => ApiError::validation("amount", err.to_string()),
            BillingError::Database(e) => e.into(),
        }
    }
}

impl From<AbsorptionError> for ApiError {
    fn from(err: AbsorptionError) -> Self {
        match err {
            AbsorptionError::ReportNotFound(_) => ApiError::not_found("Report"),
            AbsorptionError::SignupNotFound(_) => ApiError::not_found("Signup"),
            AbsorptionError::SignupNotInTraining(_) => {
                ApiError::validation("signup_id", err.to_string())
            }
            AbsorptionError::Database(e) => e.into(),
        }
    }
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::ReportNotFound(_) => ApiError::not_found("Report"),
            PurchaseError::SignupNotFound(_) => ApiError::not_found("Signup"),
            PurchaseError::SignupNotInTraining(_) => {
                ApiError::validation("signup_id", err.to_string())
            }
            PurchaseError::AlreadyBilled(_) => ApiError::Conflict(err.to_string()),
            PurchaseError::InsufficientPrepaid { .. } => {
                ApiError::validation("quantity", err.to_string())
            }
            PurchaseError::Database(e) => e.into(),
        }
    }
}
