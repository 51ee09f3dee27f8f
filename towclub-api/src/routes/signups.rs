/// Signup endpoints
///
/// # Endpoints
///
/// - `POST /v1/trainings/:id/signups` - Sign up for a training
/// - `PUT /v1/signups/:id` - Change flags or comment, or sign up again
/// - `POST /v1/signups/:id/cancel` - Cancel a signup
///
/// Every change reruns selection for the training, so the returned signup
/// shows whether the pilot got a place.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
    routes::today,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use towclub_shared::{
    auth::{
        authorization::{current_pilot, require_owner_or_orga, AuthzError},
        middleware::AuthContext,
    },
    models::signup::{CreateSignup, Signup, UpdateSignup},
    selection,
};
use uuid::Uuid;
use validator::Validate;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSignupRequest {
    /// Organizers may sign up other pilots; defaults to the caller
    pub pilot_id: Option<Uuid>,

    #[serde(default = "default_true")]
    pub is_certain: bool,

    #[serde(default = "default_true")]
    pub for_whole_day: bool,

    #[validate(length(max = 500, message = "Comment must be at most 500 characters"))]
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSignupRequest {
    pub is_certain: Option<bool>,

    pub for_whole_day: Option<bool>,

    #[validate(length(max = 500, message = "Comment must be at most 500 characters"))]
    pub comment: Option<String>,
}

/// Signs up for a training
///
/// # Endpoint
///
/// ```text
/// POST /v1/trainings/:id/signups
///
/// {
///   "is_certain": true,
///   "for_whole_day": false,
///   "comment": "Arriving around noon"
/// }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: Signing up someone else without the organizer role
/// - `404 Not Found`: Training not found
/// - `409 Conflict`: Pilot already signed up
/// - `422 Unprocessable Entity`: Training in the past
pub async fn create_signup(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(training_id): Path<Uuid>,
    Json(req): Json<CreateSignupRequest>,
) -> ApiResult<Json<Signup>> {
    validate_request(&req)?;

    let caller = current_pilot(&state.db, &auth).await?;
    let pilot_id = req.pilot_id.unwrap_or(caller.id);
    if pilot_id != caller.id && !caller.is_orga {
        return Err(AuthzError::NotOrga.into());
    }

    let signup = selection::sign_up(
        &state.db,
        CreateSignup {
            training_id,
            pilot_id,
            is_certain: req.is_certain,
            for_whole_day: req.for_whole_day,
            comment: req.comment,
        },
        today(),
    )
    .await?;

    Ok(Json(signup))
}

/// Updates a signup
///
/// Editing a canceled signup signs the pilot up again at the back of the
/// waiting list. Changing `is_certain` or `for_whole_day` also moves the
/// signup to the back.
pub async fn update_signup(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSignupRequest>,
) -> ApiResult<Json<Signup>> {
    validate_request(&req)?;

    let signup = load_signup(&state, id).await?;
    let caller = require_owner_or_orga(&state.db, &auth, signup.pilot_id).await?;

    let signup = selection::update_signup(
        &state.db,
        id,
        UpdateSignup {
            is_certain: req.is_certain,
            for_whole_day: req.for_whole_day,
            comment: req.comment,
        },
        today(),
        caller.is_orga,
    )
    .await?;

    Ok(Json(signup))
}

/// Cancels a signup; the freed place goes to the next waiting pilot
///
/// # Errors
///
/// - `409 Conflict`: The signup is already billed
/// - `422 Unprocessable Entity`: Training in the past (pilots only)
pub async fn cancel_signup(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Signup>> {
    let signup = load_signup(&state, id).await?;
    let caller = require_owner_or_orga(&state.db, &auth, signup.pilot_id).await?;

    let signup = selection::cancel_signup(&state.db, id, today(), caller.is_orga).await?;

    Ok(Json(signup))
}

async fn load_signup(state: &AppState, id: Uuid) -> ApiResult<Signup> {
    Signup::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Signup"))
}
