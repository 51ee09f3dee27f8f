/// Training day endpoints
///
/// # Endpoints
///
/// - `GET /v1/trainings` - Upcoming trainings with signup counts
/// - `POST /v1/trainings` - Create a training (organizers)
/// - `GET /v1/trainings/:id` - Training with its signups
/// - `PUT /v1/trainings/:id` - Update capacity, priority date or info (organizers)
/// - `DELETE /v1/trainings/:id` - Delete a training without report (organizers)
/// - `POST /v1/trainings/:id/select` - Run selection (organizers)

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
    routes::{today, DeletedResponse},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use towclub_shared::{
    auth::{authorization::require_orga, middleware::AuthContext},
    models::{
        report::Report,
        signup::{Signup, SignupWithPilot},
        training::{CreateTraining, Training, TrainingOverview, UpdateTraining},
    },
    selection,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListTrainingsQuery {
    /// First day to list, defaults to today
    pub from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTrainingRequest {
    pub date: NaiveDate,

    #[validate(range(min = 1, max = 100, message = "Capacity must be between 1 and 100"))]
    pub max_pilots: Option<i32>,

    pub priority_date: Option<NaiveDate>,

    #[validate(length(max = 2000, message = "Info must be at most 2000 characters"))]
    #[serde(default)]
    pub info: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTrainingRequest {
    #[validate(range(min = 1, max = 100, message = "Capacity must be between 1 and 100"))]
    pub max_pilots: Option<i32>,

    pub priority_date: Option<NaiveDate>,

    #[validate(length(max = 2000, message = "Info must be at most 2000 characters"))]
    pub info: Option<String>,
}

/// Training together with everyone who signed up
#[derive(Debug, Serialize)]
pub struct TrainingDetail {
    #[serde(flatten)]
    pub training: Training,

    /// Signups in waiting list order
    pub signups: Vec<SignupWithPilot>,

    /// Report of the day, once an organizer opened it
    pub report_id: Option<Uuid>,
}

/// Result of a selection run
#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub training: Training,

    /// Signups promoted from waiting to selected by this run
    pub promoted: Vec<Uuid>,
}

/// Lists trainings from `from` (default today) onwards
pub async fn list_trainings(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ListTrainingsQuery>,
) -> ApiResult<Json<Vec<TrainingOverview>>> {
    let from = query.from.unwrap_or_else(today);
    let trainings = Training::list_upcoming(&state.db, from).await?;
    Ok(Json(trainings))
}

/// Creates a training day
///
/// # Endpoint
///
/// ```text
/// POST /v1/trainings
///
/// {
///   "date": "2026-06-14",
///   "max_pilots": 10,
///   "info": "Meeting point at the winch at 9:00"
/// }
/// ```
///
/// `priority_date` defaults to a few days before `date`.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an organizer
/// - `409 Conflict`: A training already exists on this date
/// - `422 Unprocessable Entity`: Date in the past or invalid capacity
pub async fn create_training(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTrainingRequest>,
) -> ApiResult<Json<Training>> {
    let orga = require_orga(&state.db, &auth).await?;
    validate_request(&req)?;

    if req.date < today() {
        return Err(ApiError::validation(
            "date",
            "Training date must not be in the past",
        ));
    }
    if req.priority_date.is_some_and(|p| p > req.date) {
        return Err(ApiError::validation(
            "priority_date",
            "Priority date must not be after the training",
        ));
    }

    let training = Training::create(
        &state.db,
        CreateTraining {
            date: req.date,
            max_pilots: req.max_pilots,
            priority_date: req.priority_date,
            info: req.info,
        },
    )
    .await?;

    info!(training_id = %training.id, date = %training.date, created_by = %orga.id, "Created training");
    Ok(Json(training))
}

pub async fn get_training(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrainingDetail>> {
    let training = Training::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Training"))?;

    let signups = Signup::list_by_training(&state.db, id).await?;
    let report_id = Report::find_by_training(&state.db, id).await?.map(|r| r.id);

    Ok(Json(TrainingDetail {
        training,
        signups,
        report_id,
    }))
}

/// Updates a training and reruns selection
///
/// Raising the capacity or moving the priority date can promote waiting
/// pilots; selected pilots are never demoted.
pub async fn update_training(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTrainingRequest>,
) -> ApiResult<Json<SelectionResponse>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;

    if let Some(priority_date) = req.priority_date {
        let training = Training::find_by_id(&state.db, id)
            .await?
            .ok_or_else(|| ApiError::not_found("Training"))?;
        if priority_date > training.date {
            return Err(ApiError::validation(
                "priority_date",
                "Priority date must not be after the training",
            ));
        }
    }

    let (training, promoted) = selection::update_training(
        &state.db,
        id,
        UpdateTraining {
            max_pilots: req.max_pilots,
            priority_date: req.priority_date,
            info: req.info,
        },
    )
    .await?;

    Ok(Json(SelectionResponse { training, promoted }))
}

/// Runs selection for a training
pub async fn run_selection(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SelectionResponse>> {
    require_orga(&state.db, &auth).await?;

    let promoted = selection::select_for_training(&state.db, id).await?;
    let training = Training::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Training"))?;

    Ok(Json(SelectionResponse { training, promoted }))
}

/// Deletes a training together with its signups
///
/// # Errors
///
/// - `404 Not Found`: Unknown training
/// - `409 Conflict`: The training already has a report
pub async fn delete_training(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    let orga = require_orga(&state.db, &auth).await?;

    if Report::find_by_training(&state.db, id).await?.is_some() {
        return Err(ApiError::Conflict(
            "Training has a report and cannot be deleted".to_string(),
        ));
    }

    if !Training::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Training"));
    }

    info!(training_id = %id, deleted_by = %orga.id, "Deleted training");
    Ok(Json(DeletedResponse { id, deleted: true }))
}
