/// Report endpoints
///
/// A report is the organizers' record of a training day: cash counts,
/// organizers of the day, runs, bills, expenses and absorptions. All
/// endpoints require the organizer role.
///
/// # Endpoints
///
/// - `POST /v1/trainings/:id/report` - Open the report of a training
/// - `GET /v1/reports/:id` - Report with records and ledger
/// - `PUT /v1/reports/:id` - Update cash, remarks and organizers
/// - `POST /v1/reports/:id/runs` - Record one rotation

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use towclub_shared::{
    auth::{authorization::require_orga, middleware::AuthContext},
    ledger::ReportSummary,
    models::{
        report::{CreateReport, Report, UpdateReport},
        run::{Run, RunEntry},
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    /// Defaults to the closing cash of the previous report
    #[validate(range(min = 0, max = 1000000, message = "Cash must be between 0 and 1000000"))]
    pub cash_at_start: Option<i32>,

    #[validate(length(max = 2000, message = "Remarks must be at most 2000 characters"))]
    #[serde(default)]
    pub remarks: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReportRequest {
    #[validate(range(min = 0, max = 1000000, message = "Cash must be between 0 and 1000000"))]
    pub cash_at_start: i32,

    #[validate(range(min = 0, max = 1000000, message = "Cash must be between 0 and 1000000"))]
    pub cash_at_end: Option<i32>,

    #[validate(length(max = 2000, message = "Remarks must be at most 2000 characters"))]
    #[serde(default)]
    pub remarks: String,

    /// Signup of the first organizer of the day
    pub orga_1: Option<Uuid>,

    pub orga_2: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordRunsRequest {
    /// Number of participants the form was built for
    pub participant_count: usize,

    #[validate(length(min = 1, message = "At least one run is required"))]
    pub runs: Vec<RunEntry>,
}

/// Opens the report of a training day
///
/// # Errors
///
/// - `404 Not Found`: Training not found
/// - `409 Conflict`: The training already has a report
pub async fn create_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(training_id): Path<Uuid>,
    Json(req): Json<CreateReportRequest>,
) -> ApiResult<Json<ReportSummary>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;

    let report = Report::create(
        &state.db,
        CreateReport {
            training_id,
            cash_at_start: req.cash_at_start,
            remarks: req.remarks,
        },
    )
    .await?;

    load_summary(&state, report.id).await.map(Json)
}

/// Report with bills, purchases, expenses, absorptions and the computed ledger
///
/// # Response
///
/// ```json
/// {
///   "id": "uuid",
///   "training_id": "uuid",
///   "cash_at_start": 120,
///   "cash_at_end": 212,
///   "bills": [...],
///   "purchases": [...],
///   "expenses": [...],
///   "absorptions": [...],
///   "ledger": {
///     "revenue": 104,
///     "expected_cash_at_end": 212,
///     "difference": 0,
///     ...
///   }
/// }
/// ```
pub async fn get_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ReportSummary>> {
    require_orga(&state.db, &auth).await?;

    load_summary(&state, id).await.map(Json)
}

/// Replaces cash counts, remarks and organizers of the day
///
/// Organizers must be distinct, active signups of the report's training.
pub async fn update_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReportRequest>,
) -> ApiResult<Json<ReportSummary>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;

    Report::update(
        &state.db,
        id,
        UpdateReport {
            cash_at_start: req.cash_at_start,
            cash_at_end: req.cash_at_end,
            remarks: req.remarks,
            orga_1: req.orga_1,
            orga_2: req.orga_2,
        },
    )
    .await?;

    load_summary(&state, id).await.map(Json)
}

/// Records one rotation: a run for every selected, unbilled participant
///
/// # Endpoint
///
/// ```text
/// POST /v1/reports/:id/runs
///
/// {
///   "participant_count": 2,
///   "runs": [
///     { "signup_id": "uuid", "kind": "flight" },
///     { "signup_id": "uuid", "kind": "bus" }
///   ]
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: A listed signup is already billed
/// - `422 Unprocessable Entity`: Participants changed since the form was loaded
pub async fn record_runs(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordRunsRequest>,
) -> ApiResult<Json<Vec<Run>>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;

    let report = Report::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Report"))?;

    let runs =
        Run::record_rotation(&state.db, report.training_id, req.participant_count, &req.runs)
            .await?;

    Ok(Json(runs))
}

async fn load_summary(state: &AppState, id: Uuid) -> ApiResult<ReportSummary> {
    ReportSummary::load(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Report"))
}
