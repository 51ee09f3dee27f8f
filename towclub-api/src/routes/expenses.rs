/// Expense and absorption endpoints
///
/// Expenses are cash paid out during the day (fuel, rope repairs).
/// Absorptions are cash taken in outside of bills, such as a donation or a
/// pilot settling an old debt. Both feed the report's ledger.
///
/// - `POST /v1/reports/:id/expenses`, `DELETE /v1/expenses/:id`
/// - `POST /v1/reports/:id/absorptions`, `DELETE /v1/absorptions/:id`

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
    routes::DeletedResponse,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use towclub_shared::{
    auth::{authorization::require_orga, middleware::AuthContext},
    models::{
        absorption::{Absorption, CreateAbsorption},
        expense::{CreateExpense, Expense},
        report::Report,
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    #[validate(length(min = 1, max = 200, message = "Reason must be 1-200 characters"))]
    pub reason: String,

    #[validate(range(min = 0, max = 100000, message = "Amount must be between 0 and 100000"))]
    pub amount: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAbsorptionRequest {
    /// Signup the cash came from, if any
    pub signup_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200, message = "Reason must be 1-200 characters"))]
    pub reason: String,

    #[validate(range(min = 0, max = 100000, message = "Amount must be between 0 and 100000"))]
    pub amount: i32,
}

pub async fn create_expense(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(report_id): Path<Uuid>,
    Json(req): Json<CreateExpenseRequest>,
) -> ApiResult<Json<Expense>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;
    ensure_report(&state, report_id).await?;

    let expense = Expense::create(
        &state.db,
        report_id,
        CreateExpense {
            reason: req.reason,
            amount: req.amount,
        },
    )
    .await?;

    Ok(Json(expense))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    require_orga(&state.db, &auth).await?;

    if !Expense::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Expense"));
    }

    Ok(Json(DeletedResponse { id, deleted: true }))
}

pub async fn create_absorption(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(report_id): Path<Uuid>,
    Json(req): Json<CreateAbsorptionRequest>,
) -> ApiResult<Json<Absorption>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;
    ensure_report(&state, report_id).await?;

    let absorption = Absorption::create(
        &state.db,
        report_id,
        CreateAbsorption {
            signup_id: req.signup_id,
            reason: req.reason,
            amount: req.amount,
        },
    )
    .await?;

    Ok(Json(absorption))
}

pub async fn delete_absorption(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    require_orga(&state.db, &auth).await?;

    if !Absorption::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Absorption"));
    }

    Ok(Json(DeletedResponse { id, deleted: true }))
}

async fn ensure_report(state: &AppState, report_id: Uuid) -> ApiResult<()> {
    Report::find_by_id(&state.db, report_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Report"))
}
