/// Bill endpoints
///
/// # Endpoints
///
/// - `GET /v1/reports/:id/signups/:signup_id/bill` - Preview a bill
/// - `POST /v1/reports/:id/bills` - Settle a signup
/// - `DELETE /v1/bills/:id` - Delete a bill and give back prepaid flights

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::DeletedResponse,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use towclub_shared::{
    auth::{authorization::require_orga, middleware::AuthContext},
    billing::{self, BillPreview},
    models::bill::{Bill, PaymentMethod},
};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub signup_id: Uuid,

    /// "cash", "bank" or "card"
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CreateBillResponse {
    pub bill: Bill,

    /// Breakdown the amount was computed from
    pub preview: BillPreview,
}

/// Computes what a signup would be billed, without storing anything
///
/// # Response
///
/// ```json
/// {
///   "signup_id": "uuid",
///   "pilot_id": "uuid",
///   "breakdown": {
///     "flights": 4,
///     "prepaid_used": 1,
///     "charged_flights": 3,
///     "services": 2,
///     "charged_services": 1,
///     "amount": 30,
///     ...
///   },
///   "day_pass_added": false,
///   "purchases": []
/// }
/// ```
pub async fn preview_bill(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((report_id, signup_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<BillPreview>> {
    require_orga(&state.db, &auth).await?;

    let preview = billing::preview(&state.db, report_id, signup_id, state.prices()).await?;
    Ok(Json(preview))
}

/// Settles a signup
///
/// # Errors
///
/// - `409 Conflict`: The signup is already billed
/// - `422 Unprocessable Entity`: Signup not selected or of another training
pub async fn create_bill(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(report_id): Path<Uuid>,
    Json(req): Json<CreateBillRequest>,
) -> ApiResult<Json<CreateBillResponse>> {
    require_orga(&state.db, &auth).await?;

    let (bill, preview) =
        billing::settle(&state.db, report_id, req.signup_id, req.method, state.prices()).await?;

    Ok(Json(CreateBillResponse { bill, preview }))
}

/// Deletes a bill; the consumed prepaid flights are credited back
pub async fn delete_bill(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    require_orga(&state.db, &auth).await?;

    Bill::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Bill"))?;

    Ok(Json(DeletedResponse { id, deleted: true }))
}
