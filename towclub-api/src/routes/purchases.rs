/// Purchase endpoints
///
/// - `POST /v1/reports/:id/purchases` - Add a purchase to a signup
/// - `DELETE /v1/purchases/:id` - Remove a purchase
///
/// Buying prepaid flights credits the pilot's balance right away; deleting
/// that purchase takes them back.

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
    models::purchase::{CreatePurchase, Purchase, PurchaseItem},
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseRequest {
    pub signup_id: Uuid,

    pub item: PurchaseItem,

    #[validate(length(max = 200, message = "Description must be at most 200 characters"))]
    #[serde(default)]
    pub description: String,

    #[validate(range(min = 0, max = 100000, message = "Price must be between 0 and 100000"))]
    pub price: i32,

    /// Flights in a prepaid bundle; ignored for other items
    #[validate(range(min = 0, max = 1000, message = "Quantity must be between 0 and 1000"))]
    #[serde(default)]
    pub quantity: i32,
}

pub async fn create_purchase(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(report_id): Path<Uuid>,
    Json(req): Json<CreatePurchaseRequest>,
) -> ApiResult<Json<Purchase>> {
    require_orga(&state.db, &auth).await?;
    validate_request(&req)?;

    if req.item == PurchaseItem::PrepaidFlights && req.quantity == 0 {
        return Err(ApiError::validation(
            "quantity",
            "A prepaid bundle needs at least one flight",
        ));
    }

    let purchase = Purchase::create(
        &state.db,
        report_id,
        CreatePurchase {
            signup_id: req.signup_id,
            item: req.item,
            description: req.description,
            price: req.price,
            quantity: req.quantity,
        },
    )
    .await?;

    Ok(Json(purchase))
}

/// Removes a purchase of an unbilled signup
///
/// # Errors
///
/// - `409 Conflict`: The signup is already billed
/// - `422 Unprocessable Entity`: The bundle's flights were already used
pub async fn delete_purchase(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    require_orga(&state.db, &auth).await?;

    Purchase::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Purchase"))?;

    Ok(Json(DeletedResponse { id, deleted: true }))
}
