/// Pilot endpoints
///
/// - `GET /v1/pilots/me` returns the caller's profile including roles and
///   the remaining prepaid flights
/// - `PUT /v1/pilots/:id/roles` grants or revokes membership and organizer
///   rights (organizers)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use towclub_shared::{
    auth::{
        authorization::{current_pilot, require_orga},
        middleware::AuthContext,
    },
    models::pilot::Pilot,
};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateRolesRequest {
    pub is_orga: bool,

    pub is_member: bool,
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Pilot>> {
    let pilot = current_pilot(&state.db, &auth).await?;
    Ok(Json(pilot))
}

/// Sets the roles of a pilot
///
/// An organizer cannot revoke their own organizer rights.
pub async fn update_roles(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRolesRequest>,
) -> ApiResult<Json<Pilot>> {
    let orga = require_orga(&state.db, &auth).await?;

    if orga.id == id && !req.is_orga {
        return Err(ApiError::validation(
            "is_orga",
            "Organizers cannot revoke their own organizer rights",
        ));
    }

    let pilot = Pilot::set_roles(&state.db, id, req.is_orga, req.is_member)
        .await?
        .ok_or_else(|| ApiError::not_found("Pilot"))?;

    info!(
        pilot_id = %pilot.id,
        is_orga = pilot.is_orga,
        is_member = pilot.is_member,
        changed_by = %orga.id,
        "Updated pilot roles"
    );
    Ok(Json(pilot))
}
