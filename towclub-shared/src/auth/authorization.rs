/// Permission checks for organizers and signup owners
///
/// Pilots manage their own signups; organizers (`is_orga`) manage training
/// days, reports and everyone's signups. The role is read from the database
/// on every check, so revoking it takes effect immediately.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::pilot::Pilot;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The token names a pilot that no longer exists
    #[error("Unknown pilot {0}")]
    UnknownPilot(Uuid),

    #[error("Organizer role required")]
    NotOrga,

    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Loads the calling pilot
pub async fn current_pilot(pool: &PgPool, auth: &AuthContext) -> Result<Pilot, AuthzError> {
    Pilot::find_by_id(pool, auth.pilot_id)
        .await?
        .ok_or(AuthzError::UnknownPilot(auth.pilot_id))
}

/// Fails unless the caller holds the organizer role
pub async fn require_orga(pool: &PgPool, auth: &AuthContext) -> Result<Pilot, AuthzError> {
    let pilot = current_pilot(pool, auth).await?;

    if !pilot.is_orga {
        warn!(pilot_id = %pilot.id, "Organizer action denied");
        return Err(AuthzError::NotOrga);
    }

    Ok(pilot)
}

/// Fails unless the caller owns the resource or is an organizer
///
/// Returns the caller so handlers can tell which of the two applied.
pub async fn require_owner_or_orga(
    pool: &PgPool,
    auth: &AuthContext,
    owner_id: Uuid,
) -> Result<Pilot, AuthzError> {
    let pilot = current_pilot(pool, auth).await?;
    check_owner_or_orga(&pilot, owner_id)?;
    Ok(pilot)
}

pub fn check_owner_or_orga(pilot: &Pilot, owner_id: Uuid) -> Result<(), AuthzError> {
    if pilot.id == owner_id || pilot.is_orga {
        Ok(())
    } else {
        Err(AuthzError::NotAuthorized)
    }
}
