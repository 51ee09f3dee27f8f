/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login and token refresh
/// - `pilots`: The caller's profile
/// - `trainings`: Training days and selection
/// - `signups`: Signing up, editing and canceling
/// - `reports`: Day reports and recorded runs
/// - `bills`: Bill preview, settlement and deletion
/// - `purchases`: Equipment, day passes and prepaid flights
/// - `expenses`: Expenses and absorptions of a report

pub mod auth;
pub mod bills;
pub mod expenses;
pub mod health;
pub mod pilots;
pub mod purchases;
pub mod reports;
pub mod signups;
pub mod trainings;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response of delete endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: Uuid,

    pub deleted: bool,
}

/// Current date for past-training checks
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
