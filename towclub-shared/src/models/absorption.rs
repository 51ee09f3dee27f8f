/// Absorption model and database operations
///
/// Cash put into the box outside of a bill, e.g. a donation or a pilot
/// settling an old debt. An absorption may name the signup it came from.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE absorptions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
///     signup_id UUID REFERENCES signups(id) ON DELETE SET NULL,
///     reason VARCHAR(200) NOT NULL,
///     amount INTEGER NOT NULL CHECK (amount >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::report::Report;
use super::signup::Signup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Absorption {
    pub id: Uuid,

    pub report_id: Uuid,

    /// Signup the cash came from, if any
    pub signup_id: Option<Uuid>,

    pub reason: String,

    pub amount: i32,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAbsorption {
    pub signup_id: Option<Uuid>,

    pub reason: String,

    pub amount: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum AbsorptionError {
    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("Signup not found: {0}")]
    SignupNotFound(Uuid),

    #[error("Signup {0} does not belong to this report's training")]
    SignupNotInTraining(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const ABSORPTION_COLUMNS: &str = "id, report_id, signup_id, reason, amount, created_at";

impl Absorption {
    /// Adds an absorption, optionally naming a signup of the report's day
    pub async fn create(
        pool: &PgPool,
        report_id: Uuid,
        data: CreateAbsorption,
    ) -> Result<Self, AbsorptionError> {
        if let Some(signup_id) = data.signup_id {
            let report = Report::find_by_id(pool, report_id)
                .await?
                .ok_or(AbsorptionError::ReportNotFound(report_id))?;
            let signup = Signup::find_by_id(pool, signup_id)
                .await?
                .ok_or(AbsorptionError::SignupNotFound(signup_id))?;
            if signup.training_id != report.training_id {
                return Err(AbsorptionError::SignupNotInTraining(signup_id));
            }
        }

        let query = format!(
            "INSERT INTO absorptions (report_id, signup_id, reason, amount) \
             VALUES ($1, $2, $3, $4) RETURNING {ABSORPTION_COLUMNS}"
        );

        let absorption = sqlx::query_as::<_, Absorption>(&query)
            .bind(report_id)
            .bind(data.signup_id)
            .bind(data.reason)
            .bind(data.amount)
            .fetch_one(pool)
            .await?;

        Ok(absorption)
    }

    pub async fn list_by_report<'e, E>(db: E, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {ABSORPTION_COLUMNS} FROM absorptions WHERE report_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );

        sqlx::query_as::<_, Absorption>(&query)
            .bind(report_id)
            .fetch_all(db)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM absorptions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
