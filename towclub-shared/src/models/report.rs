/// Report model and database operations
///
/// Each training day has at most one report. It holds the cash box counts at
/// the start and end of the day, free-text remarks and the two organizers
/// who ran the day. Bills, purchases, expenses and absorptions hang off the
/// report; see [`crate::ledger`] for the reconciliation.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE reports (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     training_id UUID NOT NULL UNIQUE REFERENCES trainings(id) ON DELETE CASCADE,
///     cash_at_start INTEGER NOT NULL DEFAULT 0 CHECK (cash_at_start >= 0),
///     cash_at_end INTEGER CHECK (cash_at_end >= 0),
///     remarks TEXT NOT NULL DEFAULT '',
///     orga_1 UUID REFERENCES signups(id) ON DELETE SET NULL,
///     orga_2 UUID REFERENCES signups(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::signup::Signup;
use super::training::Training;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Report {
    pub id: Uuid,

    pub training_id: Uuid,

    /// Cash in the box when the day started
    pub cash_at_start: i32,

    /// Cash counted at the end of the day, once known
    pub cash_at_end: Option<i32>,

    pub remarks: String,

    /// First organizer of the day (a signup of this training)
    pub orga_1: Option<Uuid>,

    /// Second organizer of the day (a signup of this training)
    pub orga_2: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateReport {
    pub training_id: Uuid,

    /// Defaults to the closing cash of the previous report
    pub cash_at_start: Option<i32>,

    #[serde(default)]
    pub remarks: String,
}

/// Full replacement of a report's editable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    pub cash_at_start: i32,

    pub cash_at_end: Option<i32>,

    #[serde(default)]
    pub remarks: String,

    pub orga_1: Option<Uuid>,

    pub orga_2: Option<Uuid>,
}

/// Errors for report operations
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Training not found: {0}")]
    TrainingNotFound(Uuid),

    #[error("Report not found: {0}")]
    NotFound(Uuid),

    /// Organizer slot references a signup of another training (or a
    /// canceled one)
    #[error("Signup {0} is not an active signup of this training")]
    OrgaNotInTraining(Uuid),

    #[error("The same signup can't fill both organizer slots")]
    DuplicateOrga,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const REPORT_COLUMNS: &str =
    "id, training_id, cash_at_start, cash_at_end, remarks, orga_1, orga_2, created_at, updated_at";

impl Report {
    /// Whether `signup_id` is one of the day's designated organizers
    pub fn is_orga_of_day(&self, signup_id: Uuid) -> bool {
        self.orga_1 == Some(signup_id) || self.orga_2 == Some(signup_id)
    }

    /// Checks that both organizer slots reference distinct, active signups
    /// of the training
    pub fn validate_orgas(
        orga_1: Option<Uuid>,
        orga_2: Option<Uuid>,
        training_signups: &[Signup],
    ) -> Result<(), ReportError> {
        if let (Some(a), Some(b)) = (orga_1, orga_2) {
            if a == b {
                return Err(ReportError::DuplicateOrga);
            }
        }

        for orga in [orga_1, orga_2].into_iter().flatten() {
            let valid = training_signups
                .iter()
                .any(|s| s.id == orga && s.status.is_active());
            if !valid {
                return Err(ReportError::OrgaNotInTraining(orga));
            }
        }

        Ok(())
    }

    /// Creates the report of a training day
    ///
    /// # Errors
    ///
    /// Fails with a unique constraint violation (`reports_training_key`) if
    /// the training already has a report.
    pub async fn create(pool: &PgPool, data: CreateReport) -> Result<Self, ReportError> {
        let training = Training::find_by_id(pool, data.training_id)
            .await?
            .ok_or(ReportError::TrainingNotFound(data.training_id))?;

        let cash_at_start = match data.cash_at_start {
            Some(cash) => cash,
            None => Self::previous_cash_at_end(pool, training.date)
                .await?
                .unwrap_or(0),
        };

        let query = format!(
            "INSERT INTO reports (training_id, cash_at_start, remarks) \
             VALUES ($1, $2, $3) RETURNING {REPORT_COLUMNS}"
        );
        let report = sqlx::query_as::<_, Report>(&query)
            .bind(training.id)
            .bind(cash_at_start)
            .bind(data.remarks)
            .fetch_one(pool)
            .await?;

        info!(report_id = %report.id, date = %training.date, cash_at_start, "Created report");
        Ok(report)
    }

    /// Closing cash of the latest report before `date`, if any was counted
    pub async fn previous_cash_at_end(
        pool: &PgPool,
        date: NaiveDate,
    ) -> Result<Option<i32>, sqlx::Error> {
        let cash: Option<Option<i32>> = sqlx::query_scalar(
            r#"
            SELECT r.cash_at_end
            FROM reports r
            JOIN trainings t ON t.id = r.training_id
            WHERE t.date < $1
            ORDER BY t.date DESC
            LIMIT 1
            "#,
        )
        .bind(date)
        .fetch_optional(pool)
        .await?;

        debug!(%date, previous = ?cash, "Looked up previous closing cash");
        Ok(cash.flatten())
    }

    /// Finds a report by ID
    pub async fn find_by_id<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");

        sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Finds the report of a training day
    pub async fn find_by_training(
        pool: &PgPool,
        training_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE training_id = $1");

        sqlx::query_as::<_, Report>(&query)
            .bind(training_id)
            .fetch_optional(pool)
            .await
    }

    /// Replaces cash counts, remarks and organizers
    ///
    /// # Errors
    ///
    /// - `ReportError::DuplicateOrga` if both slots name the same signup
    /// - `ReportError::OrgaNotInTraining` if a slot names a signup of another
    ///   training day
    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateReport) -> Result<Self, ReportError> {
        let mut tx = pool.begin().await?;

        let report = Self::find_by_id(&mut *tx, id)
            .await?
            .ok_or(ReportError::NotFound(id))?;

        let signups: Vec<Signup> = Signup::list_by_training(&mut *tx, report.training_id)
            .await?
            .into_iter()
            .map(|s| s.signup)
            .collect();
        Self::validate_orgas(data.orga_1, data.orga_2, &signups)?;

        let query = format!(
            "UPDATE reports SET cash_at_start = $2, cash_at_end = $3, remarks = $4, \
                 orga_1 = $5, orga_2 = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {REPORT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .bind(data.cash_at_start)
            .bind(data.cash_at_end)
            .bind(data.remarks)
            .bind(data.orga_1)
            .bind(data.orga_2)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(report_id = %id, cash_at_end = ?updated.cash_at_end, "Updated report");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signup::SignupStatus;

    fn signup(status: SignupStatus) -> Signup {
        let now = Utc::now();
        Signup {
            id: Uuid::new_v4(),
            training_id: Uuid::new_v4(),
            pilot_id: Uuid::new_v4(),
            status,
            is_certain: true,
            for_whole_day: true,
            signed_up_on: now,
            comment: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_validate_orgas_accepts_empty_slots() {
        assert!(Report::validate_orgas(None, None, &[]).is_ok());
    }

    #[test]
    fn test_validate_orgas_accepts_signups_of_training() {
        let a = signup(SignupStatus::Selected);
        let b = signup(SignupStatus::Waiting);
        let signups = vec![a.clone(), b.clone()];

        assert!(Report::validate_orgas(Some(a.id), Some(b.id), &signups).is_ok());
        assert!(Report::validate_orgas(None, Some(b.id), &signups).is_ok());
    }

    #[test]
    fn test_validate_orgas_rejects_foreign_signup() {
        let a = signup(SignupStatus::Selected);
        let foreign = Uuid::new_v4();

        let err = Report::validate_orgas(Some(a.id), Some(foreign), &[a]).unwrap_err();
        assert!(matches!(err, ReportError::OrgaNotInTraining(id) if id == foreign));
    }

    #[test]
    fn test_validate_orgas_rejects_canceled_signup() {
        let canceled = signup(SignupStatus::Canceled);

        let err = Report::validate_orgas(Some(canceled.id), None, &[canceled.clone()]).unwrap_err();
        assert!(matches!(err, ReportError::OrgaNotInTraining(_)));
    }

    #[test]
    fn test_validate_orgas_rejects_same_signup_twice() {
        let a = signup(SignupStatus::Selected);

        let err = Report::validate_orgas(Some(a.id), Some(a.id), &[a]).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateOrga));
    }

    #[test]
    fn test_is_orga_of_day() {
        let orga = Uuid::new_v4();
        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            training_id: Uuid::new_v4(),
            cash_at_start: 100,
            cash_at_end: None,
            remarks: String::new(),
            orga_1: None,
            orga_2: Some(orga),
            created_at: now,
            updated_at: now,
        };

        assert!(report.is_orga_of_day(orga));
        assert!(!report.is_orga_of_day(Uuid::new_v4()));
    }
}
