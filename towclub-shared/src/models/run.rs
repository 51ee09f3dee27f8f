/// Run model and database operations
///
/// One run is one unit of what a pilot did during a rotation of the training
/// day: a flight, a ride with the bus or the boat, or a break. Runs are
/// recorded a rotation at a time for all selected, unbilled participants.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE run_kind AS ENUM ('flight', 'bus', 'boat', 'break');
///
/// CREATE TABLE runs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     signup_id UUID NOT NULL REFERENCES signups(id) ON DELETE CASCADE,
///     kind run_kind NOT NULL,
///     created_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::bill::Bill;
use super::signup::Signup;
use super::training::Training;

/// What a pilot did in one rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Flight,
    Bus,
    Boat,
    Break,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Flight => "flight",
            RunKind::Bus => "bus",
            RunKind::Boat => "boat",
            RunKind::Break => "break",
        }
    }

    /// Bus and boat rides are billed as services
    pub fn is_service(&self) -> bool {
        matches!(self, RunKind::Bus | RunKind::Boat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Run {
    pub id: Uuid,

    pub signup_id: Uuid,

    pub kind: RunKind,

    pub created_on: DateTime<Utc>,
}

/// One participant's entry in a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub signup_id: Uuid,

    pub kind: RunKind,
}

/// Errors when recording a rotation
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Training not found: {0}")]
    TrainingNotFound(Uuid),

    /// The set of participants changed since the form was loaded
    #[error("Participants changed: expected {expected}, found {actual}")]
    ParticipantsChanged { expected: usize, actual: usize },

    /// A run was submitted for a signup that already has a bill
    #[error("Signup {0} is already billed")]
    AlreadyBilled(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const RUN_COLUMNS: &str = "id, signup_id, kind, created_on";

impl Run {
    /// Records one rotation for every selected, unbilled participant
    ///
    /// `participant_count` and the submitted signup ids must match the
    /// current participants exactly. A billed signup can't acquire new runs.
    ///
    /// # Errors
    ///
    /// - `RunError::AlreadyBilled` if an entry names a billed signup
    /// - `RunError::ParticipantsChanged` if participants were added, removed
    ///   or billed since the caller loaded them
    pub async fn record_rotation(
        pool: &PgPool,
        training_id: Uuid,
        participant_count: usize,
        entries: &[RunEntry],
    ) -> Result<Vec<Run>, RunError> {
        let mut tx = pool.begin().await?;

        Training::lock(&mut *tx, training_id)
            .await?
            .ok_or(RunError::TrainingNotFound(training_id))?;

        let participants = Signup::list_unbilled_selected(&mut *tx, training_id).await?;
        let current: BTreeSet<Uuid> = participants.iter().map(|s| s.id).collect();
        let submitted: BTreeSet<Uuid> = entries.iter().map(|e| e.signup_id).collect();

        for entry in entries {
            if !current.contains(&entry.signup_id)
                && Bill::exists_for_signup(&mut *tx, entry.signup_id).await?
            {
                warn!(signup_id = %entry.signup_id, "Rejected run for billed signup");
                return Err(RunError::AlreadyBilled(entry.signup_id));
            }
        }

        if current.len() != participant_count
            || submitted.len() != entries.len()
            || current != submitted
        {
            warn!(
                %training_id,
                expected = participant_count,
                actual = current.len(),
                "Rotation rejected, participants changed"
            );
            return Err(RunError::ParticipantsChanged {
                expected: participant_count,
                actual: current.len(),
            });
        }

        let query = format!(
            "INSERT INTO runs (signup_id, kind) VALUES ($1, $2) RETURNING {RUN_COLUMNS}"
        );
        let mut runs = Vec::with_capacity(entries.len());
        for entry in entries {
            let run = sqlx::query_as::<_, Run>(&query)
                .bind(entry.signup_id)
                .bind(entry.kind)
                .fetch_one(&mut *tx)
                .await?;
            runs.push(run);
        }

        tx.commit().await?;

        info!(%training_id, runs = runs.len(), "Recorded rotation");
        Ok(runs)
    }

    /// Lists a signup's runs in the order they were recorded
    pub async fn list_by_signup<'e, E>(db: E, signup_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE signup_id = $1 ORDER BY created_on ASC, id ASC"
        );

        sqlx::query_as::<_, Run>(&query)
            .bind(signup_id)
            .fetch_all(db)
            .await
    }

    /// Lists all runs of a training day
    pub async fn list_by_training<'e, E>(
        db: E,
        training_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Run>(
            r#"
            SELECT r.id, r.signup_id, r.kind, r.created_on
            FROM runs r
            JOIN signups s ON s.id = r.signup_id
            WHERE s.training_id = $1
            ORDER BY r.created_on ASC, r.id ASC
            "#,
        )
        .bind(training_id)
        .fetch_all(db)
        .await
    }

    /// Counts a pilot's flights on training days in `[from, to]`
    pub async fn count_flights_between<'e, E>(
        db: E,
        pilot_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM runs r
            JOIN signups s ON s.id = r.signup_id
            JOIN trainings t ON t.id = s.training_id
            WHERE s.pilot_id = $1
              AND r.kind = 'flight'
              AND t.date BETWEEN $2 AND $3
            "#,
        )
        .bind(pilot_id)
        .bind(from)
        .bind(to)
        .fetch_one(db)
        .await
    }
}
