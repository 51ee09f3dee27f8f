/// Signup model and database operations
///
/// A signup is a pilot's registration for one training day and, once the day
/// has happened, the anchor for everything recorded about that pilot: runs,
/// purchases and the bill.
///
/// # State Machine
///
/// ```text
/// waiting → selected
/// waiting → canceled
/// selected → canceled
/// canceled → waiting      (re-signup)
/// ```
///
/// Selected signups are never demoted back to waiting.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE signup_status AS ENUM ('waiting', 'selected', 'canceled');
///
/// CREATE TABLE signups (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     training_id UUID NOT NULL REFERENCES trainings(id) ON DELETE CASCADE,
///     pilot_id UUID NOT NULL REFERENCES pilots(id) ON DELETE CASCADE,
///     status signup_status NOT NULL DEFAULT 'waiting',
///     is_certain BOOLEAN NOT NULL DEFAULT TRUE,
///     for_whole_day BOOLEAN NOT NULL DEFAULT TRUE,
///     signed_up_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     comment TEXT NOT NULL DEFAULT '',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (training_id, pilot_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Signup status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "signup_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SignupStatus {
    /// On the waiting list
    Waiting,

    /// Selected to participate
    Selected,

    /// Withdrawn by the pilot or an organizer
    Canceled,
}

impl SignupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignupStatus::Waiting => "waiting",
            SignupStatus::Selected => "selected",
            SignupStatus::Canceled => "canceled",
        }
    }

    /// Waiting or selected
    pub fn is_active(&self) -> bool {
        !matches!(self, SignupStatus::Canceled)
    }

    /// Checks if transition to target status is valid
    pub fn can_transition_to(&self, target: SignupStatus) -> bool {
        matches!(
            (self, target),
            (SignupStatus::Waiting, SignupStatus::Selected)
                | (SignupStatus::Waiting, SignupStatus::Canceled)
                | (SignupStatus::Selected, SignupStatus::Canceled)
                | (SignupStatus::Canceled, SignupStatus::Waiting)
        )
    }
}

/// A pilot's registration for a training day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signup {
    pub id: Uuid,

    pub training_id: Uuid,

    pub pilot_id: Uuid,

    pub status: SignupStatus,

    /// The pilot will definitely come
    pub is_certain: bool,

    /// The pilot stays for the whole day
    pub for_whole_day: bool,

    /// Position in the waiting list; reset by edits that weaken the signup
    pub signed_up_on: DateTime<Utc>,

    pub comment: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Signup together with the pilot fields needed to display and select it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SignupWithPilot {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub signup: Signup,

    pub first_name: String,

    pub last_name: String,

    pub is_orga: bool,

    pub is_member: bool,
}

/// Input for creating a signup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSignup {
    pub training_id: Uuid,

    pub pilot_id: Uuid,

    pub is_certain: bool,

    pub for_whole_day: bool,

    pub comment: String,
}

/// Changes to an existing signup; None leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSignup {
    pub is_certain: Option<bool>,

    pub for_whole_day: Option<bool>,

    pub comment: Option<String>,
}

impl UpdateSignup {
    /// Whether applying these changes moves the signup to the back of the
    /// waiting list
    pub fn resets_position(&self, current: &Signup) -> bool {
        self.is_certain.is_some_and(|v| v != current.is_certain)
            || self.for_whole_day.is_some_and(|v| v != current.for_whole_day)
    }
}

const SIGNUP_COLUMNS: &str = "id, training_id, pilot_id, status, is_certain, for_whole_day, \
     signed_up_on, comment, created_at, updated_at";

impl Signup {
    /// Priority requires a certain, whole-day signup made before `cutoff`
    pub fn has_priority(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_certain && self.for_whole_day && self.signed_up_on < cutoff
    }

    /// Creates a waiting signup
    ///
    /// # Errors
    ///
    /// Fails with a unique constraint violation
    /// (`signups_training_pilot_key`) if the pilot already signed up.
    pub async fn create<'e, E>(db: E, data: CreateSignup) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO signups (training_id, pilot_id, is_certain, for_whole_day, comment) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SIGNUP_COLUMNS}"
        );

        sqlx::query_as::<_, Signup>(&query)
            .bind(data.training_id)
            .bind(data.pilot_id)
            .bind(data.is_certain)
            .bind(data.for_whole_day)
            .bind(data.comment)
            .fetch_one(db)
            .await
    }

    /// Finds a signup by ID
    pub async fn find_by_id<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {SIGNUP_COLUMNS} FROM signups WHERE id = $1");

        sqlx::query_as::<_, Signup>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Finds a pilot's signup for a training
    pub async fn find_by_training_and_pilot<'e, E>(
        db: E,
        training_id: Uuid,
        pilot_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {SIGNUP_COLUMNS} FROM signups WHERE training_id = $1 AND pilot_id = $2"
        );

        sqlx::query_as::<_, Signup>(&query)
            .bind(training_id)
            .bind(pilot_id)
            .fetch_optional(db)
            .await
    }

    /// Lists all signups of a training with pilot details, oldest first
    pub async fn list_by_training<'e, E>(
        db: E,
        training_id: Uuid,
    ) -> Result<Vec<SignupWithPilot>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SignupWithPilot>(
            r#"
            SELECT s.id, s.training_id, s.pilot_id, s.status, s.is_certain,
                   s.for_whole_day, s.signed_up_on, s.comment, s.created_at,
                   s.updated_at, p.first_name, p.last_name, p.is_orga, p.is_member
            FROM signups s
            JOIN pilots p ON p.id = s.pilot_id
            WHERE s.training_id = $1
            ORDER BY s.signed_up_on ASC, s.id ASC
            "#,
        )
        .bind(training_id)
        .fetch_all(db)
        .await
    }

    /// Lists selected signups of a training that don't have a bill yet
    ///
    /// These are the participants who can still get runs recorded.
    pub async fn list_unbilled_selected<'e, E>(
        db: E,
        training_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {SIGNUP_COLUMNS} FROM signups s \
             WHERE s.training_id = $1 AND s.status = 'selected' \
             AND NOT EXISTS (SELECT 1 FROM bills b WHERE b.signup_id = s.id) \
             ORDER BY s.signed_up_on ASC, s.id ASC"
        );

        sqlx::query_as::<_, Signup>(&query)
            .bind(training_id)
            .fetch_all(db)
            .await
    }

    /// Sets the status, optionally moving the signup to the back of the list
    pub async fn set_status<'e, E>(
        db: E,
        id: Uuid,
        status: SignupStatus,
        reset_position: bool,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE signups SET status = $2, \
                 signed_up_on = CASE WHEN $3 THEN NOW() ELSE signed_up_on END, \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {SIGNUP_COLUMNS}"
        );

        sqlx::query_as::<_, Signup>(&query)
            .bind(id)
            .bind(status)
            .bind(reset_position)
            .fetch_optional(db)
            .await
    }

    /// Promotes waiting signups to selected in one statement
    pub async fn select_many<'e, E>(db: E, ids: &[Uuid]) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE signups SET status = 'selected', updated_at = NOW() \
             WHERE id = ANY($1) AND status = 'waiting'",
        )
        .bind(ids)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Applies flag and comment changes
    ///
    /// When `reset_position` is true the signup moves to the back of the
    /// waiting list.
    pub async fn update<'e, E>(
        db: E,
        id: Uuid,
        data: UpdateSignup,
        reset_position: bool,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE signups SET \
                 is_certain = COALESCE($2, is_certain), \
                 for_whole_day = COALESCE($3, for_whole_day), \
                 comment = COALESCE($4, comment), \
                 signed_up_on = CASE WHEN $5 THEN NOW() ELSE signed_up_on END, \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {SIGNUP_COLUMNS}"
        );

        sqlx::query_as::<_, Signup>(&query)
            .bind(id)
            .bind(data.is_certain)
            .bind(data.for_whole_day)
            .bind(data.comment)
            .bind(reset_position)
            .fetch_optional(db)
            .await
    }
}
