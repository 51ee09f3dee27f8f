/// Training model and database operations
///
/// A training is one club day on a given calendar date. `max_pilots` caps the
/// number of selected signups; signups made before `priority_date` by pilots
/// who commit to the whole day are promoted first.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE trainings (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     date DATE NOT NULL UNIQUE,
///     max_pilots INTEGER NOT NULL DEFAULT 10 CHECK (max_pilots >= 0),
///     priority_date DATE NOT NULL,
///     info TEXT NOT NULL DEFAULT '',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Default capacity of a training day
pub const DEFAULT_MAX_PILOTS: i32 = 10;

/// Days before the training at which priority signups close
pub const DEFAULT_PRIORITY_DAYS: u64 = 7;

/// Training day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Training {
    pub id: Uuid,

    /// Calendar date, unique across trainings
    pub date: NaiveDate,

    /// Capacity for selected signups
    pub max_pilots: i32,

    /// Signups made before this date (00:00 UTC) may get priority
    pub priority_date: NaiveDate,

    /// Free-text information for participants
    pub info: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Training day with its signup counts
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrainingOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub training: Training,

    pub selected_count: i64,

    pub waiting_count: i64,
}

/// Input for creating a training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTraining {
    pub date: NaiveDate,

    /// Defaults to [`DEFAULT_MAX_PILOTS`]
    pub max_pilots: Option<i32>,

    /// Defaults to [`DEFAULT_PRIORITY_DAYS`] before `date`
    pub priority_date: Option<NaiveDate>,

    #[serde(default)]
    pub info: String,
}

/// Input for updating a training; None leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTraining {
    pub max_pilots: Option<i32>,

    pub priority_date: Option<NaiveDate>,

    pub info: Option<String>,
}

const TRAINING_COLUMNS: &str =
    "id, date, max_pilots, priority_date, info, created_at, updated_at";

impl Training {
    /// Priority cutoff used for the default `priority_date`
    pub fn default_priority_date(date: NaiveDate) -> NaiveDate {
        date.checked_sub_days(Days::new(DEFAULT_PRIORITY_DAYS))
            .unwrap_or(date)
    }

    /// Instant before which a signup must be made to count as priority
    pub fn priority_cutoff(&self) -> DateTime<Utc> {
        self.priority_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Whether the training day is over relative to `today`
    pub fn is_in_past(&self, today: NaiveDate) -> bool {
        self.date < today
    }

    /// Capacity as a count; negative values never come out of the database
    pub fn capacity(&self) -> usize {
        usize::try_from(self.max_pilots).unwrap_or(0)
    }

    /// Creates a training
    ///
    /// # Errors
    ///
    /// Fails with a unique constraint violation (`trainings_date_key`) if a
    /// training already exists on that date.
    pub async fn create(pool: &PgPool, data: CreateTraining) -> Result<Self, sqlx::Error> {
        let priority_date = data
            .priority_date
            .unwrap_or_else(|| Self::default_priority_date(data.date));

        let query = format!(
            "INSERT INTO trainings (date, max_pilots, priority_date, info) \
             VALUES ($1, $2, $3, $4) RETURNING {TRAINING_COLUMNS}"
        );

        sqlx::query_as::<_, Training>(&query)
            .bind(data.date)
            .bind(data.max_pilots.unwrap_or(DEFAULT_MAX_PILOTS))
            .bind(priority_date)
            .bind(data.info)
            .fetch_one(pool)
            .await
    }

    /// Finds a training by ID
    pub async fn find_by_id<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {TRAINING_COLUMNS} FROM trainings WHERE id = $1");

        sqlx::query_as::<_, Training>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Finds a training by ID and locks it until the transaction ends
    ///
    /// Every operation that changes which signups are selected takes this lock
    /// first, so selection for one training day is serialized.
    pub async fn lock<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {TRAINING_COLUMNS} FROM trainings WHERE id = $1 FOR UPDATE");

        sqlx::query_as::<_, Training>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Lists trainings from `from` onwards with their signup counts
    pub async fn list_upcoming(
        pool: &PgPool,
        from: NaiveDate,
    ) -> Result<Vec<TrainingOverview>, sqlx::Error> {
        sqlx::query_as::<_, TrainingOverview>(
            r#"
            SELECT t.id, t.date, t.max_pilots, t.priority_date, t.info,
                   t.created_at, t.updated_at,
                   COUNT(s.id) FILTER (WHERE s.status = 'selected') AS selected_count,
                   COUNT(s.id) FILTER (WHERE s.status = 'waiting') AS waiting_count
            FROM trainings t
            LEFT JOIN signups s ON s.training_id = t.id
            WHERE t.date >= $1
            GROUP BY t.id
            ORDER BY t.date ASC
            "#,
        )
        .bind(from)
        .fetch_all(pool)
        .await
    }

    /// Updates capacity, priority date or info
    pub async fn update<'e, E>(
        db: E,
        id: Uuid,
        data: UpdateTraining,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE trainings SET \
                 max_pilots = COALESCE($2, max_pilots), \
                 priority_date = COALESCE($3, priority_date), \
                 info = COALESCE($4, info), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {TRAINING_COLUMNS}"
        );

        sqlx::query_as::<_, Training>(&query)
            .bind(id)
            .bind(data.max_pilots)
            .bind(data.priority_date)
            .bind(data.info)
            .fetch_optional(db)
            .await
    }

    /// Deletes a training together with its signups
    ///
    /// The schema would cascade to a report too; callers refuse to delete
    /// trainings that already have one.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM trainings WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn training(date: NaiveDate, priority_date: NaiveDate) -> Training {
        Training {
            id: Uuid::new_v4(),
            date,
            max_pilots: DEFAULT_MAX_PILOTS,
            priority_date,
            info: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_priority_date_is_a_week_before() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert_eq!(
            Training::default_priority_date(date),
            NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()
        );
    }

    #[test]
    fn test_priority_cutoff_is_midnight_utc() {
        let t = training(
            NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 7).unwrap(),
        );
        assert_eq!(
            t.priority_cutoff(),
            Utc.with_ymd_and_hms(2025, 6, 7, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_is_in_past() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let t = training(date, Training::default_priority_date(date));

        assert!(!t.is_in_past(date));
        assert!(t.is_in_past(date.succ_opt().unwrap()));
    }

    #[test]
    fn test_capacity_clamps_negative() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let mut t = training(date, date);
        t.max_pilots = -1;
        assert_eq!(t.capacity(), 0);
    }
}
