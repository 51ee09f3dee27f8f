/// Pilot model and database operations
///
/// A pilot is any account that can sign up for trainings: club members as
/// well as guests. Organizers (`is_orga`) run training days: they select
/// participants, record runs and settle bills.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE pilots (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash TEXT NOT NULL,
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100) NOT NULL,
///     phone VARCHAR(30),
///     is_orga BOOLEAN NOT NULL DEFAULT FALSE,
///     is_member BOOLEAN NOT NULL DEFAULT FALSE,
///     prepaid_flights INTEGER NOT NULL DEFAULT 0 CHECK (prepaid_flights >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use towclub_shared::models::pilot::{CreatePilot, Pilot};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let pilot = Pilot::create(&pool, CreatePilot {
///     email: "ruth@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Ruth".to_string(),
///     last_name: "Keller".to_string(),
///     phone: None,
/// }).await?;
///
/// assert_eq!(pilot.prepaid_flights, 0);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Pilot account
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Pilot {
    /// Unique pilot ID
    pub id: Uuid,

    /// Login email, unique across pilots
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    pub phone: Option<String>,

    /// Organizer role
    pub is_orga: bool,

    /// Club member; `false` marks a guest
    pub is_member: bool,

    /// Remaining prepaid flights
    pub prepaid_flights: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new pilot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePilot {
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    pub phone: Option<String>,
}

const PILOT_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, \
     is_orga, is_member, prepaid_flights, created_at, updated_at";

impl Pilot {
    /// Display name, "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whether the pilot flies as a guest
    pub fn is_guest(&self) -> bool {
        !self.is_member
    }

    /// Creates a new pilot; new accounts are guests without organizer role
    ///
    /// # Errors
    ///
    /// Fails with a unique constraint violation if the email is taken.
    pub async fn create(pool: &PgPool, data: CreatePilot) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO pilots (email, password_hash, first_name, last_name, phone) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PILOT_COLUMNS}"
        );

        sqlx::query_as::<_, Pilot>(&query)
            .bind(data.email.to_lowercase())
            .bind(data.password_hash)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.phone)
            .fetch_one(pool)
            .await
    }

    /// Finds a pilot by ID
    pub async fn find_by_id<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {PILOT_COLUMNS} FROM pilots WHERE id = $1");

        sqlx::query_as::<_, Pilot>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Finds a pilot by ID and locks the row until the transaction ends
    ///
    /// Used wherever the prepaid-flight balance is read and then changed.
    pub async fn find_for_update<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {PILOT_COLUMNS} FROM pilots WHERE id = $1 FOR UPDATE");

        sqlx::query_as::<_, Pilot>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Finds a pilot by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {PILOT_COLUMNS} FROM pilots WHERE email = $1");

        sqlx::query_as::<_, Pilot>(&query)
            .bind(email.to_lowercase())
            .fetch_optional(pool)
            .await
    }

    /// Adds `delta` (may be negative) to the prepaid-flight balance
    ///
    /// Returns the new balance, or None if the pilot doesn't exist.
    ///
    /// # Errors
    ///
    /// Fails with a check constraint violation if the balance would drop
    /// below zero.
    pub async fn adjust_prepaid_flights<'e, E>(
        db: E,
        id: Uuid,
        delta: i32,
    ) -> Result<Option<i32>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            UPDATE pilots
            SET prepaid_flights = prepaid_flights + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING prepaid_flights
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(db)
        .await
    }

    /// Sets the organizer role and club membership of a pilot
    pub async fn set_roles(
        pool: &PgPool,
        id: Uuid,
        is_orga: bool,
        is_member: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE pilots SET is_orga = $2, is_member = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {PILOT_COLUMNS}"
        );

        sqlx::query_as::<_, Pilot>(&query)
            .bind(id)
            .bind(is_orga)
            .bind(is_member)
            .fetch_optional(pool)
            .await
    }
}
