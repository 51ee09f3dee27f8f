/// Expense model and database operations
///
/// Cash taken out of the box during a training day (fuel, repairs and the
/// like).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE expenses (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
///     reason VARCHAR(200) NOT NULL,
///     amount INTEGER NOT NULL CHECK (amount >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Expense {
    pub id: Uuid,

    pub report_id: Uuid,

    pub reason: String,

    pub amount: i32,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpense {
    pub reason: String,

    pub amount: i32,
}

const EXPENSE_COLUMNS: &str = "id, report_id, reason, amount, created_at";

impl Expense {
    pub async fn create(
        pool: &PgPool,
        report_id: Uuid,
        data: CreateExpense,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO expenses (report_id, reason, amount) \
             VALUES ($1, $2, $3) RETURNING {EXPENSE_COLUMNS}"
        );

        sqlx::query_as::<_, Expense>(&query)
            .bind(report_id)
            .bind(data.reason)
            .bind(data.amount)
            .fetch_one(pool)
            .await
    }

    pub async fn list_by_report<'e, E>(db: E, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE report_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );

        sqlx::query_as::<_, Expense>(&query)
            .bind(report_id)
            .fetch_all(db)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
