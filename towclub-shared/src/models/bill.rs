/// Bill model and database operations
///
/// A bill settles one signup of a training day. It records how many of the
/// pilot's prepaid flights were consumed, the amount paid and how it was
/// paid. Bills are created through [`crate::billing::settle`], which computes
/// the amount and consumes the prepaid flights in the same transaction.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE payment_method AS ENUM ('cash', 'bank', 'card');
///
/// CREATE TABLE bills (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     signup_id UUID NOT NULL REFERENCES signups(id) ON DELETE CASCADE,
///     report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
///     prepaid_flights INTEGER NOT NULL DEFAULT 0 CHECK (prepaid_flights >= 0),
///     amount INTEGER NOT NULL CHECK (amount >= 0),
///     method payment_method NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT bills_signup_key UNIQUE (signup_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use super::pilot::Pilot;
use super::signup::Signup;
use super::training::Training;

/// How a bill was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Bank,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Card => "card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bill {
    pub id: Uuid,

    pub signup_id: Uuid,

    pub report_id: Uuid,

    /// Prepaid flights consumed by this bill
    pub prepaid_flights: i32,

    pub amount: i32,

    pub method: PaymentMethod,

    pub created_at: DateTime<Utc>,
}

/// Row data for a new bill
#[derive(Debug, Clone, Copy)]
pub struct NewBill {
    pub signup_id: Uuid,
    pub report_id: Uuid,
    pub prepaid_flights: i32,
    pub amount: i32,
    pub method: PaymentMethod,
}

const BILL_COLUMNS: &str = "id, signup_id, report_id, prepaid_flights, amount, method, created_at";

impl Bill {
    /// Inserts a bill row
    ///
    /// # Errors
    ///
    /// Fails with a unique constraint violation (`bills_signup_key`) if the
    /// signup is already billed.
    pub async fn insert<'e, E>(db: E, data: NewBill) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO bills (signup_id, report_id, prepaid_flights, amount, method) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {BILL_COLUMNS}"
        );

        sqlx::query_as::<_, Bill>(&query)
            .bind(data.signup_id)
            .bind(data.report_id)
            .bind(data.prepaid_flights)
            .bind(data.amount)
            .bind(data.method)
            .fetch_one(db)
            .await
    }

    /// Whether the signup already has a bill
    pub async fn exists_for_signup<'e, E>(db: E, signup_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bills WHERE signup_id = $1)")
            .bind(signup_id)
            .fetch_one(db)
            .await
    }

    /// Lists the bills of a report
    pub async fn list_by_report<'e, E>(db: E, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE report_id = $1 ORDER BY created_at ASC, id ASC"
        );

        sqlx::query_as::<_, Bill>(&query)
            .bind(report_id)
            .fetch_all(db)
            .await
    }

    /// Deletes a bill and re-credits the prepaid flights it consumed
    ///
    /// Returns the deleted bill, or None if it didn't exist.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let training_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT s.training_id FROM bills b JOIN signups s ON s.id = b.signup_id WHERE b.id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(training_id) = training_id else {
            return Ok(None);
        };
        Training::lock(&mut *tx, training_id).await?;

        let query = format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = $1 FOR UPDATE");
        let Some(bill) = sqlx::query_as::<_, Bill>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let signup = Signup::find_by_id(&mut *tx, bill.signup_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        Pilot::find_for_update(&mut *tx, signup.pilot_id).await?;
        if bill.prepaid_flights > 0 {
            Pilot::adjust_prepaid_flights(&mut *tx, signup.pilot_id, bill.prepaid_flights).await?;
        }

        sqlx::query("DELETE FROM bills WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            bill_id = %id,
            pilot_id = %signup.pilot_id,
            recredited = bill.prepaid_flights,
            "Deleted bill"
        );
        Ok(Some(bill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_as_str() {
        assert_eq!(PaymentMethod::Cash.as_str(), "cash");
        assert_eq!(PaymentMethod::Bank.as_str(), "bank");
        assert_eq!(PaymentMethod::Card.as_str(), "card");
    }

    #[test]
    fn test_payment_method_deserializes_lowercase() {
        let method: PaymentMethod = serde_json::from_str("\"card\"").unwrap();
        assert_eq!(method, PaymentMethod::Card);

        assert!(serde_json::from_str::<PaymentMethod>("\"Cash\"").is_err());
    }
}
