/// Purchase model and database operations
///
/// Purchases are items a pilot buys on a training day: equipment, a day pass
/// or a bundle of prepaid flights. Their prices are added to the pilot's bill.
/// Buying prepaid flights credits the pilot's balance right away; deleting
/// such a purchase takes the flights back out.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE purchase_item AS ENUM ('equipment', 'day_pass', 'prepaid_flights');
///
/// CREATE TABLE purchases (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     signup_id UUID NOT NULL REFERENCES signups(id) ON DELETE CASCADE,
///     report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
///     item purchase_item NOT NULL,
///     description VARCHAR(200) NOT NULL DEFAULT '',
///     price INTEGER NOT NULL CHECK (price >= 0),
///     quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::bill::Bill;
use super::pilot::Pilot;
use super::report::Report;
use super::signup::Signup;
use super::training::Training;

/// Kind of item sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "purchase_item", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseItem {
    Equipment,
    DayPass,
    PrepaidFlights,
}

impl PurchaseItem {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseItem::Equipment => "equipment",
            PurchaseItem::DayPass => "day_pass",
            PurchaseItem::PrepaidFlights => "prepaid_flights",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: Uuid,

    pub signup_id: Uuid,

    pub report_id: Uuid,

    pub item: PurchaseItem,

    pub description: String,

    pub price: i32,

    /// Number of flights for `prepaid_flights` purchases, 0 otherwise
    pub quantity: i32,

    pub created_at: DateTime<Utc>,
}

/// Input for adding a purchase to a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub signup_id: Uuid,

    pub item: PurchaseItem,

    #[serde(default)]
    pub description: String,

    pub price: i32,

    #[serde(default)]
    pub quantity: i32,
}

/// Errors for purchase operations
#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("Signup not found: {0}")]
    SignupNotFound(Uuid),

    #[error("Signup {0} does not belong to this report's training")]
    SignupNotInTraining(Uuid),

    /// Purchases are frozen once the signup has a bill
    #[error("Signup {0} is already billed")]
    AlreadyBilled(Uuid),

    /// Removing a prepaid bundle would make the balance negative
    #[error("Pilot has {balance} prepaid flights left, can't take back {quantity}")]
    InsufficientPrepaid { balance: i32, quantity: i32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const PURCHASE_COLUMNS: &str =
    "id, signup_id, report_id, item, description, price, quantity, created_at";

impl Purchase {
    /// Adds a purchase for a signup of the report's training
    ///
    /// A `prepaid_flights` purchase credits `quantity` flights to the pilot
    /// in the same transaction.
    ///
    /// # Errors
    ///
    /// - `PurchaseError::SignupNotInTraining` if the signup belongs to
    ///   another training day
    /// - `PurchaseError::AlreadyBilled` if the signup already has a bill
    pub async fn create(
        pool: &PgPool,
        report_id: Uuid,
        data: CreatePurchase,
    ) -> Result<Self, PurchaseError> {
        let mut tx = pool.begin().await?;

        let report = Report::find_by_id(&mut *tx, report_id)
            .await?
            .ok_or(PurchaseError::ReportNotFound(report_id))?;
        let signup = Signup::find_by_id(&mut *tx, data.signup_id)
            .await?
            .ok_or(PurchaseError::SignupNotFound(data.signup_id))?;

        if signup.training_id != report.training_id {
            return Err(PurchaseError::SignupNotInTraining(signup.id));
        }

        // Same lock order as billing: training, then pilot
        Training::lock(&mut *tx, report.training_id).await?;
        Pilot::find_for_update(&mut *tx, signup.pilot_id).await?;
        if Bill::exists_for_signup(&mut *tx, signup.id).await? {
            warn!(signup_id = %signup.id, "Rejected purchase for billed signup");
            return Err(PurchaseError::AlreadyBilled(signup.id));
        }

        let quantity = match data.item {
            PurchaseItem::PrepaidFlights => data.quantity,
            _ => 0,
        };
        if quantity > 0 {
            Pilot::adjust_prepaid_flights(&mut *tx, signup.pilot_id, quantity).await?;
        }

        let purchase = Self::insert(
            &mut *tx,
            report_id,
            CreatePurchase { quantity, ..data },
        )
        .await?;

        tx.commit().await?;

        info!(
            purchase_id = %purchase.id,
            item = purchase.item.as_str(),
            price = purchase.price,
            quantity,
            "Added purchase"
        );
        Ok(purchase)
    }

    /// Inserts a purchase row without touching the prepaid balance
    pub async fn insert<'e, E>(
        db: E,
        report_id: Uuid,
        data: CreatePurchase,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO purchases (signup_id, report_id, item, description, price, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PURCHASE_COLUMNS}"
        );

        sqlx::query_as::<_, Purchase>(&query)
            .bind(data.signup_id)
            .bind(report_id)
            .bind(data.item)
            .bind(data.description)
            .bind(data.price)
            .bind(data.quantity)
            .fetch_one(db)
            .await
    }

    /// Finds a purchase by ID
    pub async fn find_by_id<'e, E>(db: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1");

        sqlx::query_as::<_, Purchase>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Lists a signup's purchases
    pub async fn list_by_signup<'e, E>(db: E, signup_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE signup_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );

        sqlx::query_as::<_, Purchase>(&query)
            .bind(signup_id)
            .fetch_all(db)
            .await
    }

    /// Lists all purchases recorded on a report
    pub async fn list_by_report<'e, E>(db: E, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE report_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );

        sqlx::query_as::<_, Purchase>(&query)
            .bind(report_id)
            .fetch_all(db)
            .await
    }

    /// Deletes a purchase, taking back prepaid flights it credited
    ///
    /// Returns the deleted purchase, or None if it didn't exist.
    ///
    /// # Errors
    ///
    /// - `PurchaseError::AlreadyBilled` if the signup already has a bill
    /// - `PurchaseError::InsufficientPrepaid` if the pilot already used some
    ///   of the flights
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, PurchaseError> {
        let mut tx = pool.begin().await?;

        let Some(purchase) = Self::find_by_id(&mut *tx, id).await? else {
            return Ok(None);
        };
        let signup = Signup::find_by_id(&mut *tx, purchase.signup_id)
            .await?
            .ok_or(PurchaseError::SignupNotFound(purchase.signup_id))?;

        Training::lock(&mut *tx, signup.training_id).await?;
        // Re-read under the lock, a concurrent delete may have won
        let Some(purchase) = Self::find_by_id(&mut *tx, id).await? else {
            return Ok(None);
        };

        let pilot = Pilot::find_for_update(&mut *tx, signup.pilot_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        if Bill::exists_for_signup(&mut *tx, signup.id).await? {
            warn!(purchase_id = %id, "Rejected purchase removal for billed signup");
            return Err(PurchaseError::AlreadyBilled(signup.id));
        }

        if purchase.item == PurchaseItem::PrepaidFlights && purchase.quantity > 0 {
            if pilot.prepaid_flights < purchase.quantity {
                return Err(PurchaseError::InsufficientPrepaid {
                    balance: pilot.prepaid_flights,
                    quantity: purchase.quantity,
                });
            }
            Pilot::adjust_prepaid_flights(&mut *tx, pilot.id, -purchase.quantity).await?;
        }

        sqlx::query("DELETE FROM purchases WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(purchase_id = %id, item = purchase.item.as_str(), "Deleted purchase");
        Ok(Some(purchase))
    }
}
