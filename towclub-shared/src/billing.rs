/// Bill computation for a pilot's training day
///
/// The amount owed is built from the signup's runs and purchases:
///
/// - Every flight costs `flight_price`, minus flights covered by the pilot's
///   prepaid balance.
/// - Every bus or boat ride costs `service_price`. The day's designated
///   organizers get one service for free. Breaks are free.
/// - Purchases are added at their recorded price.
///
/// Guests who fly often need a day pass: when a guest's flights within the
/// last `day_pass_period_days` days (today included) exceed
/// `day_pass_threshold`, a day pass purchase is added before the bill is
/// computed, unless they already hold one for the day.
///
/// [`compute`] is the pure rule; [`preview`] and [`settle`] load the inputs
/// from the database. [`settle`] stores the bill and consumes the prepaid
/// flights in one transaction.
///
/// # Example
///
/// ```
/// use towclub_shared::billing::{compute, BillInput, PriceList};
/// use towclub_shared::models::run::RunKind;
///
/// let prices = PriceList::default();
/// let kinds = [RunKind::Flight, RunKind::Flight, RunKind::Bus, RunKind::Break];
///
/// let breakdown = compute(
///     &BillInput {
///         runs: &kinds,
///         prepaid_balance: 1,
///         is_orga_of_day: false,
///         purchase_prices: &[],
///     },
///     &prices,
/// )
/// .unwrap();
///
/// assert_eq!(breakdown.prepaid_used, 1);
/// assert_eq!(breakdown.amount, prices.flight_price + prices.service_price);
/// ```

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::bill::{Bill, NewBill, PaymentMethod};
use crate::models::pilot::Pilot;
use crate::models::purchase::{CreatePurchase, Purchase, PurchaseItem};
use crate::models::report::Report;
use crate::models::run::{Run, RunKind};
use crate::models::signup::{Signup, SignupStatus};
use crate::models::training::Training;

/// Club prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    /// Price of one flight
    pub flight_price: i32,

    /// Price of one bus or boat ride
    pub service_price: i32,

    pub day_pass_price: i32,

    /// Guests with more flights than this within the period need a day pass
    pub day_pass_threshold: i64,

    /// Length of the rolling day-pass window in days
    pub day_pass_period_days: u32,
}

impl Default for PriceList {
    fn default() -> Self {
        Self {
            flight_price: 9,
            service_price: 3,
            day_pass_price: 20,
            day_pass_threshold: 3,
            day_pass_period_days: 365,
        }
    }
}

impl PriceList {
    /// First day of the day-pass window ending on `date`
    pub fn day_pass_window_start(&self, date: NaiveDate) -> NaiveDate {
        date.checked_sub_days(Days::new(u64::from(self.day_pass_period_days)))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Inputs of the bill computation
#[derive(Debug, Clone, Copy)]
pub struct BillInput<'a> {
    pub runs: &'a [RunKind],
    pub prepaid_balance: i32,
    pub is_orga_of_day: bool,
    pub purchase_prices: &'a [i32],
}

/// Every number that goes into a bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillBreakdown {
    pub flights: i32,
    pub services: i32,
    pub breaks: i32,
    pub prepaid_balance: i32,
    pub prepaid_used: i32,
    pub charged_flights: i32,
    pub is_orga_of_day: bool,
    pub charged_services: i32,
    pub flights_cost: i32,
    pub services_cost: i32,
    pub purchases_cost: i32,
    pub amount: i32,
}

/// Computes the bill for one signup
///
/// Fails with `BillingError::AmountOverflow` if the amount doesn't fit the
/// money column.
pub fn compute(input: &BillInput<'_>, prices: &PriceList) -> Result<BillBreakdown, BillingError> {
    let mut flights = 0;
    let mut services: i32 = 0;
    let mut breaks = 0;
    for kind in input.runs {
        match kind {
            RunKind::Flight => flights += 1,
            RunKind::Bus | RunKind::Boat => services += 1,
            RunKind::Break => breaks += 1,
        }
    }

    let prepaid_used = flights.min(input.prepaid_balance.max(0));
    let charged_flights = flights - prepaid_used;

    let charged_services = if input.is_orga_of_day {
        (services - 1).max(0)
    } else {
        services
    };

    let overflow = || BillingError::AmountOverflow;
    let flights_cost = charged_flights
        .checked_mul(prices.flight_price)
        .ok_or_else(overflow)?;
    let services_cost = charged_services
        .checked_mul(prices.service_price)
        .ok_or_else(overflow)?;
    let purchases_cost = input
        .purchase_prices
        .iter()
        .try_fold(0i32, |sum, price| sum.checked_add(*price))
        .ok_or_else(overflow)?;
    let amount = flights_cost
        .checked_add(services_cost)
        .and_then(|sum| sum.checked_add(purchases_cost))
        .ok_or_else(overflow)?;

    Ok(BillBreakdown {
        flights,
        services,
        breaks,
        prepaid_balance: input.prepaid_balance,
        prepaid_used,
        charged_flights,
        is_orga_of_day: input.is_orga_of_day,
        charged_services,
        flights_cost,
        services_cost,
        purchases_cost,
        amount,
    })
}

/// Whether a day pass must be added to a guest's bill
pub fn needs_day_pass(
    is_member: bool,
    flights_today: usize,
    flights_in_window: i64,
    holds_day_pass: bool,
    prices: &PriceList,
) -> bool {
    !is_member
        && flights_today > 0
        && !holds_day_pass
        && flights_in_window > prices.day_pass_threshold
}

/// Errors for bill operations
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("Signup not found: {0}")]
    SignupNotFound(Uuid),

    #[error("Signup {0} does not belong to this report's training")]
    SignupNotInTraining(Uuid),

    #[error("Signup {0} is not selected")]
    SignupNotSelected(Uuid),

    #[error("Signup {0} is already billed")]
    AlreadyBilled(Uuid),

    #[error("Bill amount is too large")]
    AmountOverflow,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Computed bill of a signup, before it is stored
#[derive(Debug, Clone, Serialize)]
pub struct BillPreview {
    pub signup_id: Uuid,

    pub pilot_id: Uuid,

    pub breakdown: BillBreakdown,

    /// A day pass is added to the purchases when the bill is stored
    pub day_pass_added: bool,

    pub purchases: Vec<Purchase>,
}

struct Prepared {
    preview: BillPreview,
    day_pass: Option<CreatePurchase>,
}

/// Loads everything a signup's bill depends on and computes it
///
/// When `lock` is set, the pilot row stays locked until the transaction
/// ends.
async fn prepare(
    conn: &mut PgConnection,
    report_id: Uuid,
    signup_id: Uuid,
    prices: &PriceList,
    lock: bool,
) -> Result<Prepared, BillingError> {
    let report = Report::find_by_id(&mut *conn, report_id)
        .await?
        .ok_or(BillingError::ReportNotFound(report_id))?;
    let training = Training::find_by_id(&mut *conn, report.training_id)
        .await?
        .ok_or(BillingError::ReportNotFound(report_id))?;
    let signup = Signup::find_by_id(&mut *conn, signup_id)
        .await?
        .ok_or(BillingError::SignupNotFound(signup_id))?;

    if signup.training_id != training.id {
        return Err(BillingError::SignupNotInTraining(signup_id));
    }
    if signup.status != SignupStatus::Selected {
        return Err(BillingError::SignupNotSelected(signup_id));
    }

    let pilot = if lock {
        Pilot::find_for_update(&mut *conn, signup.pilot_id).await?
    } else {
        Pilot::find_by_id(&mut *conn, signup.pilot_id).await?
    };
    let pilot = pilot.ok_or(sqlx::Error::RowNotFound)?;

    if Bill::exists_for_signup(&mut *conn, signup_id).await? {
        return Err(BillingError::AlreadyBilled(signup_id));
    }

    let runs: Vec<RunKind> = Run::list_by_signup(&mut *conn, signup_id)
        .await?
        .into_iter()
        .map(|r| r.kind)
        .collect();
    let purchases = Purchase::list_by_signup(&mut *conn, signup_id).await?;

    let flights_today = runs.iter().filter(|k| **k == RunKind::Flight).count();
    let holds_day_pass = purchases.iter().any(|p| p.item == PurchaseItem::DayPass);
    let day_pass = if pilot.is_guest() && flights_today > 0 && !holds_day_pass {
        let flights_in_window = Run::count_flights_between(
            &mut *conn,
            pilot.id,
            prices.day_pass_window_start(training.date),
            training.date,
        )
        .await?;
        debug!(
            pilot_id = %pilot.id,
            flights_in_window,
            threshold = prices.day_pass_threshold,
            "Checked day pass window"
        );

        needs_day_pass(
            pilot.is_member,
            flights_today,
            flights_in_window,
            holds_day_pass,
            prices,
        )
        .then(|| CreatePurchase {
            signup_id,
            item: PurchaseItem::DayPass,
            description: format!("Day pass {}", training.date),
            price: prices.day_pass_price,
            quantity: 0,
        })
    } else {
        None
    };

    let mut purchase_prices: Vec<i32> = purchases.iter().map(|p| p.price).collect();
    if let Some(pass) = &day_pass {
        purchase_prices.push(pass.price);
    }

    let breakdown = compute(
        &BillInput {
            runs: &runs,
            prepaid_balance: pilot.prepaid_flights,
            is_orga_of_day: report.is_orga_of_day(signup_id),
            purchase_prices: &purchase_prices,
        },
        prices,
    )?;

    Ok(Prepared {
        preview: BillPreview {
            signup_id,
            pilot_id: pilot.id,
            breakdown,
            day_pass_added: day_pass.is_some(),
            purchases,
        },
        day_pass,
    })
}

/// Computes a signup's bill without storing anything
pub async fn preview(
    pool: &PgPool,
    report_id: Uuid,
    signup_id: Uuid,
    prices: &PriceList,
) -> Result<BillPreview, BillingError> {
    let mut conn = pool.acquire().await?;
    let prepared = prepare(&mut conn, report_id, signup_id, prices, false).await?;
    Ok(prepared.preview)
}

/// Computes and stores a signup's bill
///
/// In one transaction: adds the day pass if one is due, inserts the bill and
/// takes the consumed prepaid flights off the pilot's balance. The training
/// row stays locked throughout, so no run can be recorded for the signup
/// between reading its runs and storing the bill.
///
/// # Errors
///
/// - `BillingError::AlreadyBilled` if the signup has a bill
/// - `BillingError::SignupNotInTraining` if the signup belongs to another
///   training day
pub async fn settle(
    pool: &PgPool,
    report_id: Uuid,
    signup_id: Uuid,
    method: PaymentMethod,
    prices: &PriceList,
) -> Result<(Bill, BillPreview), BillingError> {
    let mut tx = pool.begin().await?;

    // Rotations, cancels and purchases of the day wait until the bill is stored
    let report = Report::find_by_id(&mut *tx, report_id)
        .await?
        .ok_or(BillingError::ReportNotFound(report_id))?;
    Training::lock(&mut *tx, report.training_id)
        .await?
        .ok_or(BillingError::ReportNotFound(report_id))?;

    let Prepared { mut preview, day_pass } =
        prepare(&mut tx, report_id, signup_id, prices, true).await?;

    if let Some(pass) = day_pass {
        let purchase = Purchase::insert(&mut *tx, report_id, pass).await?;
        info!(%signup_id, purchase_id = %purchase.id, price = purchase.price, "Added day pass");
        preview.purchases.push(purchase);
    }

    let breakdown = &preview.breakdown;
    let bill = Bill::insert(
        &mut *tx,
        NewBill {
            signup_id,
            report_id,
            prepaid_flights: breakdown.prepaid_used,
            amount: breakdown.amount,
            method,
        },
    )
    .await
    .map_err(|e| {
        if is_constraint_violation(&e, "bills_signup_key") {
            BillingError::AlreadyBilled(signup_id)
        } else {
            BillingError::Database(e)
        }
    })?;

    if breakdown.prepaid_used > 0 {
        let remaining =
            Pilot::adjust_prepaid_flights(&mut *tx, preview.pilot_id, -breakdown.prepaid_used)
                .await?;
        debug!(pilot_id = %preview.pilot_id, remaining = ?remaining, "Consumed prepaid flights");
    }

    tx.commit().await?;

    info!(
        bill_id = %bill.id,
        %signup_id,
        amount = bill.amount,
        method = method.as_str(),
        prepaid_used = bill.prepaid_flights,
        "Created bill"
    );
    Ok((bill, preview))
}

fn is_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(constraint),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(runs: &'a [RunKind], prepaid: i32, orga: bool, purchases: &'a [i32]) -> BillInput<'a> {
        BillInput {
            runs,
            prepaid_balance: prepaid,
            is_orga_of_day: orga,
            purchase_prices: purchases,
        }
    }

    #[test]
    fn test_default_prices() {
        let prices = PriceList::default();
        assert_eq!(prices.flight_price, 9);
        assert_eq!(prices.service_price, 3);
        assert_eq!(prices.day_pass_price, 20);
        assert_eq!(prices.day_pass_threshold, 3);
        assert_eq!(prices.day_pass_period_days, 365);
    }

    #[test]
    fn test_flights_and_services_are_charged() {
        let runs = [RunKind::Flight, RunKind::Flight, RunKind::Bus, RunKind::Boat];
        let b = compute(&input(&runs, 0, false, &[]), &PriceList::default()).unwrap();

        assert_eq!(b.flights, 2);
        assert_eq!(b.services, 2);
        assert_eq!(b.amount, 2 * 9 + 2 * 3);
    }

    #[test]
    fn test_breaks_are_free() {
        let runs = [RunKind::Break, RunKind::Break];
        let b = compute(&input(&runs, 0, false, &[]), &PriceList::default()).unwrap();

        assert_eq!(b.breaks, 2);
        assert_eq!(b.amount, 0);
    }

    #[test]
    fn test_prepaid_covers_flights_first() {
        let runs = [RunKind::Flight; 3];

        let partial = compute(&input(&runs, 2, false, &[]), &PriceList::default()).unwrap();
        assert_eq!(partial.prepaid_used, 2);
        assert_eq!(partial.charged_flights, 1);
        assert_eq!(partial.amount, 9);

        let covered = compute(&input(&runs, 10, false, &[]), &PriceList::default()).unwrap();
        assert_eq!(covered.prepaid_used, 3);
        assert_eq!(covered.amount, 0);
    }

    #[test]
    fn test_prepaid_does_not_cover_services() {
        let runs = [RunKind::Bus];
        let b = compute(&input(&runs, 5, false, &[]), &PriceList::default()).unwrap();

        assert_eq!(b.prepaid_used, 0);
        assert_eq!(b.amount, 3);
    }

    #[test]
    fn test_orga_of_day_gets_one_free_service() {
        let runs = [RunKind::Bus, RunKind::Boat, RunKind::Flight];
        let b = compute(&input(&runs, 0, true, &[]), &PriceList::default()).unwrap();

        assert_eq!(b.charged_services, 1);
        assert_eq!(b.amount, 9 + 3);

        let none = compute(&input(&[RunKind::Flight], 0, true, &[]), &PriceList::default()).unwrap();
        assert_eq!(none.charged_services, 0);
    }

    #[test]
    fn test_purchases_are_added() {
        let b = compute(&input(&[], 0, false, &[15, 20]), &PriceList::default()).unwrap();
        assert_eq!(b.purchases_cost, 35);
        assert_eq!(b.amount, 35);
    }

    #[test]
    fn test_custom_prices() {
        let prices = PriceList {
            flight_price: 12,
            service_price: 5,
            ..PriceList::default()
        };
        let runs = [RunKind::Flight, RunKind::Boat];

        assert_eq!(compute(&input(&runs, 0, false, &[]), &prices).unwrap().amount, 17);
    }

    #[test]
    fn test_day_pass_only_for_frequent_guests_who_flew_today() {
        let prices = PriceList::default();

        assert!(needs_day_pass(false, 1, 4, false, &prices));
        // At the threshold, not above it
        assert!(!needs_day_pass(false, 1, 3, false, &prices));
        // Members never need one
        assert!(!needs_day_pass(true, 1, 40, false, &prices));
        // Didn't fly today
        assert!(!needs_day_pass(false, 0, 40, false, &prices));
        // Already holds one
        assert!(!needs_day_pass(false, 2, 40, true, &prices));
    }

    #[test]
    fn test_day_pass_window_start() {
        let prices = PriceList {
            day_pass_period_days: 30,
            ..PriceList::default()
        };
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        assert_eq!(
            prices.day_pass_window_start(date),
            NaiveDate::from_ymd_opt(2025, 5, 31).unwrap()
        );
    }

    #[test]
    fn test_amount_overflow_is_an_error() {
        let result = compute(&input(&[], 0, false, &[i32::MAX, 1]), &PriceList::default());
        assert!(matches!(result, Err(BillingError::AmountOverflow)));

        let prices = PriceList {
            flight_price: i32::MAX,
            ..PriceList::default()
        };
        let runs = [RunKind::Flight; 2];
        let result = compute(&input(&runs, 0, false, &[]), &prices);
        assert!(matches!(result, Err(BillingError::AmountOverflow)));
    }

    #[test]
    fn test_breakdown_serializes_amount() {
        let b = compute(&input(&[RunKind::Flight], 0, false, &[]), &PriceList::default()).unwrap();
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["amount"], 9);
        assert_eq!(json["is_orga_of_day"], false);
    }
}
