/// Database models for Towclub
///
/// This module contains all database models and their CRUD operations.
///
/// # Models
///
/// - `pilot`: Pilot accounts, roles and prepaid-flight balances
/// - `training`: Training days and their capacity
/// - `signup`: A pilot's registration for a training day
/// - `run`: Flights and services recorded per rotation
/// - `report`: Per-day cash report with the day's organizers
/// - `bill`: Settlement of one signup
/// - `purchase`: Items sold on a training day
/// - `expense`: Cash taken out of the box
/// - `absorption`: Cash put into the box outside of bills
///
/// # Example
///
/// ```no_run
/// use towclub_shared::models::training::{CreateTraining, Training};
/// use towclub_shared::db::pool::{create_pool, DatabaseConfig};
/// use chrono::NaiveDate;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::new("postgresql://localhost/towclub")).await?;
///
/// let training = Training::create(&pool, CreateTraining {
///     date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
///     max_pilots: None,
///     priority_date: None,
///     info: String::new(),
/// }).await?;
///
/// assert_eq!(training.max_pilots, 10);
/// # Ok(())
/// # }
/// ```

pub mod absorption;
pub mod bill;
pub mod expense;
pub mod pilot;
pub mod purchase;
pub mod report;
pub mod run;
pub mod signup;
pub mod training;
