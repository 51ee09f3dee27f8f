/// Database layer for Towclub
///
/// PostgreSQL is the only store. Models live in the `models` module at crate
/// root level; this module owns the pool and the schema migrations.
///
/// # Example
///
/// ```no_run
/// use towclub_shared::db::pool::{create_pool, DatabaseConfig};
/// use towclub_shared::db::migrations::run_migrations;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::new(std::env::var("DATABASE_URL")?)).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
