//! PostgreSQL pool and schema migrations.
//!
//! The Postgres-backed stores in [`crate::store::postgres`] share the pool created here.

use sqlx::{Pool, Postgres};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// Callback bursts from the gateway are short single-row statements, so a
/// small pool is enough; connections are opened lazily and reused.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server
/// cannot be reached or authenticated against.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Creates the `transactions`, `customers`, `customer_payments` and
/// `webhook_records` tables. Applied migrations are tracked in
/// `_sqlx_migrations`, so each one runs only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro embeds ./migrations at compile time
    sqlx::migrate!("./migrations").run(pool).await
}
