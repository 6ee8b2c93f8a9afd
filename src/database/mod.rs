//! The Request, Anchor, and Metadata Repositories (spec §4.5, C3/C4/C5),
//! backed by Postgres.
//!
//! Grounded on the teacher's `database/mod.rs` (a thin `Pool<Postgres>`
//! wrapper plus a `sqlx::migrate!` call) and `database/methods.rs` (a
//! blanket extension trait implemented for anything that implements
//! `sqlx::Executor<Database = Postgres>`, so the same methods work against
//! the pool directly or against a transaction handle).

pub mod methods;
pub mod types;

use std::ops::Deref;

use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::Pool;

pub use methods::DbMethods;

/// Errors from the repository layer (spec §7: `PersistFailure`'s source).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("unknown request status: {0}")]
    UnknownStatus(#[from] types::UnknownRequestStatus),

    #[error(transparent)]
    Cid(#[from] cid::Error),
}

/// Owns the connection pool. `Deref`s to `Pool<Postgres>` so [`DbMethods`]
/// calls work directly on a `Database`, the same way the teacher's
/// `Database` derefs to its pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        sqlx::migrate!("./schemas/database").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Begins a transaction at `REPEATABLE READ` isolation (spec §4.1 step
    /// 10). Callers commit or roll back explicitly.
    pub async fn begin_repeatable_read(
        &self,
    ) -> Result<sqlx::Transaction<'_, Postgres>, Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

impl Deref for Database {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
