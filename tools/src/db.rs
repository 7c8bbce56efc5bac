use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::OnceCell;

use crate::error::ToolError;

/// Lazily-initialized shared database handle.
///
/// The pool holds at most one live connection per process, acquired on
/// first need. sqlx pings a connection before handing it back out, so an
/// unhealthy connection is replaced transparently on the next acquire.
/// Concurrent tool dispatches within one orchestration step serialize on
/// pool acquire rather than assuming the connection supports concurrent
/// cursors.
#[derive(Debug)]
pub struct Db {
    url: String,
    pool: OnceCell<PgPool>,
}

impl Db {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: OnceCell::new(),
        }
    }

    pub async fn pool(&self) -> Result<&PgPool, ToolError> {
        self.pool
            .get_or_try_init(|| async {
                tracing::debug!("opening database connection pool");
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(15))
                    .connect(&self.url)
                    .await
            })
            .await
            .map_err(|err| {
                ToolError::new(
                    "db_unavailable",
                    format!("Could not acquire a healthy database connection: {err}"),
                )
                .with_docs_hint("Check DATABASE_URL and that the database accepts connections.")
            })
    }

    /// Connectivity probe used by `dbdoctor health`.
    pub async fn ping(&self) -> Result<(), ToolError> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}
