use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Open a SQLite pool with foreign keys enforced and WAL journaling.
/// The acquire timeout doubles as the busy timeout, so a locked
/// database gives up on the same clock the caller is waiting on.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let timeout_secs = timeout_secs.max(1);
    let busy_timeout = format!("PRAGMA busy_timeout = {}", timeout_secs * 1_000);
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs))
        .after_connect(move |conn, _meta| {
            let busy_timeout = busy_timeout.clone();
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&busy_timeout).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::connect_with_settings;

    #[tokio::test]
    async fn busy_timeout_follows_the_acquire_timeout() {
        let pool = connect_with_settings("sqlite::memory:", 1, 7).await.expect("connect");

        let row = sqlx::query("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(row.get::<i64, _>(0), 7_000);

        pool.close().await;
    }
}
