use super::schema::Database;
use super::types::DatabaseError;

impl Database {
    // ========================================================================
    // Session State Operations
    // ========================================================================

    /// Get a persisted session value by key.
    ///
    /// Keys use dotted convention: `search.current_query`.
    ///
    /// # Returns
    ///
    /// The value if the key exists, or `None` if it was never set or was cleared.
    pub async fn get_session_value(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM session_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a session value (UPSERT).
    ///
    /// # Arguments
    ///
    /// * `key` - Dotted key (e.g., `search.current_query`)
    /// * `value` - The value to store
    pub async fn set_session_value(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO session_state (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a session value. Returns `true` if the key existed.
    pub async fn clear_session_value(&self, key: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM session_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
