// db/test_support.rs
// Shared test helpers for database tests

use super::pool::DatabasePool;
use super::{GuildId, schema};
use rusqlite::{Connection, params};
use std::sync::Arc;

/// Create a bare in-memory connection with the schema applied
pub fn setup_test_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to open in-memory connection");
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .expect("Failed to enable foreign keys");
    schema::run_all_migrations(&conn).expect("Failed to run migrations");
    conn
}

/// Create a test pool (in-memory DB)
pub async fn setup_test_pool() -> Arc<DatabasePool> {
    Arc::new(
        DatabasePool::open_in_memory()
            .await
            .expect("Failed to open in-memory pool"),
    )
}

/// Insert a tag row directly, bypassing the guard and the index
pub fn insert_tag(conn: &Connection, guild: GuildId, name: &str, content: &str) {
    conn.execute(
        "INSERT INTO tags (guild_id, tag_name, content, uses, created_at)
         VALUES (?1, ?2, ?3, 0, '2024-01-01T00:00:00.000000Z')",
        params![guild, name, content],
    )
    .expect("Failed to insert tag");
}

/// Insert an alias row directly, bypassing the guard and the index
pub fn insert_alias(conn: &Connection, guild: GuildId, alias_name: &str, target: &str) {
    conn.execute(
        "INSERT INTO tag_aliases (guild_id, alias_name, tag_name, created_at)
         VALUES (?1, ?2, ?3, '2024-01-01T00:00:00.000000Z')",
        params![guild, alias_name, target],
    )
    .expect("Failed to insert alias");
}
