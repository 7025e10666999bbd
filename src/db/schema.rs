// db/schema.rs
// Database schema and migrations

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version, recorded in store_meta
pub const SCHEMA_VERSION: i64 = 1;

/// Run all schema setup and migrations.
///
/// Idempotent: safe to call on every open.
pub fn run_all_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let version: Option<i64> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .and_then(|v| v.parse().ok());

    match version {
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                [SCHEMA_VERSION.to_string()],
            )?;
            tracing::debug!(version = SCHEMA_VERSION, "Initialized tag store schema");
        }
        Some(v) if v > SCHEMA_VERSION => {
            anyhow::bail!(
                "database schema version {} is newer than supported version {}",
                v,
                SCHEMA_VERSION
            );
        }
        Some(_) => {}
    }

    Ok(())
}

/// Database schema SQL
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- =======================================
-- CANONICAL STORE
-- =======================================
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    guild_id INTEGER NOT NULL,
    tag_name TEXT NOT NULL,
    content TEXT NOT NULL,
    user_id INTEGER,                        -- NULL once the owner is removed
    uses INTEGER NOT NULL DEFAULT 0 CHECK (uses >= 0),
    created_at TEXT NOT NULL,
    edited_at TEXT,
    UNIQUE (guild_id, tag_name)
);
CREATE INDEX IF NOT EXISTS ix_tags_owner ON tags(guild_id, user_id);
CREATE INDEX IF NOT EXISTS ix_tags_uses ON tags(guild_id, uses DESC);

-- Aliases bind to tags by name. The foreign key is deferred so a rename can
-- rewrite the tag row and its aliases inside one transaction; it is only a
-- commit-time backstop, the mutation pipeline keeps it satisfied itself.
CREATE TABLE IF NOT EXISTS tag_aliases (
    guild_id INTEGER NOT NULL,
    alias_name TEXT NOT NULL,
    tag_name TEXT NOT NULL,
    user_id INTEGER,
    created_at TEXT NOT NULL,
    PRIMARY KEY (guild_id, alias_name),
    FOREIGN KEY (guild_id, tag_name) REFERENCES tags(guild_id, tag_name)
        DEFERRABLE INITIALLY DEFERRED
);
CREATE INDEX IF NOT EXISTS ix_tag_aliases_target ON tag_aliases(guild_id, tag_name);
CREATE INDEX IF NOT EXISTS ix_tag_aliases_owner ON tag_aliases(guild_id, user_id);

-- =======================================
-- SEARCH INDEX
-- =======================================
-- One row per live tag or alias.
CREATE TABLE IF NOT EXISTS search_entries (
    guild_id INTEGER NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('tag', 'alias')),
    name TEXT NOT NULL,
    indexed_text TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    PRIMARY KEY (guild_id, kind, name)
);

-- Inverted postings: token -> entity, with term frequency.
CREATE TABLE IF NOT EXISTS search_postings (
    guild_id INTEGER NOT NULL,
    token TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    tf INTEGER NOT NULL CHECK (tf > 0),
    PRIMARY KEY (guild_id, token, kind, name)
);
CREATE INDEX IF NOT EXISTS ix_search_postings_entity ON search_postings(guild_id, kind, name);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        run_all_migrations(&conn).unwrap();

        let version: String = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_rejects_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        conn.execute(
            "UPDATE store_meta SET value = '999' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();
        assert!(run_all_migrations(&conn).is_err());
    }

    #[test]
    fn test_alias_foreign_key_checked_at_commit() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all_migrations(&conn).unwrap();

        let tx = conn.unchecked_transaction().unwrap();
        tx.execute(
            "INSERT INTO tag_aliases (guild_id, alias_name, tag_name, created_at)
             VALUES (1, 'dangling', 'missing', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        assert!(tx.commit().is_err(), "dangling alias must not commit");
    }
}
