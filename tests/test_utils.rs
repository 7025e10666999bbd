//! Test utilities for tag store integration tests

#![allow(dead_code)]

use std::time::Duration;
use tagstore::db::PoolOptions;
use tagstore::{GuildId, Requester, TagStore, UserId};
use tempfile::TempDir;

pub const GUILD: GuildId = GuildId(1_000);
pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);

pub fn alice() -> Requester {
    Requester::user(ALICE)
}

/// A store plus whatever keeps its backing storage alive
pub struct TestContext {
    pub store: TagStore,
    _dir: Option<TempDir>,
}

impl TestContext {
    /// Private in-memory store
    pub async fn new() -> Self {
        Self {
            store: TagStore::open_in_memory()
                .await
                .expect("Failed to open in-memory store"),
            _dir: None,
        }
    }

    /// File-backed WAL store with a real connection pool, for concurrency tests
    pub async fn file_backed() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let options = PoolOptions {
            max_size: 8,
            busy_timeout: Duration::from_secs(10),
        };
        let store = TagStore::open_path(&dir.path().join("tags.db"), options)
            .await
            .expect("Failed to open file-backed store");
        Self {
            store,
            _dir: Some(dir),
        }
    }

    /// Assert the guild's index matches its tags and aliases
    pub async fn assert_index_consistent(&self, guild: GuildId) {
        let report = self
            .store
            .verify_index(guild)
            .await
            .expect("verify_index failed");
        assert!(report.is_clean(), "index out of sync: {report:?}");
    }

    /// Assert no name is both a tag and an alias
    pub async fn assert_names_disjoint(&self, guild: GuildId) {
        let overlap: i64 = self
            .store
            .pool()
            .interact(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM tags t
                     JOIN tag_aliases a ON a.guild_id = t.guild_id AND a.alias_name = t.tag_name
                     WHERE t.guild_id = ?1",
                    [guild],
                    |row| row.get(0),
                )?)
            })
            .await
            .expect("overlap query failed");
        assert_eq!(overlap, 0, "tag and alias names overlap");
    }

    /// Assert every alias targets a live tag
    pub async fn assert_aliases_live(&self, guild: GuildId) {
        let dangling: i64 = self
            .store
            .pool()
            .interact(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM tag_aliases a
                     LEFT JOIN tags t ON t.guild_id = a.guild_id AND t.tag_name = a.tag_name
                     WHERE a.guild_id = ?1 AND t.id IS NULL",
                    [guild],
                    |row| row.get(0),
                )?)
            })
            .await
            .expect("dangling query failed");
        assert_eq!(dangling, 0, "alias points at a missing tag");
    }

    /// All three store invariants at once
    pub async fn assert_invariants(&self, guild: GuildId) {
        self.assert_names_disjoint(guild).await;
        self.assert_aliases_live(guild).await;
        self.assert_index_consistent(guild).await;
    }
}
