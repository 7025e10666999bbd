// search/index.rs
// Inverted index over tag and alias text, maintained inside write transactions

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::tokenize::term_frequencies;
use crate::db::tags::{all_aliases_sync, all_tags_sync};
use crate::db::{Alias, EntityKind, GuildId, Tag, format_timestamp};
use crate::error::Result;

/// Identity of an indexed entity within a guild
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IndexKey {
    pub kind: EntityKind,
    pub name: String,
}

impl IndexKey {
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Tag,
            name: name.into(),
        }
    }

    pub fn alias(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Alias,
            name: name.into(),
        }
    }
}

/// What gets written to the index for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub key: IndexKey,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

impl IndexEntry {
    /// A tag is searchable by its name and its content
    pub fn for_tag(tag: &Tag) -> Self {
        Self {
            key: IndexKey::tag(&tag.name),
            text: format!("{}\n{}", tag.name, tag.content),
            updated_at: tag.updated_at(),
        }
    }

    /// An alias is searchable by its own name and its target's name
    pub fn for_alias(alias: &Alias) -> Self {
        Self {
            key: IndexKey::alias(&alias.name),
            text: format!("{}\n{}", alias.name, alias.target_name),
            updated_at: alias.created_at,
        }
    }
}

/// Add an entity to the guild's index
pub fn index_insert_sync(conn: &Connection, guild: GuildId, entry: &IndexEntry) -> Result<()> {
    let tf = term_frequencies(&entry.text);
    let token_count: u32 = tf.values().sum();

    conn.execute(
        "INSERT INTO search_entries (guild_id, kind, name, indexed_text, updated_at, token_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            guild,
            entry.key.kind,
            entry.key.name,
            entry.text,
            format_timestamp(entry.updated_at),
            token_count
        ],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO search_postings (guild_id, token, kind, name, tf)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (token, count) in &tf {
        stmt.execute(params![guild, token, entry.key.kind, entry.key.name, count])?;
    }
    Ok(())
}

/// Remove an entity from the guild's index. Returns whether it was indexed.
pub fn index_remove_sync(conn: &Connection, guild: GuildId, key: &IndexKey) -> Result<bool> {
    conn.execute(
        "DELETE FROM search_postings WHERE guild_id = ?1 AND kind = ?2 AND name = ?3",
        params![guild, key.kind, key.name],
    )?;
    let removed = conn.execute(
        "DELETE FROM search_entries WHERE guild_id = ?1 AND kind = ?2 AND name = ?3",
        params![guild, key.kind, key.name],
    )?;
    Ok(removed > 0)
}

/// Swap an entity's index entry for a new one (edit, rename)
pub fn index_replace_sync(
    conn: &Connection,
    guild: GuildId,
    old: &IndexKey,
    new: &IndexEntry,
) -> Result<()> {
    index_remove_sync(conn, guild, old)?;
    index_insert_sync(conn, guild, new)
}

/// Drop every index row for a guild
pub fn clear_guild_index_sync(conn: &Connection, guild: GuildId) -> Result<usize> {
    conn.execute("DELETE FROM search_postings WHERE guild_id = ?1", [guild])?;
    let entries = conn.execute("DELETE FROM search_entries WHERE guild_id = ?1", [guild])?;
    Ok(entries)
}

/// Result of comparing a guild's index with its canonical rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Live entities with no index entry
    pub missing: Vec<IndexKey>,
    /// Entries whose text, timestamp, token count or postings disagree with the row
    pub stale: Vec<IndexKey>,
    /// Entries or postings for entities that no longer exist
    pub orphaned: Vec<IndexKey>,
    /// Number of live entities checked
    pub checked: usize,
}

impl IndexReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty() && self.orphaned.is_empty()
    }
}

struct StoredEntry {
    text: String,
    updated_at: String,
    token_count: u32,
    postings: BTreeMap<String, u32>,
}

fn load_index_sync(conn: &Connection, guild: GuildId) -> Result<BTreeMap<IndexKey, StoredEntry>> {
    let mut entries = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT kind, name, indexed_text, updated_at, token_count
         FROM search_entries WHERE guild_id = ?1",
    )?;
    let rows = stmt.query_map([guild], |row| {
        Ok((
            IndexKey {
                kind: row.get(0)?,
                name: row.get(1)?,
            },
            StoredEntry {
                text: row.get(2)?,
                updated_at: row.get(3)?,
                token_count: row.get(4)?,
                postings: BTreeMap::new(),
            },
        ))
    })?;
    for row in rows {
        let (key, entry) = row?;
        entries.insert(key, entry);
    }
    Ok(entries)
}

fn load_postings_sync(
    conn: &Connection,
    guild: GuildId,
) -> Result<BTreeMap<IndexKey, BTreeMap<String, u32>>> {
    let mut postings: BTreeMap<IndexKey, BTreeMap<String, u32>> = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT kind, name, token, tf FROM search_postings WHERE guild_id = ?1")?;
    let rows = stmt.query_map([guild], |row| {
        Ok((
            IndexKey {
                kind: row.get(0)?,
                name: row.get(1)?,
            },
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
        ))
    })?;
    for row in rows {
        let (key, token, tf) = row?;
        postings.entry(key).or_default().insert(token, tf);
    }
    Ok(postings)
}

/// Compare a guild's index against the canonical tables.
///
/// Read-only; run it in a read transaction for a consistent snapshot.
pub fn verify_index_sync(conn: &Connection, guild: GuildId) -> Result<IndexReport> {
    let expected: Vec<IndexEntry> = all_tags_sync(conn, guild)?
        .iter()
        .map(IndexEntry::for_tag)
        .chain(all_aliases_sync(conn, guild)?.iter().map(IndexEntry::for_alias))
        .collect();

    let mut stored = load_index_sync(conn, guild)?;
    let mut postings = load_postings_sync(conn, guild)?;
    for (key, entry) in stored.iter_mut() {
        if let Some(p) = postings.remove(key) {
            entry.postings = p;
        }
    }

    let mut report = IndexReport {
        checked: expected.len(),
        ..Default::default()
    };

    for entry in &expected {
        match stored.remove(&entry.key) {
            None => report.missing.push(entry.key.clone()),
            Some(found) => {
                let tf = term_frequencies(&entry.text);
                let fresh = found.text == entry.text
                    && found.updated_at == format_timestamp(entry.updated_at)
                    && found.token_count == tf.values().sum::<u32>()
                    && found.postings == tf;
                if !fresh {
                    report.stale.push(entry.key.clone());
                }
            }
        }
    }

    // Whatever is left has no canonical row behind it
    let orphans: BTreeSet<IndexKey> = stored.into_keys().chain(postings.into_keys()).collect();
    report.orphaned = orphans.into_iter().collect();

    if !report.is_clean() {
        tracing::warn!(
            guild = %guild,
            missing = report.missing.len(),
            stale = report.stale.len(),
            orphaned = report.orphaned.len(),
            "Search index out of sync"
        );
    }
    Ok(report)
}

/// Drop and rebuild a guild's index from the canonical tables.
///
/// Returns the number of entities indexed.
pub fn rebuild_index_sync(conn: &Connection, guild: GuildId) -> Result<usize> {
    clear_guild_index_sync(conn, guild)?;
    let mut count = 0;
    for tag in all_tags_sync(conn, guild)? {
        index_insert_sync(conn, guild, &IndexEntry::for_tag(&tag))?;
        count += 1;
    }
    for alias in all_aliases_sync(conn, guild)? {
        index_insert_sync(conn, guild, &IndexEntry::for_alias(&alias))?;
        count += 1;
    }
    Ok(count)
}
