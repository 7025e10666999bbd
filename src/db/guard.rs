// db/guard.rs
// Name validation and the tag/alias uniqueness guard

use super::{EntityKind, GuildId};
use crate::error::{Result, TagError};
use rusqlite::{Connection, OptionalExtension};

/// Maximum tag or alias name length, in characters
pub const MAX_NAME_LEN: usize = 50;

/// Maximum tag content length, in characters
pub const MAX_CONTENT_LEN: usize = 2000;

/// Normalize a user-supplied name: trim, then apply full Unicode case
/// folding (`Straße` and `STRASSE` are the same name).
///
/// Names are case-insensitive, so every lookup and every write goes through
/// this first. Length limits apply to the folded name.
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = caseless::default_case_fold_str(raw.trim());
    if name.is_empty() {
        return Err(TagError::InvalidName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(TagError::NameTooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }
    Ok(name)
}

/// Check content bounds. Content is stored verbatim.
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(TagError::EmptyContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(TagError::ContentTooLong {
            len,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(())
}

/// Which kind currently holds `name` in the guild, if any.
pub fn name_holder_sync(
    conn: &Connection,
    guild: GuildId,
    name: &str,
) -> Result<Option<EntityKind>> {
    let kind = conn
        .query_row(
            "SELECT 'tag' FROM tags WHERE guild_id = ?1 AND tag_name = ?2
             UNION ALL
             SELECT 'alias' FROM tag_aliases WHERE guild_id = ?1 AND alias_name = ?2
             LIMIT 1",
            rusqlite::params![guild, name],
            |row| row.get::<_, EntityKind>(0),
        )
        .optional()?;
    Ok(kind)
}

/// Fail unless `name` is free for a new entity of kind `creating`.
///
/// Must run inside the same transaction as the write it guards; the pool's
/// immediate transactions hold the write lock from the first statement, so
/// nothing can claim the name between this check and the insert.
pub fn check_name_available_sync(
    conn: &Connection,
    guild: GuildId,
    name: &str,
    creating: EntityKind,
) -> Result<()> {
    match name_holder_sync(conn, guild, name)? {
        None => Ok(()),
        Some(existing) if existing == creating => Err(TagError::DuplicateKey {
            name: name.to_string(),
            kind: existing,
        }),
        Some(existing) => Err(TagError::NameCollision {
            name: name.to_string(),
            existing,
        }),
    }
}
