// db/tags.rs
// Canonical tag and alias records

use rusqlite::{Connection, OptionalExtension, params};

use super::types::{
    ALIAS_COLUMNS, Alias, EntityKind, GuildId, TAG_COLUMNS, Tag, TagId, UserId, format_timestamp,
    now, parse_alias_row, parse_tag_row,
};
use crate::error::{Result, TagError};

// Sync functions for pool.write() / pool.read() usage. Callers pass
// normalized names and run these inside their own transaction.

/// UNIQUE or PRIMARY KEY violation, as opposed to FK/CHECK failures.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

fn map_unique(err: rusqlite::Error, name: &str, kind: EntityKind) -> TagError {
    if is_unique_violation(&err) {
        TagError::DuplicateKey {
            name: name.to_string(),
            kind,
        }
    } else {
        err.into()
    }
}

/// Insert a new tag and return its row id
pub fn put_tag_sync(
    conn: &Connection,
    guild: GuildId,
    name: &str,
    content: &str,
    owner: Option<UserId>,
) -> Result<TagId> {
    conn.execute(
        "INSERT INTO tags (guild_id, tag_name, content, user_id, uses, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![guild, name, content, owner, format_timestamp(now())],
    )
    .map_err(|e| map_unique(e, name, EntityKind::Tag))?;
    Ok(TagId(conn.last_insert_rowid()))
}

/// Insert a new alias pointing at a live tag.
///
/// Naming another alias as the target binds the new alias to that alias's
/// tag, so alias chains never exceed one hop. The returned alias carries the
/// tag it was bound to.
pub fn put_alias_sync(
    conn: &Connection,
    guild: GuildId,
    alias_name: &str,
    target_name: &str,
    owner: Option<UserId>,
) -> Result<Alias> {
    let target_name = match get_alias_sync(conn, guild, target_name)? {
        Some(existing) => existing.target_name,
        None => target_name.to_string(),
    };
    if !tag_exists_sync(conn, guild, &target_name)? {
        return Err(TagError::AliasTargetMissing { target: target_name });
    }

    let alias = Alias {
        guild_id: guild,
        name: alias_name.to_string(),
        target_name: target_name.clone(),
        owner,
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO tag_aliases (guild_id, alias_name, tag_name, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            guild,
            alias_name,
            target_name,
            owner,
            format_timestamp(alias.created_at)
        ],
    )
    .map_err(|e| map_unique(e, alias_name, EntityKind::Alias))?;
    Ok(alias)
}

fn tag_exists_sync(conn: &Connection, guild: GuildId, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM tags WHERE guild_id = ?1 AND tag_name = ?2",
            params![guild, name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Get a tag by name
pub fn get_tag_sync(conn: &Connection, guild: GuildId, name: &str) -> Result<Option<Tag>> {
    let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE guild_id = ?1 AND tag_name = ?2");
    conn.query_row(&sql, params![guild, name], parse_tag_row)
        .optional()
        .map_err(Into::into)
}

/// Get an alias by name
pub fn get_alias_sync(
    conn: &Connection,
    guild: GuildId,
    alias_name: &str,
) -> Result<Option<Alias>> {
    let sql =
        format!("SELECT {ALIAS_COLUMNS} FROM tag_aliases WHERE guild_id = ?1 AND alias_name = ?2");
    conn.query_row(&sql, params![guild, alias_name], parse_alias_row)
        .optional()
        .map_err(Into::into)
}

/// Delete a tag together with every alias that targets it.
///
/// Returns `None` when no such tag exists, otherwise the aliases removed by
/// the cascade so the caller can drop their index entries too.
pub fn delete_tag_sync(
    conn: &Connection,
    guild: GuildId,
    name: &str,
) -> Result<Option<Vec<Alias>>> {
    let aliases = aliases_for_tag_sync(conn, guild, name)?;
    conn.execute(
        "DELETE FROM tag_aliases WHERE guild_id = ?1 AND tag_name = ?2",
        params![guild, name],
    )?;
    let deleted = conn.execute(
        "DELETE FROM tags WHERE guild_id = ?1 AND tag_name = ?2",
        params![guild, name],
    )?;
    if deleted == 0 {
        // No tag means no aliases could have targeted it.
        return Ok(None);
    }
    Ok(Some(aliases))
}

/// Delete an alias. Returns whether a row was removed.
pub fn delete_alias_sync(conn: &Connection, guild: GuildId, alias_name: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM tag_aliases WHERE guild_id = ?1 AND alias_name = ?2",
        params![guild, alias_name],
    )?;
    Ok(deleted > 0)
}

/// Rename a tag and repoint every alias that referenced the old name.
///
/// Both updates must share the caller's transaction; the alias foreign key
/// is deferred so the intermediate state is never checked.
pub fn rename_tag_sync(conn: &Connection, guild: GuildId, old: &str, new: &str) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE tags SET tag_name = ?3 WHERE guild_id = ?1 AND tag_name = ?2",
            params![guild, old, new],
        )
        .map_err(|e| map_unique(e, new, EntityKind::Tag))?;
    if updated == 0 {
        return Err(TagError::not_found(old));
    }
    conn.execute(
        "UPDATE tag_aliases SET tag_name = ?3 WHERE guild_id = ?1 AND tag_name = ?2",
        params![guild, old, new],
    )?;
    Ok(())
}

/// Bump the use counter of a tag
pub fn increment_uses_sync(conn: &Connection, guild: GuildId, name: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tags SET uses = uses + 1 WHERE guild_id = ?1 AND tag_name = ?2",
        params![guild, name],
    )?;
    if updated == 0 {
        return Err(TagError::not_found(name));
    }
    Ok(())
}

/// Replace a tag's content and stamp `edited_at`
pub fn update_content_sync(
    conn: &Connection,
    guild: GuildId,
    name: &str,
    content: &str,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tags SET content = ?3, edited_at = ?4 WHERE guild_id = ?1 AND tag_name = ?2",
        params![guild, name, content, format_timestamp(now())],
    )?;
    if updated == 0 {
        return Err(TagError::not_found(name));
    }
    Ok(())
}

/// Set or clear a tag's owner
pub fn set_tag_owner_sync(
    conn: &Connection,
    guild: GuildId,
    name: &str,
    owner: Option<UserId>,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tags SET user_id = ?3 WHERE guild_id = ?1 AND tag_name = ?2",
        params![guild, name, owner],
    )?;
    if updated == 0 {
        return Err(TagError::not_found(name));
    }
    Ok(())
}

/// Set or clear an alias's owner
pub fn set_alias_owner_sync(
    conn: &Connection,
    guild: GuildId,
    alias_name: &str,
    owner: Option<UserId>,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tag_aliases SET user_id = ?3 WHERE guild_id = ?1 AND alias_name = ?2",
        params![guild, alias_name, owner],
    )?;
    if updated == 0 {
        return Err(TagError::not_found(alias_name));
    }
    Ok(())
}

/// Aliases pointing at a tag, by alias name
pub fn aliases_for_tag_sync(
    conn: &Connection,
    guild: GuildId,
    tag_name: &str,
) -> Result<Vec<Alias>> {
    let sql = format!(
        "SELECT {ALIAS_COLUMNS} FROM tag_aliases
         WHERE guild_id = ?1 AND tag_name = ?2
         ORDER BY alias_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![guild, tag_name], parse_alias_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// LIMIT/OFFSET bind values. Limits saturate; an offset SQLite cannot
/// represent is `InvalidCursor` rather than a silently wrapped number.
pub(crate) fn sql_window(limit: usize, offset: usize) -> Result<(i64, i64)> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let offset =
        i64::try_from(offset).map_err(|_| TagError::InvalidCursor(offset.to_string()))?;
    Ok((limit, offset))
}

/// Tags ordered by uses (most used first), then name
pub fn list_tags_by_uses_sync(
    conn: &Connection,
    guild: GuildId,
    limit: usize,
    offset: usize,
) -> Result<Vec<Tag>> {
    let sql = format!(
        "SELECT {TAG_COLUMNS} FROM tags WHERE guild_id = ?1
         ORDER BY uses DESC, tag_name ASC
         LIMIT ?2 OFFSET ?3"
    );
    let (limit, offset) = sql_window(limit, offset)?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![guild, limit, offset], parse_tag_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Everything a user owns in a guild: tags (by uses, then name), then aliases (by name)
pub fn list_by_owner_sync(
    conn: &Connection,
    guild: GuildId,
    owner: UserId,
) -> Result<Vec<(EntityKind, String)>> {
    let mut stmt = conn.prepare(
        "SELECT 'tag', tag_name FROM tags WHERE guild_id = ?1 AND user_id = ?2
         ORDER BY uses DESC, tag_name ASC",
    )?;
    let mut out = stmt
        .query_map(params![guild, owner], |row| {
            Ok((row.get::<_, EntityKind>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT 'alias', alias_name FROM tag_aliases WHERE guild_id = ?1 AND user_id = ?2
         ORDER BY alias_name ASC",
    )?;
    let aliases = stmt.query_map(params![guild, owner], |row| {
            Ok((row.get::<_, EntityKind>(0)?, row.get::<_, String>(1)?))
        })?;
    for alias in aliases {
        out.push(alias?);
    }
    Ok(out)
}

/// Null out a user's ownership, everywhere or within one guild.
///
/// Content survives; returns the number of tags and aliases affected.
pub fn unauthor_sync(conn: &Connection, user: UserId, guild: Option<GuildId>) -> Result<usize> {
    let changed = match guild {
        Some(g) => {
            conn.execute(
                "UPDATE tags SET user_id = NULL WHERE guild_id = ?1 AND user_id = ?2",
                params![g, user],
            )? + conn.execute(
                "UPDATE tag_aliases SET user_id = NULL WHERE guild_id = ?1 AND user_id = ?2",
                params![g, user],
            )?
        }
        None => {
            conn.execute("UPDATE tags SET user_id = NULL WHERE user_id = ?1", [user])?
                + conn.execute(
                    "UPDATE tag_aliases SET user_id = NULL WHERE user_id = ?1",
                    [user],
                )?
        }
    };
    Ok(changed)
}

/// Row counts removed by [`delete_guild_sync`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuildPurge {
    pub tags: usize,
    pub aliases: usize,
}

/// Remove every tag and alias in a guild
pub fn delete_guild_sync(conn: &Connection, guild: GuildId) -> Result<GuildPurge> {
    let aliases = conn.execute("DELETE FROM tag_aliases WHERE guild_id = ?1", [guild])?;
    let tags = conn.execute("DELETE FROM tags WHERE guild_id = ?1", [guild])?;
    Ok(GuildPurge { tags, aliases })
}

/// All tags in a guild, for index rebuilds and verification
pub fn all_tags_sync(conn: &Connection, guild: GuildId) -> Result<Vec<Tag>> {
    let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE guild_id = ?1 ORDER BY tag_name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([guild], parse_tag_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// All aliases in a guild, for index rebuilds and verification
pub fn all_aliases_sync(conn: &Connection, guild: GuildId) -> Result<Vec<Alias>> {
    let sql =
        format!("SELECT {ALIAS_COLUMNS} FROM tag_aliases WHERE guild_id = ?1 ORDER BY alias_name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([guild], parse_alias_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_connection;

    const G: GuildId = GuildId(10);
    const U: UserId = UserId(100);

    // ═══════════════════════════════════════
    // put / get
    // ═══════════════════════════════════════

    #[test]
    fn test_put_and_get_tag() {
        let conn = setup_test_connection();
        let id = put_tag_sync(&conn, G, "foo", "bar", Some(U)).unwrap();

        let tag = get_tag_sync(&conn, G, "foo").unwrap().unwrap();
        assert_eq!(tag.id, id);
        assert_eq!(tag.content, "bar");
        assert_eq!(tag.owner, Some(U));
        assert_eq!(tag.uses, 0);
        assert!(tag.edited_at.is_none());
        assert!(get_tag_sync(&conn, GuildId(11), "foo").unwrap().is_none());
    }

    #[test]
    fn test_put_tag_duplicate() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "foo", "bar", None).unwrap();
        let err = put_tag_sync(&conn, G, "foo", "again", None).unwrap_err();
        assert!(matches!(err, TagError::DuplicateKey { kind: EntityKind::Tag, .. }));
    }

    #[test]
    fn test_put_alias_requires_live_tag() {
        let conn = setup_test_connection();
        let err = put_alias_sync(&conn, G, "baz", "foo", None).unwrap_err();
        assert!(matches!(err, TagError::AliasTargetMissing { ref target } if target == "foo"));

        put_tag_sync(&conn, G, "foo", "bar", None).unwrap();
        put_alias_sync(&conn, G, "baz", "foo", Some(U)).unwrap();

        // An alias target binds to the tag behind it
        let chained = put_alias_sync(&conn, G, "qux", "baz", None).unwrap();
        assert_eq!(chained.target_name, "foo");
        let stored = get_alias_sync(&conn, G, "qux").unwrap().unwrap();
        assert_eq!(stored.target_name, "foo");

        let alias = get_alias_sync(&conn, G, "baz").unwrap().unwrap();
        assert_eq!(alias.target_name, "foo");
        assert_eq!(alias.owner, Some(U));
    }

    // ═══════════════════════════════════════
    // cascades
    // ═══════════════════════════════════════

    #[test]
    fn test_delete_tag_cascades_aliases() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "foo", "bar", None).unwrap();
        put_tag_sync(&conn, G, "other", "x", None).unwrap();
        put_alias_sync(&conn, G, "a1", "foo", None).unwrap();
        put_alias_sync(&conn, G, "a2", "foo", None).unwrap();
        put_alias_sync(&conn, G, "keep", "other", None).unwrap();

        let removed = delete_tag_sync(&conn, G, "foo").unwrap().unwrap();
        let names: Vec<_> = removed.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a1", "a2"]);

        assert!(get_alias_sync(&conn, G, "a1").unwrap().is_none());
        assert!(get_alias_sync(&conn, G, "keep").unwrap().is_some());
        assert!(delete_tag_sync(&conn, G, "foo").unwrap().is_none());
    }

    #[test]
    fn test_rename_repoints_aliases() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "foo", "x", None).unwrap();
        put_alias_sync(&conn, G, "baz", "foo", None).unwrap();

        let tx = conn.unchecked_transaction().unwrap();
        rename_tag_sync(&tx, G, "foo", "qux").unwrap();
        tx.commit().unwrap();

        assert!(get_tag_sync(&conn, G, "foo").unwrap().is_none());
        assert_eq!(get_tag_sync(&conn, G, "qux").unwrap().unwrap().content, "x");
        assert_eq!(get_alias_sync(&conn, G, "baz").unwrap().unwrap().target_name, "qux");
    }

    #[test]
    fn test_rename_errors() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "foo", "x", None).unwrap();
        put_tag_sync(&conn, G, "bar", "y", None).unwrap();

        assert!(matches!(
            rename_tag_sync(&conn, G, "missing", "new"),
            Err(TagError::NotFound { .. })
        ));
        assert!(matches!(
            rename_tag_sync(&conn, G, "foo", "bar"),
            Err(TagError::DuplicateKey { .. })
        ));
    }

    // ═══════════════════════════════════════
    // updates
    // ═══════════════════════════════════════

    #[test]
    fn test_increment_and_edit() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "foo", "bar", None).unwrap();
        for _ in 0..3 {
            increment_uses_sync(&conn, G, "foo").unwrap();
        }
        update_content_sync(&conn, G, "foo", "baz").unwrap();

        let tag = get_tag_sync(&conn, G, "foo").unwrap().unwrap();
        assert_eq!(tag.uses, 3);
        assert_eq!(tag.content, "baz");
        assert!(tag.edited_at.is_some());
        assert!(matches!(
            increment_uses_sync(&conn, G, "nope"),
            Err(TagError::NotFound { .. })
        ));
    }

    #[test]
    fn test_owner_listing_and_unauthor() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "low", "x", Some(U)).unwrap();
        put_tag_sync(&conn, G, "high", "x", Some(U)).unwrap();
        put_tag_sync(&conn, GuildId(11), "elsewhere", "x", Some(U)).unwrap();
        put_alias_sync(&conn, G, "al", "low", Some(U)).unwrap();
        increment_uses_sync(&conn, G, "high").unwrap();

        let owned = list_by_owner_sync(&conn, G, U).unwrap();
        assert_eq!(
            owned,
            vec![
                (EntityKind::Tag, "high".to_string()),
                (EntityKind::Tag, "low".to_string()),
                (EntityKind::Alias, "al".to_string()),
            ]
        );

        assert_eq!(unauthor_sync(&conn, U, Some(G)).unwrap(), 3);
        assert!(list_by_owner_sync(&conn, G, U).unwrap().is_empty());
        assert_eq!(list_by_owner_sync(&conn, GuildId(11), U).unwrap().len(), 1);

        assert_eq!(unauthor_sync(&conn, U, None).unwrap(), 1);
        let tag = get_tag_sync(&conn, G, "low").unwrap().unwrap();
        assert_eq!(tag.owner, None);
        assert_eq!(tag.content, "x");
    }

    #[test]
    fn test_list_tags_by_uses_paging() {
        let conn = setup_test_connection();
        for (name, uses) in [("a", 1), ("b", 3), ("c", 3), ("d", 0)] {
            put_tag_sync(&conn, G, name, "x", None).unwrap();
            for _ in 0..uses {
                increment_uses_sync(&conn, G, name).unwrap();
            }
        }
        let page1: Vec<_> = list_tags_by_uses_sync(&conn, G, 2, 0)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        let page2: Vec<_> = list_tags_by_uses_sync(&conn, G, 2, 2)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(page1, vec!["b", "c"]);
        assert_eq!(page2, vec!["a", "d"]);
    }

    #[test]
    fn test_delete_guild() {
        let conn = setup_test_connection();
        put_tag_sync(&conn, G, "foo", "x", None).unwrap();
        put_alias_sync(&conn, G, "bar", "foo", None).unwrap();
        put_tag_sync(&conn, GuildId(11), "foo", "x", None).unwrap();

        let purge = delete_guild_sync(&conn, G).unwrap();
        assert_eq!(purge, GuildPurge { tags: 1, aliases: 1 });
        assert!(all_tags_sync(&conn, G).unwrap().is_empty());
        assert_eq!(all_tags_sync(&conn, GuildId(11)).unwrap().len(), 1);
    }
}
