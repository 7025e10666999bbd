// search/query.rs
// Name resolution and ranked token search

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::db::tags::{
    aliases_for_tag_sync, get_alias_sync, get_tag_sync, increment_uses_sync, sql_window,
};
use crate::db::{Alias, EntityKind, GuildId, Tag, parse_timestamp};
use crate::error::{Result, TagError};

/// How query tokens combine
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MatchMode {
    /// Every query token must match
    #[default]
    All,
    /// At least one query token must match
    Any,
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub kind: EntityKind,
    pub name: String,
    /// Sum of term frequencies over the matched query tokens
    pub score: u32,
    /// Number of distinct query tokens matched
    pub matched: u32,
    pub updated_at: DateTime<Utc>,
}

/// A tag reached by name, possibly through one alias hop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub tag: Tag,
    pub via_alias: Option<Alias>,
}

/// Find the tag `name` refers to: the tag itself, else an alias's target.
///
/// Aliases only ever point at tags, so this never follows more than one hop.
pub fn find_sync(conn: &Connection, guild: GuildId, name: &str) -> Result<Option<Resolved>> {
    if let Some(tag) = get_tag_sync(conn, guild, name)? {
        return Ok(Some(Resolved {
            tag,
            via_alias: None,
        }));
    }
    let Some(alias) = get_alias_sync(conn, guild, name)? else {
        return Ok(None);
    };
    let tag = get_tag_sync(conn, guild, &alias.target_name)?.ok_or_else(|| {
        // Unreachable while the alias foreign key holds
        TagError::AliasTargetMissing {
            target: alias.target_name.clone(),
        }
    })?;
    Ok(Some(Resolved {
        tag,
        via_alias: Some(alias),
    }))
}

/// Resolve a name and count the use against the underlying tag.
///
/// Must run in a write transaction so the read and the increment are one unit.
pub fn resolve_sync(conn: &Connection, guild: GuildId, name: &str) -> Result<Resolved> {
    let mut resolved = find_sync(conn, guild, name)?.ok_or_else(|| TagError::not_found(name))?;
    increment_uses_sync(conn, guild, &resolved.tag.name)?;
    resolved.tag.uses += 1;
    Ok(resolved)
}

/// Tag details for display, without counting a use
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagInfo {
    pub tag: Tag,
    /// Set when the looked-up name was an alias
    pub via_alias: Option<String>,
    /// Every alias pointing at the tag
    pub aliases: Vec<Alias>,
}

pub fn lookup_sync(conn: &Connection, guild: GuildId, name: &str) -> Result<TagInfo> {
    let resolved = find_sync(conn, guild, name)?.ok_or_else(|| TagError::not_found(name))?;
    let aliases = aliases_for_tag_sync(conn, guild, &resolved.tag.name)?;
    Ok(TagInfo {
        via_alias: resolved.via_alias.map(|a| a.name),
        tag: resolved.tag,
        aliases,
    })
}

/// Ranked search over a guild's index.
///
/// `tokens` must be distinct (see [`super::tokenize::query_tokens`]). Order:
/// score desc, most recently updated first, name asc, tags before aliases.
pub fn search_sync(
    conn: &Connection,
    guild: GuildId,
    tokens: &[String],
    mode: MatchMode,
    limit: usize,
    offset: usize,
) -> Result<Vec<SearchMatch>> {
    if tokens.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let required = match mode {
        MatchMode::All => tokens.len(),
        MatchMode::Any => 1,
    };
    let tokens_json = serde_json::to_string(tokens).map_err(|e| TagError::Other(e.to_string()))?;
    let (limit, offset) = sql_window(limit, offset)?;

    let mut stmt = conn.prepare_cached(
        "SELECT p.kind, p.name, SUM(p.tf) AS score, COUNT(*) AS matched, e.updated_at
         FROM search_postings p
         JOIN search_entries e
           ON e.guild_id = p.guild_id AND e.kind = p.kind AND e.name = p.name
         WHERE p.guild_id = ?1 AND p.token IN (SELECT value FROM json_each(?2))
         GROUP BY p.kind, p.name
         HAVING COUNT(*) >= ?3
         ORDER BY score DESC, e.updated_at DESC, p.name ASC,
                  CASE p.kind WHEN 'tag' THEN 0 ELSE 1 END
         LIMIT ?4 OFFSET ?5",
    )?;
    let rows = stmt.query_map(
        params![
            guild,
            tokens_json,
            required as i64,
            limit,
            offset
        ],
        |row| {
            let updated_at: String = row.get(4)?;
            Ok((
                row.get::<_, EntityKind>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                updated_at,
            ))
        },
    )?;

    let mut matches = Vec::new();
    for row in rows {
        let (kind, name, score, matched, updated_at) = row?;
        let updated_at = parse_timestamp(&updated_at)
            .ok_or_else(|| TagError::Other(format!("bad index timestamp: {updated_at}")))?;
        matches.push(SearchMatch {
            kind,
            name,
            score,
            matched,
            updated_at,
        });
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tags::{put_alias_sync, put_tag_sync, update_content_sync};
    use crate::db::test_support::setup_test_connection;
    use crate::search::index::{IndexEntry, IndexKey, index_insert_sync, index_replace_sync};
    use crate::search::tokenize::query_tokens;

    const G: GuildId = GuildId(5);

    fn add_tag(conn: &Connection, name: &str, content: &str) {
        put_tag_sync(conn, G, name, content, None).unwrap();
        let tag = get_tag_sync(conn, G, name).unwrap().unwrap();
        index_insert_sync(conn, G, &IndexEntry::for_tag(&tag)).unwrap();
    }

    fn add_alias(conn: &Connection, name: &str, target: &str) {
        let alias = put_alias_sync(conn, G, name, target, None).unwrap();
        index_insert_sync(conn, G, &IndexEntry::for_alias(&alias)).unwrap();
    }

    fn names(conn: &Connection, q: &str, mode: MatchMode) -> Vec<String> {
        search_sync(conn, G, &query_tokens(q), mode, 50, 0)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect()
    }

    // ═══════════════════════════════════════
    // resolution
    // ═══════════════════════════════════════

    #[test]
    fn test_resolve_direct_and_via_alias() {
        let conn = setup_test_connection();
        add_tag(&conn, "foo", "bar");
        add_alias(&conn, "baz", "foo");

        let direct = resolve_sync(&conn, G, "foo").unwrap();
        assert_eq!(direct.tag.content, "bar");
        assert!(direct.via_alias.is_none());

        let hop = resolve_sync(&conn, G, "baz").unwrap();
        assert_eq!(hop.tag.name, "foo");
        assert_eq!(hop.via_alias.unwrap().name, "baz");
        assert_eq!(hop.tag.uses, 2);

        assert!(matches!(resolve_sync(&conn, G, "nope"), Err(TagError::NotFound { .. })));
    }

    #[test]
    fn test_lookup_does_not_count_use() {
        let conn = setup_test_connection();
        add_tag(&conn, "foo", "bar");
        add_alias(&conn, "b", "foo");
        add_alias(&conn, "a", "foo");

        let info = lookup_sync(&conn, G, "b").unwrap();
        assert_eq!(info.via_alias.as_deref(), Some("b"));
        let alias_names: Vec<_> = info.aliases.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(alias_names, vec!["a", "b"]);
        assert_eq!(get_tag_sync(&conn, G, "foo").unwrap().unwrap().uses, 0);
    }

    // ═══════════════════════════════════════
    // search
    // ═══════════════════════════════════════

    #[test]
    fn test_search_single_match() {
        let conn = setup_test_connection();
        add_tag(&conn, "foo", "the quick brown fox");
        add_tag(&conn, "other", "slow green turtle");
        assert_eq!(names(&conn, "quick", MatchMode::All), vec!["foo"]);
    }

    #[test]
    fn test_search_ranks_by_term_frequency() {
        let conn = setup_test_connection();
        add_tag(&conn, "once", "rust is fine");
        add_tag(&conn, "thrice", "rust rust and more rust");
        assert_eq!(names(&conn, "rust", MatchMode::All), vec!["thrice", "once"]);
    }

    #[test]
    fn test_search_modes() {
        let conn = setup_test_connection();
        add_tag(&conn, "both", "apple banana");
        add_tag(&conn, "one", "apple cherry");

        assert_eq!(names(&conn, "apple banana", MatchMode::All), vec!["both"]);
        let any = names(&conn, "apple banana", MatchMode::Any);
        assert_eq!(any, vec!["both", "one"]);
    }

    #[test]
    fn test_search_tie_breaks() {
        let conn = setup_test_connection();
        add_tag(&conn, "zeta", "shared word");
        add_tag(&conn, "alpha", "shared word");
        // equal timestamps fall back to name order
        conn.execute_batch(
            "UPDATE search_entries SET updated_at = '2024-01-01T00:00:00.000000Z';",
        )
        .unwrap();
        assert_eq!(names(&conn, "shared", MatchMode::All), vec!["alpha", "zeta"]);

        // a more recent edit wins the tie
        update_content_sync(&conn, G, "zeta", "shared word").unwrap();
        let tag = get_tag_sync(&conn, G, "zeta").unwrap().unwrap();
        index_replace_sync(&conn, G, &IndexKey::tag("zeta"), &IndexEntry::for_tag(&tag)).unwrap();
        assert_eq!(names(&conn, "shared", MatchMode::All), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_search_alias_scores_own_and_target_name() {
        let conn = setup_test_connection();
        add_tag(&conn, "deploy", "steps for shipping");
        add_alias(&conn, "deploy-guide", "deploy");

        let hits = search_sync(&conn, G, &query_tokens("deploy"), MatchMode::All, 10, 0).unwrap();
        // the alias mentions "deploy" in its name and in its target
        assert_eq!(hits[0].kind, EntityKind::Alias);
        assert_eq!(hits[0].score, 2);
        assert_eq!(hits[1].kind, EntityKind::Tag);
        assert_eq!(hits[1].score, 1);
    }

    #[test]
    fn test_search_paging_and_empty_query() {
        let conn = setup_test_connection();
        for name in ["a", "b", "c"] {
            add_tag(&conn, name, "common");
        }
        conn.execute_batch(
            "UPDATE search_entries SET updated_at = '2024-01-01T00:00:00.000000Z';",
        )
        .unwrap();
        let tokens = query_tokens("common");
        let first = search_sync(&conn, G, &tokens, MatchMode::All, 2, 0).unwrap();
        let second = search_sync(&conn, G, &tokens, MatchMode::All, 2, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "c");

        assert!(search_sync(&conn, G, &[], MatchMode::Any, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_match_mode_parse() {
        assert_eq!("ANY".parse::<MatchMode>().unwrap(), MatchMode::Any);
        assert_eq!(MatchMode::default().to_string(), "all");
    }
}
