// store/queries.rs
// Read paths: resolution, search, listings, index maintenance

use tracing::{info, warn};

use super::page::{Cursor, Page, SearchOptions, SearchPager};
use super::TagStore;
use crate::db::tags::{
    aliases_for_tag_sync, get_tag_sync, list_by_owner_sync, list_tags_by_uses_sync,
};
use crate::db::{Alias, EntityKind, GuildId, Tag, UserId, normalize_name};
use crate::error::{Result, TagError};
use crate::search::index::{IndexReport, rebuild_index_sync, verify_index_sync};
use crate::search::query::{SearchMatch, TagInfo, lookup_sync, resolve_sync, search_sync};
use crate::search::tokenize::query_tokens;

impl TagStore {
    /// Content for `name`, following at most one alias hop.
    ///
    /// Counts one use against the underlying tag. The lookup and the
    /// increment share a write transaction so concurrent resolves all count.
    pub async fn resolve(&self, guild: GuildId, name: &str) -> Result<String> {
        let name = normalize_name(name)?;
        let resolved = self
            .pool
            .write(move |tx| resolve_sync(tx, guild, &name))
            .await?;
        Ok(resolved.tag.content)
    }

    /// Tag details and aliases, without counting a use
    pub async fn lookup(&self, guild: GuildId, name: &str) -> Result<TagInfo> {
        let name = normalize_name(name)?;
        self.pool
            .read(move |tx| lookup_sync(tx, guild, &name))
            .await
    }

    /// Aliases pointing at a tag
    pub async fn aliases_of(&self, guild: GuildId, tag_name: &str) -> Result<Vec<Alias>> {
        let tag_name = normalize_name(tag_name)?;
        self.pool
            .read(move |tx| {
                if get_tag_sync(tx, guild, &tag_name)?.is_none() {
                    return Err(TagError::not_found(&tag_name));
                }
                aliases_for_tag_sync(tx, guild, &tag_name)
            })
            .await
    }

    /// Everything `owner` owns in a guild: tags first, then aliases
    pub async fn list_by_owner(
        &self,
        guild: GuildId,
        owner: UserId,
    ) -> Result<Vec<(EntityKind, String)>> {
        self.pool
            .read(move |tx| list_by_owner_sync(tx, guild, owner))
            .await
    }

    /// Most used tags first
    pub async fn leaderboard(
        &self,
        guild: GuildId,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<Page<Tag>> {
        let limit = self.search.clamp_limit(limit);
        if limit == 0 {
            return Ok(Page::empty());
        }
        let offset = cursor.map(Cursor::offset).unwrap_or(0);
        let rows = self
            .pool
            .read(move |tx| list_tags_by_uses_sync(tx, guild, limit + 1, offset))
            .await?;
        Ok(Page::from_overfetch(rows, limit, offset))
    }

    /// Ranked search using the configured default match mode
    pub async fn search(
        &self,
        guild: GuildId,
        query: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<Page<SearchMatch>> {
        let options = SearchOptions::new(self.search.default_mode, limit).starting_at(cursor);
        self.search_with(guild, query, options).await
    }

    /// Ranked search with explicit options
    pub async fn search_with(
        &self,
        guild: GuildId,
        query: &str,
        options: SearchOptions,
    ) -> Result<Page<SearchMatch>> {
        let tokens = query_tokens(query);
        let limit = self.search.clamp_limit(options.limit);
        if tokens.is_empty() || limit == 0 {
            return Ok(Page::empty());
        }
        let offset = options.cursor.map(Cursor::offset).unwrap_or(0);
        let mode = options.mode;

        let hits = self
            .pool
            .read(move |tx| search_sync(tx, guild, &tokens, mode, limit + 1, offset))
            .await?;
        Ok(Page::from_overfetch(hits, limit, offset))
    }

    /// Lazily page through every match for a query
    pub fn search_pages(&self, guild: GuildId, query: &str, options: SearchOptions) -> SearchPager {
        SearchPager::new(self.clone(), guild, query.to_string(), options)
    }

    /// Compare a guild's search index with its tags and aliases
    pub async fn verify_index(&self, guild: GuildId) -> Result<IndexReport> {
        self.pool
            .read(move |tx| verify_index_sync(tx, guild))
            .await
    }

    /// Rebuild a guild's search index from scratch in one transaction
    pub async fn rebuild_index(&self, guild: GuildId) -> Result<usize> {
        let count = self
            .pool
            .write(move |tx| rebuild_index_sync(tx, guild))
            .await
            .inspect_err(|e| warn!(guild = %guild, error = %e, "Index rebuild failed"))?;
        info!(guild = %guild, entries = count, "Rebuilt search index");
        Ok(count)
    }
}
