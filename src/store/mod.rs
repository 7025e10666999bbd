// store/mod.rs
// TagStore: the async entry point wrapping every mutation in one transaction
//
// Each mutation validates its input up front, then runs
// permission checks -> name guard -> canonical writes -> index updates
// inside a single BEGIN IMMEDIATE transaction. An error anywhere rolls back
// the rows and the index together.

mod events;
mod page;
mod queries;

pub use events::DirectoryEvent;
pub use page::{Cursor, Page, SearchOptions, SearchPager};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{SearchConfig, TagStoreConfig};
use crate::db::guard::{name_holder_sync, validate_content};
use crate::db::tags::{
    aliases_for_tag_sync, delete_alias_sync, delete_guild_sync, delete_tag_sync, get_alias_sync,
    get_tag_sync, put_alias_sync, put_tag_sync, rename_tag_sync, set_alias_owner_sync,
    set_tag_owner_sync, update_content_sync,
};
use crate::db::{
    DatabasePool, EntityKind, GuildId, GuildPurge, PoolOptions, TagId, UserId,
    check_name_available_sync, normalize_name,
};
use crate::error::{Result, TagError};
use crate::search::index::{
    IndexEntry, IndexKey, clear_guild_index_sync, index_insert_sync, index_remove_sync,
    index_replace_sync,
};
use crate::search::query::find_sync;

/// Who is asking for a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    /// Holds guild administration rights
    pub is_admin: bool,
}

impl Requester {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    /// Owners may change their own entries; admins may change anything.
    /// Unowned entries are admin-only until someone claims them.
    pub fn may_modify(&self, owner: Option<UserId>) -> bool {
        self.is_admin || owner == Some(self.user_id)
    }

    fn ensure_may_modify(&self, owner: Option<UserId>, name: &str) -> Result<()> {
        if self.may_modify(owner) {
            Ok(())
        } else {
            Err(TagError::PermissionDenied {
                name: name.to_string(),
            })
        }
    }
}

/// Shared handle to a tag store. Cheap to clone.
#[derive(Clone)]
pub struct TagStore {
    pool: Arc<DatabasePool>,
    search: Arc<SearchConfig>,
}

impl TagStore {
    /// Open the store described by a config (path, pool, search limits)
    pub async fn open(config: &TagStoreConfig) -> Result<Self> {
        config.validate()?;
        let store = Self::open_path(&config.db_path(), config.pool_options()).await?;
        Ok(store.with_search_config(config.search.clone()))
    }

    /// Open a file-backed store with default search settings
    pub async fn open_path(path: &Path, options: PoolOptions) -> Result<Self> {
        let pool = DatabasePool::open(path, options)
            .await
            .map_err(|e| TagError::StorageUnavailable(format!("{e:#}")))?;
        info!(path = %path.display(), "Opened tag store");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Open a private in-memory store
    pub async fn open_in_memory() -> Result<Self> {
        let pool = DatabasePool::open_in_memory()
            .await
            .map_err(|e| TagError::StorageUnavailable(format!("{e:#}")))?;
        Ok(Self::from_pool(Arc::new(pool)))
    }

    pub fn from_pool(pool: Arc<DatabasePool>) -> Self {
        Self {
            pool,
            search: Arc::new(SearchConfig::default()),
        }
    }

    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = Arc::new(search);
        self
    }

    pub fn pool(&self) -> &Arc<DatabasePool> {
        &self.pool
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    // ═══════════════════════════════════════
    // creation
    // ═══════════════════════════════════════

    /// Create a tag owned by `owner`
    pub async fn create_tag(
        &self,
        guild: GuildId,
        name: &str,
        content: &str,
        owner: UserId,
    ) -> Result<TagId> {
        let name = normalize_name(name)?;
        validate_content(content)?;
        let content = content.to_string();

        let tag_name = name.clone();
        let id = self
            .pool
            .write(move |tx| {
                check_name_available_sync(tx, guild, &name, EntityKind::Tag)?;
                let id = put_tag_sync(tx, guild, &name, &content, Some(owner))?;
                let tag = get_tag_sync(tx, guild, &name)?
                    .ok_or_else(|| TagError::not_found(&name))?;
                index_insert_sync(tx, guild, &IndexEntry::for_tag(&tag))?;
                Ok(id)
            })
            .await?;

        debug!(guild = %guild, name = %tag_name, id = %id, "Created tag");
        Ok(id)
    }

    /// Create an alias for an existing tag. An alias given as the target
    /// binds the new alias to that alias's tag.
    pub async fn create_alias(
        &self,
        guild: GuildId,
        alias_name: &str,
        target_name: &str,
        owner: UserId,
    ) -> Result<()> {
        let alias_name = normalize_name(alias_name)?;
        let target_name = normalize_name(target_name)?;

        let alias = self
            .pool
            .write(move |tx| {
                check_name_available_sync(tx, guild, &alias_name, EntityKind::Alias)?;
                let alias = put_alias_sync(tx, guild, &alias_name, &target_name, Some(owner))?;
                index_insert_sync(tx, guild, &IndexEntry::for_alias(&alias))?;
                Ok(alias)
            })
            .await?;

        debug!(guild = %guild, alias = %alias.name, target = %alias.target_name, "Created alias");
        Ok(())
    }

    // ═══════════════════════════════════════
    // modification
    // ═══════════════════════════════════════

    /// Replace a tag's content. An alias name edits the tag it points at.
    pub async fn edit_tag(
        &self,
        guild: GuildId,
        name: &str,
        new_content: &str,
        requester: Requester,
    ) -> Result<()> {
        let name = normalize_name(name)?;
        validate_content(new_content)?;
        let content = new_content.to_string();

        let edited = self
            .pool
            .write(move |tx| {
                let tag = find_sync(tx, guild, &name)?
                    .ok_or_else(|| TagError::not_found(&name))?
                    .tag;
                requester.ensure_may_modify(tag.owner, &tag.name)?;

                update_content_sync(tx, guild, &tag.name, &content)?;
                let updated = get_tag_sync(tx, guild, &tag.name)?
                    .ok_or_else(|| TagError::not_found(&tag.name))?;
                index_replace_sync(
                    tx,
                    guild,
                    &IndexKey::tag(&tag.name),
                    &IndexEntry::for_tag(&updated),
                )?;
                Ok(updated.name)
            })
            .await?;

        debug!(guild = %guild, name = %edited, "Edited tag");
        Ok(())
    }

    /// Rename a tag; aliases follow it to the new name
    pub async fn rename_tag(
        &self,
        guild: GuildId,
        old_name: &str,
        new_name: &str,
        requester: Requester,
    ) -> Result<()> {
        let old = normalize_name(old_name)?;
        let new = normalize_name(new_name)?;

        let (from, to) = (old.clone(), new.clone());
        let moved = self
            .pool
            .write(move |tx| {
                let tag = get_tag_sync(tx, guild, &old)?.ok_or_else(|| TagError::not_found(&old))?;
                requester.ensure_may_modify(tag.owner, &tag.name)?;
                if old == new {
                    return Ok(0);
                }

                check_name_available_sync(tx, guild, &new, EntityKind::Tag)?;
                let aliases = aliases_for_tag_sync(tx, guild, &old)?;
                rename_tag_sync(tx, guild, &old, &new)?;

                let renamed = get_tag_sync(tx, guild, &new)?
                    .ok_or_else(|| TagError::not_found(&new))?;
                index_replace_sync(
                    tx,
                    guild,
                    &IndexKey::tag(&old),
                    &IndexEntry::for_tag(&renamed),
                )?;
                // Alias entries index their target's name, so they change too
                for mut alias in aliases {
                    alias.target_name = new.clone();
                    index_replace_sync(
                        tx,
                        guild,
                        &IndexKey::alias(&alias.name),
                        &IndexEntry::for_alias(&alias),
                    )?;
                }
                Ok(1)
            })
            .await?;

        if moved > 0 {
            debug!(guild = %guild, from = %from, to = %to, "Renamed tag");
        }
        Ok(())
    }

    /// Give an unowned tag or alias to `user`
    pub async fn claim(&self, guild: GuildId, name: &str, user: UserId) -> Result<EntityKind> {
        let name = normalize_name(name)?;

        let claimed = name.clone();
        let kind = self
            .pool
            .write(move |tx| {
                let kind = name_holder_sync(tx, guild, &name)?
                    .ok_or_else(|| TagError::not_found(&name))?;
                let owner = match kind {
                    EntityKind::Tag => get_tag_sync(tx, guild, &name)?.and_then(|t| t.owner),
                    EntityKind::Alias => get_alias_sync(tx, guild, &name)?.and_then(|a| a.owner),
                };
                if let Some(owner) = owner {
                    return Err(TagError::AlreadyOwned { name, owner });
                }
                match kind {
                    EntityKind::Tag => set_tag_owner_sync(tx, guild, &name, Some(user))?,
                    EntityKind::Alias => set_alias_owner_sync(tx, guild, &name, Some(user))?,
                }
                Ok(kind)
            })
            .await?;

        debug!(guild = %guild, name = %claimed, kind = %kind, user = %user, "Claimed entry");
        Ok(kind)
    }

    // ═══════════════════════════════════════
    // deletion
    // ═══════════════════════════════════════

    /// Delete a tag and every alias pointing at it
    pub async fn delete_tag(&self, guild: GuildId, name: &str, requester: Requester) -> Result<()> {
        let name = normalize_name(name)?;
        let deleted = name.clone();
        let cascaded = self
            .pool
            .write(move |tx| delete_tag_in(tx, guild, &name, requester))
            .await?;
        debug!(guild = %guild, name = %deleted, aliases = cascaded, "Deleted tag");
        Ok(())
    }

    pub async fn delete_alias(
        &self,
        guild: GuildId,
        alias_name: &str,
        requester: Requester,
    ) -> Result<()> {
        let alias_name = normalize_name(alias_name)?;
        let deleted = alias_name.clone();
        self.pool
            .write(move |tx| delete_alias_in(tx, guild, &alias_name, requester))
            .await?;
        debug!(guild = %guild, alias = %deleted, "Deleted alias");
        Ok(())
    }

    /// Delete whichever kind of entry holds `name`
    pub async fn delete_entry(
        &self,
        guild: GuildId,
        name: &str,
        requester: Requester,
    ) -> Result<EntityKind> {
        let name = normalize_name(name)?;
        let deleted = name.clone();
        let kind = self
            .pool
            .write(move |tx| {
                let kind = name_holder_sync(tx, guild, &name)?
                    .ok_or_else(|| TagError::not_found(&name))?;
                match kind {
                    EntityKind::Tag => {
                        delete_tag_in(tx, guild, &name, requester)?;
                    }
                    EntityKind::Alias => delete_alias_in(tx, guild, &name, requester)?,
                }
                Ok(kind)
            })
            .await?;
        debug!(guild = %guild, name = %deleted, kind = %kind, "Deleted entry");
        Ok(kind)
    }

    /// Remove every tag, alias and index entry of a guild
    pub async fn wipe_guild(&self, guild: GuildId) -> Result<GuildPurge> {
        let purge = self
            .pool
            .write(move |tx| {
                let purge = delete_guild_sync(tx, guild)?;
                clear_guild_index_sync(tx, guild)?;
                Ok(purge)
            })
            .await?;
        info!(guild = %guild, tags = purge.tags, aliases = purge.aliases, "Wiped guild");
        Ok(purge)
    }
}

fn delete_tag_in(
    conn: &Connection,
    guild: GuildId,
    name: &str,
    requester: Requester,
) -> Result<usize> {
    let tag = get_tag_sync(conn, guild, name)?.ok_or_else(|| TagError::not_found(name))?;
    requester.ensure_may_modify(tag.owner, name)?;

    let aliases = delete_tag_sync(conn, guild, name)?.ok_or_else(|| TagError::not_found(name))?;
    index_remove_sync(conn, guild, &IndexKey::tag(name))?;
    for alias in &aliases {
        index_remove_sync(conn, guild, &IndexKey::alias(&alias.name))?;
    }
    Ok(aliases.len())
}

fn delete_alias_in(
    conn: &Connection,
    guild: GuildId,
    alias_name: &str,
    requester: Requester,
) -> Result<()> {
    let alias = get_alias_sync(conn, guild, alias_name)?
        .ok_or_else(|| TagError::not_found(alias_name))?;
    requester.ensure_may_modify(alias.owner, alias_name)?;

    delete_alias_sync(conn, guild, alias_name)?;
    index_remove_sync(conn, guild, &IndexKey::alias(alias_name))?;
    Ok(())
}
