// store/events.rs
// Inbound notifications from the user/guild directory

use serde::{Deserialize, Serialize};
use tracing::info;

use super::TagStore;
use crate::db::tags::unauthor_sync;
use crate::db::{GuildId, UserId};
use crate::error::Result;

/// Something changed in the directory that owns guilds and users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DirectoryEvent {
    /// The guild is gone: drop all of its tags, aliases and index entries
    GuildRemoved { guild_id: GuildId },
    /// The user is gone everywhere: their entries survive without an owner
    UserRemoved { user_id: UserId },
    /// The user left one guild: unown their entries there only
    MemberLeft { guild_id: GuildId, user_id: UserId },
}

impl TagStore {
    /// Apply a directory event. Returns how many tags and aliases it touched.
    pub async fn apply_event(&self, event: DirectoryEvent) -> Result<usize> {
        match event {
            DirectoryEvent::GuildRemoved { guild_id } => {
                let purge = self.wipe_guild(guild_id).await?;
                Ok(purge.tags + purge.aliases)
            }
            DirectoryEvent::UserRemoved { user_id } => {
                let changed = self
                    .pool
                    .write(move |tx| unauthor_sync(tx, user_id, None))
                    .await?;
                info!(user = %user_id, entries = changed, "Released entries of removed user");
                Ok(changed)
            }
            DirectoryEvent::MemberLeft { guild_id, user_id } => {
                let changed = self
                    .pool
                    .write(move |tx| unauthor_sync(tx, user_id, Some(guild_id)))
                    .await?;
                info!(
                    guild = %guild_id,
                    user = %user_id,
                    entries = changed,
                    "Released entries of departed member"
                );
                Ok(changed)
            }
        }
    }
}
