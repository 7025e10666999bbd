// src/cli/commands.rs
// Command handlers: open the store, run one operation, print the result

use anyhow::{Result, bail};
use serde::Serialize;
use tagstore::config::TagStoreConfig;
use tagstore::store::{Cursor, Requester, SearchOptions, TagStore};
use tagstore::{GuildId, MatchMode, UserId};

use super::{Cli, Commands};

/// Print `value` as pretty JSON, or the text rendering otherwise
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let out = text(value);
        if !out.is_empty() {
            println!("{out}");
        }
    }
    Ok(())
}

fn parse_cursor(raw: Option<String>) -> Result<Option<Cursor>> {
    raw.map(|c| c.parse::<Cursor>().map_err(Into::into))
        .transpose()
}

pub async fn run(cli: Cli, mut config: TagStoreConfig) -> Result<()> {
    if let Some(db) = cli.db {
        config.storage.path = Some(db);
    }
    let store = TagStore::open(&config).await?;

    let guild = GuildId(cli.guild);
    let user = UserId(cli.user);
    let requester = Requester {
        user_id: user,
        is_admin: cli.admin,
    };
    let json = cli.json;

    match cli.command {
        Commands::Create { name, content } => {
            let id = store.create_tag(guild, &name, &content, user).await?;
            emit(json, &id, |id| format!("Created tag {} (id {id})", name.trim()))?;
        }
        Commands::Alias { name, target } => {
            store.create_alias(guild, &name, &target, user).await?;
            emit(json, &serde_json::json!({"alias": name, "target": target}), |_| {
                format!("Created alias {} -> {}", name.trim(), target.trim())
            })?;
        }
        Commands::Resolve { name } => {
            let content = store.resolve(guild, &name).await?;
            emit(json, &content, |c| c.clone())?;
        }
        Commands::Info { name } => {
            let info = store.lookup(guild, &name).await?;
            emit(json, &info, |info| {
                let mut lines = vec![
                    format!("name:    {}", info.tag.name),
                    format!(
                        "owner:   {}",
                        info.tag
                            .owner
                            .map(|o| o.to_string())
                            .unwrap_or_else(|| "(none)".into())
                    ),
                    format!("uses:    {}", info.tag.uses),
                    format!("created: {}", info.tag.created_at.to_rfc3339()),
                ];
                if let Some(edited) = info.tag.edited_at {
                    lines.push(format!("edited:  {}", edited.to_rfc3339()));
                }
                if let Some(via) = &info.via_alias {
                    lines.push(format!("via:     alias {via}"));
                }
                if !info.aliases.is_empty() {
                    let names: Vec<_> = info.aliases.iter().map(|a| a.name.as_str()).collect();
                    lines.push(format!("aliases: {}", names.join(", ")));
                }
                lines.join("\n")
            })?;
        }
        Commands::Search {
            query,
            limit,
            any,
            cursor,
        } => {
            let mode = if any {
                MatchMode::Any
            } else {
                store.search_config().default_mode
            };
            let limit = limit.unwrap_or(store.search_config().default_limit);
            let options = SearchOptions::new(mode, limit).starting_at(parse_cursor(cursor)?);
            let page = store.search_with(guild, &query, options).await?;
            emit(json, &page, |page| {
                let mut lines: Vec<String> = page
                    .items
                    .iter()
                    .map(|m| format!("{:>4}  {:<5}  {}", m.score, m.kind.as_str(), m.name))
                    .collect();
                if lines.is_empty() {
                    lines.push("No matches".into());
                }
                if let Some(next) = page.next_cursor {
                    lines.push(format!("(more: --cursor {next})"));
                }
                lines.join("\n")
            })?;
        }
        Commands::Edit { name, content } => {
            store.edit_tag(guild, &name, &content, requester).await?;
            emit(json, &serde_json::json!({"edited": name}), |_| {
                format!("Edited {}", name.trim())
            })?;
        }
        Commands::Rename { old, new } => {
            store.rename_tag(guild, &old, &new, requester).await?;
            emit(json, &serde_json::json!({"from": old, "to": new}), |_| {
                format!("Renamed {} -> {}", old.trim(), new.trim())
            })?;
        }
        Commands::Delete { name } => {
            let kind = store.delete_entry(guild, &name, requester).await?;
            emit(json, &serde_json::json!({"deleted": name, "kind": kind}), |_| {
                format!("Deleted {kind} {}", name.trim())
            })?;
        }
        Commands::Claim { name } => {
            let kind = store.claim(guild, &name, user).await?;
            emit(json, &serde_json::json!({"claimed": name, "kind": kind}), |_| {
                format!("Claimed {kind} {}", name.trim())
            })?;
        }
        Commands::List { owner } => {
            let owner = owner.map(UserId).unwrap_or(user);
            let entries = store.list_by_owner(guild, owner).await?;
            emit(json, &entries, |entries| {
                if entries.is_empty() {
                    return format!("User {owner} owns nothing here");
                }
                entries
                    .iter()
                    .map(|(kind, name)| format!("{:<5}  {name}", kind.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::Leaderboard { limit, cursor } => {
            let page = store.leaderboard(guild, limit, parse_cursor(cursor)?).await?;
            emit(json, &page, |page| {
                let mut lines: Vec<String> = page
                    .items
                    .iter()
                    .map(|t| format!("{:>6}  {}", t.uses, t.name))
                    .collect();
                if let Some(next) = page.next_cursor {
                    lines.push(format!("(more: --cursor {next})"));
                }
                lines.join("\n")
            })?;
        }
        Commands::Wipe { yes } => {
            if !yes {
                bail!("refusing to wipe guild {guild} without --yes");
            }
            let purge = store.wipe_guild(guild).await?;
            emit(
                json,
                &serde_json::json!({"tags": purge.tags, "aliases": purge.aliases}),
                |_| format!("Removed {} tags and {} aliases", purge.tags, purge.aliases),
            )?;
        }
        Commands::Check => {
            let report = store.verify_index(guild).await?;
            emit(json, &report, |r| {
                format!(
                    "checked {}: {} missing, {} stale, {} orphaned",
                    r.checked,
                    r.missing.len(),
                    r.stale.len(),
                    r.orphaned.len()
                )
            })?;
            if !report.is_clean() {
                bail!("search index out of sync; run `tagstore reindex`");
            }
        }
        Commands::Reindex => {
            let count = store.rebuild_index(guild).await?;
            emit(json, &count, |n| format!("Indexed {n} entries"))?;
        }
    }

    Ok(())
}
