// db/types.rs
// Records returned by store operations and the id newtypes they are keyed by

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        // SQLite integers are signed; snowflakes are stored bit-for-bit.
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0 as i64))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(|v| Self(v as u64))
            }
        }
    };
}

snowflake_id!(
    /// Guild (tenant) identifier
    GuildId
);
snowflake_id!(
    /// User identifier, used for ownership
    UserId
);

/// Surrogate row id of a tag. Aliases bind by name, not by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The two kinds of named entity sharing a guild's namespace
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Tag,
    Alias,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl ToSql for EntityKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntityKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse()
            .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

/// A tag row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub guild_id: GuildId,
    pub name: String,
    pub content: String,
    pub owner: Option<UserId>,
    pub uses: u64,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Tag {
    /// Timestamp used for recency ordering: last content edit, else creation.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.edited_at.unwrap_or(self.created_at)
    }
}

/// An alias row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub guild_id: GuildId,
    pub name: String,
    pub target_name: String,
    pub owner: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Column list matching [`parse_tag_row`]
pub const TAG_COLUMNS: &str =
    "id, guild_id, tag_name, content, user_id, uses, created_at, edited_at";

/// Column list matching [`parse_alias_row`]
pub const ALIAS_COLUMNS: &str = "guild_id, alias_name, tag_name, user_id, created_at";

/// Parse a Tag from a row selected with [`TAG_COLUMNS`]
pub fn parse_tag_row(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    let uses: i64 = row.get(5)?;
    let created_at: String = row.get(6)?;
    let edited_at: Option<String> = row.get(7)?;
    Ok(Tag {
        id: TagId(row.get(0)?),
        guild_id: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        owner: row.get(4)?,
        uses: uses.max(0) as u64,
        created_at: column_timestamp(6, &created_at)?,
        edited_at: edited_at
            .as_deref()
            .map(|ts| column_timestamp(7, ts))
            .transpose()?,
    })
}

/// Parse an Alias from a row selected with [`ALIAS_COLUMNS`]
pub fn parse_alias_row(row: &rusqlite::Row) -> rusqlite::Result<Alias> {
    let created_at: String = row.get(4)?;
    Ok(Alias {
        guild_id: row.get(0)?,
        name: row.get(1)?,
        target_name: row.get(2)?,
        owner: row.get(3)?,
        created_at: column_timestamp(4, &created_at)?,
    })
}

// Fixed-width so that TEXT ordering in SQL matches chronological ordering.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Format a timestamp for storage
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn column_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {s}").into(),
        )
    })
}

/// Current time, truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&format_timestamp(now)).unwrap_or(now)
}
