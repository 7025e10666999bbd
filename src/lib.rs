// src/lib.rs
// Per-guild tag and alias store with a synchronously maintained search index

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod db;
pub mod error;
pub mod search;
pub mod store;

pub use db::{Alias, EntityKind, GuildId, Tag, TagId, UserId};
pub use error::{Result, TagError};
pub use search::{IndexReport, MatchMode, SearchMatch, TagInfo};
pub use store::{Cursor, DirectoryEvent, Page, Requester, SearchOptions, SearchPager, TagStore};
