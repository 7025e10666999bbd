// search/mod.rs
// Per-guild full-text index over tags and aliases

pub mod index;
pub mod query;
pub mod tokenize;

pub use index::{IndexEntry, IndexKey, IndexReport};
pub use query::{MatchMode, Resolved, SearchMatch, TagInfo};
pub use tokenize::tokenize;
