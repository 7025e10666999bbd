// store/page.rs
// Offset cursors, result pages, and the lazy search pager

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TagStore;
use crate::db::GuildId;
use crate::error::{Result, TagError};
use crate::search::{MatchMode, SearchMatch};

/// Opaque position in an ordered result set.
///
/// Printing a cursor and parsing it back resumes from the same place, so a
/// caller can hand it out between requests. Offsets never exceed `i64::MAX`,
/// the largest OFFSET SQLite accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Cursor(usize);

impl Cursor {
    pub(crate) fn at(offset: usize) -> Self {
        Self(offset)
    }

    pub(crate) fn offset(self) -> usize {
        self.0
    }
}

impl TryFrom<u64> for Cursor {
    type Error = TagError;

    fn try_from(raw: u64) -> Result<Self> {
        if i64::try_from(raw).is_err() {
            return Err(TagError::InvalidCursor(raw.to_string()));
        }
        usize::try_from(raw)
            .map(Cursor)
            .map_err(|_| TagError::InvalidCursor(raw.to_string()))
    }
}

impl From<Cursor> for u64 {
    fn from(cursor: Cursor) -> Self {
        cursor.0 as u64
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|_| TagError::InvalidCursor(format!("{s:?}")))?;
        Cursor::try_from(raw)
    }
}

/// One page of results plus where the next page starts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` on the last page
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Build a page from a query that fetched `limit + 1` rows at `offset`
    pub(crate) fn from_overfetch(mut items: Vec<T>, limit: usize, offset: usize) -> Self {
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            offset.checked_add(limit).map(Cursor::at)
        } else {
            None
        };
        Self { items, next_cursor }
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Search parameters beyond the query text
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub mode: MatchMode,
    pub limit: usize,
    pub cursor: Option<Cursor>,
}

impl SearchOptions {
    pub fn new(mode: MatchMode, limit: usize) -> Self {
        Self {
            mode,
            limit,
            cursor: None,
        }
    }

    pub fn starting_at(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Walks search results page by page.
///
/// Each page is a separate read, so pages reflect whatever was committed
/// when they were fetched. The sequence ends after the first page without a
/// next cursor.
pub struct SearchPager {
    store: TagStore,
    guild: GuildId,
    query: String,
    options: SearchOptions,
    done: bool,
}

impl SearchPager {
    pub(crate) fn new(
        store: TagStore,
        guild: GuildId,
        query: String,
        options: SearchOptions,
    ) -> Self {
        Self {
            store,
            guild,
            query,
            options,
            done: false,
        }
    }

    /// Cursor the next call will start from
    pub fn cursor(&self) -> Option<Cursor> {
        self.options.cursor
    }

    /// Fetch the next page, or `None` once the results are exhausted
    pub async fn next_page(&mut self) -> Result<Option<Page<SearchMatch>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .store
            .search_with(self.guild, &self.query, self.options.clone())
            .await?;
        self.options.cursor = page.next_cursor;
        self.done = page.next_cursor.is_none();
        Ok(Some(page))
    }

    /// Drain the remaining pages into one list
    pub async fn collect_all(mut self) -> Result<Vec<SearchMatch>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page.items);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_text_roundtrip() {
        let cursor = Cursor::at(40);
        let parsed: Cursor = cursor.to_string().parse().unwrap();
        assert_eq!(parsed, cursor);
        assert!("next".parse::<Cursor>().is_err());
    }

    #[test]
    fn test_cursor_rejects_offsets_beyond_sql_range() {
        let max: Cursor = i64::MAX.to_string().parse().unwrap();
        assert_eq!(max.offset() as u64, i64::MAX as u64);

        let err = u64::MAX.to_string().parse::<Cursor>().unwrap_err();
        assert!(matches!(err, TagError::InvalidCursor(_)));
        let err = (i64::MAX as u64 + 1).to_string().parse::<Cursor>().unwrap_err();
        assert!(matches!(err, TagError::InvalidCursor(_)));

        assert!(serde_json::from_str::<Cursor>(&u64::MAX.to_string()).is_err());
        let json: Cursor = serde_json::from_str("12").unwrap();
        assert_eq!(json, Cursor::at(12));
    }

    #[test]
    fn test_page_from_overfetch() {
        let page = Page::from_overfetch(vec![1, 2, 3], 2, 4);
        assert_eq!(page.items, vec![1, 2]);
        assert_eq!(page.next_cursor, Some(Cursor::at(6)));

        let last = Page::from_overfetch(vec![1], 2, 0);
        assert!(last.is_last());

        // No next cursor once the offset cannot advance
        let end = Page::from_overfetch(vec![1, 2], 1, usize::MAX);
        assert_eq!(end.items, vec![1]);
        assert!(end.is_last());
    }
}
