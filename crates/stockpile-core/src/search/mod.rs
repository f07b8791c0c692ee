//! In-memory text search over the local store.
//!
//! The index is a flat list of (name, code) entries rebuilt from the
//! entities table when stale. Matching is case-insensitive substring search;
//! freshness is time-based, with explicit invalidation after local writes.

use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::error::Result;
use crate::models::EntityKind;

/// One hit from the text index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    /// Entity identifier (offline or real)
    pub id: String,
    /// Entity kind
    pub kind: EntityKind,
    /// Display name
    pub name: String,
    /// Natural key, when present
    pub code: Option<String>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    hit: SearchMatch,
    name_lower: String,
    code_lower: Option<String>,
}

/// Time-bounded text index over entity names and codes
pub struct SearchIndex {
    entries: Vec<IndexEntry>,
    built_at: Option<Instant>,
    ttl: Duration,
}

impl SearchIndex {
    /// Create an empty index with the given time-to-live
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            built_at: None,
            ttl,
        }
    }

    /// Whether the index must be rebuilt before serving queries
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.built_at
            .is_none_or(|built_at| built_at.elapsed() >= self.ttl)
    }

    /// Drop the built index so the next query rebuilds it
    pub fn invalidate(&mut self) {
        self.built_at = None;
        self.entries.clear();
    }

    /// Rebuild the index from the entities table
    pub fn rebuild(&mut self, conn: &Connection) -> Result<()> {
        let mut stmt =
            conn.prepare("SELECT id, kind, name, code FROM entities ORDER BY updated_at DESC")?;
        let entries = stmt
            .query_map([], |row| {
                let kind: String = row.get(1)?;
                Ok((
                    row.get::<_, String>(0)?,
                    kind,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.entries = entries
            .into_iter()
            .map(|(id, kind, name, code)| {
                Ok(IndexEntry {
                    name_lower: name.to_lowercase(),
                    code_lower: code.as_ref().map(|code| code.to_lowercase()),
                    hit: SearchMatch {
                        id,
                        kind: kind.parse()?,
                        name,
                        code,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.built_at = Some(Instant::now());
        tracing::debug!(entries = self.entries.len(), "rebuilt search index");
        Ok(())
    }

    /// Case-insensitive substring search over names and codes, rebuilding
    /// the index first when stale. An empty query matches nothing.
    pub fn search(&mut self, conn: &Connection, query: &str) -> Result<Vec<SearchMatch>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if self.is_stale() {
            self.rebuild(conn)?;
        }

        Ok(self
            .entries
            .iter()
            .filter(|entry| {
                entry.name_lower.contains(&query)
                    || entry
                        .code_lower
                        .as_ref()
                        .is_some_and(|code| code.contains(&query))
            })
            .map(|entry| entry.hit.clone())
            .collect())
    }
}
