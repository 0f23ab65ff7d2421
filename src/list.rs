use crate::model::{ContentKind, ListEntry};
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use time::OffsetDateTime;
use uuid::Uuid;

/// Add or re-rate a catalog item in a user's list. Keyed by content id, so
/// rating the same item again overwrites the previous entry.
pub fn rate(
    conn: &Connection,
    user: &Uuid,
    content_id: &str,
    kind: ContentKind,
    title: &str,
    cover: Option<&str>,
    rating: u8,
) -> Result<ListEntry> {
    if !(1..=10).contains(&rating) {
        return Err(anyhow!("invalid_rating"));
    }
    if content_id.trim().is_empty() || title.trim().is_empty() {
        return Err(anyhow!("invalid_entry"));
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO list_entries (user_id, content_id, kind, title, cover, rating, added_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(user_id, content_id) DO UPDATE SET \
           kind = excluded.kind, title = excluded.title, cover = excluded.cover, \
           rating = excluded.rating, added_at = excluded.added_at",
        params![
            user.to_string(),
            content_id,
            kind.as_str(),
            title,
            cover,
            rating,
            now
        ],
    )?;
    Ok(ListEntry {
        content_id: content_id.into(),
        kind,
        title: title.into(),
        cover: cover.map(Into::into),
        rating,
        added_at: now,
    })
}

/// Full list for a user, newest additions first.
pub fn entries(conn: &Connection, user: &Uuid) -> Result<Vec<ListEntry>> {
    let mut stmt = conn.prepare(
        "SELECT content_id, kind, title, cover, rating, added_at FROM list_entries \
         WHERE user_id = ?1 ORDER BY added_at DESC, content_id",
    )?;
    let entries = stmt
        .query_map([user.to_string()], |row| {
            Ok(ListEntry {
                content_id: row.get(0)?,
                kind: ContentKind::parse(row.get::<_, String>(1)?.as_str())
                    .unwrap_or(ContentKind::Manga),
                title: row.get(2)?,
                cover: row.get(3)?,
                rating: row.get(4)?,
                added_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Case-insensitive substring filter over title and kind.
pub fn filter_entries(entries: &[ListEntry], term: &str) -> Vec<ListEntry> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return entries.to_vec();
    }
    entries
        .iter()
        .filter(|e| {
            e.title.to_lowercase().contains(&term)
                || e.kind.as_str().to_lowercase().contains(&term)
        })
        .cloned()
        .collect()
}

/// Highest-rated `n` entries, rating descending.
pub fn top_n(entries: &[ListEntry], n: usize) -> Vec<ListEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| b.rating.cmp(&a.rating));
    sorted.truncate(n);
    sorted
}
