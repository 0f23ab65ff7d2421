use crate::db;
use crate::model::User;
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

/// Create a user profile row at signup.
pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let username = username.trim();
    let email = email.trim();
    if username.is_empty() {
        return Err(anyhow!("invalid_username"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(anyhow!("invalid_email"));
    }
    let id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let res = conn.execute(
        "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), username, email, password_hash, now],
    );
    match res {
        Ok(_) => Ok(User {
            id,
            username: username.into(),
            email: email.into(),
            created_at: now,
        }),
        Err(e) => {
            if matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::ConstraintViolation)
            ) {
                Err(anyhow!("duplicate_user"))
            } else {
                Err(e.into())
            }
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: db::uuid_column(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>> {
    let mut stmt =
        conn.prepare("SELECT id, username, email, created_at FROM users WHERE id = ?1")?;
    let user = stmt
        .query_row([id.to_string()], row_to_user)
        .optional()?;
    Ok(user)
}

/// Look up a user by email for login, returning the stored password hash.
pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<(User, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email, created_at, password_hash FROM users WHERE email = ?1",
    )?;
    let found = stmt
        .query_row([email], |row| Ok((row_to_user(row)?, row.get::<_, String>(4)?)))
        .optional()?;
    Ok(found)
}

/// Prefix search over usernames, excluding the requester.
///
/// The window is the document-store range trick: usernames in
/// `[term, term + U+F8FF]`, which captures every username starting with the
/// term.
pub fn search_by_prefix(conn: &Connection, term: &str, requester: &Uuid) -> Result<Vec<User>> {
    let term = term.trim();
    if term.is_empty() {
        return Err(anyhow!("empty_search"));
    }
    let upper = format!("{term}\u{f8ff}");
    let mut stmt = conn.prepare(
        "SELECT id, username, email, created_at FROM users \
         WHERE username >= ?1 AND username <= ?2 AND id <> ?3 ORDER BY username",
    )?;
    let users = stmt
        .query_map(params![term, upper, requester.to_string()], row_to_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}
