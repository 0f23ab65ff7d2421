use crate::db;
use crate::model::{Friend, FriendRequest, RequestStatus};
use crate::users;
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

/// Deterministic request id for an ordered (from, to) pair. A re-send
/// overwrites the existing row instead of duplicating it.
pub fn request_id(from: &Uuid, to: &Uuid) -> String {
    format!("{}_{}", from, to)
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: row.get(0)?,
        from_id: db::uuid_column(row, 1)?,
        from_username: row.get(2)?,
        to_id: db::uuid_column(row, 3)?,
        to_username: row.get(4)?,
        status: RequestStatus::parse(row.get::<_, String>(5)?.as_str())
            .unwrap_or(RequestStatus::Pending),
        created_at: row.get(6)?,
    })
}

const REQUEST_COLS: &str = "id, from_id, from_username, to_id, to_username, status, created_at";

/// Send (or re-send) a friend request. Requires both profiles to exist.
pub fn send_request(conn: &Connection, from: &Uuid, to: &Uuid) -> Result<FriendRequest> {
    if from == to {
        return Err(anyhow!("self_request"));
    }
    let sender = users::get_user(conn, from)?.ok_or_else(|| anyhow!("missing_profile"))?;
    let target = users::get_user(conn, to)?.ok_or_else(|| anyhow!("not_found"))?;
    let id = request_id(from, to);
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO friend_requests (id, from_id, from_username, to_id, to_username, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6) \
         ON CONFLICT(id) DO UPDATE SET status = 'pending', created_at = excluded.created_at",
        params![
            id,
            from.to_string(),
            sender.username,
            to.to_string(),
            target.username,
            now
        ],
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLS} FROM friend_requests WHERE id = ?1"
    ))?;
    let req = stmt.query_row(params![id], row_to_request)?;
    Ok(req)
}

/// Pending requests addressed to a user, newest first.
pub fn pending_requests_for(conn: &Connection, to: &Uuid) -> Result<Vec<FriendRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLS} FROM friend_requests \
         WHERE to_id = ?1 AND status = 'pending' ORDER BY created_at DESC"
    ))?;
    let reqs = stmt
        .query_map([to.to_string()], row_to_request)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reqs)
}

/// Accept a pending request addressed to `caller`: flips the status and
/// writes both friendship rows in one transaction, so the friendship is
/// either fully symmetric or not created at all.
pub fn accept_request(conn: &mut Connection, id: &str, caller: &Uuid) -> Result<FriendRequest> {
    let tx = conn.transaction()?;
    let req = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {REQUEST_COLS} FROM friend_requests \
             WHERE id = ?1 AND to_id = ?2 AND status = 'pending'"
        ))?;
        stmt.query_row(params![id, caller.to_string()], row_to_request)
            .optional()?
            .ok_or_else(|| anyhow!("not_found"))?
    };
    tx.execute(
        "UPDATE friend_requests SET status = 'accepted' WHERE id = ?1",
        [id],
    )?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    tx.execute(
        "INSERT OR REPLACE INTO friendships (user_id, friend_id, friend_username, added_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            req.to_id.to_string(),
            req.from_id.to_string(),
            req.from_username,
            now
        ],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO friendships (user_id, friend_id, friend_username, added_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            req.from_id.to_string(),
            req.to_id.to_string(),
            req.to_username,
            now
        ],
    )?;
    tx.commit()?;
    Ok(FriendRequest {
        status: RequestStatus::Accepted,
        ..req
    })
}

/// Decline a pending request addressed to `caller`. The row is kept with a
/// terminal rejected status.
pub fn decline_request(conn: &Connection, id: &str, caller: &Uuid) -> Result<()> {
    let changed = conn.execute(
        "UPDATE friend_requests SET status = 'rejected' \
         WHERE id = ?1 AND to_id = ?2 AND status = 'pending'",
        params![id, caller.to_string()],
    )?;
    if changed == 0 {
        return Err(anyhow!("not_found"));
    }
    Ok(())
}

/// Remove a friendship: both sides' rows go in one transaction.
pub fn remove_friend(conn: &mut Connection, user: &Uuid, friend: &Uuid) -> Result<()> {
    let tx = conn.transaction()?;
    let a = tx.execute(
        "DELETE FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
        params![user.to_string(), friend.to_string()],
    )?;
    let b = tx.execute(
        "DELETE FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
        params![friend.to_string(), user.to_string()],
    )?;
    tx.commit()?;
    if a == 0 && b == 0 {
        return Err(anyhow!("not_found"));
    }
    Ok(())
}

/// A user's friends, alphabetical.
pub fn friends_of(conn: &Connection, user: &Uuid) -> Result<Vec<Friend>> {
    let mut stmt = conn.prepare(
        "SELECT friend_id, friend_username, added_at FROM friendships \
         WHERE user_id = ?1 ORDER BY friend_username",
    )?;
    let friends = stmt
        .query_map([user.to_string()], |row| {
            Ok(Friend {
                friend_id: db::uuid_column(row, 0)?,
                username: row.get(1)?,
                added_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(friends)
}

pub fn are_friends(conn: &Connection, a: &Uuid, b: &Uuid) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2")?;
    let exists: Option<i64> = stmt
        .query_row(params![a.to_string(), b.to_string()], |row| row.get(0))
        .optional()?;
    Ok(exists.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, users};

    fn two_users(conn: &Connection) -> (Uuid, Uuid) {
        let a = users::create_user(conn, "alice", "alice@example.com", "h").unwrap();
        let b = users::create_user(conn, "bob", "bob@example.com", "h").unwrap();
        (a.id, b.id)
    }

    #[test]
    fn resend_is_idempotent() {
        let conn = db::init_db(":memory:").unwrap();
        let (a, b) = two_users(&conn);
        let first = send_request(&conn, &a, &b).unwrap();
        let second = send_request(&conn, &a, &b).unwrap();
        assert_eq!(first.id, second.id);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM friend_requests", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(second.status, RequestStatus::Pending);
    }

    #[test]
    fn send_requires_profiles() {
        let conn = db::init_db(":memory:").unwrap();
        let a = users::create_user(&conn, "alice", "alice@example.com", "h").unwrap();
        let ghost = Uuid::new_v4();
        assert_eq!(
            send_request(&conn, &ghost, &a.id).unwrap_err().to_string(),
            "missing_profile"
        );
        assert_eq!(
            send_request(&conn, &a.id, &ghost).unwrap_err().to_string(),
            "not_found"
        );
        assert!(send_request(&conn, &a.id, &a.id).is_err());
    }

    #[test]
    fn accept_writes_both_sides() {
        let mut conn = db::init_db(":memory:").unwrap();
        let (a, b) = two_users(&conn);
        let req = send_request(&conn, &a, &b).unwrap();
        let accepted = accept_request(&mut conn, &req.id, &b).unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        assert!(are_friends(&conn, &a, &b).unwrap());
        assert!(are_friends(&conn, &b, &a).unwrap());
        let a_friends = friends_of(&conn, &a).unwrap();
        assert_eq!(a_friends.len(), 1);
        assert_eq!(a_friends[0].username, "bob");
        let b_friends = friends_of(&conn, &b).unwrap();
        assert_eq!(b_friends[0].username, "alice");

        // terminal: accepting again is a not_found
        assert!(accept_request(&mut conn, &req.id, &b).is_err());
        assert!(pending_requests_for(&conn, &b).unwrap().is_empty());
    }

    #[test]
    fn accept_only_by_recipient() {
        let mut conn = db::init_db(":memory:").unwrap();
        let (a, b) = two_users(&conn);
        let req = send_request(&conn, &a, &b).unwrap();
        // the sender cannot accept their own request
        assert!(accept_request(&mut conn, &req.id, &a).is_err());
        assert!(!are_friends(&conn, &a, &b).unwrap());
    }

    #[test]
    fn decline_keeps_row_terminal() {
        let conn = db::init_db(":memory:").unwrap();
        let (a, b) = two_users(&conn);
        let req = send_request(&conn, &a, &b).unwrap();
        decline_request(&conn, &req.id, &b).unwrap();
        assert!(decline_request(&conn, &req.id, &b).is_err());
        let status: String = conn
            .query_row(
                "SELECT status FROM friend_requests WHERE id = ?1",
                [&req.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "rejected");
        assert!(pending_requests_for(&conn, &b).unwrap().is_empty());
    }

    #[test]
    fn remove_deletes_both_sides() {
        let mut conn = db::init_db(":memory:").unwrap();
        let (a, b) = two_users(&conn);
        let req = send_request(&conn, &a, &b).unwrap();
        accept_request(&mut conn, &req.id, &b).unwrap();
        remove_friend(&mut conn, &a, &b).unwrap();
        assert!(!are_friends(&conn, &a, &b).unwrap());
        assert!(!are_friends(&conn, &b, &a).unwrap());
        assert!(remove_friend(&mut conn, &a, &b).is_err());
    }

    #[test]
    fn pending_inbox_lists_only_pending() {
        let conn = db::init_db(":memory:").unwrap();
        let (a, b) = two_users(&conn);
        let c = users::create_user(&conn, "carol", "carol@example.com", "h").unwrap();
        send_request(&conn, &a, &b).unwrap();
        let req_c = send_request(&conn, &c.id, &b).unwrap();
        decline_request(&conn, &req_c.id, &b).unwrap();
        let inbox = pending_requests_for(&conn, &b).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from_username, "alice");
    }
}
