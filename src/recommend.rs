use crate::model::Recommendation;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

const MAX_RESULTS: usize = 5;
const MAX_SAMPLE_TITLES: usize = 3;

/// Score every other user by how many rated items they share with `user` and
/// return the top matches. Candidates that are already friends, or that
/// already have a pending request from `user`, are skipped.
///
/// Full scan over users and their lists; fine at this application's scale.
pub fn recommendations_for(conn: &Connection, user: &Uuid) -> Result<Vec<Recommendation>> {
    let own = content_ids_of(conn, user)?;
    if own.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT id, username FROM users WHERE id <> ?1")?;
    let candidates = stmt
        .query_map([user.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut matches = Vec::new();
    for (candidate_id, username) in candidates {
        let candidate = Uuid::parse_str(&candidate_id)?;
        if is_friend(conn, user, &candidate)? || has_pending_outbound(conn, user, &candidate)? {
            continue;
        }
        let shared = shared_titles(conn, &candidate, &own)?;
        if shared.is_empty() {
            continue;
        }
        let shared_count = shared.len();
        let mut shared_titles = shared;
        shared_titles.truncate(MAX_SAMPLE_TITLES);
        matches.push(Recommendation {
            user_id: candidate,
            username,
            shared_count,
            shared_titles,
        });
    }

    matches.sort_by(|a, b| b.shared_count.cmp(&a.shared_count));
    matches.truncate(MAX_RESULTS);
    Ok(matches)
}

fn content_ids_of(conn: &Connection, user: &Uuid) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT content_id FROM list_entries WHERE user_id = ?1")?;
    let ids = stmt
        .query_map([user.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn shared_titles(conn: &Connection, user: &Uuid, own: &HashSet<String>) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT content_id, title FROM list_entries WHERE user_id = ?1")?;
    let rows = stmt
        .query_map([user.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|(id, _)| own.contains(id))
        .map(|(_, title)| title)
        .collect())
}

fn is_friend(conn: &Connection, user: &Uuid, other: &Uuid) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2")?;
    let exists: Option<i64> = stmt
        .query_row(params![user.to_string(), other.to_string()], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(exists.is_some())
}

fn has_pending_outbound(conn: &Connection, from: &Uuid, to: &Uuid) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT 1 FROM friend_requests WHERE from_id = ?1 AND to_id = ?2 AND status = 'pending'",
    )?;
    let exists: Option<i64> = stmt
        .query_row(params![from.to_string(), to.to_string()], |row| row.get(0))
        .optional()?;
    Ok(exists.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentKind;
    use crate::{db, friends, list, users};

    fn user(conn: &Connection, name: &str) -> Uuid {
        users::create_user(conn, name, &format!("{name}@example.com"), "h")
            .unwrap()
            .id
    }

    fn rate(conn: &Connection, user: &Uuid, content_id: &str, title: &str) {
        list::rate(
            conn,
            user,
            content_id,
            ContentKind::Manga,
            title,
            None,
            7,
        )
        .unwrap();
    }

    #[test]
    fn empty_list_gives_no_recommendations() {
        let conn = db::init_db(":memory:").unwrap();
        let a = user(&conn, "alice");
        let b = user(&conn, "bob");
        rate(&conn, &b, "X", "X");
        assert!(recommendations_for(&conn, &a).unwrap().is_empty());
    }

    #[test]
    fn shared_overlap_scenario() {
        let conn = db::init_db(":memory:").unwrap();
        let a = user(&conn, "alice");
        let b = user(&conn, "bob");
        rate(&conn, &a, "X", "X");
        rate(&conn, &a, "Y", "Y");
        rate(&conn, &b, "Y", "Y");
        rate(&conn, &b, "Z", "Z");

        let recs = recommendations_for(&conn, &a).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].user_id, b);
        assert_eq!(recs[0].shared_count, 1);
        assert_eq!(recs[0].shared_titles, vec!["Y".to_string()]);
    }

    #[test]
    fn excludes_friends_and_pending_outbound() {
        let mut conn = db::init_db(":memory:").unwrap();
        let a = user(&conn, "alice");
        let b = user(&conn, "bob");
        let c = user(&conn, "carol");
        let d = user(&conn, "dave");
        for uid in [&a, &b, &c, &d] {
            rate(&conn, uid, "Y", "Y");
        }

        // b is already a friend
        let req = friends::send_request(&conn, &b, &a).unwrap();
        friends::accept_request(&mut conn, &req.id, &a).unwrap();
        // c has a pending outbound request from a
        friends::send_request(&conn, &a, &c).unwrap();

        let recs = recommendations_for(&conn, &a).unwrap();
        let ids: Vec<_> = recs.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![d]);
    }

    #[test]
    fn inbound_pending_does_not_exclude() {
        let conn = db::init_db(":memory:").unwrap();
        let a = user(&conn, "alice");
        let b = user(&conn, "bob");
        rate(&conn, &a, "Y", "Y");
        rate(&conn, &b, "Y", "Y");
        // b requested a; a's view still recommends b
        friends::send_request(&conn, &b, &a).unwrap();
        let recs = recommendations_for(&conn, &a).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].user_id, b);
    }

    #[test]
    fn ordering_caps_and_sample_titles() {
        let conn = db::init_db(":memory:").unwrap();
        let me = user(&conn, "me");
        for i in 0..6 {
            rate(&conn, &me, &format!("c{i}"), &format!("T{i}"));
        }
        // seven candidates sharing 1..=7 items (capped at 6 available)
        for n in 1..=7usize {
            let u = user(&conn, &format!("user{n}"));
            for i in 0..n.min(6) {
                rate(&conn, &u, &format!("c{i}"), &format!("T{i}"));
            }
        }
        let recs = recommendations_for(&conn, &me).unwrap();
        assert_eq!(recs.len(), 5);
        let counts: Vec<_> = recs.iter().map(|r| r.shared_count).collect();
        let mut sorted = counts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);
        assert_eq!(recs[0].shared_count, 6);
        assert!(recs.iter().all(|r| r.shared_titles.len() <= 3));
    }
}
