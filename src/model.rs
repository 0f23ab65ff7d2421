use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog content categories, one per external source.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    #[serde(rename = "MANGA")]
    Manga,
    #[serde(rename = "FILM")]
    Film,
    #[serde(rename = "TV_SHOW")]
    TvShow,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Manga => "MANGA",
            ContentKind::Film => "FILM",
            ContentKind::TvShow => "TV_SHOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MANGA" => Some(ContentKind::Manga),
            "FILM" => Some(ContentKind::Film),
            "TV_SHOW" => Some(ContentKind::TvShow),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: i64,
}

/// One rated item in a user's personal list, keyed by content id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub content_id: String,
    pub kind: ContentKind,
    pub title: String,
    pub cover: Option<String>,
    pub rating: u8,
    pub added_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// Directional friend request. The id is derived from the ordered pair so a
/// re-send overwrites the existing document instead of duplicating it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FriendRequest {
    pub id: String,
    pub from_id: Uuid,
    pub from_username: String,
    pub to_id: Uuid,
    pub to_username: String,
    pub status: RequestStatus,
    pub created_at: i64,
}

/// One side of a friendship; the mirror row lives under the other user.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Friend {
    pub friend_id: Uuid,
    pub username: String,
    pub added_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: String,
    pub from_id: Uuid,
    pub from_username: String,
    pub to_id: Uuid,
    pub text: String,
    pub created_at: i64,
    /// Advisory expiry, 24h after creation. Nothing purges expired rows.
    pub expire_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub user_id: Uuid,
    pub username: String,
    pub shared_count: usize,
    pub shared_titles: Vec<String>,
}
