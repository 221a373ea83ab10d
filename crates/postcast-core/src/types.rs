//! Post and destination data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a scheduled post carries. Exactly one payload kind per post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostPayload {
    /// Plain text message.
    Text(String),
    /// A media reference (platform file id) with an optional caption.
    Media {
        kind: MediaKind,
        file_id: String,
        caption: Option<String>,
    },
}

impl PostPayload {
    /// Short preview for listings and confirmation screens.
    pub fn preview(&self, max_chars: usize) -> String {
        match self {
            PostPayload::Text(t) => {
                if t.chars().count() > max_chars {
                    let cut: String = t.chars().take(max_chars).collect();
                    format!("{cut}...")
                } else {
                    t.clone()
                }
            }
            PostPayload::Media { kind, caption, .. } => match caption {
                Some(c) if !c.is_empty() => {
                    let cut: String = c.chars().take(max_chars).collect();
                    format!("[{}] {cut}", kind.as_str())
                }
                _ => format!("[{}]", kind.as_str()),
            },
        }
    }
}

/// Media payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "document" => Some(MediaKind::Document),
            _ => None,
        }
    }
}

/// Delivery state of a post. Monotonic: Pending -> Delivered, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    Pending,
    Delivered,
}

/// A scheduled deliverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Row id, assigned by the store on creation.
    pub id: i64,
    pub payload: PostPayload,
    /// UTC delivery instant. Immutable after creation.
    pub scheduled_at: DateTime<Utc>,
    pub state: DeliveryState,
    /// Active-destination count snapshotted at creation. Advisory only;
    /// fan-out always reads the live set.
    pub destination_count: u32,
    /// Destinations successfully delivered. Set once, at completion.
    pub success_count: Option<u32>,
    /// Set exactly once, when the post transitions to Delivered.
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A broadcast target. Removal is a soft delete (active = false).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// Externally assigned identifier (e.g. a Telegram channel id).
    pub id: String,
    pub name: Option<String>,
    pub active: bool,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_preview_truncates() {
        let p = PostPayload::Text("a".repeat(40));
        assert_eq!(p.preview(25).chars().count(), 28); // 25 + "..."
        let short = PostPayload::Text("hi".into());
        assert_eq!(short.preview(25), "hi");
    }

    #[test]
    fn test_media_preview() {
        let p = PostPayload::Media {
            kind: MediaKind::Photo,
            file_id: "abc".into(),
            caption: None,
        };
        assert_eq!(p.preview(25), "[photo]");
    }

    #[test]
    fn test_media_kind_roundtrip() {
        for kind in [MediaKind::Photo, MediaKind::Video, MediaKind::Document] {
            assert_eq!(MediaKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MediaKind::parse("sticker"), None);
    }
}
