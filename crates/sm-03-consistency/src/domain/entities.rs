//! Derived-state records owned by the consuming services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{MediaId, PostCreated, PostId, UserId};

/// Search index entry for one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<PostCreated> for SearchRecord {
    fn from(event: PostCreated) -> Self {
        Self {
            post_id: event.post_id,
            user_id: event.user_id,
            content: event.content,
            created_at: event.created_at,
        }
    }
}

impl SearchRecord {
    /// Number of whitespace-separated `terms` found in the content,
    /// ignoring case.
    #[must_use]
    pub fn score(&self, terms: &[String]) -> usize {
        let content = self.content.to_lowercase();
        terms.iter().filter(|t| content.contains(t.as_str())).count()
    }
}

/// Metadata of an uploaded media object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: MediaId,
    pub user_id: UserId,
    /// Key of the object in object storage.
    pub public_id: String,
    pub url: String,
    pub original_name: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}
