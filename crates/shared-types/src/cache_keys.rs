//! # Cache Key Namespaces
//!
//! Each namespace is owned by exactly one producing service, but any
//! coordinator reacting to a relevant event may invalidate it.
//!
//! | Namespace | Owner | Example |
//! |-----------|-------|---------|
//! | `posts:<page>:<limit>` | post service | `posts:1:10` |
//! | `posts:<postId>` | post service | `posts:p1` |
//! | `search:<query>` | search service | `search:rust` |
//! | `media:<...>` | media service | `media:all` |

use crate::entities::PostId;

/// Prefix of every post view (lists and single posts).
pub const POSTS_PREFIX: &str = "posts:";

/// Prefix of every cached search result.
pub const SEARCH_PREFIX: &str = "search:";

/// Prefix of every cached media listing.
pub const MEDIA_PREFIX: &str = "media:";

/// Paginated post list view.
#[must_use]
pub fn post_list(page: u32, limit: u32) -> String {
    format!("{POSTS_PREFIX}{page}:{limit}")
}

/// Single post view.
#[must_use]
pub fn single_post(id: &PostId) -> String {
    format!("{POSTS_PREFIX}{id}")
}

/// Search result view for a query.
#[must_use]
pub fn search(query: &str) -> String {
    format!("{SEARCH_PREFIX}{query}")
}

/// Listing of all media records.
#[must_use]
pub fn media_list() -> String {
    format!("{MEDIA_PREFIX}all")
}
