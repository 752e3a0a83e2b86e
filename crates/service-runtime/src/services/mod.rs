//! Request-path services.

pub mod media;
pub mod posts;
pub mod search;

pub use media::{MediaService, NewMedia};
pub use posts::{NewPost, PostPage, PostService};
pub use search::{SearchService, MAX_RESULTS};
