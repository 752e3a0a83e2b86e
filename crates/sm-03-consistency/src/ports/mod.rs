pub mod outbound;

pub use outbound::{MediaRepository, ObjectStorage, SearchIndex};
