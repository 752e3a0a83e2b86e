pub mod entities;
pub mod errors;

pub use entities::{MediaRecord, SearchRecord};
pub use errors::CoordinatorError;
