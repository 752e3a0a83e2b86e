//! # Social-Mesh Service Runtime
//!
//! Hosts the post, search and media services of the mesh. One binary runs
//! any subset of them (`MESH_SERVICE`), all sharing one store and one bus.
//!
//! ## Request Path
//!
//! ```text
//! client ──→ gateway budget (per IP) ──→ route budget (per user)
//!                                              │
//!                                              ↓
//!                      service: persist ──→ invalidate cache ──→ publish
//! ```
//!
//! ## Event Path
//!
//! ```text
//! post.created ──→ search-service.post.created ──→ SearchIndexCoordinator
//! post.deleted ──┬→ search-service.post.deleted ──→ SearchIndexCoordinator
//!                └→ media-service.post.deleted  ──→ MediaCleanupCoordinator
//! ```
//!
//! ## Modular Structure
//!
//! - `config` - `MeshConfig` and environment overlay
//! - `services/` - post, search and media request handling
//! - `http/` - axum routes, per-route rate limiting, caller identity
//! - `runtime` - wiring, consumer lifecycle, graceful shutdown

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod error;
pub mod http;
pub mod ports;
pub mod runtime;
pub mod services;

pub use adapters::InMemoryPostRepository;
pub use config::{ConfigError, MeshConfig, ServiceRole};
pub use error::{RuntimeError, ServiceError};
pub use http::{build_router, ApiServices};
pub use ports::PostRepository;
pub use runtime::{Repositories, ServiceRuntime};
pub use services::{MediaService, NewMedia, NewPost, PostPage, PostService, SearchService};
