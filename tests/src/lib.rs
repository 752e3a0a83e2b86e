//! # Social-Mesh Test Suite
//!
//! Cross-crate scenarios that no single subsystem crate can exercise alone.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── rate_limiting.rs  # fixed-window admission over a shared store, HTTP 429/503
//!     ├── event_bus.rs      # fan-out, competing consumers, retry, dead-letter
//!     ├── consistency.rs    # post events propagated to search and media
//!     └── caching.rs        # invalidate-then-respond on the post write path
//! tests/benches/
//! └── mesh_benchmarks.rs    # admission and cache hot paths
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sm-tests
//! cargo test -p sm-tests integration::consistency::
//! cargo bench -p sm-tests
//! ```

pub mod integration;
