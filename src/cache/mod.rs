//! Two-tier cache
//!
//! A decoded-value memory tier in front of a raw-bytes disk tier, plus the
//! persisted directory listings, composed by [`CacheService`].

pub mod config;
pub mod diagnostics;
pub mod disk;
pub mod listing;
pub mod memory;
pub mod service;

pub use config::CacheConfig;
pub use diagnostics::{BestEffortOp, DiagnosticSink, TracingSink};
pub use disk::DiskCache;
pub use listing::ListingCache;
pub use memory::MemoryCache;
pub use service::{ByteCodec, CacheService, Delivery, FetchOptions, RawBytes};
