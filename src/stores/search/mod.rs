// docvault-core/src/stores/search/mod.rs
// SearchIndexPort backends: `memory` is the canonical in-process index
// (default for a single-node deployment and for tests alike), `elasticsearch`
// is the distributed alternative behind the `elasticsearch` feature.

pub mod memory;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub use memory::MemorySearchIndex;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::ElasticsearchIndex;
