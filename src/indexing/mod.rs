pub mod document;
pub mod indexer;
pub mod strategy;

pub use document::IndexedDocument;
pub use indexer::{DocumentIndexer, IndexerStats};
pub use strategy::IndexingStrategy;
