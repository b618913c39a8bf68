//! Vector index adapters

pub mod opensearch;

pub use opensearch::OpenSearchIndex;
