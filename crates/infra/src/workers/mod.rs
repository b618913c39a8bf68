//! Long-running background workers

pub mod index_worker;

pub use index_worker::{VectorIndexWorker, VectorIndexWorkerConfig};
