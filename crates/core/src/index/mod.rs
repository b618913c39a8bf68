//! Vector-index propagation: staged enqueue and the index consumer

pub mod consumer;
pub mod enqueue;
pub mod normalize;
pub mod ports;

pub use consumer::{ConsumeReport, VectorIndexConsumer};
pub use enqueue::{staged_batch_key, EnqueueSettings, VectorIndexEnqueuer};
pub use normalize::normalize_instant;
pub use ports::*;
